use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PollError {
    #[error("poll key must not be empty")]
    EmptyKey,

    #[error("poll interval for '{key}' must be greater than zero")]
    InvalidInterval { key: String },

    #[error("coordinator has been disposed")]
    Disposed,
}
