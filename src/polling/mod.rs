mod coordinator;
mod error;
mod foreground;
mod registration;

pub use coordinator::{CoordinatorConfig, PollHandle, PollingCoordinator};
pub use error::PollError;
pub use foreground::ForegroundSignal;
pub use registration::{PollOptions, PollState, PollStatus};
