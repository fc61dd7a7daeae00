pub mod focus;
pub mod status;
