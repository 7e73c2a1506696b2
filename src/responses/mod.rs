//! Asynchronous response lifecycle: state machine and manager.

pub mod manager;
pub mod state;

pub use manager::ResponseManager;
pub use state::{ResponseState, ResponseStatus};
