//! Canonical types shared by every backend.

pub mod conversation;
pub mod generation;
pub mod message;
pub mod stream;
pub mod usage;

pub use conversation::*;
pub use generation::*;
pub use message::*;
pub use stream::*;
pub use usage::*;
