//! Utility modules: ids, timeout.

pub mod ids;
pub mod timeout;
