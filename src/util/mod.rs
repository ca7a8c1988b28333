//! Shared utilities

pub mod shutdown;
pub mod time;

pub use shutdown::{Shutdown, ShutdownTrigger};
