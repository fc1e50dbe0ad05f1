//! CLI command implementations.

pub mod convert;
pub mod sign;
pub mod sync;
pub mod watch;
