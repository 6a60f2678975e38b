//! Shared utilities for Larder.

pub mod logging;
pub mod stats;
pub mod sync;

pub use logging::{init_logging, try_init_logging, LogFormat, LoggingError};
pub use stats::StatsCounter;
pub use sync::lock;
