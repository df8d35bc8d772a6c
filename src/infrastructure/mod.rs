//! Infrastructure: logging bootstrap.

pub mod logging;

pub use logging::{LogConfig, LogFormat, Logger};
