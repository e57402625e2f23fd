//! Tracing setup: stdout plus a daily rolling file under the configured log dir.

mod logger;

pub use logger::init_logger;
