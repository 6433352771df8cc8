//! Tracing setup shared by the exporter binaries.

mod tracing;

pub use self::tracing::{init as init_tracing, init_with_level};
