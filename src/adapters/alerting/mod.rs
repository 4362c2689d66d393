//! Alert sink adapters.

mod tracing_sink;

pub use tracing_sink::TracingAlertSink;
