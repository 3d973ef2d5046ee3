//! WeePOST Core - posts live weather samples to an HTTP endpoint
//!
//! Samples are handed to a bounded backlog without blocking the producer.
//! A single delivery worker drains it: each sample is checked for
//! staleness, projected through compiled filter expressions into a JSON
//! document, and POSTed with a base64 credential header, retrying
//! transient failures.

pub mod backlog;
pub mod config;
pub mod error;
pub mod expr;
pub mod logging;
pub mod projector;
pub mod retry;
pub mod runner;
pub mod sample;
pub mod shutdown;
pub mod transport;
pub mod value;
pub mod worker;

// Re-exports for convenience
pub use backlog::{Backlog, Submit};
pub use config::{Config, default_loop_filters};
pub use error::DeliveryError;
pub use logging::init_logging;
pub use projector::{EvalErrorPolicy, FieldError, FieldProjector, OutputDocument, ProjectorError};
pub use retry::{Delivered, RetryPolicy};
pub use runner::start;
pub use sample::Sample;
pub use shutdown::{install_signal_handlers, is_shutdown_requested, request_shutdown};
pub use transport::{HttpTransport, Outcome, PostError, PostRequest, Transport};
pub use value::Value;
pub use worker::{DeliveryWorker, Disposition, Producer, WorkerConfig, WorkerHandle, WorkerStats};
