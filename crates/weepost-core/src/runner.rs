//! Service entry point: validate everything, then start the worker

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::backlog::Backlog;
use crate::config::Config;
use crate::transport::HttpTransport;
use crate::worker::{DeliveryWorker, WorkerHandle};

/// Start a delivery worker for `config`.
///
/// Missing credentials, out-of-range numbers and malformed filter
/// expressions all fail here, before any thread is spawned.
pub fn start(config: &Config) -> Result<WorkerHandle> {
    let worker_config = config.worker_config()?;
    let projector = config.projector()?;
    let transport =
        HttpTransport::new(&config.user_agent).context("Failed to build HTTP client")?;

    let backlog = Arc::new(match config.max_backlog {
        Some(capacity) => Backlog::new(capacity),
        None => Backlog::unbounded(),
    });
    log::debug!(
        "backlog capacity: {}, post interval: {:?}, max tries: {}",
        config
            .max_backlog
            .map_or_else(|| "unbounded".to_string(), |c| c.to_string()),
        worker_config.post_interval,
        worker_config.retry.max_tries
    );
    if worker_config.skip_upload {
        log::warn!("skip_upload is set: documents will be built but not posted");
    }

    let worker = DeliveryWorker::new(worker_config, projector, transport, backlog);
    WorkerHandle::spawn(worker).context("Failed to spawn delivery worker")
}
