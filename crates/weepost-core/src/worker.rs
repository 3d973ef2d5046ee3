//! The delivery worker: one long-lived loop draining the backlog.
//!
//! Per sample: take → staleness check → pacing → projection → POST with
//! retry. Every failure is confined to the sample it happened on; only
//! closing the backlog ends the loop.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::backlog::{Backlog, Submit};
use crate::error::DeliveryError;
use crate::projector::FieldProjector;
use crate::retry::{Delivered, RetryPolicy, retry_with_wait};
use crate::sample::Sample;
use crate::transport::{JSON_CONTENT_TYPE, PostRequest, Transport};

/// Validated runtime settings for the worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub endpoint: String,
    /// Plain credential, base64-encoded on the wire
    pub key: String,
    /// Minimum spacing between delivery attempts
    pub post_interval: Duration,
    /// Samples older than this are discarded; `None` disables the check
    pub stale: Option<Duration>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub log_success: bool,
    pub log_failure: bool,
    /// Build documents but never send them
    pub skip_upload: bool,
}

/// Terminal state of one sample
#[derive(Debug)]
pub enum Disposition {
    Delivered(Delivered),
    /// Older than the `stale` threshold; nothing was sent
    Stale { age: Duration },
    /// Projected but not sent (`skip_upload`)
    Skipped,
    Abandoned(DeliveryError),
}

/// Counters accumulated over the worker's lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub taken: u64,
    pub delivered: u64,
    pub stale: u64,
    pub skipped: u64,
    pub abandoned: u64,
    pub interrupted: u64,
    /// Attempts beyond the first, across all samples
    pub retries: u64,
    /// Samples dropped by backlog overflow
    pub evicted: u64,
}

impl WorkerStats {
    fn record(&mut self, disposition: &Disposition) {
        self.taken += 1;
        match disposition {
            Disposition::Delivered(d) => {
                self.delivered += 1;
                self.retries += u64::from(d.attempts.saturating_sub(1));
            }
            Disposition::Stale { .. } => self.stale += 1,
            Disposition::Skipped => self.skipped += 1,
            Disposition::Abandoned(e) => {
                if e.is_interrupted() {
                    self.interrupted += 1;
                } else {
                    self.abandoned += 1;
                }
                self.retries += u64::from(e.attempts().saturating_sub(1));
            }
        }
    }

    /// Log a summary (used at worker exit)
    pub fn log(&self) {
        log::info!(
            "Samples: {} taken, {} delivered, {} stale, {} abandoned, {} interrupted",
            self.taken,
            self.delivered,
            self.stale,
            self.abandoned,
            self.interrupted
        );
        if self.skipped > 0 {
            log::info!("Upload skipped for {} samples", self.skipped);
        }
        log::info!("Retries: {}, evicted by backlog: {}", self.retries, self.evicted);
    }
}

pub struct DeliveryWorker<T> {
    config: WorkerConfig,
    projector: FieldProjector,
    transport: T,
    backlog: Arc<Backlog<Sample>>,
    last_attempt: Option<Instant>,
    stats: WorkerStats,
}

impl<T: Transport> DeliveryWorker<T> {
    pub fn new(
        config: WorkerConfig,
        projector: FieldProjector,
        transport: T,
        backlog: Arc<Backlog<Sample>>,
    ) -> Self {
        Self {
            config,
            projector,
            transport,
            backlog,
            last_attempt: None,
            stats: WorkerStats::default(),
        }
    }

    /// Loop until the backlog is closed, or finished and drained.
    pub fn run(mut self) -> WorkerStats {
        log::info!(
            "Samples will be posted to {} ({} filters)",
            self.config.endpoint,
            self.projector.len()
        );
        while let Some(sample) = self.backlog.take() {
            let disposition = self.process(&sample);
            self.stats.record(&disposition);
        }
        self.stats.evicted = self.backlog.evicted();
        log::info!("Delivery worker stopped");
        self.stats.log();
        self.stats
    }

    /// Carry one sample to a terminal state.
    pub fn process(&mut self, sample: &Sample) -> Disposition {
        let label = label(sample);

        if let Some(age) = self.stale_age(sample) {
            log::info!("{label}: discarded, {}s old", age.as_secs());
            return Disposition::Stale { age };
        }

        if !self.pace() {
            return self.abandon(&label, DeliveryError::Interrupted { attempts: 0 });
        }

        let document = match self.projector.project(sample) {
            Ok(doc) => doc,
            Err(e) => return self.abandon(&label, DeliveryError::Projection(e)),
        };
        let body = match document.to_json() {
            Ok(body) => body,
            Err(e) => return self.abandon(&label, DeliveryError::Encode(e)),
        };

        if self.config.skip_upload {
            log::debug!(
                "{label}: upload skipped: {}",
                String::from_utf8_lossy(&body)
            );
            return Disposition::Skipped;
        }

        match self.deliver(&label, &body) {
            Ok(delivered) => {
                if self.config.log_success {
                    log::info!(
                        "{label}: posted {} fields (HTTP {}, attempt {})",
                        document.len(),
                        delivered.status,
                        delivered.attempts
                    );
                } else {
                    log::debug!("{label}: posted {} fields", document.len());
                }
                Disposition::Delivered(delivered)
            }
            Err(e) => self.abandon(&label, e),
        }
    }

    fn abandon(&self, label: &str, error: DeliveryError) -> Disposition {
        if error.is_interrupted() {
            log::warn!("{label}: {error}");
        } else if self.config.log_failure {
            log::error!("{label}: {error}");
        } else {
            log::debug!("{label}: {error}");
        }
        Disposition::Abandoned(error)
    }

    /// Age of the sample if it exceeds the staleness threshold
    fn stale_age(&self, sample: &Sample) -> Option<Duration> {
        let threshold = self.config.stale?;
        let ts = sample.timestamp()?;
        let age = (Utc::now() - ts).to_std().ok()?;
        (age > threshold).then_some(age)
    }

    /// Wait out the remainder of `post_interval` since the last attempt.
    /// Returns `false` if shutdown cut the wait short.
    fn pace(&self) -> bool {
        let Some(last) = self.last_attempt else {
            return true;
        };
        let elapsed = last.elapsed();
        if elapsed >= self.config.post_interval {
            return true;
        }
        let remaining = self.config.post_interval - elapsed;
        log::trace!("pacing: waiting {remaining:?}");
        self.backlog.pause(remaining)
    }

    fn deliver(&mut self, label: &str, body: &[u8]) -> Result<Delivered, DeliveryError> {
        let Self {
            config,
            transport,
            backlog,
            last_attempt,
            ..
        } = self;
        let request = PostRequest {
            endpoint: &config.endpoint,
            credential: &config.key,
            body,
            content_type: JSON_CONTENT_TYPE,
            timeout: config.timeout,
        };
        retry_with_wait(
            label,
            &config.retry,
            |wait| backlog.pause(wait),
            |_| {
                *last_attempt = Some(Instant::now());
                transport.post(&request)
            },
        )
    }
}

fn label(sample: &Sample) -> String {
    match sample.timestamp() {
        Some(ts) => format!("sample {}", ts.format("%Y-%m-%d %H:%M:%S")),
        None => "sample (no timestamp)".to_string(),
    }
}

/// Producer-side handle: the only way samples reach the worker.
#[derive(Clone)]
pub struct Producer {
    backlog: Arc<Backlog<Sample>>,
}

impl Producer {
    pub fn new(backlog: Arc<Backlog<Sample>>) -> Self {
        Self { backlog }
    }

    /// Hand over a new sample without blocking.
    ///
    /// Returns `false` if the worker no longer accepts samples.
    pub fn submit(&self, sample: Sample) -> bool {
        match self.backlog.submit(sample) {
            Submit::Queued => true,
            Submit::Evicted(old) => {
                log::debug!(
                    "backlog full ({}), dropped oldest {}",
                    self.backlog.capacity(),
                    label(&old)
                );
                true
            }
            Submit::Refused(_) => {
                log::debug!("backlog closed, sample refused");
                false
            }
        }
    }

    /// No more samples will follow; the worker drains and exits.
    pub fn finish(&self) {
        self.backlog.finish();
    }
}

/// A running worker thread plus its backlog.
pub struct WorkerHandle {
    backlog: Arc<Backlog<Sample>>,
    thread: JoinHandle<WorkerStats>,
}

impl WorkerHandle {
    pub fn spawn<T: Transport + 'static>(worker: DeliveryWorker<T>) -> std::io::Result<Self> {
        let backlog = worker.backlog.clone();
        let thread = std::thread::Builder::new()
            .name("weepost-worker".to_string())
            .spawn(move || worker.run())?;
        Ok(Self { backlog, thread })
    }

    pub fn producer(&self) -> Producer {
        Producer::new(self.backlog.clone())
    }

    pub fn backlog(&self) -> &Arc<Backlog<Sample>> {
        &self.backlog
    }

    pub fn submit(&self, sample: Sample) -> bool {
        self.producer().submit(sample)
    }

    /// Deliver everything already queued, then stop.
    pub fn finish(self) -> WorkerStats {
        self.backlog.finish();
        self.join()
    }

    /// Stop at the next suspension point; queued samples are dropped.
    pub fn stop(self) -> WorkerStats {
        let dropped = self.backlog.close();
        if dropped > 0 {
            log::warn!("{dropped} queued samples dropped on shutdown");
        }
        self.join()
    }

    /// Wait for the worker to exit on its own (after `finish` or `close`).
    pub fn join(self) -> WorkerStats {
        self.thread.join().unwrap_or_else(|_| {
            log::error!("delivery worker panicked");
            WorkerStats::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projector::EvalErrorPolicy;
    use crate::transport::{Outcome, PostError};
    use std::sync::Mutex;

    /// Transport replaying canned outcomes, recording each body it sees
    struct Scripted {
        outcomes: Mutex<Vec<Outcome>>,
        bodies: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(mut outcomes: Vec<Outcome>) -> Arc<Self> {
            outcomes.reverse();
            Arc::new(Self {
                outcomes: Mutex::new(outcomes),
                bodies: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.bodies.lock().unwrap().len()
        }
    }

    impl Transport for Scripted {
        fn post(&self, request: &PostRequest<'_>) -> Outcome {
            self.bodies
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(request.body).into_owned());
            self.outcomes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Outcome::Success { status: 200 })
        }
    }

    fn config() -> WorkerConfig {
        WorkerConfig {
            endpoint: "http://127.0.0.1:9/live".into(),
            key: "secret".into(),
            post_interval: Duration::ZERO,
            stale: None,
            timeout: Duration::from_secs(1),
            retry: RetryPolicy {
                max_tries: 3,
                wait: Duration::from_millis(20),
            },
            log_success: true,
            log_failure: true,
            skip_upload: false,
        }
    }

    fn worker(config: WorkerConfig, transport: Arc<Scripted>) -> DeliveryWorker<Arc<Scripted>> {
        let projector = FieldProjector::compile(
            [("last-updated", "dateTime"), ("current.outTemp", "outTemp")],
            EvalErrorPolicy::Abandon,
        )
        .unwrap();
        DeliveryWorker::new(config, projector, transport, Arc::new(Backlog::unbounded()))
    }

    fn fresh() -> Sample {
        Sample::new()
            .with("dateTime", Utc::now().timestamp())
            .with("outTemp", 72.5)
    }

    fn unavailable() -> Outcome {
        Outcome::Retryable(PostError::Http {
            status: Some(503),
            message: "busy".into(),
        })
    }

    #[test]
    fn stale_sample_never_reaches_transport() {
        let transport = Scripted::new(vec![]);
        let mut w = worker(
            WorkerConfig {
                stale: Some(Duration::from_secs(30)),
                ..config()
            },
            transport.clone(),
        );
        let old = Sample::new()
            .with("dateTime", Utc::now().timestamp() - 31)
            .with("outTemp", 1.0);
        assert!(matches!(w.process(&old), Disposition::Stale { .. }));
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn sample_within_stale_window_is_sent() {
        let transport = Scripted::new(vec![]);
        let mut w = worker(
            WorkerConfig {
                stale: Some(Duration::from_secs(30)),
                ..config()
            },
            transport.clone(),
        );
        let recent = Sample::new().with("dateTime", Utc::now().timestamp() - 5);
        assert!(matches!(w.process(&recent), Disposition::Delivered(_)));
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn sample_without_timestamp_is_never_stale() {
        let transport = Scripted::new(vec![]);
        let mut w = worker(
            WorkerConfig {
                stale: Some(Duration::from_secs(1)),
                ..config()
            },
            transport.clone(),
        );
        let d = w.process(&Sample::new().with("outTemp", 3i64));
        assert!(matches!(d, Disposition::Delivered(_)));
        assert_eq!(transport.bodies.lock().unwrap()[0], r#"{"current.outTemp":3}"#);
    }

    #[test]
    fn retries_then_delivers_with_two_waits() {
        let transport = Scripted::new(vec![unavailable(), unavailable()]);
        let mut w = worker(config(), transport.clone());
        let start = Instant::now();
        let d = w.process(&fresh());
        assert!(start.elapsed() >= Duration::from_millis(40));
        let Disposition::Delivered(delivered) = d else {
            panic!("expected delivery, got {d:?}");
        };
        assert_eq!(delivered.attempts, 3);
        assert_eq!(transport.calls(), 3);
    }

    #[test]
    fn always_failing_is_abandoned_after_max_tries() {
        let transport = Scripted::new(vec![unavailable(); 10]);
        let mut w = worker(config(), transport.clone());
        let d = w.process(&fresh());
        assert!(matches!(
            d,
            Disposition::Abandoned(DeliveryError::Exhausted { attempts: 3, .. })
        ));
        assert_eq!(transport.calls(), 3);
    }

    #[test]
    fn non_retryable_abandons_after_one_attempt() {
        let transport = Scripted::new(vec![Outcome::NonRetryable(PostError::Http {
            status: Some(401),
            message: "bad key".into(),
        })]);
        let mut w = worker(config(), transport.clone());
        let d = w.process(&fresh());
        assert!(matches!(
            d,
            Disposition::Abandoned(DeliveryError::Rejected { attempts: 1, .. })
        ));
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn projection_error_sends_nothing() {
        let transport = Scripted::new(vec![]);
        let projector =
            FieldProjector::compile([("bad", "outTemp / 0")], EvalErrorPolicy::Abandon).unwrap();
        let mut w = DeliveryWorker::new(
            config(),
            projector,
            transport.clone(),
            Arc::new(Backlog::unbounded()),
        );
        let d = w.process(&fresh());
        assert!(matches!(d, Disposition::Abandoned(DeliveryError::Projection(_))));
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn skip_upload_builds_but_does_not_send() {
        let transport = Scripted::new(vec![]);
        let mut w = worker(
            WorkerConfig {
                skip_upload: true,
                ..config()
            },
            transport.clone(),
        );
        assert!(matches!(w.process(&fresh()), Disposition::Skipped));
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn pacing_spaces_consecutive_deliveries() {
        let transport = Scripted::new(vec![]);
        let mut w = worker(
            WorkerConfig {
                post_interval: Duration::from_millis(60),
                ..config()
            },
            transport.clone(),
        );
        let start = Instant::now();
        w.process(&fresh());
        w.process(&fresh());
        assert!(start.elapsed() >= Duration::from_millis(60));
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn run_drains_in_order_and_counts() {
        let transport = Scripted::new(vec![
            Outcome::Success { status: 200 },
            Outcome::NonRetryable(PostError::Invalid("bad".into())),
        ]);
        let w = worker(config(), transport.clone());
        let handle = WorkerHandle::spawn(w).unwrap();
        let producer = handle.producer();
        for t in [1i64, 2, 3] {
            assert!(producer.submit(Sample::new().with("outTemp", t)));
        }
        let stats = handle.finish();

        assert_eq!(stats.taken, 3);
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.abandoned, 1);
        let bodies = transport.bodies.lock().unwrap().clone();
        assert_eq!(
            bodies,
            vec![
                r#"{"current.outTemp":1}"#,
                r#"{"current.outTemp":2}"#,
                r#"{"current.outTemp":3}"#,
            ]
        );
    }

    #[test]
    fn stop_interrupts_retry_wait() {
        let transport = Scripted::new(vec![unavailable(); 10]);
        let w = worker(
            WorkerConfig {
                retry: RetryPolicy {
                    max_tries: 10,
                    wait: Duration::from_secs(60),
                },
                ..config()
            },
            transport.clone(),
        );
        let handle = WorkerHandle::spawn(w).unwrap();
        handle.submit(fresh());
        while transport.calls() == 0 {
            std::thread::sleep(Duration::from_millis(5));
        }
        let start = Instant::now();
        let stats = handle.stop();
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(stats.interrupted, 1);
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn submit_refused_after_finish() {
        let transport = Scripted::new(vec![]);
        let handle = WorkerHandle::spawn(worker(config(), transport)).unwrap();
        let producer = handle.producer();
        producer.finish();
        assert!(!producer.submit(fresh()));
        let stats = handle.join();
        assert_eq!(stats.taken, 0);
    }
}
