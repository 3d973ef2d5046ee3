//! Bounded retry with a fixed wait between attempts

use std::time::Duration;

use crate::error::DeliveryError;
use crate::transport::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (at least 1)
    pub max_tries: u32,
    /// Pause between a retryable failure and the next attempt
    pub wait: Duration,
}

/// Successful delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivered {
    pub status: u16,
    pub attempts: u32,
}

/// Run `attempt_fn` until it succeeds, fails non-retryably, or `max_tries`
/// attempts are used up.
///
/// `pause` performs the wait between attempts and returns `false` if it was
/// cut short by shutdown, which ends the loop.
pub fn retry_with_wait(
    label: &str,
    policy: &RetryPolicy,
    mut pause: impl FnMut(Duration) -> bool,
    mut attempt_fn: impl FnMut(u32) -> Outcome,
) -> Result<Delivered, DeliveryError> {
    let max_tries = policy.max_tries.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match attempt_fn(attempt) {
            Outcome::Success { status } => {
                return Ok(Delivered {
                    status,
                    attempts: attempt,
                });
            }
            Outcome::Retryable(e) if attempt < max_tries => {
                log::debug!(
                    "{label}: attempt {attempt}/{max_tries} failed: {e}, retrying in {:?}",
                    policy.wait
                );
                if !pause(policy.wait) {
                    return Err(DeliveryError::Interrupted { attempts: attempt });
                }
            }
            Outcome::Retryable(last) => {
                return Err(DeliveryError::Exhausted {
                    attempts: attempt,
                    last,
                });
            }
            Outcome::NonRetryable(error) => {
                return Err(DeliveryError::Rejected {
                    attempts: attempt,
                    error,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::PostError;

    const POLICY: RetryPolicy = RetryPolicy {
        max_tries: 3,
        wait: Duration::from_secs(5),
    };

    fn unavailable() -> Outcome {
        Outcome::Retryable(PostError::Http {
            status: Some(503),
            message: "busy".into(),
        })
    }

    #[test]
    fn first_try_success_never_pauses() {
        let mut pauses = 0;
        let r = retry_with_wait(
            "t",
            &POLICY,
            |_| {
                pauses += 1;
                true
            },
            |_| Outcome::Success { status: 200 },
        );
        assert_eq!(r.unwrap(), Delivered { status: 200, attempts: 1 });
        assert_eq!(pauses, 0);
    }

    #[test]
    fn succeeds_on_third_attempt_after_two_pauses() {
        let mut waits = Vec::new();
        let r = retry_with_wait(
            "t",
            &POLICY,
            |d| {
                waits.push(d);
                true
            },
            |n| if n < 3 { unavailable() } else { Outcome::Success { status: 201 } },
        );
        assert_eq!(r.unwrap().attempts, 3);
        assert_eq!(waits, vec![Duration::from_secs(5); 2]);
    }

    #[test]
    fn exhausts_after_max_tries() {
        let mut calls = 0;
        let r = retry_with_wait("t", &POLICY, |_| true, |_| {
            calls += 1;
            unavailable()
        });
        assert!(matches!(r, Err(DeliveryError::Exhausted { attempts: 3, .. })));
        assert_eq!(calls, 3);
    }

    #[test]
    fn non_retryable_stops_immediately() {
        let mut calls = 0;
        let r = retry_with_wait("t", &POLICY, |_| true, |_| {
            calls += 1;
            Outcome::NonRetryable(PostError::Http {
                status: Some(400),
                message: "bad".into(),
            })
        });
        assert!(matches!(r, Err(DeliveryError::Rejected { attempts: 1, .. })));
        assert_eq!(calls, 1);
    }

    #[test]
    fn interrupted_pause_ends_loop() {
        let r = retry_with_wait("t", &POLICY, |_| false, |_| unavailable());
        assert!(matches!(r, Err(DeliveryError::Interrupted { attempts: 1 })));
    }

    #[test]
    fn zero_max_tries_still_attempts_once() {
        let policy = RetryPolicy {
            max_tries: 0,
            wait: Duration::ZERO,
        };
        let mut calls = 0;
        let _ = retry_with_wait("t", &policy, |_| true, |_| {
            calls += 1;
            unavailable()
        });
        assert_eq!(calls, 1);
    }
}
