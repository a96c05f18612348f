use std::future::Future;
use std::time::Duration;

use crate::errors::WorkflowError;

/// Fixed-interval polling bounded by a number of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_polls: u32,
}

impl PollPolicy {
    pub fn new(interval_secs: u64, max_polls: u32) -> Self {
        Self { interval: Duration::from_secs(interval_secs), max_polls }
    }
}

/// Outcome of one status check.
#[derive(Debug)]
pub enum PollStep<T> {
    Pending(String),
    Done(T),
}

/// Check until it reports `Done`, an error, or the attempt budget runs out.
pub async fn poll_until<T, F, Fut>(
    policy: PollPolicy,
    what: &str,
    mut check: F,
) -> Result<T, WorkflowError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStep<T>, WorkflowError>>,
{
    for attempt in 1..=policy.max_polls {
        match check().await? {
            PollStep::Done(value) => return Ok(value),
            PollStep::Pending(status) => {
                tracing::debug!(
                    event_name = "platform.poll.pending",
                    what,
                    status = %status,
                    attempt,
                    max_polls = policy.max_polls,
                    "still waiting"
                );
                if attempt < policy.max_polls && !policy.interval.is_zero() {
                    tokio::time::sleep(policy.interval).await;
                }
            }
        }
    }

    Err(WorkflowError::Timeout { what: what.to_owned(), attempts: policy.max_polls })
}
