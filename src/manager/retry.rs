// self
use crate::{
	_prelude::*,
	config::RetryPolicy,
	obs::{self, FlowKind, FlowOutcome},
};

/// Runs `op` until it succeeds, fails with a non-retryable error, or the policy runs out of
/// attempts. Delays use the Tokio clock.
pub(crate) async fn with_retry<F, Fut, T>(policy: &RetryPolicy, kind: FlowKind, mut op: F) -> Result<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T>>,
{
	let mut attempt = 0;

	loop {
		match op().await {
			Ok(value) => return Ok(value),
			Err(e) if e.is_retryable() && policy.allows_retry_after(attempt) => {
				let delay = policy.delay_for(attempt, e.retry_after());

				obs::warn_retry(kind, attempt + 1, delay, &e);
				obs::record_flow_outcome(kind, FlowOutcome::Retry);
				sleep(delay).await;

				attempt += 1;
			},
			Err(e) => return Err(e),
		}
	}
}

/// Sleeps for a `time` duration; negative values return immediately.
pub(crate) async fn sleep(delay: Duration) {
	if let Ok(delay) = std::time::Duration::try_from(delay) {
		tokio::time::sleep(delay).await;
	}
}
