// crates.io
use rand::Rng;
// self
use crate::_prelude::*;

/// Exponential backoff policy with random jitter.
///
/// Attempt `n` (zero-based) waits `base_delay * 2^n`, capped at `max_delay`, then scaled by a
/// random factor in `[0.5, 1.5)` and capped again. A server `Retry-After` hint replaces the
/// computed delay but still honors the cap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
	/// Total attempts, including the first one.
	pub max_attempts: u32,
	/// Delay before the first retry.
	pub base_delay: Duration,
	/// Upper bound for any single delay.
	pub max_delay: Duration,
}
impl RetryPolicy {
	/// Creates a policy with explicit bounds.
	pub const fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
		Self { max_attempts, base_delay, max_delay }
	}

	/// Policy that never retries.
	pub const fn none() -> Self {
		Self::new(1, Duration::ZERO, Duration::ZERO)
	}

	/// Returns the delay to wait after the failed attempt `attempt` (zero-based).
	pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
		if let Some(hint) = retry_after {
			return hint.clamp(Duration::ZERO, self.max_delay);
		}

		let exp = self
			.base_delay
			.checked_mul(1_i32 << attempt.min(30))
			.map_or(self.max_delay, |delay| delay.min(self.max_delay));
		let jitter: f64 = rand::rng().random_range(0.5..1.5);

		Duration::checked_seconds_f64(exp.as_seconds_f64() * jitter)
			.map_or(self.max_delay, |delay| delay.min(self.max_delay))
	}

	/// Returns `true` if another attempt is allowed after `attempt` (zero-based) failed.
	pub fn allows_retry_after(&self, attempt: u32) -> bool {
		attempt + 1 < self.max_attempts
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self::new(5, Duration::seconds(2), Duration::seconds(60))
	}
}
