//! Backoff schedule for failed cache loads.

// self
use crate::_prelude::*;

/// Exponential backoff applied to transient load failures.
///
/// Attempt `n` (zero-based) waits `min(base_delay * 2^n, max_delay)` before retrying. Only
/// [`Error::is_transient`] failures are retried.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Retries after the first failed attempt.
	pub max_retries: u32,
	/// Delay before the first retry.
	pub base_delay: StdDuration,
	/// Upper bound for any single delay.
	pub max_delay: StdDuration,
}
impl RetryPolicy {
	/// Policy that surfaces the first failure.
	pub const NONE: Self =
		Self { max_retries: 0, base_delay: StdDuration::ZERO, max_delay: StdDuration::ZERO };

	/// Delay before retry number `attempt` (zero-based).
	pub fn delay(&self, attempt: u32) -> StdDuration {
		let factor = 1_u32.checked_shl(attempt).unwrap_or(u32::MAX);

		self.base_delay.saturating_mul(factor).min(self.max_delay)
	}

	/// Returns the delay to wait before retrying `error`, or `None` when it must surface.
	pub fn next_delay(&self, error: &Error, attempt: u32) -> Option<StdDuration> {
		(error.is_transient() && attempt < self.max_retries).then(|| self.delay(attempt))
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: 2,
			base_delay: StdDuration::from_millis(1_000),
			max_delay: StdDuration::from_millis(30_000),
		}
	}
}
