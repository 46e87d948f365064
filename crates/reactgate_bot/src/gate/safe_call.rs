#![forbid(unsafe_code)]

use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

/// Retry policy for guarded calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafeCallPolicy {
	/// Total attempts, including the first. Values below 1 behave as 1.
	pub max_attempts: u32,
	/// Delay before the first retry; doubles on each further retry.
	pub retry_delay: Duration,
}

impl Default for SafeCallPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 1,
			retry_delay: Duration::from_millis(250),
		}
	}
}

impl SafeCallPolicy {
	/// Single attempt, no retry.
	pub const fn single_attempt() -> Self {
		Self {
			max_attempts: 1,
			retry_delay: Duration::ZERO,
		}
	}

	fn delay_for(&self, retry: u32) -> Duration {
		self.retry_delay.saturating_mul(1u32 << retry.min(16))
	}
}

/// Run a fallible operation, absorbing its failure.
///
/// Returns `Some(value)` on success. On failure the error is logged and `None` is
/// returned; nothing is propagated to the caller.
pub async fn try_safe<T, F, Fut>(label: &str, policy: &SafeCallPolicy, mut op: F) -> Option<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = anyhow::Result<T>>,
{
	let attempts = policy.max_attempts.max(1);

	for attempt in 1..=attempts {
		match op().await {
			Ok(v) => return Some(v),
			Err(e) if attempt < attempts => {
				let delay = policy.delay_for(attempt - 1);
				warn!(%label, attempt, delay_ms = delay.as_millis() as u64, error = %e, "guarded call failed; retrying");
				tokio::time::sleep(delay).await;
			}
			Err(e) => {
				error!(%label, attempt, error = ?e, "error caught");
			}
		}
	}

	None
}
