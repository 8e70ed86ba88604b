use std::{
	fmt::Display,
	future::Future,
	time::{Duration, Instant},
};

const MAX_BACKOFF_EXPONENT: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub base_backoff: Duration,
	pub max_backoff: Duration,
}
impl RetryPolicy {
	pub fn from_config(cfg: &ground_config::Retry) -> Self {
		Self {
			max_attempts: cfg.max_attempts.max(1),
			base_backoff: Duration::from_millis(cfg.base_backoff_ms),
			max_backoff: Duration::from_millis(cfg.max_backoff_ms),
		}
	}

	pub fn single_attempt() -> Self {
		Self { max_attempts: 1, base_backoff: Duration::ZERO, max_backoff: Duration::ZERO }
	}

	/// Delay before retrying after `attempt` failed. Doubles each time and is capped.
	pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
		let exp = attempt.max(1).saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
		let base = self.base_backoff.saturating_mul(1 << exp);

		base.min(self.max_backoff)
	}
}

/// Runs `op` until it succeeds, fails permanently, or the attempts run out.
///
/// `op` receives the 1-based attempt number. Only errors that `is_transient` accepts are
/// retried.
pub async fn with_retry<T, E, Op, Fut, P>(
	policy: &RetryPolicy,
	label: &str,
	is_transient: P,
	op: Op,
) -> Result<T, E>
where
	Op: FnMut(u32) -> Fut,
	Fut: Future<Output = Result<T, E>>,
	P: Fn(&E) -> bool,
	E: Display,
{
	with_retry_until(policy, label, None, is_transient, op).await
}

/// Like [`with_retry`], but gives up instead of sleeping past `until`.
///
/// A backoff that would end at or after `until` returns the last error right away.
pub async fn with_retry_until<T, E, Op, Fut, P>(
	policy: &RetryPolicy,
	label: &str,
	until: Option<Instant>,
	is_transient: P,
	mut op: Op,
) -> Result<T, E>
where
	Op: FnMut(u32) -> Fut,
	Fut: Future<Output = Result<T, E>>,
	P: Fn(&E) -> bool,
	E: Display,
{
	let mut attempt = 1;

	loop {
		match op(attempt).await {
			Ok(value) => return Ok(value),
			Err(err) if attempt < policy.max_attempts && is_transient(&err) => {
				let delay = policy.backoff_for_attempt(attempt);

				if until.is_some_and(|until| Instant::now() + delay >= until) {
					tracing::debug!(
						label,
						attempt,
						error = %err,
						"Time budget spent. Not retrying."
					);

					return Err(err);
				}

				tracing::debug!(
					label,
					attempt,
					delay_ms = delay.as_millis() as u64,
					error = %err,
					"Retrying transient provider failure."
				);

				tokio::time::sleep(delay).await;

				attempt += 1;
			},
			Err(err) => return Err(err),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicU32, Ordering};

	use super::*;
	use crate::Error;

	fn fast_policy(max_attempts: u32) -> RetryPolicy {
		RetryPolicy {
			max_attempts,
			base_backoff: Duration::from_millis(1),
			max_backoff: Duration::from_millis(2),
		}
	}

	#[test]
	fn backoff_doubles_and_caps() {
		let policy = RetryPolicy {
			max_attempts: 3,
			base_backoff: Duration::from_millis(200),
			max_backoff: Duration::from_millis(500),
		};

		assert_eq!(policy.backoff_for_attempt(0), Duration::from_millis(200));
		assert_eq!(policy.backoff_for_attempt(1), Duration::from_millis(200));
		assert_eq!(policy.backoff_for_attempt(2), Duration::from_millis(400));
		assert_eq!(policy.backoff_for_attempt(3), Duration::from_millis(500));
	}

	#[tokio::test]
	async fn transient_failures_are_retried_until_success() {
		let calls = AtomicU32::new(0);
		let result = with_retry(&fast_policy(3), "embed", Error::is_transient, |attempt| {
			calls.fetch_add(1, Ordering::SeqCst);

			async move {
				if attempt < 3 {
					Err(Error::Status { status: 503, body: String::new() })
				} else {
					Ok(attempt)
				}
			}
		})
		.await;

		assert_eq!(result.expect("Third attempt must succeed."), 3);
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn permanent_failures_stop_immediately() {
		let calls = AtomicU32::new(0);
		let result: Result<(), Error> =
			with_retry(&fast_policy(3), "rerank", Error::is_transient, |_| {
				calls.fetch_add(1, Ordering::SeqCst);

				async { Err(Error::Status { status: 400, body: String::new() }) }
			})
			.await;

		assert!(result.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn attempts_are_bounded() {
		let calls = AtomicU32::new(0);
		let result: Result<(), Error> =
			with_retry(&fast_policy(2), "sparse", Error::is_transient, |_| {
				calls.fetch_add(1, Ordering::SeqCst);

				async { Err(Error::Status { status: 429, body: String::new() }) }
			})
			.await;

		assert!(result.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn spent_budget_stops_before_backing_off() {
		let calls = AtomicU32::new(0);
		let policy = RetryPolicy {
			max_attempts: 3,
			base_backoff: Duration::from_secs(5),
			max_backoff: Duration::from_secs(5),
		};
		let until = Instant::now() + Duration::from_secs(1);
		let started = Instant::now();
		let result: Result<(), Error> =
			with_retry_until(&policy, "rerank", Some(until), Error::is_transient, |_| {
				calls.fetch_add(1, Ordering::SeqCst);

				async { Err(Error::Status { status: 503, body: String::new() }) }
			})
			.await;

		assert!(result.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert!(started.elapsed() < Duration::from_secs(1));
	}

	#[tokio::test]
	async fn distant_budget_still_retries() {
		let calls = AtomicU32::new(0);
		let until = Instant::now() + Duration::from_secs(60);
		let result: Result<(), Error> =
			with_retry_until(&fast_policy(3), "embed", Some(until), Error::is_transient, |_| {
				calls.fetch_add(1, Ordering::SeqCst);

				async { Err(Error::Status { status: 503, body: String::new() }) }
			})
			.await;

		assert!(result.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}
}
