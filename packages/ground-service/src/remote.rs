use std::{future::Future, time::Duration};

use ground_providers::{
	Error as ProviderError, Result as ProviderResult,
	rate_limit::RateLimiter,
	retry::{self, RetryPolicy},
};

use crate::{GroundService, budget::Deadline};

impl GroundService {
	/// Paces, times out, and retries one provider call.
	///
	/// A rate-limit wait longer than the capped timeout fails as transient instead of stalling.
	pub(crate) async fn call_provider<T, Op, Fut>(
		&self,
		label: &'static str,
		limiter: &RateLimiter,
		timeout_ms: u64,
		deadline: &Deadline,
		mut op: Op,
	) -> ProviderResult<T>
	where
		Op: FnMut() -> Fut,
		Fut: Future<Output = ProviderResult<T>>,
	{
		let policy = RetryPolicy::from_config(&self.cfg.retry);

		retry::with_retry_until(
			&policy,
			label,
			deadline.until(),
			ProviderError::is_transient,
			|_| {
				let call = op();
				let timeout = deadline.cap(Duration::from_millis(timeout_ms));

				async move {
					limiter.acquire(timeout).await?;

					match tokio::time::timeout(timeout, call).await {
						Ok(result) => result,
						Err(_) => Err(ProviderError::Timeout {
							label: label.to_string(),
							timeout_ms: timeout.as_millis() as u64,
						}),
					}
				}
			},
		)
		.await
	}
}
