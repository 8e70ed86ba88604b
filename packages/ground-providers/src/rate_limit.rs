use std::{
	sync::{Mutex, PoisonError},
	time::{Duration, Instant},
};

use crate::{Error, Result};

/// Token bucket pacing outbound calls to one provider.
#[derive(Debug)]
pub struct RateLimiter {
	label: String,
	bucket: Option<Mutex<Bucket>>,
}
impl RateLimiter {
	pub fn per_minute(label: impl Into<String>, requests_per_minute: Option<u32>) -> Self {
		let bucket = requests_per_minute
			.filter(|rpm| *rpm > 0)
			.map(|rpm| Mutex::new(Bucket::new(rpm, Instant::now())));

		Self { label: label.into(), bucket }
	}

	pub fn unlimited(label: impl Into<String>) -> Self {
		Self { label: label.into(), bucket: None }
	}

	/// Waits for a slot. Fails fast when the wait alone would exceed `max_wait`.
	pub async fn acquire(&self, max_wait: Duration) -> Result<()> {
		let Some(bucket) = &self.bucket else {
			return Ok(());
		};
		let wait = {
			let mut bucket = bucket.lock().unwrap_or_else(PoisonError::into_inner);
			let wait = bucket.take(Instant::now());

			if wait > max_wait {
				bucket.refund();

				return Err(Error::RateLimited { label: self.label.clone() });
			}

			wait
		};

		if !wait.is_zero() {
			tracing::debug!(label = %self.label, wait_ms = wait.as_millis() as u64, "Pacing provider call.");

			tokio::time::sleep(wait).await;
		}

		Ok(())
	}
}

#[derive(Debug)]
struct Bucket {
	capacity: f64,
	tokens: f64,
	per_second: f64,
	updated: Instant,
}
impl Bucket {
	fn new(requests_per_minute: u32, now: Instant) -> Self {
		let capacity = f64::from(requests_per_minute);

		Self { capacity, tokens: capacity, per_second: capacity / 60.0, updated: now }
	}

	/// Reserves one token and returns how long the caller must wait before using it.
	fn take(&mut self, now: Instant) -> Duration {
		let elapsed = now.saturating_duration_since(self.updated).as_secs_f64();

		self.tokens = (self.tokens + elapsed * self.per_second).min(self.capacity);
		self.updated = now;
		self.tokens -= 1.0;

		if self.tokens >= 0.0 {
			return Duration::ZERO;
		}

		Duration::from_secs_f64(-self.tokens / self.per_second)
	}

	fn refund(&mut self) {
		self.tokens += 1.0;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn burst_up_to_capacity_then_paces() {
		let start = Instant::now();
		let mut bucket = Bucket::new(2, start);

		assert_eq!(bucket.take(start), Duration::ZERO);
		assert_eq!(bucket.take(start), Duration::ZERO);

		let wait = bucket.take(start);

		assert!((wait.as_secs_f64() - 30.0).abs() < 1e-6, "Unexpected wait: {wait:?}");
	}

	#[test]
	fn tokens_refill_over_time() {
		let start = Instant::now();
		let mut bucket = Bucket::new(60, start);

		for _ in 0..60 {
			bucket.take(start);
		}

		assert_eq!(bucket.take(start + Duration::from_secs(1)), Duration::ZERO);
	}

	#[tokio::test]
	async fn over_budget_waits_fail_fast_and_refund() {
		let limiter = RateLimiter::per_minute("rerank", Some(1));

		limiter.acquire(Duration::ZERO).await.expect("First call fits the burst.");

		let err = limiter.acquire(Duration::from_millis(5)).await.expect_err("Second call must wait.");

		assert!(err.is_transient());

		let unlimited = RateLimiter::unlimited("sparse");

		for _ in 0..100 {
			unlimited.acquire(Duration::ZERO).await.expect("Unlimited never waits.");
		}
	}
}
