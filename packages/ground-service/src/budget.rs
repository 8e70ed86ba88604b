use std::time::{Duration, Instant};

const MIN_CALL_TIMEOUT: Duration = Duration::from_millis(1);

/// Soft time budget for one retrieval call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
	started: Instant,
	budget: Option<Duration>,
}
impl Deadline {
	pub(crate) fn new(budget_ms: Option<u64>) -> Self {
		Self { started: Instant::now(), budget: budget_ms.map(Duration::from_millis) }
	}

	pub(crate) fn remaining(&self) -> Option<Duration> {
		self.budget.map(|budget| budget.saturating_sub(self.started.elapsed()))
	}

	/// The instant the budget runs out, if there is one.
	pub(crate) fn until(&self) -> Option<Instant> {
		self.budget.map(|budget| self.started + budget)
	}

	pub(crate) fn expired(&self) -> bool {
		self.remaining().is_some_and(|remaining| remaining.is_zero())
	}

	/// The smaller of `timeout` and the remaining budget, never zero.
	pub(crate) fn cap(&self, timeout: Duration) -> Duration {
		match self.remaining() {
			Some(remaining) => timeout.min(remaining).max(MIN_CALL_TIMEOUT),
			None => timeout,
		}
	}
}

pub(crate) fn elapsed_ms(since: Instant) -> u64 {
	since.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unbounded_deadline_never_caps() {
		let deadline = Deadline::new(None);

		assert!(!deadline.expired());
		assert_eq!(deadline.cap(Duration::from_secs(20)), Duration::from_secs(20));
	}

	#[test]
	fn spent_budget_caps_to_minimum() {
		let deadline = Deadline::new(Some(0));

		assert!(deadline.expired());
		assert_eq!(deadline.cap(Duration::from_secs(20)), MIN_CALL_TIMEOUT);
	}

	#[test]
	fn budget_end_is_known_only_when_set() {
		assert!(Deadline::new(None).until().is_none());

		let deadline = Deadline::new(Some(250));

		assert_eq!(deadline.until(), Some(deadline.started + Duration::from_millis(250)));
	}

	#[test]
	fn generous_budget_keeps_the_call_timeout() {
		let deadline = Deadline::new(Some(60_000));

		assert_eq!(deadline.cap(Duration::from_millis(500)), Duration::from_millis(500));
	}
}
