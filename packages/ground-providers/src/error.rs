pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error(transparent)]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("{message}")]
	InvalidConfig { message: String },
	#[error("{message}")]
	InvalidResponse { message: String },
	#[error("Provider returned HTTP {status}: {body}")]
	Status { status: u16, body: String },
	#[error("{label} did not answer within {timeout_ms} ms.")]
	Timeout { label: String, timeout_ms: u64 },
	#[error("{label} rate limit would delay the call past its budget.")]
	RateLimited { label: String },
}
impl Error {
	/// Whether another attempt could succeed: throttling, server faults, and timeouts.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::Reqwest(err) =>
				err.is_timeout()
					|| err.is_connect()
					|| err.status().is_some_and(|status| {
						status.as_u16() == 429 || status.is_server_error()
					}),
			Self::Status { status, .. } => *status == 429 || *status >= 500,
			Self::Timeout { .. } | Self::RateLimited { .. } => true,
			_ => false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn throttling_and_server_errors_are_transient() {
		assert!(Error::Status { status: 429, body: String::new() }.is_transient());
		assert!(Error::Status { status: 503, body: String::new() }.is_transient());
		assert!(Error::Timeout { label: "rerank".to_string(), timeout_ms: 10 }.is_transient());
	}

	#[test]
	fn client_and_shape_errors_are_permanent() {
		assert!(!Error::Status { status: 401, body: String::new() }.is_transient());
		assert!(!Error::InvalidResponse { message: "bad".to_string() }.is_transient());
	}
}
