pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl From<ground_providers::Error> for Error {
	fn from(err: ground_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl From<ground_storage::Error> for Error {
	fn from(err: ground_storage::Error) -> Self {
		match err {
			ground_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			ground_storage::Error::Qdrant(inner) => Self::Storage { message: inner.to_string() },
		}
	}
}
