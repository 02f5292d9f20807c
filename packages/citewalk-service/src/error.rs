pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Backend unavailable: {message}")]
	BackendUnavailable { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Queue full: {message}")]
	QueueFull { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Timed out: {message}")]
	Timeout { message: String },
	#[error("Internal error: {message}")]
	Internal { message: String },
	/// Raised inside a running job once cancellation has been observed. The job manager turns it
	/// into [`crate::JobStatus::Cancelled`]; it never reaches callers.
	#[error("Cancelled.")]
	Cancelled,
}
impl Error {
	pub(crate) fn invalid(message: impl Into<String>) -> Self {
		Self::InvalidRequest { message: message.into() }
	}

	pub(crate) fn job_not_found(job_id: &str) -> Self {
		Self::NotFound { message: format!("job {job_id} does not exist.") }
	}
}

impl From<citewalk_providers::Error> for Error {
	fn from(err: citewalk_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
