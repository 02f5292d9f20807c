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
	#[error("{message}")]
	NotReady { message: String },
}
impl Error {
	pub(crate) fn invalid_response(message: impl Into<String>) -> Self {
		Self::InvalidResponse { message: message.into() }
	}

	/// Connection failures, timeouts, rate limiting, and server errors may succeed on retry.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::Reqwest(err) => {
				if err.is_timeout() || err.is_connect() {
					return true;
				}

				err.status()
					.map(|status| status.as_u16() == 429 || status.is_server_error())
					.unwrap_or(false)
			},
			_ => false,
		}
	}
}
