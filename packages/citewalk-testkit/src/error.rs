pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{0}")]
	Message(String),

	#[error("Condition not met within {waited_ms} ms.")]
	Timeout { waited_ms: u128 },
}
