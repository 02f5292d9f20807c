use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A discovery request as submitted by a caller.
///
/// Counts are signed so that negative values reach validation and are reported as such instead of
/// failing deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
	pub query: String,
	#[serde(default = "default_expand_layers")]
	pub expand_layers: i64,
	#[serde(default = "default_search_queries")]
	pub search_queries: i64,
	#[serde(default = "default_search_papers")]
	pub search_papers: i64,
	#[serde(default = "default_expand_papers")]
	pub expand_papers: i64,
	#[serde(default)]
	pub threads_num: i64,
}
impl SearchRequest {
	pub fn new(query: impl Into<String>) -> Self {
		Self {
			query: query.into(),
			expand_layers: default_expand_layers(),
			search_queries: default_search_queries(),
			search_papers: default_search_papers(),
			expand_papers: default_expand_papers(),
			threads_num: 0,
		}
	}

	/// Checks the request and returns the trimmed topic with its budget.
	pub fn validate(&self) -> Result<(String, Budget)> {
		let query = self.query.trim();

		if query.is_empty() {
			return Err(Error::invalid("query must be non-empty."));
		}

		let budget = Budget {
			expand_layers: count("expand_layers", self.expand_layers)?,
			search_queries: count("search_queries", self.search_queries)?,
			search_papers: count("search_papers", self.search_papers)?,
			expand_papers: count("expand_papers", self.expand_papers)?,
			threads_num: count("threads_num", self.threads_num)?,
		};

		Ok((query.to_string(), budget))
	}
}

/// The validated work bounds of one job. Immutable once the job exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
	pub expand_layers: u32,
	pub search_queries: u32,
	pub search_papers: u32,
	pub expand_papers: u32,
	/// Zero selects the service default share.
	pub threads_num: u32,
}

fn count(field: &str, value: i64) -> Result<u32> {
	if value < 0 {
		return Err(Error::invalid(format!("{field} must be zero or greater.")));
	}

	u32::try_from(value).map_err(|_| Error::invalid(format!("{field} is too large.")))
}

fn default_expand_layers() -> i64 {
	2
}

fn default_search_queries() -> i64 {
	5
}

fn default_search_papers() -> i64 {
	10
}

fn default_expand_papers() -> i64 {
	20
}
