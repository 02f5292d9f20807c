use std::{future::Future, time::Duration};

use serde::Serialize;

use crate::{Error, Providers, Result};
use citewalk_config::Config;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendState {
	pub ready: bool,
	pub error: Option<String>,
}
impl BackendState {
	fn from_result(result: Result<()>) -> Self {
		match result {
			Ok(()) => Self { ready: true, error: None },
			Err(err) => Self { ready: false, error: Some(err.to_string()) },
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendReport {
	pub query_oracle: BackendState,
	pub relevance_oracle: BackendState,
	pub search: BackendState,
	pub citation: BackendState,
}
impl BackendReport {
	pub fn ready(&self) -> bool {
		self.backends().all(|(_, state)| state.ready)
	}

	/// Names and errors of the backends that are not ready.
	pub fn failures(&self) -> Vec<String> {
		self.backends()
			.filter(|(_, state)| !state.ready)
			.map(|(name, state)| match &state.error {
				Some(error) => format!("{name}: {error}"),
				None => name.to_string(),
			})
			.collect()
	}

	fn backends(&self) -> impl Iterator<Item = (&'static str, &BackendState)> {
		[
			("query_oracle", &self.query_oracle),
			("relevance_oracle", &self.relevance_oracle),
			("search", &self.search),
			("citation", &self.citation),
		]
		.into_iter()
	}
}

/// Checks all four collaborators concurrently, each bounded by its own provider timeout.
pub async fn probe(cfg: &Config, providers: &Providers) -> BackendReport {
	let p = &cfg.providers;
	let (query_oracle, relevance_oracle, search, citation) = tokio::join!(
		bounded(p.query_oracle.timeout_ms, providers.query.ready(&p.query_oracle)),
		bounded(p.relevance_oracle.timeout_ms, providers.relevance.ready(&p.relevance_oracle)),
		bounded(p.search.timeout_ms, providers.search.ready(&p.search)),
		bounded(p.citation.timeout_ms, providers.citation.ready(&p.citation)),
	);
	let report = BackendReport {
		query_oracle: BackendState::from_result(query_oracle),
		relevance_oracle: BackendState::from_result(relevance_oracle),
		search: BackendState::from_result(search),
		citation: BackendState::from_result(citation),
	};

	if report.ready() {
		tracing::info!("All backends are ready.");
	} else {
		tracing::warn!(failures = ?report.failures(), "Backends are not ready.");
	}

	report
}

async fn bounded(timeout_ms: u64, check: impl Future<Output = Result<()>>) -> Result<()> {
	tokio::time::timeout(Duration::from_millis(timeout_ms), check).await.unwrap_or_else(|_| {
		Err(Error::Timeout { message: format!("readiness check exceeded {timeout_ms} ms.") })
	})
}
