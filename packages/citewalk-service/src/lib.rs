//! Layered literature discovery: a bounded walk over the citation graph driven by query and
//! relevance oracles, run as asynchronous, cancellable jobs.

pub mod aggregate;
pub mod budget;
pub mod health;
pub mod jobs;
pub mod layer;
pub mod paper;
pub mod pool;
pub mod stages;

mod error;

pub use budget::{Budget, SearchRequest};
pub use citewalk_providers::{
	citation::CitedPaper, query::QueryContext, relevance::ScoringDoc, search::SearchHit,
};
pub use error::{Error, Result};
pub use health::{BackendReport, BackendState};
pub use jobs::{JobManager, JobResult, JobStats, JobStatus, JobView, SearchJob};
pub use layer::{Outcome, Phase, Progress};
pub use paper::{CandidatePaper, PaperView};

use std::{future::Future, pin::Pin, sync::Arc};

use citewalk_config::{CitationProviderConfig, OracleProviderConfig, ProviderConfig};
use citewalk_providers::{citation, query, readiness, relevance, search};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait QueryOracle
where
	Self: Send + Sync,
{
	fn generate<'a>(
		&'a self,
		cfg: &'a OracleProviderConfig,
		topic: &'a str,
		context: Option<&'a QueryContext>,
		max_queries: usize,
	) -> BoxFuture<'a, Result<Vec<String>>>;

	fn ready<'a>(&'a self, _cfg: &'a OracleProviderConfig) -> BoxFuture<'a, Result<()>> {
		Box::pin(async { Ok(()) })
	}
}

pub trait RelevanceOracle
where
	Self: Send + Sync,
{
	/// Returns one score in `[0, 1]` per document, in input order.
	fn score<'a>(
		&'a self,
		cfg: &'a OracleProviderConfig,
		query: &'a str,
		docs: &'a [ScoringDoc],
	) -> BoxFuture<'a, Result<Vec<f32>>>;

	fn ready<'a>(&'a self, _cfg: &'a OracleProviderConfig) -> BoxFuture<'a, Result<()>> {
		Box::pin(async { Ok(()) })
	}
}

pub trait SearchProvider
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		max_results: usize,
	) -> BoxFuture<'a, Result<Vec<SearchHit>>>;

	fn ready<'a>(&'a self, _cfg: &'a ProviderConfig) -> BoxFuture<'a, Result<()>> {
		Box::pin(async { Ok(()) })
	}
}

pub trait CitationProvider
where
	Self: Send + Sync,
{
	fn citations<'a>(
		&'a self,
		cfg: &'a CitationProviderConfig,
		paper_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<CitedPaper>>>;

	fn ready<'a>(&'a self, _cfg: &'a CitationProviderConfig) -> BoxFuture<'a, Result<()>> {
		Box::pin(async { Ok(()) })
	}
}

#[derive(Clone)]
pub struct Providers {
	pub query: Arc<dyn QueryOracle>,
	pub relevance: Arc<dyn RelevanceOracle>,
	pub search: Arc<dyn SearchProvider>,
	pub citation: Arc<dyn CitationProvider>,
}
impl Providers {
	pub fn new(
		query: Arc<dyn QueryOracle>,
		relevance: Arc<dyn RelevanceOracle>,
		search: Arc<dyn SearchProvider>,
		citation: Arc<dyn CitationProvider>,
	) -> Self {
		Self { query, relevance, search, citation }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(HttpProviders);

		Self {
			query: provider.clone(),
			relevance: provider.clone(),
			search: provider.clone(),
			citation: provider,
		}
	}
}

struct HttpProviders;
impl QueryOracle for HttpProviders {
	fn generate<'a>(
		&'a self,
		cfg: &'a OracleProviderConfig,
		topic: &'a str,
		context: Option<&'a QueryContext>,
		max_queries: usize,
	) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move { Ok(query::generate(cfg, topic, context, max_queries).await?) })
	}

	fn ready<'a>(&'a self, cfg: &'a OracleProviderConfig) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(readiness::oracle(cfg).await?) })
	}
}
impl RelevanceOracle for HttpProviders {
	fn score<'a>(
		&'a self,
		cfg: &'a OracleProviderConfig,
		query: &'a str,
		docs: &'a [ScoringDoc],
	) -> BoxFuture<'a, Result<Vec<f32>>> {
		Box::pin(async move { Ok(relevance::score(cfg, query, docs).await?) })
	}

	fn ready<'a>(&'a self, cfg: &'a OracleProviderConfig) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(readiness::oracle(cfg).await?) })
	}
}
impl SearchProvider for HttpProviders {
	fn search<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		max_results: usize,
	) -> BoxFuture<'a, Result<Vec<SearchHit>>> {
		Box::pin(async move { Ok(search::search(cfg, query, max_results).await?) })
	}

	fn ready<'a>(&'a self, cfg: &'a ProviderConfig) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(readiness::search(cfg).await?) })
	}
}
impl CitationProvider for HttpProviders {
	fn citations<'a>(
		&'a self,
		cfg: &'a CitationProviderConfig,
		paper_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<CitedPaper>>> {
		Box::pin(async move { Ok(citation::fetch(cfg, paper_id).await?) })
	}

	fn ready<'a>(&'a self, cfg: &'a CitationProviderConfig) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Ok(readiness::citation(cfg).await?) })
	}
}
