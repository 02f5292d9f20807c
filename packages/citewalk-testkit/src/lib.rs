//! Deterministic stand-ins for the four collaborators, plus configuration and polling helpers.

mod error;

pub use error::{Error, Result};

use std::{
	collections::HashSet,
	future::Future,
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use serde_json::Map;
use tokio::{
	sync::watch,
	time::{self, Instant},
};

use citewalk_config::{
	CitationProviderConfig, Config, Engine, Jobs, OracleProviderConfig, ProviderConfig, Providers,
	Service,
};
use citewalk_service::{
	BoxFuture, CitationProvider, CitedPaper, QueryContext, QueryOracle, RelevanceOracle,
	ScoringDoc, SearchHit, SearchProvider,
};

type ServiceResult<T> = citewalk_service::Result<T>;
type QueryScript =
	Box<dyn Fn(&str, Option<&QueryContext>) -> ServiceResult<Vec<String>> + Send + Sync>;
type SearchScript = Box<dyn Fn(&str, usize) -> ServiceResult<Vec<SearchHit>> + Send + Sync>;
type ScoreScript = Box<dyn Fn(&ScoringDoc) -> ServiceResult<f32> + Send + Sync>;
type CitationScript = Box<dyn Fn(&str) -> ServiceResult<Vec<CitedPaper>> + Send + Sync>;
type Matcher = Box<dyn Fn(Backend, &str) -> bool + Send + Sync>;
type Latency = Box<dyn Fn(Backend, &str) -> Duration + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
	QueryOracle,
	RelevanceOracle,
	Search,
	Citation,
}

/// A latch that holds matching calls until it is opened.
#[derive(Clone)]
pub struct Gate {
	tx: Arc<watch::Sender<bool>>,
}
impl Gate {
	pub fn new() -> Self {
		Self { tx: Arc::new(watch::channel(false).0) }
	}

	pub fn open(&self) {
		self.tx.send_replace(true);
	}

	async fn wait(&self) {
		let mut rx = self.tx.subscribe();
		let _ = rx.wait_for(|open| *open).await;
	}
}
impl Default for Gate {
	fn default() -> Self {
		Self::new()
	}
}

/// One object standing in for every collaborator.
///
/// Defaults: the topic-only query call yields `"{topic} survey"` and `"{topic} methods"`; a
/// context call yields `"{topic} {title}"`; a search returns `max_results` hits unique to the
/// query; every document scores 0.9; every paper cites two papers derived from its id.
pub struct FakeBackend {
	queries: QueryScript,
	hits: SearchScript,
	scores: ScoreScript,
	citations: CitationScript,
	latency: Latency,
	gate: Option<(Gate, Matcher)>,
	unready: HashSet<Backend>,
	calls: [AtomicUsize; 4],
	in_flight: AtomicUsize,
	peak: AtomicUsize,
	log: Mutex<Vec<(Backend, String)>>,
}
impl FakeBackend {
	pub fn new() -> Self {
		Self {
			queries: Box::new(default_queries),
			hits: Box::new(|query, max_results| Ok(default_hits(query, max_results))),
			scores: Box::new(|_| Ok(0.9)),
			citations: Box::new(|paper_id| Ok(default_citations(paper_id))),
			latency: Box::new(|_, _| Duration::ZERO),
			gate: None,
			unready: HashSet::new(),
			calls: Default::default(),
			in_flight: AtomicUsize::new(0),
			peak: AtomicUsize::new(0),
			log: Mutex::new(Vec::new()),
		}
	}

	pub fn with_queries(
		mut self,
		script: impl Fn(&str, Option<&QueryContext>) -> ServiceResult<Vec<String>>
		+ Send
		+ Sync
		+ 'static,
	) -> Self {
		self.queries = Box::new(script);

		self
	}

	pub fn with_hits(
		mut self,
		script: impl Fn(&str, usize) -> ServiceResult<Vec<SearchHit>> + Send + Sync + 'static,
	) -> Self {
		self.hits = Box::new(script);

		self
	}

	pub fn with_scores(
		mut self,
		script: impl Fn(&ScoringDoc) -> ServiceResult<f32> + Send + Sync + 'static,
	) -> Self {
		self.scores = Box::new(script);

		self
	}

	pub fn with_citations(
		mut self,
		script: impl Fn(&str) -> ServiceResult<Vec<CitedPaper>> + Send + Sync + 'static,
	) -> Self {
		self.citations = Box::new(script);

		self
	}

	/// Every call sleeps for the returned duration before answering. The key is the query, the
	/// paper id, or the first document title.
	pub fn with_latency(
		mut self,
		latency: impl Fn(Backend, &str) -> Duration + Send + Sync + 'static,
	) -> Self {
		self.latency = Box::new(latency);

		self
	}

	/// Matching calls wait for `gate` to open after they are counted as in flight.
	pub fn with_gate(
		mut self,
		gate: Gate,
		matcher: impl Fn(Backend, &str) -> bool + Send + Sync + 'static,
	) -> Self {
		self.gate = Some((gate, Box::new(matcher)));

		self
	}

	/// Makes the readiness check of `backend` fail.
	pub fn unready(mut self, backend: Backend) -> Self {
		self.unready.insert(backend);

		self
	}

	pub fn into_providers(self) -> (Arc<Self>, citewalk_service::Providers) {
		let fake = Arc::new(self);
		let providers = citewalk_service::Providers::new(
			fake.clone(),
			fake.clone(),
			fake.clone(),
			fake.clone(),
		);

		(fake, providers)
	}

	pub fn calls(&self, backend: Backend) -> usize {
		self.calls[backend as usize].load(Ordering::SeqCst)
	}

	pub fn in_flight(&self) -> usize {
		self.in_flight.load(Ordering::SeqCst)
	}

	/// The highest number of calls that were in flight at the same instant.
	pub fn peak_in_flight(&self) -> usize {
		self.peak.load(Ordering::SeqCst)
	}

	/// Keys of the calls made to `backend`, in dispatch order.
	pub fn keys(&self, backend: Backend) -> Vec<String> {
		self.log
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.iter()
			.filter(|(logged, _)| *logged == backend)
			.map(|(_, key)| key.clone())
			.collect()
	}

	async fn track<T>(
		&self,
		backend: Backend,
		key: &str,
		answer: impl FnOnce() -> ServiceResult<T>,
	) -> ServiceResult<T> {
		self.calls[backend as usize].fetch_add(1, Ordering::SeqCst);
		self.log.lock().unwrap_or_else(|err| err.into_inner()).push((backend, key.to_string()));

		let _in_flight = InFlight::enter(&self.in_flight, &self.peak);

		if let Some((gate, matcher)) = &self.gate
			&& matcher(backend, key)
		{
			gate.wait().await;
		}

		let latency = (self.latency)(backend, key);

		if !latency.is_zero() {
			time::sleep(latency).await;
		}

		answer()
	}

	fn readiness(&self, backend: Backend) -> BoxFuture<'_, ServiceResult<()>> {
		let ready = !self.unready.contains(&backend);

		Box::pin(async move {
			if ready {
				Ok(())
			} else {
				Err(citewalk_service::Error::Provider {
					message: format!("{backend:?} is not reachable."),
				})
			}
		})
	}
}
impl Default for FakeBackend {
	fn default() -> Self {
		Self::new()
	}
}

impl QueryOracle for FakeBackend {
	fn generate<'a>(
		&'a self,
		_cfg: &'a OracleProviderConfig,
		topic: &'a str,
		context: Option<&'a QueryContext>,
		max_queries: usize,
	) -> BoxFuture<'a, ServiceResult<Vec<String>>> {
		let key = context.map_or(topic, |context| context.title.as_str());

		Box::pin(self.track(Backend::QueryOracle, key, move || {
			let mut queries = (self.queries)(topic, context)?;

			queries.truncate(max_queries);

			Ok(queries)
		}))
	}

	fn ready<'a>(&'a self, _cfg: &'a OracleProviderConfig) -> BoxFuture<'a, ServiceResult<()>> {
		self.readiness(Backend::QueryOracle)
	}
}

impl RelevanceOracle for FakeBackend {
	fn score<'a>(
		&'a self,
		_cfg: &'a OracleProviderConfig,
		_query: &'a str,
		docs: &'a [ScoringDoc],
	) -> BoxFuture<'a, ServiceResult<Vec<f32>>> {
		let key = docs.first().map_or("", |doc| doc.title.as_str());

		Box::pin(self.track(Backend::RelevanceOracle, key, move || {
			docs.iter().map(|doc| (self.scores)(doc)).collect()
		}))
	}

	fn ready<'a>(&'a self, _cfg: &'a OracleProviderConfig) -> BoxFuture<'a, ServiceResult<()>> {
		self.readiness(Backend::RelevanceOracle)
	}
}

impl SearchProvider for FakeBackend {
	fn search<'a>(
		&'a self,
		_cfg: &'a ProviderConfig,
		query: &'a str,
		max_results: usize,
	) -> BoxFuture<'a, ServiceResult<Vec<SearchHit>>> {
		Box::pin(self.track(Backend::Search, query, move || (self.hits)(query, max_results)))
	}

	fn ready<'a>(&'a self, _cfg: &'a ProviderConfig) -> BoxFuture<'a, ServiceResult<()>> {
		self.readiness(Backend::Search)
	}
}

impl CitationProvider for FakeBackend {
	fn citations<'a>(
		&'a self,
		_cfg: &'a CitationProviderConfig,
		paper_id: &'a str,
	) -> BoxFuture<'a, ServiceResult<Vec<CitedPaper>>> {
		Box::pin(self.track(Backend::Citation, paper_id, move || (self.citations)(paper_id)))
	}

	fn ready<'a>(&'a self, _cfg: &'a CitationProviderConfig) -> BoxFuture<'a, ServiceResult<()>> {
		self.readiness(Backend::Citation)
	}
}

struct InFlight<'a> {
	counter: &'a AtomicUsize,
}
impl<'a> InFlight<'a> {
	fn enter(counter: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
		let now = counter.fetch_add(1, Ordering::SeqCst) + 1;

		peak.fetch_max(now, Ordering::SeqCst);

		Self { counter }
	}
}
impl Drop for InFlight<'_> {
	fn drop(&mut self) {
		self.counter.fetch_sub(1, Ordering::SeqCst);
	}
}

pub fn default_queries(topic: &str, context: Option<&QueryContext>) -> ServiceResult<Vec<String>> {
	Ok(match context {
		None => vec![format!("{topic} survey"), format!("{topic} methods")],
		Some(context) => vec![format!("{topic} {}", context.title)],
	})
}

/// Hits whose ids and titles are unique to `query`.
pub fn default_hits(query: &str, max_results: usize) -> Vec<SearchHit> {
	let slug = slug(query);

	(0..max_results)
		.map(|i| SearchHit {
			id: format!("{slug}-{i}"),
			title: format!("{query} paper {i}"),
			link: format!("https://papers.test/{slug}/{i}"),
			snippet: format!("Abstract of {query} paper {i}."),
		})
		.collect()
}

pub fn default_citations(paper_id: &str) -> Vec<CitedPaper> {
	(0..2)
		.map(|i| CitedPaper {
			id: format!("{paper_id}-ref-{i}"),
			title: format!("Reference {i} of {paper_id}"),
			snippet: String::new(),
		})
		.collect()
}

pub fn hit(id: &str, title: &str) -> SearchHit {
	SearchHit {
		id: id.to_string(),
		title: title.to_string(),
		link: format!("https://arxiv.org/abs/{id}"),
		snippet: format!("Abstract of {title}."),
	}
}

/// A configuration whose providers point nowhere; pair it with [`FakeBackend`].
pub fn test_config() -> Config {
	Config {
		service: Service { http_bind: "127.0.0.1:0".to_string(), log_level: "info".to_string() },
		engine: Engine {
			max_concurrency: 8,
			default_concurrency: 2,
			call_timeout_ms: 2_000,
			min_relevance: 0.5,
			max_accepted_per_layer: None,
		},
		jobs: Jobs {
			max_pending: 16,
			max_running: 4,
			job_ttl_seconds: 3_600,
			sweep_interval_seconds: 60,
		},
		providers: Providers {
			query_oracle: oracle_provider("fake-crawler"),
			relevance_oracle: oracle_provider("fake-selector"),
			search: ProviderConfig {
				provider_id: "fake".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: String::new(),
				path: "/search".to_string(),
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
			citation: CitationProviderConfig {
				provider_id: "fake".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: String::new(),
				path: "/paper/{paper_id}/references".to_string(),
				timeout_ms: 1_000,
				max_attempts: 1,
				base_backoff_ms: 1,
				default_headers: Map::new(),
			},
		},
	}
}

/// Polls `condition` every few milliseconds until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> Result<()> {
	let started = Instant::now();

	loop {
		if condition() {
			return Ok(());
		}
		if started.elapsed() >= timeout {
			return Err(Error::Timeout { waited_ms: timeout.as_millis() });
		}

		time::sleep(Duration::from_millis(5)).await;
	}
}

/// Awaits `future`, failing if it takes longer than `timeout`.
pub async fn within<T>(timeout: Duration, future: impl Future<Output = T>) -> Result<T> {
	time::timeout(timeout, future).await.map_err(|_| {
		Error::Message(format!("Future did not finish within {} ms.", timeout.as_millis()))
	})
}

fn oracle_provider(model: &str) -> OracleProviderConfig {
	OracleProviderConfig {
		provider_id: "fake".to_string(),
		api_base: "http://127.0.0.1:1/v1".to_string(),
		api_key: String::new(),
		path: "/completions".to_string(),
		model: model.to_string(),
		temperature: 0.0,
		max_tokens: 64,
		logprobs: 20,
		timeout_ms: 1_000,
		default_headers: Map::new(),
	}
}

fn slug(text: &str) -> String {
	text.chars()
		.map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
		.collect()
}
