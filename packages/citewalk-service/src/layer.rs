//! The per-job layer state machine.
//!
//! One controller drives one job from `Init` to `Done`. Stages within a layer run strictly in
//! order and layers never overlap. Cancellation is checked before every transition; a cancelled
//! run ends with whatever has been accepted so far.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
	Budget, CandidatePaper, Error, Providers, QueryContext, Result,
	aggregate::{self, Aggregate, SeenIds},
	pool::PoolShare,
	stages::{
		StageContext, expansion,
		query_search::{self, IssuedQueries},
		selection,
	},
};
use citewalk_config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
	Init,
	QueryGen,
	Searching,
	Selecting,
	Expanding,
	NextLayer,
	Finalizing,
	Done,
}

/// Reported to the job owner at every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
	pub layer: u32,
	pub phase: Phase,
	pub accepted: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
	Completed(Vec<CandidatePaper>),
	/// Carries the ranked partial aggregate.
	Cancelled(Vec<CandidatePaper>),
}

/// The per-layer working set.
#[derive(Debug, Default)]
struct Frontier {
	contexts: Vec<QueryContext>,
	queries: Vec<String>,
	/// Cited papers carried over from the previous layer's expansion.
	seeded: Vec<CandidatePaper>,
	candidates: Vec<CandidatePaper>,
	accepted: Vec<CandidatePaper>,
	next_seed: Vec<CandidatePaper>,
}

pub struct LayerController<'a> {
	cfg: &'a Config,
	providers: &'a Providers,
	pool: PoolShare,
	cancel: CancellationToken,
	topic: String,
	budget: Budget,
	layer: u32,
	frontier: Frontier,
	seen: SeenIds,
	issued: IssuedQueries,
	aggregate: Aggregate,
}
impl<'a> LayerController<'a> {
	pub fn new(
		cfg: &'a Config,
		providers: &'a Providers,
		pool: PoolShare,
		cancel: CancellationToken,
		topic: impl Into<String>,
		budget: Budget,
	) -> Self {
		Self {
			cfg,
			providers,
			pool,
			cancel,
			topic: topic.into(),
			budget,
			layer: 0,
			frontier: Frontier::default(),
			seen: SeenIds::default(),
			issued: IssuedQueries::default(),
			aggregate: Aggregate::default(),
		}
	}

	/// Runs the job to completion. Stage exhaustion is returned as an error; cancellation is an
	/// [`Outcome`], not an error.
	pub async fn run(mut self, mut on_progress: impl FnMut(Progress)) -> Result<Outcome> {
		let mut phase = Phase::Init;

		loop {
			if self.cancel.is_cancelled() {
				return Ok(self.cancelled());
			}

			on_progress(Progress { layer: self.layer, phase, accepted: self.aggregate.len() });
			tracing::debug!(layer = self.layer, ?phase, "Layer controller transition.");

			if phase == Phase::Done {
				return Ok(Outcome::Completed(self.aggregate.finalize()));
			}

			let stepped = self.step(phase).await;

			phase = match stepped {
				Ok(next) => next,
				Err(Error::Cancelled) => return Ok(self.cancelled()),
				Err(err) => return Err(err),
			};
		}
	}

	async fn step(&mut self, phase: Phase) -> Result<Phase> {
		let next = match phase {
			Phase::Init => Phase::QueryGen,
			Phase::QueryGen => {
				let queries = query_search::generate_queries(
					&self.stage(),
					&self.frontier.contexts,
					&self.issued,
				)
				.await?;

				self.issued.record(&queries);
				self.frontier.queries = queries;

				Phase::Searching
			},
			Phase::Searching => {
				let hits =
					query_search::search(&self.stage(), &self.frontier.queries, &self.seen).await?;
				let seeded = std::mem::take(&mut self.frontier.seeded);

				self.frontier.candidates =
					aggregate::fresh_candidates(hits.into_iter().chain(seeded), &self.seen);

				Phase::Selecting
			},
			Phase::Selecting => {
				let accepted = selection::select(&self.stage(), &self.frontier.candidates).await?;

				self.seen.extend(&self.frontier.candidates);

				let added = self.aggregate.push_layer(&accepted);

				tracing::info!(
					layer = self.layer,
					candidates = self.frontier.candidates.len(),
					accepted = added,
					"Layer selection finished."
				);

				self.frontier.accepted = accepted;

				if added == 0 || self.layer >= self.budget.expand_layers {
					Phase::Finalizing
				} else {
					Phase::Expanding
				}
			},
			Phase::Expanding => {
				let next_seed =
					expansion::expand(&self.stage(), &self.frontier.accepted, &self.seen).await?;

				self.frontier.next_seed = next_seed;

				if self.frontier.next_seed.is_empty() { Phase::Finalizing } else { Phase::NextLayer }
			},
			Phase::NextLayer => {
				let previous = std::mem::take(&mut self.frontier);
				let contexts = previous
					.accepted
					.iter()
					.chain(&previous.next_seed)
					.map(CandidatePaper::query_context)
					.collect();

				self.frontier =
					Frontier { contexts, seeded: previous.next_seed, ..Frontier::default() };
				self.layer += 1;

				Phase::QueryGen
			},
			Phase::Finalizing => Phase::Done,
			Phase::Done => Phase::Done,
		};

		Ok(next)
	}

	fn stage(&self) -> StageContext<'_> {
		StageContext {
			cfg: self.cfg,
			providers: self.providers,
			pool: &self.pool,
			cancel: &self.cancel,
			topic: &self.topic,
			budget: &self.budget,
			layer: self.layer,
		}
	}

	fn cancelled(self) -> Outcome {
		tracing::info!(
			layer = self.layer,
			accepted = self.aggregate.len(),
			"Layer controller cancelled."
		);

		Outcome::Cancelled(self.aggregate.snapshot())
	}
}
