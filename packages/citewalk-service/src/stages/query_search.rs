use std::collections::HashSet;

use futures::future;

use crate::{
	CandidatePaper, QueryContext, Result,
	aggregate::{self, SeenIds},
	stages::{self, StageContext},
};
use citewalk_domain::queries;

/// Queries already sent to the search provider by one job, compared case-insensitively.
#[derive(Debug, Default)]
pub struct IssuedQueries(HashSet<String>);
impl IssuedQueries {
	pub fn contains(&self, query: &str) -> bool {
		self.0.contains(&issued_key(query))
	}

	pub fn record(&mut self, queries: &[String]) {
		self.0.extend(queries.iter().map(|query| issued_key(query)));
	}
}

fn issued_key(query: &str) -> String {
	query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Generates up to `search_queries` distinct queries the job has not issued yet.
///
/// The topic-only call always runs; each context entry adds one more call. The resulting lists
/// are merged round-robin with the topic-only list first, and repeats of earlier layers are
/// dropped before truncation. If the oracle answers but yields nothing usable, the topic itself
/// is the only query, unless it was already searched.
pub async fn generate_queries(
	ctx: &StageContext<'_>,
	contexts: &[QueryContext],
	issued: &IssuedQueries,
) -> Result<Vec<String>> {
	let max_queries = ctx.budget.search_queries as usize;

	if max_queries == 0 || ctx.budget.search_papers == 0 {
		return Ok(Vec::new());
	}

	let cfg = &ctx.cfg.providers.query_oracle;
	let oracle = &ctx.providers.query;
	let seeds =
		std::iter::once(None).chain(contexts.iter().take(max_queries).map(Some)).collect::<Vec<_>>();
	let calls = seeds.iter().map(|context| {
		ctx.pool.call(ctx.cancel, oracle.generate(cfg, ctx.topic, *context, max_queries))
	});
	let lists = stages::settle(ctx, "query_gen", future::join_all(calls).await)?;
	let merged = queries::merge_round_robin(&lists, usize::MAX);

	if merged.is_empty() {
		if issued.contains(ctx.topic) {
			tracing::info!(layer = ctx.layer, "No usable query was generated.");

			return Ok(Vec::new());
		}

		tracing::info!(layer = ctx.layer, "No usable query was generated; searching the topic.");

		return Ok(vec![ctx.topic.to_string()]);
	}

	let generated = merged.len();
	let fresh: Vec<String> =
		merged.into_iter().filter(|query| !issued.contains(query)).take(max_queries).collect();

	if fresh.is_empty() {
		tracing::info!(layer = ctx.layer, generated, "Every generated query was already issued.");
	}

	Ok(fresh)
}

/// Issues one search per query and returns fresh candidates in first-seen order.
pub async fn search(
	ctx: &StageContext<'_>,
	queries: &[String],
	seen: &SeenIds,
) -> Result<Vec<CandidatePaper>> {
	let max_results = ctx.budget.search_papers as usize;

	if queries.is_empty() || max_results == 0 {
		return Ok(Vec::new());
	}

	let cfg = &ctx.cfg.providers.search;
	let provider = &ctx.providers.search;
	let calls = queries.iter().map(|query| async move {
		ctx.pool
			.call(ctx.cancel, provider.search(cfg, query, max_results))
			.await
			.map(|hits| (query, hits))
	});
	let batches = stages::settle(ctx, "search", future::join_all(calls).await)?;
	let candidates = batches.into_iter().flat_map(|(query, hits)| {
		hits.into_iter()
			.take(max_results)
			.filter_map(move |hit| CandidatePaper::from_hit(&hit, ctx.layer, query))
			.collect::<Vec<_>>()
	});

	Ok(aggregate::fresh_candidates(candidates, seen))
}
