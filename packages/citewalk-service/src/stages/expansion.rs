use futures::future;

use crate::{
	CandidatePaper, Result, aggregate,
	aggregate::SeenIds,
	stages::{self, StageContext},
};

/// Fetches citations for the `expand_papers` best accepted papers.
///
/// Returns the cited papers not yet seen by the job, as next-layer candidates. They carry no
/// score; the next layer's selection rescoring decides whether they are accepted. A failed fetch
/// for one paper only loses that paper's citations.
pub async fn expand(
	ctx: &StageContext<'_>,
	accepted: &[CandidatePaper],
	seen: &SeenIds,
) -> Result<Vec<CandidatePaper>> {
	let expand_papers = ctx.budget.expand_papers as usize;

	if expand_papers == 0 || accepted.is_empty() {
		return Ok(Vec::new());
	}

	let mut parents = accepted.iter().collect::<Vec<_>>();

	parents.sort_by(|a, b| aggregate::by_score_desc(a, b));
	parents.truncate(expand_papers);

	let cfg = &ctx.cfg.providers.citation;
	let provider = &ctx.providers.citation;
	let calls = parents.iter().map(|parent| async move {
		ctx.pool
			.call(ctx.cancel, provider.citations(cfg, &parent.id))
			.await
			.map(|cited| (parent.id.as_str(), cited))
	});
	let batches = stages::settle(ctx, "expansion", future::join_all(calls).await)?;
	let next_layer = ctx.layer + 1;
	let cited = batches.into_iter().flat_map(|(parent_id, cited)| {
		cited
			.iter()
			.filter_map(|paper| CandidatePaper::from_cited(paper, next_layer, parent_id))
			.collect::<Vec<_>>()
	});

	Ok(aggregate::fresh_candidates(cited, seen))
}
