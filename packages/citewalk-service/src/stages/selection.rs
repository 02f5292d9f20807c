use crate::{
	CandidatePaper, Error, Result, ScoringDoc, aggregate,
	stages::{self, StageContext},
};

/// Scores all candidates in one batched call and returns the accepted subset, best first.
///
/// Acceptance is a rank cutoff over the whole layer: papers at or above `engine.min_relevance`
/// are kept, then the list is truncated to `engine.max_accepted_per_layer` when set. Ties keep
/// first-seen order.
pub async fn select(
	ctx: &StageContext<'_>,
	candidates: &[CandidatePaper],
) -> Result<Vec<CandidatePaper>> {
	if candidates.is_empty() {
		return Ok(Vec::new());
	}

	let cfg = &ctx.cfg.providers.relevance_oracle;
	let docs = candidates.iter().map(CandidatePaper::scoring_doc).collect::<Vec<ScoringDoc>>();
	let call = ctx.pool.call(ctx.cancel, ctx.providers.relevance.score(cfg, ctx.topic, &docs)).await;
	let mut scores = stages::settle(ctx, "selection", vec![call])?;
	let scores = scores.pop().unwrap_or_default();

	if scores.len() != candidates.len() {
		return Err(Error::Internal {
			message: format!(
				"selection failed at layer {}: relevance oracle returned {} scores for {} candidates",
				ctx.layer,
				scores.len(),
				candidates.len()
			),
		});
	}

	let mut scored = candidates
		.iter()
		.zip(scores)
		.map(|(paper, score)| CandidatePaper { score: sanitize(score), ..paper.clone() })
		.collect::<Vec<_>>();

	scored.sort_by(aggregate::by_score_desc);

	let min_relevance = ctx.cfg.engine.min_relevance;
	let mut accepted =
		scored.into_iter().filter(|paper| paper.score >= min_relevance).collect::<Vec<_>>();

	if let Some(max) = ctx.cfg.engine.max_accepted_per_layer {
		accepted.truncate(max as usize);
	}

	tracing::debug!(
		layer = ctx.layer,
		candidates = candidates.len(),
		accepted = accepted.len(),
		"Selection finished."
	);

	Ok(accepted)
}

fn sanitize(score: f32) -> f32 {
	if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 }
}
