//! Relevance scoring through a selector model.
//!
//! The selector is asked for a one-token decision and the score is the probability it assigns to
//! the token `True`, read from the top logprobs of that first token.

use serde_json::{Value, json};

use crate::{Result, completion};
use citewalk_config::OracleProviderConfig;

const SCORE_CHUNK_SIZE: usize = 32;
const TRUE_TOKEN: &str = "True";

#[derive(Debug, Clone, PartialEq)]
pub struct ScoringDoc {
	pub title: String,
	pub snippet: String,
}

pub async fn score(cfg: &OracleProviderConfig, query: &str, docs: &[ScoringDoc]) -> Result<Vec<f32>> {
	let mut scores = Vec::with_capacity(docs.len());

	for chunk in docs.chunks(SCORE_CHUNK_SIZE) {
		let prompts: Vec<String> = chunk.iter().map(|doc| build_prompt(query, doc)).collect();
		let body = json!({
			"model": cfg.model,
			"prompt": prompts,
			"max_tokens": 1,
			"temperature": 0.0,
			"top_p": 1.0,
			"logprobs": cfg.logprobs,
		});
		let json = completion::post(cfg, &body).await?;

		scores.extend(parse_true_probabilities(&json, chunk.len())?);
	}

	Ok(scores)
}

fn build_prompt(query: &str, doc: &ScoringDoc) -> String {
	format!(
		"Evaluate whether the following paper satisfies the user query.\n\nSearched Paper:\nTitle: {}\nAbstract: {}\n\nUser Query: {}\n\nOutput format: Decision: True/False\nDecision:",
		doc.title.trim(),
		doc.snippet.trim(),
		query.trim()
	)
}

/// Aligns one score per prompt. Missing choices or logprobs score 0.0.
fn parse_true_probabilities(json: &Value, expected: usize) -> Result<Vec<f32>> {
	let choices = completion::ordered_choices(json)?;
	let mut scores: Vec<f32> = choices.into_iter().map(true_probability).collect();

	scores.resize(expected, 0.0);

	Ok(scores)
}

fn true_probability(choice: &Value) -> f32 {
	let Some(token_map) = choice
		.get("logprobs")
		.and_then(|lp| lp.get("top_logprobs"))
		.and_then(Value::as_array)
		.and_then(|steps| steps.first())
		.and_then(Value::as_object)
	else {
		return 0.0;
	};
	let best = token_map
		.iter()
		.filter(|(token, _)| token.trim() == TRUE_TOKEN)
		.filter_map(|(_, logprob)| logprob.as_f64())
		.fold(None, |best: Option<f64>, logprob| Some(best.map_or(logprob, |b| b.max(logprob))));

	best.map(|logprob| logprob.exp() as f32).unwrap_or(0.0)
}
