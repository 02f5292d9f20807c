use serde_json::json;

use crate::{Result, completion};
use citewalk_config::OracleProviderConfig;
use citewalk_domain::queries;

/// A discovered paper used to steer query generation in later layers.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryContext {
	pub title: String,
	pub snippet: String,
}

pub async fn generate(
	cfg: &OracleProviderConfig,
	topic: &str,
	context: Option<&QueryContext>,
	max_queries: usize,
) -> Result<Vec<String>> {
	let body = json!({
		"model": cfg.model,
		"prompt": build_prompt(topic, context, max_queries),
		"max_tokens": cfg.max_tokens,
		"temperature": cfg.temperature,
	});
	let json = completion::post(cfg, &body).await?;
	let text = completion::choice_texts(&json)?.into_iter().next().unwrap_or_default();

	Ok(queries::normalize_query_list(&text, max_queries))
}

fn build_prompt(topic: &str, context: Option<&QueryContext>, max_queries: usize) -> String {
	let mut prompt = format!(
		"Research topic: {}\nWrite up to {max_queries} search queries, one per line, each prefixed with [Search].\n",
		topic.trim()
	);

	if let Some(context) = context {
		prompt.push_str(&format!(
			"Related paper:\nTitle: {}\nAbstract: {}\n",
			context.title.trim(),
			context.snippet.trim()
		));
	}

	prompt
}
