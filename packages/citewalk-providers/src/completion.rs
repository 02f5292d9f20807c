//! OpenAI-compatible `/completions` plumbing shared by both oracles.

use serde_json::Value;

use crate::{Error, Result};
use citewalk_config::OracleProviderConfig;

pub(crate) async fn post(cfg: &OracleProviderConfig, body: &Value) -> Result<Value> {
	let client = crate::client(cfg.timeout_ms)?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(body)
		.send()
		.await?;

	Ok(res.error_for_status()?.json().await?)
}

/// Returns the `choices` array ordered by each choice's `index`.
pub(crate) fn ordered_choices(json: &Value) -> Result<Vec<&Value>> {
	let choices = json
		.get("choices")
		.and_then(Value::as_array)
		.ok_or_else(|| Error::invalid_response("Completion response is missing choices array."))?;
	let mut indexed: Vec<(usize, &Value)> = choices
		.iter()
		.enumerate()
		.map(|(fallback_index, choice)| {
			let index = choice
				.get("index")
				.and_then(Value::as_u64)
				.map(|v| v as usize)
				.unwrap_or(fallback_index);

			(index, choice)
		})
		.collect();

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, choice)| choice).collect())
}

pub(crate) fn choice_texts(json: &Value) -> Result<Vec<String>> {
	Ok(ordered_choices(json)?
		.into_iter()
		.map(|choice| choice.get("text").and_then(Value::as_str).unwrap_or_default().to_string())
		.collect())
}
