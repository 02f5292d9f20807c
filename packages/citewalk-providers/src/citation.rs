//! Citation lists from a rate-limited metadata provider.
//!
//! A fetch for one paper is a single logical call: transient failures are retried with
//! exponential backoff inside that call, bounded by `max_attempts`.

use std::time::Duration;

use reqwest::Url;
use serde_json::Value;

use crate::{Error, Result};
use citewalk_config::{CitationProviderConfig, PAPER_ID_PLACEHOLDER};

const MAX_BACKOFF_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq)]
pub struct CitedPaper {
	pub id: String,
	pub title: String,
	pub snippet: String,
}

pub async fn fetch(cfg: &CitationProviderConfig, paper_id: &str) -> Result<Vec<CitedPaper>> {
	let client = crate::client(cfg.timeout_ms)?;
	let url = citation_url(cfg, paper_id)?;
	let headers = crate::auth_headers(&cfg.api_key, &cfg.default_headers)?;
	let max_attempts = cfg.max_attempts.max(1);
	let mut attempt = 1;

	loop {
		let result: Result<Vec<CitedPaper>> = async {
			let res = client.get(url.clone()).headers(headers.clone()).send().await?;
			let json: Value = res.error_for_status()?.json().await?;

			parse_citation_response(&json)
		}
		.await;

		match result {
			Ok(papers) => return Ok(papers),
			Err(err) if attempt < max_attempts && err.is_transient() => {
				let delay = backoff_delay(cfg.base_backoff_ms, attempt);

				tracing::warn!(
					error = %err,
					paper_id,
					attempt,
					delay_ms = delay.as_millis() as u64,
					"Citation fetch failed; retrying."
				);
				tokio::time::sleep(delay).await;

				attempt += 1;
			},
			Err(err) => return Err(err),
		}
	}
}

/// Joins `api_base` with the templated path. The path setter escapes what a path may not carry
/// (spaces, `?`, `#`) and keeps `/`, so legacy ids such as `hep-th/9901001` stay readable.
pub(crate) fn citation_url(cfg: &CitationProviderConfig, paper_id: &str) -> Result<Url> {
	let mut url = Url::parse(&cfg.api_base).map_err(|err| Error::InvalidConfig {
		message: format!("Citation api_base {:?} is not a valid URL: {err}.", cfg.api_base),
	})?;
	let path = format!(
		"{}{}",
		url.path().trim_end_matches('/'),
		cfg.path.replace(PAPER_ID_PLACEHOLDER, paper_id.trim())
	);

	url.set_path(&path);

	Ok(url)
}

/// Exponential backoff starting at `base_ms` for the first retry, capped at 30 seconds.
pub(crate) fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
	let factor = 1_u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);

	Duration::from_millis(base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS))
}

fn parse_citation_response(json: &Value) -> Result<Vec<CitedPaper>> {
	let items = json
		.as_array()
		.or_else(|| {
			["references", "citations", "data"]
				.iter()
				.find_map(|key| json.get(*key).and_then(Value::as_array))
		})
		.ok_or_else(|| Error::invalid_response("Citation response is missing a reference list."))?;

	Ok(items.iter().filter_map(parse_cited).collect())
}

fn parse_cited(item: &Value) -> Option<CitedPaper> {
	let paper = item.get("citedPaper").or_else(|| item.get("citingPaper")).unwrap_or(item);
	let id = paper
		.get("externalIds")
		.and_then(|ids| crate::str_field(ids, &["ArXiv", "arxiv"]))
		.or_else(|| crate::str_field(paper, &["arxiv_id", "paper_id", "paperId", "id"]))?
		.to_string();

	Some(CitedPaper {
		id,
		title: crate::str_field(paper, &["title"]).unwrap_or_default().to_string(),
		snippet: crate::str_field(paper, &["abstract", "snippet"]).unwrap_or_default().to_string(),
	})
}
