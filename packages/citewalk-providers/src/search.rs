use serde_json::{Value, json};

use crate::{Error, Result};
use citewalk_config::ProviderConfig;

/// One raw hit from the search provider, before dedup-key normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
	pub id: String,
	pub title: String,
	pub link: String,
	pub snippet: String,
}

pub async fn search(cfg: &ProviderConfig, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
	let client = crate::client(cfg.timeout_ms)?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = json!({ "query": query, "max_results": max_results });
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;
	let mut hits = parse_search_response(&json)?;

	hits.truncate(max_results);

	Ok(hits)
}

fn parse_search_response(json: &Value) -> Result<Vec<SearchHit>> {
	let items = json
		.as_array()
		.or_else(|| json.get("papers").and_then(Value::as_array))
		.or_else(|| json.get("results").and_then(Value::as_array))
		.ok_or_else(|| Error::invalid_response("Search response is missing a hit list."))?;

	Ok(items.iter().filter_map(parse_hit).collect())
}

fn parse_hit(item: &Value) -> Option<SearchHit> {
	let link = crate::str_field(item, &["link", "url", "abs_url"]).unwrap_or_default().to_string();
	let id = crate::str_field(item, &["id", "arxiv_id", "paper_id"])
		.map(str::to_string)
		.or_else(|| (!link.is_empty()).then(|| link.clone()))?;

	Some(SearchHit {
		id,
		title: crate::str_field(item, &["title"]).unwrap_or_default().to_string(),
		link,
		snippet: crate::str_field(item, &["snippet", "abstract", "summary"])
			.unwrap_or_default()
			.to_string(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_bare_hit_arrays() {
		let json = serde_json::json!([
			{ "title": "SimCLR", "link": "2002.05709", "snippet": "Contrastive." },
			{ "title": "No id" }
		]);
		let hits = parse_search_response(&json).expect("parse failed");

		assert_eq!(hits.len(), 1);
		assert_eq!(hits[0].id, "2002.05709");
		assert_eq!(hits[0].snippet, "Contrastive.");
	}

	#[test]
	fn parses_paper_objects() {
		let json = serde_json::json!({
			"papers": [
				{
					"arxiv_id": "1911.05722",
					"title": "MoCo",
					"url": "https://arxiv.org/abs/1911.05722",
					"abstract": "Momentum contrast."
				}
			]
		});
		let hits = parse_search_response(&json).expect("parse failed");

		assert_eq!(hits[0].id, "1911.05722");
		assert_eq!(hits[0].link, "https://arxiv.org/abs/1911.05722");
		assert_eq!(hits[0].snippet, "Momentum contrast.");
	}

	#[test]
	fn rejects_unknown_shapes() {
		assert!(parse_search_response(&serde_json::json!({ "count": 0 })).is_err());
	}
}
