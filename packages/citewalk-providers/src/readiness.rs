//! Reachability checks used by health reporting and submission gating.

use serde_json::Value;

use crate::{Error, Result};
use citewalk_config::{CitationProviderConfig, OracleProviderConfig, ProviderConfig};

/// Succeeds when the oracle endpoint lists the configured model.
pub async fn oracle(cfg: &OracleProviderConfig) -> Result<()> {
	let client = crate::client(cfg.timeout_ms)?;
	let res = client
		.get(format!("{}/models", cfg.api_base))
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;
	let served = served_models(&json);

	if served.iter().any(|id| id == &cfg.model) {
		return Ok(());
	}

	Err(Error::NotReady {
		message: format!(
			"{} does not serve model {}; available: {}.",
			cfg.api_base,
			cfg.model,
			served.join(", ")
		),
	})
}

pub async fn search(cfg: &ProviderConfig) -> Result<()> {
	reachable(&cfg.api_base, &cfg.api_key, &cfg.default_headers, cfg.timeout_ms).await
}

pub async fn citation(cfg: &CitationProviderConfig) -> Result<()> {
	reachable(&cfg.api_base, &cfg.api_key, &cfg.default_headers, cfg.timeout_ms).await
}

// Any response short of a server error means the host is up.
async fn reachable(
	api_base: &str,
	api_key: &str,
	default_headers: &serde_json::Map<String, Value>,
	timeout_ms: u64,
) -> Result<()> {
	let client = crate::client(timeout_ms)?;
	let res =
		client.get(api_base).headers(crate::auth_headers(api_key, default_headers)?).send().await?;

	if res.status().is_server_error() {
		return Err(Error::NotReady {
			message: format!("{api_base} responded with {}.", res.status()),
		});
	}

	Ok(())
}

fn served_models(json: &Value) -> Vec<String> {
	json.get("data")
		.and_then(Value::as_array)
		.map(|models| {
			models
				.iter()
				.filter_map(|model| model.get("id").and_then(Value::as_str))
				.map(str::to_string)
				.collect()
		})
		.unwrap_or_default()
}
