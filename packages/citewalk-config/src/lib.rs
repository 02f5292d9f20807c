mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	CitationProviderConfig, Config, Engine, Jobs, OracleProviderConfig, ProviderConfig, Providers,
	Service,
};

use std::{fs, net::SocketAddr, path::Path};

pub const PAPER_ID_PLACEHOLDER: &str = "{paper_id}";

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	finish(cfg)
}

pub fn parse(raw: &str) -> Result<Config> {
	let cfg: Config = toml::from_str(raw).map_err(|err| Error::ParseInline { source: err })?;

	finish(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.parse::<SocketAddr>().is_err() {
		return Err(Error::invalid("service.http_bind", "must be a socket address."));
	}

	let engine = &cfg.engine;

	if engine.max_concurrency == 0 {
		return Err(Error::invalid("engine.max_concurrency", "must be greater than zero."));
	}
	if engine.default_concurrency == 0 {
		return Err(Error::invalid("engine.default_concurrency", "must be greater than zero."));
	}
	if engine.default_concurrency > engine.max_concurrency {
		return Err(Error::invalid(
			"engine.default_concurrency",
			"must not exceed engine.max_concurrency.",
		));
	}
	if engine.call_timeout_ms == 0 {
		return Err(Error::invalid("engine.call_timeout_ms", "must be greater than zero."));
	}
	if !engine.min_relevance.is_finite() {
		return Err(Error::invalid("engine.min_relevance", "must be a finite number."));
	}
	if !(0.0..=1.0).contains(&engine.min_relevance) {
		return Err(Error::invalid("engine.min_relevance", "must be in the range 0.0-1.0."));
	}
	if engine.max_accepted_per_layer == Some(0) {
		return Err(Error::invalid("engine.max_accepted_per_layer", "must be greater than zero."));
	}
	if cfg.jobs.max_pending == 0 {
		return Err(Error::invalid("jobs.max_pending", "must be greater than zero."));
	}
	if cfg.jobs.max_running == 0 {
		return Err(Error::invalid("jobs.max_running", "must be greater than zero."));
	}
	if cfg.jobs.sweep_interval_seconds == 0 {
		return Err(Error::invalid("jobs.sweep_interval_seconds", "must be greater than zero."));
	}

	let providers = &cfg.providers;

	for (field, api_base, timeout_ms) in [
		("providers.query_oracle", &providers.query_oracle.api_base, providers.query_oracle.timeout_ms),
		(
			"providers.relevance_oracle",
			&providers.relevance_oracle.api_base,
			providers.relevance_oracle.timeout_ms,
		),
		("providers.search", &providers.search.api_base, providers.search.timeout_ms),
		("providers.citation", &providers.citation.api_base, providers.citation.timeout_ms),
	] {
		if api_base.trim().is_empty() {
			return Err(Error::invalid(field, "api_base must be non-empty."));
		}
		if timeout_ms == 0 {
			return Err(Error::invalid(field, "timeout_ms must be greater than zero."));
		}
	}
	for (field, model) in [
		("providers.query_oracle", &providers.query_oracle.model),
		("providers.relevance_oracle", &providers.relevance_oracle.model),
	] {
		if model.trim().is_empty() {
			return Err(Error::invalid(field, "model must be non-empty."));
		}
	}

	if providers.relevance_oracle.logprobs == 0 {
		return Err(Error::invalid(
			"providers.relevance_oracle",
			"logprobs must be greater than zero.",
		));
	}
	if !providers.citation.path.contains(PAPER_ID_PLACEHOLDER) {
		return Err(Error::invalid(
			"providers.citation",
			format!("path must contain the {PAPER_ID_PLACEHOLDER} placeholder."),
		));
	}
	if providers.citation.max_attempts == 0 {
		return Err(Error::invalid("providers.citation", "max_attempts must be greater than zero."));
	}

	Ok(())
}

fn finish(mut cfg: Config) -> Result<Config> {
	normalize(&mut cfg);
	validate(&cfg)?;

	Ok(cfg)
}

fn normalize(cfg: &mut Config) {
	let providers = &mut cfg.providers;

	for api_base in [
		&mut providers.query_oracle.api_base,
		&mut providers.relevance_oracle.api_base,
		&mut providers.search.api_base,
		&mut providers.citation.api_base,
	] {
		let trimmed = api_base.trim().trim_end_matches('/').to_string();

		*api_base = trimmed;
	}

	if cfg.service.log_level.trim().is_empty() {
		cfg.service.log_level = "info".to_string();
	}
}
