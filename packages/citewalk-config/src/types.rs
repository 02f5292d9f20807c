use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub engine: Engine,
	#[serde(default)]
	pub jobs: Jobs,
	pub providers: Providers,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Engine {
	/// Outbound call slots shared by every job in the process.
	pub max_concurrency: u32,
	/// Per-job share used when a request asks for `threads_num = 0`.
	pub default_concurrency: u32,
	pub call_timeout_ms: u64,
	#[serde(default = "default_min_relevance")]
	pub min_relevance: f32,
	pub max_accepted_per_layer: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Jobs {
	pub max_pending: u32,
	pub max_running: u32,
	/// Zero keeps terminal jobs for the lifetime of the process.
	pub job_ttl_seconds: u64,
	pub sweep_interval_seconds: u64,
}
impl Default for Jobs {
	fn default() -> Self {
		Self { max_pending: 64, max_running: 2, job_ttl_seconds: 3_600, sweep_interval_seconds: 60 }
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub query_oracle: OracleProviderConfig,
	pub relevance_oracle: OracleProviderConfig,
	pub search: ProviderConfig,
	pub citation: CitationProviderConfig,
}

/// An OpenAI-compatible completions endpoint serving one model.
#[derive(Debug, Clone, Deserialize)]
pub struct OracleProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	#[serde(default)]
	pub api_key: String,
	pub path: String,
	pub model: String,
	#[serde(default)]
	pub temperature: f32,
	#[serde(default = "default_max_tokens")]
	pub max_tokens: u32,
	#[serde(default = "default_logprobs")]
	pub logprobs: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	#[serde(default)]
	pub api_key: String,
	pub path: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CitationProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	#[serde(default)]
	pub api_key: String,
	/// Must contain the `{paper_id}` placeholder.
	pub path: String,
	pub timeout_ms: u64,
	#[serde(default = "default_max_attempts")]
	pub max_attempts: u32,
	#[serde(default = "default_base_backoff_ms")]
	pub base_backoff_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_min_relevance() -> f32 {
	0.5
}

fn default_max_tokens() -> u32 {
	512
}

fn default_logprobs() -> u32 {
	20
}

fn default_max_attempts() -> u32 {
	3
}

fn default_base_backoff_ms() -> u64 {
	500
}
