//! Dedup keys for papers.
//!
//! arXiv identifiers arrive as bare ids, `arXiv:` prefixed ids, abstract or PDF URLs, and with or
//! without a version suffix. All of them collapse to the same canonical id so a paper found through
//! two different queries, or through a citation list, is only accepted once per job.

use std::sync::LazyLock;

use regex::Regex;

static MODERN_ARXIV_ID: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^(\d{4}\.\d{4,5})(v\d+)?$").expect("modern arXiv id pattern is valid")
});
static LEGACY_ARXIV_ID: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^([a-z][a-z\-]*(\.[a-z]{2})?/\d{7})(v\d+)?$")
		.expect("legacy arXiv id pattern is valid")
});

const ARXIV_URL_PREFIXES: [&str; 4] = [
	"https://arxiv.org/abs/",
	"https://arxiv.org/pdf/",
	"http://arxiv.org/abs/",
	"http://arxiv.org/pdf/",
];

/// Returns the canonical arXiv id (version stripped) when `raw` names an arXiv paper.
pub fn arxiv_id(raw: &str) -> Option<String> {
	let mut text = raw.trim().to_ascii_lowercase();

	if let Some(rest) = text.strip_prefix("arxiv:") {
		text = rest.trim().to_string();
	}

	let www_stripped = text.replacen("://www.arxiv.org/", "://arxiv.org/", 1);

	text = www_stripped;

	for prefix in ARXIV_URL_PREFIXES {
		if let Some(rest) = text.strip_prefix(prefix) {
			text = rest.to_string();

			break;
		}
	}

	let text = text.trim_end_matches('/');
	let text = text.strip_suffix(".pdf").unwrap_or(text);

	if let Some(captures) = MODERN_ARXIV_ID.captures(text) {
		return captures.get(1).map(|m| m.as_str().to_string());
	}
	if let Some(captures) = LEGACY_ARXIV_ID.captures(text) {
		return captures.get(1).map(|m| m.as_str().to_string());
	}

	None
}

/// The key used to deduplicate candidates within a job.
///
/// Falls back to the trimmed, lowercased identifier for non-arXiv sources. Blank input has no key.
pub fn dedup_key(raw: &str) -> Option<String> {
	if let Some(id) = arxiv_id(raw) {
		return Some(id);
	}

	let fallback = raw.trim().trim_end_matches('/').to_lowercase();

	if fallback.is_empty() { None } else { Some(fallback) }
}

pub fn abs_url(arxiv_id: &str) -> String {
	format!("https://arxiv.org/abs/{arxiv_id}")
}
