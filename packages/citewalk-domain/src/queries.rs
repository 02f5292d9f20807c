//! Normalization of query lists produced by the query oracle.

use std::collections::HashSet;

use serde_json::Value;

const SEARCH_MARKER: &str = "[search]";

/// Turns raw oracle output into at most `limit` distinct search queries.
///
/// Accepts a JSON array of strings or free text with one query per line. Lines may carry list
/// bullets, numbering, or a `[Search]` marker; lines carrying any other bracketed marker are
/// control output and are skipped. Queries are compared case-insensitively after whitespace
/// collapsing; the first spelling wins.
pub fn normalize_query_list(raw: &str, limit: usize) -> Vec<String> {
	let text = raw.trim();
	let items: Vec<String> = match serde_json::from_str::<Value>(text) {
		Ok(Value::Array(values)) =>
			values.iter().filter_map(|value| value.as_str().map(str::to_string)).collect(),
		_ => text.lines().filter_map(strip_line_markers).collect(),
	};

	dedup_queries(items, limit)
}

/// Interleaves several query lists, taking one query from each list per round.
///
/// The output is deduplicated the same way as [`normalize_query_list`] and capped at `limit`.
pub fn merge_round_robin(lists: &[Vec<String>], limit: usize) -> Vec<String> {
	let longest = lists.iter().map(Vec::len).max().unwrap_or(0);
	let mut interleaved = Vec::new();

	for round in 0..longest {
		for list in lists {
			if let Some(query) = list.get(round) {
				interleaved.push(query.clone());
			}
		}
	}

	dedup_queries(interleaved, limit)
}

fn dedup_queries(items: Vec<String>, limit: usize) -> Vec<String> {
	let mut seen = HashSet::new();
	let mut out = Vec::new();

	for item in items {
		if out.len() >= limit {
			break;
		}

		let normalized = item.split_whitespace().collect::<Vec<_>>().join(" ");

		if normalized.is_empty() {
			continue;
		}
		if seen.insert(normalized.to_lowercase()) {
			out.push(normalized);
		}
	}

	out
}

fn strip_line_markers(line: &str) -> Option<String> {
	let mut text = line.trim().trim_start_matches(['-', '*', '\u{2022}']).trim_start();

	let digits = text.chars().take_while(char::is_ascii_digit).count();

	if digits > 0 {
		let rest = &text[digits..];

		if let Some(stripped) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
			text = stripped.trim_start();
		}
	}

	let lowered = text.to_ascii_lowercase();

	if lowered.starts_with(SEARCH_MARKER) {
		text = text[SEARCH_MARKER.len()..].trim_start_matches(':').trim();
	} else if text.starts_with('[') {
		return None;
	}

	let text = text.trim().trim_matches('"').trim();

	if text.is_empty() { None } else { Some(text.to_string()) }
}
