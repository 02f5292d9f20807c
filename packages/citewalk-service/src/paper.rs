use serde::{Deserialize, Serialize};

use crate::{CitedPaper, QueryContext, ScoringDoc, SearchHit};
use citewalk_domain::paper_id;

/// A paper discovered by one job, keyed by its normalized id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePaper {
	/// Dedup key: the canonical arXiv id when there is one.
	pub id: String,
	pub title: String,
	pub link: String,
	pub snippet: String,
	pub layer: u32,
	/// Zero until the paper has been scored.
	pub score: f32,
	/// The search query that surfaced the paper, or `cites:<parent>` for citation seeds.
	pub query: String,
}
impl CandidatePaper {
	/// Drops hits that carry no usable id or no title.
	pub fn from_hit(hit: &SearchHit, layer: u32, query: &str) -> Option<Self> {
		let id = paper_id::dedup_key(&hit.id).or_else(|| paper_id::dedup_key(&hit.link))?;
		let title = hit.title.trim();

		if title.is_empty() {
			return None;
		}

		Some(Self {
			link: link_for(&id, &hit.link),
			id,
			title: title.to_string(),
			snippet: hit.snippet.trim().to_string(),
			layer,
			score: 0.0,
			query: query.to_string(),
		})
	}

	pub fn from_cited(cited: &CitedPaper, layer: u32, parent_id: &str) -> Option<Self> {
		let id = paper_id::dedup_key(&cited.id)?;
		let title = cited.title.trim();

		if title.is_empty() {
			return None;
		}

		Some(Self {
			link: link_for(&id, ""),
			id,
			title: title.to_string(),
			snippet: cited.snippet.trim().to_string(),
			layer,
			score: 0.0,
			query: format!("cites:{parent_id}"),
		})
	}

	pub fn scoring_doc(&self) -> ScoringDoc {
		ScoringDoc { title: self.title.clone(), snippet: self.snippet.clone() }
	}

	pub fn query_context(&self) -> QueryContext {
		QueryContext { title: self.title.clone(), snippet: self.snippet.clone() }
	}
}

/// The caller-facing shape of a result entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperView {
	pub title: String,
	pub link: String,
	pub snippet: String,
}
impl From<&CandidatePaper> for PaperView {
	fn from(paper: &CandidatePaper) -> Self {
		Self { title: paper.title.clone(), link: paper.link.clone(), snippet: paper.snippet.clone() }
	}
}

/// Prefers the provider's link; arXiv papers without one get their abstract page.
fn link_for(id: &str, link: &str) -> String {
	let link = link.trim();

	if !link.is_empty() {
		return link.to_string();
	}

	match paper_id::arxiv_id(id) {
		Some(arxiv_id) => paper_id::abs_url(&arxiv_id),
		None => id.to_string(),
	}
}
