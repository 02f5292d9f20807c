//! Job-scoped dedup state and the running result list.

use std::{cmp::Ordering, collections::HashSet};

use crate::CandidatePaper;

/// Every dedup key the job has already scored, accepted or not.
#[derive(Debug, Default)]
pub struct SeenIds(HashSet<String>);
impl SeenIds {
	pub fn contains(&self, id: &str) -> bool {
		self.0.contains(id)
	}

	pub fn insert(&mut self, id: &str) -> bool {
		self.0.insert(id.to_string())
	}

	pub fn extend<'a>(&mut self, papers: impl IntoIterator<Item = &'a CandidatePaper>) {
		for paper in papers {
			self.insert(&paper.id);
		}
	}
}

/// Accepted papers across all layers, at most one per dedup key.
#[derive(Debug, Default)]
pub struct Aggregate {
	papers: Vec<CandidatePaper>,
	keys: HashSet<String>,
}
impl Aggregate {
	/// Appends one layer's accepted papers, skipping keys that are already present. Returns the
	/// number of papers added.
	pub fn push_layer(&mut self, accepted: &[CandidatePaper]) -> usize {
		let before = self.papers.len();

		for paper in accepted {
			if self.keys.insert(paper.id.clone()) {
				self.papers.push(paper.clone());
			}
		}

		self.papers.len() - before
	}

	pub(crate) fn len(&self) -> usize {
		self.papers.len()
	}

	/// A ranked copy of what has been accepted so far.
	pub fn snapshot(&self) -> Vec<CandidatePaper> {
		let mut papers = self.papers.clone();

		rank(&mut papers);

		papers
	}

	pub fn finalize(mut self) -> Vec<CandidatePaper> {
		rank(&mut self.papers);

		self.papers
	}
}

/// Orders by layer ascending, then score descending. The sort is stable, so equal papers keep
/// their acceptance order.
pub fn rank(papers: &mut [CandidatePaper]) {
	papers.sort_by(|a, b| a.layer.cmp(&b.layer).then_with(|| by_score_desc(a, b)));
}

pub fn by_score_desc(a: &CandidatePaper, b: &CandidatePaper) -> Ordering {
	b.score.total_cmp(&a.score)
}

/// Keeps the first occurrence of each key and drops keys already scored by the job.
pub fn fresh_candidates(
	candidates: impl IntoIterator<Item = CandidatePaper>,
	seen: &SeenIds,
) -> Vec<CandidatePaper> {
	let mut keys = HashSet::new();

	candidates
		.into_iter()
		.filter(|paper| !seen.contains(&paper.id) && keys.insert(paper.id.clone()))
		.collect()
}
