use citewalk_domain::{paper_id, queries};

#[test]
fn arxiv_forms_share_one_dedup_key() {
	let expected = Some("2401.01234".to_string());

	assert_eq!(paper_id::dedup_key("2401.01234"), expected);
	assert_eq!(paper_id::dedup_key("2401.01234v3"), expected);
	assert_eq!(paper_id::dedup_key("arXiv:2401.01234"), expected);
	assert_eq!(paper_id::dedup_key(" https://arxiv.org/abs/2401.01234v2 "), expected);
	assert_eq!(paper_id::dedup_key("https://www.arxiv.org/pdf/2401.01234.pdf"), expected);
}

#[test]
fn legacy_arxiv_ids_are_recognized() {
	assert_eq!(paper_id::arxiv_id("hep-th/9901001v2"), Some("hep-th/9901001".to_string()));
	assert_eq!(paper_id::arxiv_id("math.GT/0309136"), Some("math.gt/0309136".to_string()));
}

#[test]
fn non_arxiv_ids_fall_back_to_lowercased_text() {
	assert_eq!(paper_id::arxiv_id("10.1145/3292500.3330701"), None);
	assert_eq!(
		paper_id::dedup_key("https://doi.org/10.1145/ABC/"),
		Some("https://doi.org/10.1145/abc".to_string())
	);
}

#[test]
fn blank_ids_have_no_key() {
	assert_eq!(paper_id::dedup_key("   "), None);
	assert_eq!(paper_id::dedup_key(""), None);
}

#[test]
fn builds_abs_url() {
	assert_eq!(paper_id::abs_url("2401.01234"), "https://arxiv.org/abs/2401.01234");
}

#[test]
fn parses_search_marked_lines() {
	let raw = "[Search] contrastive learning survey\n[Search]  SimCLR   augmentation\n[StopSearch]";
	let parsed = queries::normalize_query_list(raw, 5);

	assert_eq!(parsed, vec!["contrastive learning survey", "SimCLR augmentation"]);
}

#[test]
fn parses_bullets_and_numbering() {
	let raw = "1. graph neural networks\n- \"message passing\"\n\u{2022} GNN expressivity\n2) graph neural networks";
	let parsed = queries::normalize_query_list(raw, 10);

	assert_eq!(parsed, vec!["graph neural networks", "message passing", "GNN expressivity"]);
}

#[test]
fn parses_json_arrays_and_applies_limit() {
	let raw = r#"["a query", "A  QUERY", "second", "third"]"#;
	let parsed = queries::normalize_query_list(raw, 2);

	assert_eq!(parsed, vec!["a query", "second"]);
}

#[test]
fn zero_limit_yields_nothing() {
	assert!(queries::normalize_query_list("anything", 0).is_empty());
}

#[test]
fn merges_lists_round_robin() {
	let lists = vec![
		vec!["topic a".to_string(), "topic b".to_string()],
		vec!["ctx a".to_string(), "Topic A".to_string(), "ctx c".to_string()],
		vec![],
	];
	let merged = queries::merge_round_robin(&lists, 4);

	assert_eq!(merged, vec!["topic a", "ctx a", "topic b", "ctx c"]);
}
