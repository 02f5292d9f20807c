use std::{
	collections::HashSet,
	sync::{Arc, Mutex},
	time::Duration,
};

use citewalk_config::Config;
use citewalk_service::{
	CandidatePaper, CitedPaper, Error, JobManager, JobResult, SearchRequest,
};
use citewalk_testkit::{Backend, FakeBackend, hit, test_config};

fn request(query: &str, layers: i64, queries: i64, papers: i64, expand: i64) -> SearchRequest {
	SearchRequest {
		query: query.to_string(),
		expand_layers: layers,
		search_queries: queries,
		search_papers: papers,
		expand_papers: expand,
		threads_num: 0,
	}
}

fn start(cfg: Config, fake: FakeBackend) -> (Arc<FakeBackend>, JobManager) {
	let (fake, providers) = fake.into_providers();

	(fake, JobManager::with_providers(cfg, providers))
}

async fn run(manager: &JobManager, request: &SearchRequest) -> JobResult {
	let job_id = manager.submit(request).expect("Submit should succeed.");

	citewalk_testkit::within(Duration::from_secs(10), manager.wait(&job_id))
		.await
		.expect("Job should finish in time.")
		.expect("Job should exist.")
}

async fn completed(manager: &JobManager, request: &SearchRequest) -> Vec<CandidatePaper> {
	match run(manager, request).await {
		JobResult::Completed(papers) => papers,
		other => panic!("Expected a completed job, got {other:?}."),
	}
}

fn ids(papers: &[CandidatePaper]) -> Vec<&str> {
	papers.iter().map(|paper| paper.id.as_str()).collect()
}

#[tokio::test]
async fn completed_results_have_unique_dedup_keys() {
	let fake = FakeBackend::new()
		.with_hits(|query, _| {
			let mut hits = vec![
				hit("2002.05709v1", "SimCLR"),
				hit("arXiv:2002.05709v3", "SimCLR again"),
				hit("1911.05722", "MoCo"),
			];

			if query.contains("methods") {
				hits.push(hit("2006.07733", "BYOL"));
			}

			Ok(hits)
		})
		.with_citations(|_| {
			Ok(vec![
				CitedPaper {
					id: "2002.05709".to_string(),
					title: "SimCLR".to_string(),
					snippet: String::new(),
				},
				CitedPaper {
					id: "2103.03230".to_string(),
					title: "Barlow Twins".to_string(),
					snippet: String::new(),
				},
			])
		});
	let (_, manager) = start(test_config(), fake);
	let papers = completed(&manager, &request("contrastive learning", 1, 2, 5, 5)).await;
	let unique: HashSet<_> = ids(&papers).into_iter().collect();

	assert_eq!(unique.len(), papers.len());
	assert_eq!(ids(&papers), vec!["2002.05709", "1911.05722", "2006.07733", "2103.03230"]);
	assert_eq!(papers[3].layer, 1);
}

#[tokio::test]
async fn zero_expand_layers_returns_first_layer_without_citation_fetch() {
	let (fake, manager) = start(test_config(), FakeBackend::new());
	let papers = completed(&manager, &request("graph transformers", 0, 2, 3, 20)).await;
	let mut expected = citewalk_testkit::default_hits("graph transformers survey", 3);

	expected.extend(citewalk_testkit::default_hits("graph transformers methods", 3));

	let expected_ids: Vec<_> = expected.iter().map(|hit| hit.id.clone()).collect();

	assert_eq!(ids(&papers), expected_ids);
	assert!(papers.iter().all(|paper| paper.layer == 0));
	assert_eq!(fake.calls(Backend::Citation), 0);
	assert_eq!(fake.calls(Backend::RelevanceOracle), 1);
}

#[tokio::test]
async fn contrastive_learning_scenario_is_bounded() {
	let (fake, manager) = start(test_config(), FakeBackend::new());
	let papers = completed(&manager, &request("contrastive learning", 1, 2, 5, 0)).await;

	assert!(!papers.is_empty());
	assert!(papers.len() <= 10);
	assert!(papers.iter().all(|paper| !paper.title.is_empty() && !paper.link.is_empty()));
	assert_eq!(fake.calls(Backend::Citation), 0);
}

#[tokio::test]
async fn peak_concurrency_stays_within_thread_budget() {
	let fake = FakeBackend::new().with_latency(|_, _| Duration::from_millis(20));
	let (fake, manager) = start(test_config(), fake);
	let mut req = request("diffusion models", 1, 5, 4, 6);

	req.threads_num = 2;

	let papers = completed(&manager, &req).await;

	assert!(!papers.is_empty());
	assert!(fake.calls(Backend::Search) > 2);
	assert!(fake.peak_in_flight() <= 2, "peak was {}", fake.peak_in_flight());
}

#[tokio::test]
async fn default_share_applies_when_threads_num_is_zero() {
	let fake = FakeBackend::new().with_latency(|_, _| Duration::from_millis(20));
	let (fake, manager) = start(test_config(), fake);

	completed(&manager, &request("diffusion models", 1, 5, 4, 6)).await;

	assert!(fake.peak_in_flight() <= manager.config().engine.default_concurrency as usize);
}

#[tokio::test]
async fn each_candidate_is_scored_once_per_job() {
	let scored = Arc::new(Mutex::new(Vec::new()));
	let fake = FakeBackend::new().with_scores({
		let scored = scored.clone();

		move |doc| {
			scored.lock().expect("Lock should not be poisoned.").push(doc.title.clone());

			Ok(if doc.title.ends_with('0') { 0.9 } else { 0.1 })
		}
	});
	let (_, manager) = start(test_config(), fake);
	let papers = completed(&manager, &request("speech recognition", 2, 2, 3, 4)).await;
	let scored = scored.lock().expect("Lock should not be poisoned.").clone();
	let unique: HashSet<_> = scored.iter().collect();

	assert_eq!(unique.len(), scored.len());
	assert!(papers.iter().all(|paper| paper.score >= 0.5));
}

#[tokio::test]
async fn cited_papers_are_rescored_before_acceptance() {
	let fake = FakeBackend::new()
		.with_hits(|_, _| Ok(vec![hit("1706.03762", "Attention Is All You Need")]))
		.with_citations(|_| {
			Ok(vec![
				CitedPaper {
					id: "1409.0473".to_string(),
					title: "Neural Machine Translation by Jointly Learning to Align".to_string(),
					snippet: String::new(),
				},
				CitedPaper {
					id: "1512.03385".to_string(),
					title: "Unrelated residual networks".to_string(),
					snippet: String::new(),
				},
			])
		})
		.with_scores(|doc| Ok(if doc.title.starts_with("Unrelated") { 0.2 } else { 0.95 }));
	let (_, manager) = start(test_config(), fake);
	let papers = completed(&manager, &request("attention", 1, 1, 1, 1)).await;

	assert_eq!(ids(&papers), vec!["1706.03762", "1409.0473"]);
	assert_eq!(papers[1].layer, 1);
	assert_eq!(papers[1].query, "cites:1706.03762");
	assert_eq!(papers[1].link, "https://arxiv.org/abs/1409.0473");
	assert!((papers[1].score - 0.95).abs() < f32::EPSILON);
}

#[tokio::test]
async fn acceptance_cutoff_ranks_the_whole_layer() {
	let mut cfg = test_config();

	cfg.engine.max_accepted_per_layer = Some(2);

	let fake = FakeBackend::new()
		.with_hits(|query, _| {
			Ok(if query.contains("survey") {
				vec![hit("2101.00001", "a"), hit("2101.00002", "b")]
			} else {
				vec![hit("2101.00003", "c"), hit("2101.00004", "d")]
			})
		})
		.with_scores(|doc| {
			Ok(match doc.title.as_str() {
				"a" => 0.6,
				"b" => 0.4,
				"c" => 0.8,
				_ => 0.7,
			})
		});
	let (_, manager) = start(cfg, fake);
	let papers = completed(&manager, &request("ranking", 0, 2, 2, 0)).await;

	assert_eq!(ids(&papers), vec!["2101.00003", "2101.00004"]);
}

#[tokio::test]
async fn stage_with_every_call_failing_fails_the_job() {
	let fake = FakeBackend::new()
		.with_hits(|_, _| Err(Error::Provider { message: "search backend exploded".to_string() }));
	let (_, manager) = start(test_config(), fake);

	match run(&manager, &request("robotics", 1, 2, 3, 3)).await {
		JobResult::Failed { error } => {
			assert!(error.contains("search"), "error was {error}");
			assert!(error.contains("search backend exploded"), "error was {error}");
		},
		other => panic!("Expected a failed job, got {other:?}."),
	}
}

#[tokio::test]
async fn single_failed_call_is_dropped() {
	let fake = FakeBackend::new().with_hits(|query, max_results| {
		if query.contains("survey") {
			Err(Error::Provider { message: "flaky".to_string() })
		} else {
			Ok(citewalk_testkit::default_hits(query, max_results))
		}
	});
	let (_, manager) = start(test_config(), fake);
	let papers = completed(&manager, &request("robotics", 0, 2, 3, 0)).await;

	assert_eq!(papers.len(), 3);
	assert!(papers.iter().all(|paper| paper.query == "robotics methods"));
}

#[tokio::test]
async fn failed_citation_fetch_only_loses_that_paper() {
	let fake = FakeBackend::new()
		.with_hits(|_, _| Ok(vec![hit("2201.00001", "First"), hit("2201.00002", "Second")]))
		.with_citations(|paper_id| {
			if paper_id == "2201.00001" {
				Err(Error::Provider { message: "rate limited".to_string() })
			} else {
				Ok(vec![CitedPaper {
					id: "2201.00003".to_string(),
					title: "Third".to_string(),
					snippet: String::new(),
				}])
			}
		});
	let (fake, manager) = start(test_config(), fake);
	let papers = completed(&manager, &request("anything", 1, 1, 2, 2)).await;

	assert_eq!(fake.calls(Backend::Citation), 2);
	assert!(ids(&papers).contains(&"2201.00003"));
}

#[tokio::test]
async fn timed_out_call_is_dropped() {
	let mut cfg = test_config();

	cfg.engine.call_timeout_ms = 100;

	let fake = FakeBackend::new().with_latency(|backend, key| {
		if backend == Backend::Search && key.contains("survey") {
			Duration::from_millis(1_000)
		} else {
			Duration::ZERO
		}
	});
	let (_, manager) = start(cfg, fake);
	let papers = completed(&manager, &request("protein folding", 0, 2, 2, 0)).await;

	assert_eq!(papers.len(), 2);
	assert!(papers.iter().all(|paper| paper.query == "protein folding methods"));
}

#[tokio::test]
async fn search_stage_with_every_call_timing_out_fails_the_job() {
	let mut cfg = test_config();

	cfg.engine.call_timeout_ms = 50;

	let fake = FakeBackend::new().with_latency(|backend, _| {
		if backend == Backend::Search { Duration::from_millis(1_000) } else { Duration::ZERO }
	});
	let (fake, manager) = start(cfg, fake);

	match run(&manager, &request("protein folding", 1, 2, 2, 2)).await {
		JobResult::Failed { error } => {
			assert!(error.contains("search failed at layer 0"), "error was {error}");
			assert!(error.contains("Timed out: call exceeded 50 ms"), "error was {error}");
		},
		other => panic!("Expected a failed job, got {other:?}."),
	}

	assert_eq!(fake.calls(Backend::RelevanceOracle), 0);
	assert_eq!(fake.calls(Backend::Citation), 0);
}

#[tokio::test]
async fn empty_oracle_output_searches_the_topic() {
	let fake = FakeBackend::new().with_queries(|_, _| Ok(Vec::new()));
	let (fake, manager) = start(test_config(), fake);

	completed(&manager, &request("quantum error correction", 0, 3, 2, 0)).await;

	assert_eq!(fake.keys(Backend::Search), vec!["quantum error correction".to_string()]);
}

#[tokio::test]
async fn zero_search_budget_makes_no_calls() {
	let (fake, manager) = start(test_config(), FakeBackend::new());
	let papers = completed(&manager, &request("anything", 2, 0, 10, 20)).await;

	assert!(papers.is_empty());

	for backend in
		[Backend::QueryOracle, Backend::Search, Backend::RelevanceOracle, Backend::Citation]
	{
		assert_eq!(fake.calls(backend), 0);
	}
}

#[tokio::test]
async fn later_layers_use_accepted_papers_as_query_context() {
	let (fake, manager) = start(test_config(), FakeBackend::new());

	completed(&manager, &request("mixture of experts", 1, 2, 1, 1)).await;

	let contexts = fake.keys(Backend::QueryOracle);

	assert_eq!(contexts[0], "mixture of experts");
	assert!(contexts.contains(&"mixture of experts survey paper 0".to_string()));
	assert!(contexts.iter().filter(|key| key.as_str() == "mixture of experts").count() == 2);
}

#[tokio::test]
async fn later_layers_skip_queries_already_searched() {
	let (fake, manager) = start(test_config(), FakeBackend::new());

	completed(&manager, &request("mixture of experts", 1, 2, 1, 1)).await;

	let searched = fake.keys(Backend::Search);
	let unique: HashSet<_> = searched.iter().map(|key| key.to_lowercase()).collect();

	assert_eq!(unique.len(), searched.len(), "searched {searched:?}");
	let first_layer: HashSet<_> = searched.iter().take(2).map(String::as_str).collect();

	assert_eq!(
		first_layer,
		HashSet::from(["mixture of experts survey", "mixture of experts methods"])
	);
	assert!(searched.len() > 2, "searched {searched:?}");
}

#[tokio::test]
async fn repeated_oracle_output_leaves_only_cited_candidates() {
	let fake = FakeBackend::new()
		.with_queries(|_, _| Ok(vec!["Sparse Routing".to_string()]))
		.with_hits(|_, _| Ok(vec![hit("2101.03961", "Switch Transformers")]))
		.with_citations(|_| {
			Ok(vec![CitedPaper {
				id: "1701.06538".to_string(),
				title: "Outrageously Large Neural Networks".to_string(),
				snippet: String::new(),
			}])
		});
	let (fake, manager) = start(test_config(), fake);
	let papers = completed(&manager, &request("mixture of experts", 1, 2, 1, 1)).await;

	assert_eq!(fake.keys(Backend::Search), vec!["Sparse Routing".to_string()]);
	assert_eq!(ids(&papers), vec!["2101.03961", "1701.06538"]);
}
