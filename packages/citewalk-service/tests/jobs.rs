use std::{sync::Arc, time::Duration};

use time::OffsetDateTime;

use citewalk_config::Config;
use citewalk_service::{Error, JobManager, JobResult, JobStatus, Phase, SearchRequest};
use citewalk_testkit::{Backend, FakeBackend, Gate, test_config, wait_until, within};

const PATIENCE: Duration = Duration::from_secs(10);

fn start(cfg: Config, fake: FakeBackend) -> (Arc<FakeBackend>, JobManager) {
	let (fake, providers) = fake.into_providers();

	(fake, JobManager::with_providers(cfg, providers))
}

fn small_request(query: &str) -> SearchRequest {
	SearchRequest {
		query: query.to_string(),
		expand_layers: 1,
		search_queries: 2,
		search_papers: 3,
		expand_papers: 2,
		threads_num: 2,
	}
}

fn rank(status: JobStatus) -> u8 {
	match status {
		JobStatus::Queued => 0,
		JobStatus::Running => 1,
		_ => 2,
	}
}

#[tokio::test]
async fn unknown_job_id_is_not_found() {
	let (_, manager) = start(test_config(), FakeBackend::new());

	assert!(matches!(manager.get_status("unknown-id"), Err(Error::NotFound { .. })));
	assert!(matches!(manager.get_result("unknown-id"), Err(Error::NotFound { .. })));
	assert!(matches!(manager.cancel("unknown-id"), Err(Error::NotFound { .. })));
}

#[tokio::test]
async fn result_is_pending_right_after_submit() {
	let gate = Gate::new();
	let fake = FakeBackend::new().with_gate(gate.clone(), |_, _| true);
	let (_, manager) = start(test_config(), fake);
	let job_id = manager.submit(&small_request("sparse attention")).expect("Submit should succeed.");

	match manager.get_result(&job_id).expect("Job should exist.") {
		JobResult::Pending { status } => assert!(!status.is_terminal()),
		other => panic!("Expected a pending result, got {other:?}."),
	}

	gate.open();

	let result = within(PATIENCE, manager.wait(&job_id))
		.await
		.expect("Job should finish in time.")
		.expect("Job should exist.");

	assert!(matches!(result, JobResult::Completed(_)));
}

#[tokio::test]
async fn same_request_twice_yields_independent_jobs() {
	let (_, manager) = start(test_config(), FakeBackend::new());
	let req = small_request("neural radiance fields");
	let first = manager.submit(&req).expect("First submit should succeed.");
	let second = manager.submit(&req).expect("Second submit should succeed.");

	assert_ne!(first, second);
	assert_eq!(first.len(), 32);

	let first_result = within(PATIENCE, manager.wait(&first)).await.expect("First job should finish.");
	let second_result =
		within(PATIENCE, manager.wait(&second)).await.expect("Second job should finish.");

	match (first_result, second_result) {
		(Ok(JobResult::Completed(a)), Ok(JobResult::Completed(b))) => {
			assert!(!a.is_empty());
			assert_eq!(a, b);
		},
		other => panic!("Expected two completed jobs, got {other:?}."),
	}
}

#[tokio::test]
async fn status_never_regresses() {
	let fake = FakeBackend::new().with_latency(|_, _| Duration::from_millis(5));
	let (_, manager) = start(test_config(), fake);
	let job_id = manager.submit(&small_request("retrieval augmentation")).expect("Submit should succeed.");
	let mut seen = Vec::new();

	loop {
		let view = manager.get_status(&job_id).expect("Job should exist.");

		seen.push(view.status);

		if view.status.is_terminal() {
			break;
		}

		tokio::time::sleep(Duration::from_millis(2)).await;
	}

	assert!(seen.windows(2).all(|pair| rank(pair[0]) <= rank(pair[1])));

	let view = manager.cancel(&job_id).expect("Cancelling a finished job should succeed.");

	assert_eq!(view.status, JobStatus::Completed);

	for _ in 0..3 {
		let view = manager.get_status(&job_id).expect("Job should exist.");

		assert_eq!(view.status, JobStatus::Completed);
		assert_eq!(view.phase, Phase::Done);
		assert!(view.started_at.is_some());
		assert!(view.duration_seconds.is_some());
	}
}

#[tokio::test]
async fn cancel_during_second_layer_returns_partial_results() {
	let gate = Gate::new();
	let fake = FakeBackend::new()
		.with_gate(gate.clone(), |backend, key| backend == Backend::Search && key.contains(" paper "));
	let (fake, manager) = start(test_config(), fake);
	let mut req = small_request("self-supervised learning");

	req.expand_layers = 2;

	let job_id = manager.submit(&req).expect("Submit should succeed.");

	wait_until(PATIENCE, || {
		let view = manager.get_status(&job_id).expect("Job should exist.");

		view.layer == 1 && fake.in_flight() > 0
	})
	.await
	.expect("Job should block in the second layer.");

	manager.cancel(&job_id).expect("Cancel should succeed.");
	gate.open();

	let result = within(PATIENCE, manager.wait(&job_id))
		.await
		.expect("Cancelled job should finish in time.")
		.expect("Job should exist.");

	match result {
		JobResult::Cancelled { partial } => {
			assert_eq!(partial.len(), 6);
			assert!(partial.iter().all(|paper| paper.layer == 0));
		},
		other => panic!("Expected a cancelled job, got {other:?}."),
	}

	assert!(matches!(
		manager.get_result(&job_id).expect("Job should exist."),
		JobResult::Cancelled { .. }
	));
	assert_eq!(manager.get_status(&job_id).expect("Job should exist.").status, JobStatus::Cancelled);
	assert_eq!(fake.calls(Backend::Citation), 2);
}

#[tokio::test]
async fn cancelled_queued_job_never_runs() {
	let mut cfg = test_config();

	cfg.jobs.max_running = 1;

	let gate = Gate::new();
	let fake = FakeBackend::new().with_gate(gate.clone(), |_, _| true);
	let (fake, manager) = start(cfg, fake);
	let running = manager.submit(&small_request("first")).expect("First submit should succeed.");
	let queued = manager.submit(&small_request("second")).expect("Second submit should succeed.");

	wait_until(PATIENCE, || fake.in_flight() > 0).await.expect("First job should start.");

	assert_eq!(manager.get_status(&queued).expect("Job should exist.").status, JobStatus::Queued);

	manager.cancel(&queued).expect("Cancel should succeed.");

	let result = within(PATIENCE, manager.wait(&queued))
		.await
		.expect("Queued job should finish in time.")
		.expect("Job should exist.");

	assert_eq!(result, JobResult::Cancelled { partial: Vec::new() });
	assert!(manager.get_status(&queued).expect("Job should exist.").started_at.is_none());

	gate.open();

	let result = within(PATIENCE, manager.wait(&running))
		.await
		.expect("Running job should finish in time.")
		.expect("Job should exist.");

	assert!(matches!(result, JobResult::Completed(_)));
	assert!(fake.keys(Backend::QueryOracle).iter().all(|key| key != "second"));
}

#[tokio::test]
async fn submissions_beyond_max_pending_are_rejected() {
	let mut cfg = test_config();

	cfg.jobs.max_pending = 1;

	let gate = Gate::new();
	let fake = FakeBackend::new().with_gate(gate.clone(), |_, _| true);
	let (_, manager) = start(cfg, fake);
	let job_id = manager.submit(&small_request("first")).expect("First submit should succeed.");

	assert!(matches!(
		manager.submit(&small_request("second")),
		Err(Error::QueueFull { .. })
	));

	gate.open();
	within(PATIENCE, manager.wait(&job_id))
		.await
		.expect("Job should finish in time.")
		.expect("Job should exist.");

	manager.submit(&small_request("third")).expect("Submit should succeed once the queue drains.");
}

#[tokio::test]
async fn failed_probe_blocks_submissions() {
	let (_, manager) = start(test_config(), FakeBackend::new().unready(Backend::Citation));

	manager.submit(&small_request("before probe")).expect("Submit should succeed before any probe.");

	let report = manager.probe().await;

	assert!(!report.ready());
	assert!(report.query_oracle.ready);
	assert!(!report.citation.ready);

	match manager.submit(&small_request("after probe")) {
		Err(Error::BackendUnavailable { message }) => assert!(message.contains("citation")),
		other => panic!("Expected BackendUnavailable, got {other:?}."),
	}
}

#[tokio::test]
async fn invalid_request_creates_no_job() {
	let (_, manager) = start(test_config(), FakeBackend::new());
	let mut req = small_request("valid topic");

	req.expand_papers = -3;

	assert!(matches!(manager.submit(&req), Err(Error::InvalidRequest { .. })));
	assert!(matches!(manager.submit(&small_request(" ")), Err(Error::InvalidRequest { .. })));
	assert_eq!(manager.stats().total, 0);
}

#[tokio::test]
async fn purge_removes_only_expired_terminal_jobs() {
	let mut cfg = test_config();

	cfg.jobs.job_ttl_seconds = 60;

	let gate = Gate::new();
	let fake = FakeBackend::new()
		.with_gate(gate.clone(), |backend, key| backend == Backend::QueryOracle && key == "blocked");
	let (_, manager) = start(cfg, fake);
	let finished = manager.submit(&small_request("finished")).expect("Submit should succeed.");
	let blocked = manager.submit(&small_request("blocked")).expect("Submit should succeed.");

	within(PATIENCE, manager.wait(&finished))
		.await
		.expect("Job should finish in time.")
		.expect("Job should exist.");

	let now = OffsetDateTime::now_utc();

	assert_eq!(manager.purge_expired(now), 0);
	assert_eq!(manager.purge_expired(now + time::Duration::hours(1)), 1);
	assert!(matches!(manager.get_status(&finished), Err(Error::NotFound { .. })));
	assert!(manager.get_status(&blocked).is_ok());

	gate.open();
}

#[tokio::test]
async fn zero_ttl_keeps_jobs() {
	let mut cfg = test_config();

	cfg.jobs.job_ttl_seconds = 0;

	let (_, manager) = start(cfg, FakeBackend::new());
	let job_id = manager.submit(&small_request("kept")).expect("Submit should succeed.");

	within(PATIENCE, manager.wait(&job_id))
		.await
		.expect("Job should finish in time.")
		.expect("Job should exist.");

	assert_eq!(manager.purge_expired(OffsetDateTime::now_utc() + time::Duration::days(365)), 0);
}

#[tokio::test]
async fn submit_sync_surfaces_terminal_outcome() {
	let (_, manager) = start(test_config(), FakeBackend::new());
	let result = within(PATIENCE, manager.submit_sync(&small_request("sync")))
		.await
		.expect("Sync search should finish in time.");

	assert!(matches!(result, Ok(JobResult::Completed(ref papers)) if !papers.is_empty()));

	let failing = FakeBackend::new()
		.with_scores(|_| Err(Error::Provider { message: "selector offline".to_string() }));
	let (_, manager) = start(test_config(), failing);
	let result = within(PATIENCE, manager.submit_sync(&small_request("sync")))
		.await
		.expect("Sync search should finish in time.");

	match result {
		Err(Error::Internal { message }) => assert!(message.contains("selector offline")),
		other => panic!("Expected an internal error, got {other:?}."),
	}
}

#[tokio::test]
async fn stats_count_queued_and_running_jobs() {
	let mut cfg = test_config();

	cfg.jobs.max_running = 1;

	let gate = Gate::new();
	let fake = FakeBackend::new().with_gate(gate.clone(), |_, _| true);
	let (fake, manager) = start(cfg, fake);
	let first = manager.submit(&small_request("one")).expect("Submit should succeed.");
	let second = manager.submit(&small_request("two")).expect("Submit should succeed.");

	wait_until(PATIENCE, || fake.in_flight() > 0).await.expect("First job should start.");

	let stats = manager.stats();

	assert_eq!((stats.queued, stats.running, stats.total), (1, 1, 2));

	gate.open();

	for job_id in [first, second] {
		within(PATIENCE, manager.wait(&job_id))
			.await
			.expect("Job should finish in time.")
			.expect("Job should exist.");
	}

	let stats = manager.stats();

	assert_eq!((stats.queued, stats.running, stats.total), (0, 0, 2));
}
