//! The job manager.
//!
//! Every job is owned by one spawned task that holds the only `watch::Sender` for it. Readers get
//! immutable snapshots through the matching receiver; nothing outside the owning task mutates a
//! job.

use std::{
	collections::HashMap,
	sync::{Arc, RwLock},
	time::Instant,
};

use serde::Serialize;
use time::{Duration, OffsetDateTime};
use tokio::sync::{Semaphore, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
	BackendReport, Budget, CandidatePaper, Error, PaperView, Providers, Result, SearchRequest,
	health,
	layer::{LayerController, Outcome, Phase, Progress},
	pool::ConcurrencyPool,
};
use citewalk_config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
	Queued,
	Running,
	Completed,
	Failed,
	Cancelled,
}
impl JobStatus {
	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Queued => "queued",
			Self::Running => "running",
			Self::Completed => "completed",
			Self::Failed => "failed",
			Self::Cancelled => "cancelled",
		}
	}

	fn can_become(self, next: Self) -> bool {
		match self {
			Self::Queued => next != Self::Queued,
			Self::Running => next.is_terminal(),
			_ => false,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchJob {
	pub id: String,
	pub status: JobStatus,
	pub query: String,
	pub budget: Budget,
	pub layer: u32,
	pub phase: Phase,
	pub accepted: usize,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339")]
	pub updated_at: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339::option")]
	pub started_at: Option<OffsetDateTime>,
	#[serde(with = "time::serde::rfc3339::option")]
	pub completed_at: Option<OffsetDateTime>,
	/// Set when the job completes, and holds the partial aggregate when it is cancelled.
	pub result: Option<Vec<CandidatePaper>>,
	pub error: Option<String>,
}
impl SearchJob {
	fn new(id: String, query: String, budget: Budget, now: OffsetDateTime) -> Self {
		Self {
			id,
			status: JobStatus::Queued,
			query,
			budget,
			layer: 0,
			phase: Phase::Init,
			accepted: 0,
			created_at: now,
			updated_at: now,
			started_at: None,
			completed_at: None,
			result: None,
			error: None,
		}
	}

	/// Applies a status change if it moves forward. Terminal statuses never change.
	fn transition(&mut self, next: JobStatus, now: OffsetDateTime) -> bool {
		if !self.status.can_become(next) {
			return false;
		}

		self.status = next;
		self.updated_at = now;

		if next == JobStatus::Running {
			self.started_at = Some(now);
		}
		if next.is_terminal() {
			self.completed_at = Some(now);
		}

		true
	}

	pub fn duration_seconds(&self) -> Option<f64> {
		let started_at = self.started_at?;
		let completed_at = self.completed_at?;

		Some((completed_at - started_at).as_seconds_f64())
	}
}

/// The caller-facing status of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
	pub job_id: String,
	pub status: JobStatus,
	pub query: String,
	pub budget: Budget,
	pub layer: u32,
	pub phase: Phase,
	pub accepted: usize,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339")]
	pub updated_at: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339::option")]
	pub started_at: Option<OffsetDateTime>,
	#[serde(with = "time::serde::rfc3339::option")]
	pub completed_at: Option<OffsetDateTime>,
	pub duration_seconds: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Vec<PaperView>>,
}
impl JobView {
	fn new(job: &SearchJob, include_result: bool) -> Self {
		let result = include_result
			.then(|| job.result.as_ref().map(|papers| papers.iter().map(PaperView::from).collect()))
			.flatten();

		Self {
			job_id: job.id.clone(),
			status: job.status,
			query: job.query.clone(),
			budget: job.budget,
			layer: job.layer,
			phase: job.phase,
			accepted: job.accepted,
			created_at: job.created_at,
			updated_at: job.updated_at,
			started_at: job.started_at,
			completed_at: job.completed_at,
			duration_seconds: job.duration_seconds(),
			error: job.error.clone(),
			result,
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
	/// The job has not reached a terminal status yet. Not an error.
	Pending { status: JobStatus },
	Completed(Vec<CandidatePaper>),
	Failed { error: String },
	Cancelled { partial: Vec<CandidatePaper> },
}
impl JobResult {
	fn from_job(job: &SearchJob) -> Self {
		match job.status {
			JobStatus::Queued | JobStatus::Running => Self::Pending { status: job.status },
			JobStatus::Completed => Self::Completed(job.result.clone().unwrap_or_default()),
			JobStatus::Failed => Self::Failed { error: job.error.clone().unwrap_or_default() },
			JobStatus::Cancelled => Self::Cancelled { partial: job.result.clone().unwrap_or_default() },
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobStats {
	pub max_pending: u32,
	pub max_running: u32,
	pub job_ttl_seconds: u64,
	pub queued: usize,
	pub running: usize,
	pub total: usize,
}

#[derive(Clone)]
pub struct JobManager {
	inner: Arc<Inner>,
}

struct Inner {
	cfg: Config,
	providers: Providers,
	pool: ConcurrencyPool,
	run_slots: Arc<Semaphore>,
	jobs: RwLock<HashMap<String, JobHandle>>,
	/// `None` until the first probe.
	backends: RwLock<Option<BackendReport>>,
}

struct JobHandle {
	snapshot: watch::Receiver<Arc<SearchJob>>,
	cancel: CancellationToken,
}

impl JobManager {
	pub fn new(cfg: Config) -> Self {
		Self::with_providers(cfg, Providers::default())
	}

	pub fn with_providers(cfg: Config, providers: Providers) -> Self {
		let pool = ConcurrencyPool::new(&cfg.engine);
		let run_slots = Arc::new(Semaphore::new(cfg.jobs.max_running.max(1) as usize));

		Self {
			inner: Arc::new(Inner {
				cfg,
				providers,
				pool,
				run_slots,
				jobs: RwLock::new(HashMap::new()),
				backends: RwLock::new(None),
			}),
		}
	}

	pub fn config(&self) -> &Config {
		&self.inner.cfg
	}

	pub fn pool(&self) -> &ConcurrencyPool {
		&self.inner.pool
	}

	/// Validates and enqueues a request, returning the new job id immediately.
	///
	/// Must be called inside a Tokio runtime; the job runs on its own spawned task.
	pub fn submit(&self, request: &SearchRequest) -> Result<String> {
		let (query, budget) = request.validate()?;

		if let Some(report) = self.backend_report()
			&& !report.ready()
		{
			return Err(Error::BackendUnavailable { message: report.failures().join("; ") });
		}

		let id = Uuid::new_v4().simple().to_string();
		let job = SearchJob::new(id.clone(), query, budget, OffsetDateTime::now_utc());
		let (tx, rx) = watch::channel(Arc::new(job.clone()));
		let cancel = CancellationToken::new();

		{
			let mut jobs = self.inner.jobs.write().unwrap_or_else(|err| err.into_inner());
			let pending =
				jobs.values().filter(|handle| !handle.snapshot.borrow().status.is_terminal()).count();
			let max_pending = self.inner.cfg.jobs.max_pending as usize;

			if pending >= max_pending {
				return Err(Error::QueueFull {
					message: format!("{pending} jobs are pending; the limit is {max_pending}."),
				});
			}

			jobs.insert(id.clone(), JobHandle { snapshot: rx, cancel: cancel.clone() });
		}

		tracing::info!(
			job_id = %id,
			query = %job.query,
			expand_layers = budget.expand_layers,
			search_queries = budget.search_queries,
			search_papers = budget.search_papers,
			expand_papers = budget.expand_papers,
			threads_num = budget.threads_num,
			"Search job submitted."
		);

		tokio::spawn(run_job(self.inner.clone(), job, tx, cancel));

		Ok(id)
	}

	/// Submits and waits for the terminal outcome. A failed job is returned as an error.
	pub async fn submit_sync(&self, request: &SearchRequest) -> Result<JobResult> {
		let id = self.submit(request)?;

		match self.wait(&id).await? {
			JobResult::Failed { error } => Err(Error::Internal { message: error }),
			result => Ok(result),
		}
	}

	/// Resolves once the job is terminal.
	pub async fn wait(&self, job_id: &str) -> Result<JobResult> {
		let mut snapshot = self.handle(job_id, |handle| handle.snapshot.clone())?;
		let job = snapshot
			.wait_for(|job| job.status.is_terminal())
			.await
			.map(|job| Arc::clone(&*job))
			.map_err(|_| Error::Internal {
				message: format!("job {job_id} stopped without finishing."),
			})?;

		Ok(JobResult::from_job(&job))
	}

	pub fn get_status(&self, job_id: &str) -> Result<JobView> {
		self.view(job_id, false)
	}

	/// Like [`Self::get_status`], also carrying the result list once there is one.
	pub fn view(&self, job_id: &str, include_result: bool) -> Result<JobView> {
		let job = self.snapshot(job_id)?;

		Ok(JobView::new(&job, include_result))
	}

	pub fn snapshot(&self, job_id: &str) -> Result<Arc<SearchJob>> {
		self.handle(job_id, |handle| Arc::clone(&*handle.snapshot.borrow()))
	}

	pub fn get_result(&self, job_id: &str) -> Result<JobResult> {
		let job = self.snapshot(job_id)?;

		Ok(JobResult::from_job(&job))
	}

	/// Requests cooperative cancellation. Cancelling a terminal job is a successful no-op.
	pub fn cancel(&self, job_id: &str) -> Result<JobView> {
		let (job, cancel) = self.handle(job_id, |handle| {
			(Arc::clone(&*handle.snapshot.borrow()), handle.cancel.clone())
		})?;

		if !job.status.is_terminal() {
			cancel.cancel();

			tracing::info!(
				job_id,
				status = job.status.as_str(),
				"Search job cancellation requested."
			);
		}

		Ok(JobView::new(&job, false))
	}

	/// Checks every backend and records the result for admission.
	pub async fn probe(&self) -> BackendReport {
		let report = health::probe(&self.inner.cfg, &self.inner.providers).await;

		*self.inner.backends.write().unwrap_or_else(|err| err.into_inner()) = Some(report.clone());

		report
	}

	pub fn backend_report(&self) -> Option<BackendReport> {
		self.inner.backends.read().unwrap_or_else(|err| err.into_inner()).clone()
	}

	pub fn stats(&self) -> JobStats {
		let jobs = self.inner.jobs.read().unwrap_or_else(|err| err.into_inner());
		let mut stats = JobStats {
			max_pending: self.inner.cfg.jobs.max_pending,
			max_running: self.inner.cfg.jobs.max_running,
			job_ttl_seconds: self.inner.cfg.jobs.job_ttl_seconds,
			queued: 0,
			running: 0,
			total: jobs.len(),
		};

		for handle in jobs.values() {
			match handle.snapshot.borrow().status {
				JobStatus::Queued => stats.queued += 1,
				JobStatus::Running => stats.running += 1,
				_ => {},
			}
		}

		stats
	}

	/// Drops terminal jobs last updated more than `jobs.job_ttl_seconds` before `now`. Returns the
	/// number of jobs removed.
	pub fn purge_expired(&self, now: OffsetDateTime) -> usize {
		let ttl_seconds = self.inner.cfg.jobs.job_ttl_seconds;

		if ttl_seconds == 0 {
			return 0;
		}

		let ttl = Duration::seconds(i64::try_from(ttl_seconds).unwrap_or(i64::MAX));
		let Some(cutoff) = now.checked_sub(ttl) else {
			return 0;
		};
		let mut jobs = self.inner.jobs.write().unwrap_or_else(|err| err.into_inner());
		let before = jobs.len();

		jobs.retain(|_, handle| {
			let job = handle.snapshot.borrow();

			!(job.status.is_terminal() && job.updated_at < cutoff)
		});

		let purged = before - jobs.len();

		if purged > 0 {
			tracing::info!(purged, remaining = jobs.len(), "Expired jobs purged.");
		}

		purged
	}

	fn handle<T>(&self, job_id: &str, f: impl FnOnce(&JobHandle) -> T) -> Result<T> {
		let jobs = self.inner.jobs.read().unwrap_or_else(|err| err.into_inner());

		jobs.get(job_id).map(f).ok_or_else(|| Error::job_not_found(job_id))
	}
}

async fn run_job(
	inner: Arc<Inner>,
	mut job: SearchJob,
	tx: watch::Sender<Arc<SearchJob>>,
	cancel: CancellationToken,
) {
	let slot = tokio::select! {
		biased;
		_ = cancel.cancelled() => None,
		permit = inner.run_slots.clone().acquire_owned() => permit.ok(),
	};
	let Some(_slot) = slot else {
		job.result = Some(Vec::new());

		finish(&mut job, &tx, JobStatus::Cancelled, None);

		return;
	};
	let clock = Instant::now();
	let share = inner.pool.share(job.budget.threads_num);
	let controller = LayerController::new(
		&inner.cfg,
		&inner.providers,
		share,
		cancel.clone(),
		job.query.clone(),
		job.budget,
	);

	tracing::info!(job_id = %job.id, "Search job started.");

	let outcome = controller
		.run(|progress: Progress| {
			let now = OffsetDateTime::now_utc();

			job.transition(JobStatus::Running, now);

			job.layer = progress.layer;
			job.phase = progress.phase;
			job.accepted = progress.accepted;
			job.updated_at = now;

			tx.send_replace(Arc::new(job.clone()));
		})
		.await;

	match outcome {
		Ok(Outcome::Completed(papers)) => {
			job.accepted = papers.len();
			job.result = Some(papers);

			finish(&mut job, &tx, JobStatus::Completed, None);
		},
		Ok(Outcome::Cancelled(partial)) => {
			job.accepted = partial.len();
			job.result = Some(partial);

			finish(&mut job, &tx, JobStatus::Cancelled, None);
		},
		Err(err) => finish(&mut job, &tx, JobStatus::Failed, Some(err.to_string())),
	}

	tracing::info!(
		job_id = %job.id,
		status = job.status.as_str(),
		layer = job.layer,
		accepted = job.accepted,
		elapsed_ms = clock.elapsed().as_millis() as u64,
		"Search job finished."
	);
}

fn finish(
	job: &mut SearchJob,
	tx: &watch::Sender<Arc<SearchJob>>,
	status: JobStatus,
	error: Option<String>,
) {
	if !job.transition(status, OffsetDateTime::now_utc()) {
		return;
	}

	if let Some(error) = &error {
		tracing::error!(job_id = %job.id, error = %error, "Search job failed.");
	}

	job.error = error;

	tx.send_replace(Arc::new(job.clone()));
}
