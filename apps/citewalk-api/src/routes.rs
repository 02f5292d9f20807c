use axum::{
	Json, Router,
	extract::{
		Path, Query, State,
		rejection::{JsonRejection, QueryRejection},
	},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::state::AppState;
use citewalk_service::{CandidatePaper, Error, JobResult, JobStatus, PaperView, SearchRequest};

const SERVICE_NAME: &str = "citewalk";

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/", get(index))
		.route("/health", get(health))
		.route("/v1/search", post(search))
		.route("/v1/search_async", post(search_async))
		.route("/v1/jobs/{job_id}", get(job_status).delete(cancel_job))
		.route("/v1/jobs/{job_id}/result", get(job_result))
		.with_state(state)
}

#[derive(Debug, Deserialize)]
struct SearchBody {
	#[serde(flatten)]
	request: SearchRequest,
	/// Turns `/v1/search` into an asynchronous submission.
	#[serde(default, rename = "async", alias = "async_mode", alias = "background")]
	run_async: bool,
}

#[derive(Debug, Deserialize)]
struct StatusParams {
	include_result: Option<String>,
}
impl StatusParams {
	/// Absent means yes; otherwise only `1`, `true` and `yes` enable the result.
	fn include_result(&self) -> bool {
		self.include_result.as_deref().is_none_or(|flag| {
			matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
		})
	}
}

#[derive(Debug, Serialize)]
struct SubmitResponse {
	job_id: String,
	status: JobStatus,
	status_url: String,
	result_url: String,
}
impl SubmitResponse {
	fn new(job_id: String) -> Self {
		Self {
			status_url: format!("/v1/jobs/{job_id}"),
			result_url: format!("/v1/jobs/{job_id}/result"),
			status: JobStatus::Queued,
			job_id,
		}
	}
}

async fn index() -> Json<Value> {
	Json(json!({
		"service": SERVICE_NAME,
		"version": crate::VERSION,
		"status": "running",
		"endpoints": {
			"health": "GET /health",
			"search": "POST /v1/search",
			"search_async": "POST /v1/search_async",
			"job_status": "GET /v1/jobs/{job_id}",
			"job_result": "GET /v1/jobs/{job_id}/result",
			"cancel_job": "DELETE /v1/jobs/{job_id}",
		},
	}))
}

async fn health(State(state): State<AppState>) -> Response {
	let report = state.manager.probe().await;
	let status = if report.ready() { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
	let body = json!({
		"status": if report.ready() { "healthy" } else { "unhealthy" },
		"backends": report,
		"jobs": state.manager.stats(),
	});

	(status, Json(body)).into_response()
}

async fn search(
	State(state): State<AppState>,
	payload: Result<Json<SearchBody>, JsonRejection>,
) -> Result<Response, ApiError> {
	let Json(body) = payload?;

	if body.run_async {
		return submit(&state, &body.request);
	}

	match state.manager.submit_sync(&body.request).await? {
		JobResult::Completed(papers) => Ok(Json(views(&papers)).into_response()),
		JobResult::Cancelled { partial } => Ok(Json(json!({
			"status": JobStatus::Cancelled,
			"cancelled": true,
			"result": views(&partial),
		}))
		.into_response()),
		JobResult::Failed { error } => Err(ApiError::internal(error)),
		JobResult::Pending { status } => {
			Err(ApiError::internal(format!("Search ended while {}.", status.as_str())))
		},
	}
}

async fn search_async(
	State(state): State<AppState>,
	payload: Result<Json<SearchBody>, JsonRejection>,
) -> Result<Response, ApiError> {
	let Json(body) = payload?;

	submit(&state, &body.request)
}

async fn job_status(
	State(state): State<AppState>,
	Path(job_id): Path<String>,
	params: Result<Query<StatusParams>, QueryRejection>,
) -> Result<Response, ApiError> {
	let Query(params) = params?;
	let view = state.manager.view(&job_id, params.include_result())?;

	Ok(Json(view).into_response())
}

async fn job_result(
	State(state): State<AppState>,
	Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
	let response = match state.manager.get_result(&job_id)? {
		JobResult::Completed(papers) => (
			StatusCode::OK,
			Json(json!({
				"job_id": job_id,
				"status": JobStatus::Completed,
				"result": views(&papers),
			})),
		),
		JobResult::Cancelled { partial } => (
			StatusCode::OK,
			Json(json!({
				"job_id": job_id,
				"status": JobStatus::Cancelled,
				"cancelled": true,
				"result": views(&partial),
			})),
		),
		JobResult::Pending { status } => (
			StatusCode::ACCEPTED,
			Json(json!({
				"job_id": job_id,
				"status": status,
				"message": format!("Job is {}.", status.as_str()),
			})),
		),
		JobResult::Failed { error } => return Err(ApiError::internal(error)),
	};

	Ok(response.into_response())
}

async fn cancel_job(
	State(state): State<AppState>,
	Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
	let view = state.manager.cancel(&job_id)?;

	Ok(Json(view).into_response())
}

fn submit(state: &AppState, request: &SearchRequest) -> Result<Response, ApiError> {
	let job_id = state.manager.submit(request)?;

	Ok((StatusCode::ACCEPTED, Json(SubmitResponse::new(job_id))).into_response())
}

fn views(papers: &[CandidatePaper]) -> Vec<PaperView> {
	papers.iter().map(PaperView::from).collect()
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}
impl ApiError {
	fn new(status: StatusCode, error_code: impl Into<String>, message: impl Into<String>) -> Self {
		Self { status, error_code: error_code.into(), message: message.into() }
	}

	fn internal(message: impl Into<String>) -> Self {
		Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", message)
	}
}
impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		match err {
			Error::InvalidRequest { message } =>
				Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message),
			Error::BackendUnavailable { message } =>
				Self::new(StatusCode::SERVICE_UNAVAILABLE, "BACKEND_UNAVAILABLE", message),
			Error::NotFound { message } => Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message),
			Error::QueueFull { message } =>
				Self::new(StatusCode::TOO_MANY_REQUESTS, "QUEUE_FULL", message),
			err @ (Error::Provider { .. }
			| Error::Timeout { .. }
			| Error::Internal { .. }
			| Error::Cancelled) => {
				tracing::error!(error = %err, "Request failed.");

				Self::internal(err.to_string())
			},
		}
	}
}
impl From<JsonRejection> for ApiError {
	fn from(rejection: JsonRejection) -> Self {
		Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", rejection.body_text())
	}
}
impl From<QueryRejection> for ApiError {
	fn from(rejection: QueryRejection) -> Self {
		Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", rejection.body_text())
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}
