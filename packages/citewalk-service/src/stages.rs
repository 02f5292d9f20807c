//! The three I/O stages of a layer. Each stage reads job state and returns its output; the layer
//! controller alone folds that output back into the job.

pub mod expansion;
pub mod query_search;
pub mod selection;

use tokio_util::sync::CancellationToken;

use crate::{Budget, Error, Providers, Result, pool::PoolShare};
use citewalk_config::Config;

/// Everything a stage needs to run its calls for one layer.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
	pub cfg: &'a Config,
	pub providers: &'a Providers,
	pub pool: &'a PoolShare,
	pub cancel: &'a CancellationToken,
	pub topic: &'a str,
	pub budget: &'a Budget,
	pub layer: u32,
}

/// Folds the joined results of a fan-out.
///
/// Failed calls are logged and dropped. The stage fails only when calls were made and none of
/// them succeeded. Results gathered after cancellation are discarded.
pub(crate) fn settle<T>(
	ctx: &StageContext<'_>,
	stage: &'static str,
	results: Vec<Result<T>>,
) -> Result<Vec<T>> {
	if ctx.cancel.is_cancelled() {
		return Err(Error::Cancelled);
	}

	let attempted = results.len();
	let mut succeeded = Vec::with_capacity(attempted);
	let mut last_error = None;

	for result in results {
		match result {
			Ok(value) => succeeded.push(value),
			Err(Error::Cancelled) => return Err(Error::Cancelled),
			Err(err) => {
				tracing::warn!(stage, layer = ctx.layer, error = %err, "Dropping failed call.");

				last_error = Some(err);
			},
		}
	}

	if attempted > 0 && succeeded.is_empty() {
		let cause = last_error.map(|err| err.to_string()).unwrap_or_default();

		tracing::error!(
			stage,
			layer = ctx.layer,
			attempted,
			cause = %cause,
			"Every call in the stage failed."
		);

		return Err(Error::Internal {
			message: format!("{stage} failed at layer {}: {cause}", ctx.layer),
		});
	}

	Ok(succeeded)
}
