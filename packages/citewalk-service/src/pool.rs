//! Outbound call slots.
//!
//! One process-wide semaphore bounds every call the service makes. Each job additionally holds a
//! [`PoolShare`] whose own semaphore caps how many of those slots the job may occupy at once.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};
use citewalk_config::Engine;

#[derive(Debug, Clone)]
pub struct ConcurrencyPool {
	global: Arc<Semaphore>,
	max_concurrency: usize,
	default_concurrency: usize,
	call_timeout: Duration,
}
impl ConcurrencyPool {
	pub fn new(cfg: &Engine) -> Self {
		let max_concurrency = cfg.max_concurrency.max(1) as usize;

		Self {
			global: Arc::new(Semaphore::new(max_concurrency)),
			max_concurrency,
			default_concurrency: (cfg.default_concurrency.max(1) as usize).min(max_concurrency),
			call_timeout: Duration::from_millis(cfg.call_timeout_ms),
		}
	}

	/// Zero selects the default share; anything else is clamped to the process maximum.
	pub fn share_size(&self, threads_num: u32) -> usize {
		match threads_num {
			0 => self.default_concurrency,
			n => (n as usize).min(self.max_concurrency),
		}
	}

	pub fn share(&self, threads_num: u32) -> PoolShare {
		let limit = self.share_size(threads_num);

		PoolShare {
			global: self.global.clone(),
			local: Arc::new(Semaphore::new(limit)),
			call_timeout: self.call_timeout,
		}
	}

	/// Slots currently free across the whole process.
	pub fn available(&self) -> usize {
		self.global.available_permits()
	}
}

#[derive(Debug, Clone)]
pub struct PoolShare {
	global: Arc<Semaphore>,
	local: Arc<Semaphore>,
	call_timeout: Duration,
}
impl PoolShare {
	/// Runs one outbound call inside a job slot and a process slot, under the call timeout.
	///
	/// `call` is not polled until both slots are held. Cancellation is observed while waiting for
	/// either slot and once more right before dispatch; a call already running is left to finish.
	pub async fn call<T, F>(&self, cancel: &CancellationToken, call: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		let _local = acquire(&self.local, cancel).await?;
		let _global = acquire(&self.global, cancel).await?;

		if cancel.is_cancelled() {
			return Err(Error::Cancelled);
		}

		match tokio::time::timeout(self.call_timeout, call).await {
			Ok(result) => result,
			Err(_) => Err(Error::Timeout {
				message: format!("call exceeded {} ms.", self.call_timeout.as_millis()),
			}),
		}
	}
}

async fn acquire<'a>(
	semaphore: &'a Semaphore,
	cancel: &CancellationToken,
) -> Result<SemaphorePermit<'a>> {
	tokio::select! {
		biased;
		_ = cancel.cancelled() => Err(Error::Cancelled),
		permit = semaphore.acquire() => permit.map_err(|_| Error::Internal {
			message: "Concurrency pool is closed.".to_string(),
		}),
	}
}
