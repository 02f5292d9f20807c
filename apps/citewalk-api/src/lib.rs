pub mod routes;
pub mod state;

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;
use time::OffsetDateTime;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;
use citewalk_service::JobManager;

pub const VERSION: &str = concat!(
	env!("CARGO_PKG_VERSION"),
	"-",
	env!("VERGEN_GIT_SHA"),
	"-",
	env!("VERGEN_CARGO_TARGET_TRIPLE"),
);

#[derive(Debug, Parser)]
#[command(version = VERSION, rename_all = "kebab")]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = citewalk_config::load(&args.config)?;

	init_tracing(&config)?;

	let http_addr: SocketAddr = config.service.http_bind.parse()?;
	let state = AppState::new(config);

	state.manager.probe().await;

	tokio::spawn(sweep(state.manager.clone()));

	let listener = TcpListener::bind(http_addr).await?;

	tracing::info!(%http_addr, version = VERSION, "HTTP server listening.");

	axum::serve(listener, routes::router(state)).await?;

	Ok(())
}

/// Purges expired jobs and re-probes backends every `jobs.sweep_interval_seconds`.
pub async fn sweep(manager: JobManager) {
	let interval = Duration::from_secs(manager.config().jobs.sweep_interval_seconds.max(1));

	loop {
		tokio::time::sleep(interval).await;

		let purged = manager.purge_expired(OffsetDateTime::now_utc());
		let report = manager.probe().await;

		tracing::debug!(purged, ready = report.ready(), "Retention sweep finished.");
	}
}

fn init_tracing(config: &citewalk_config::Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	Ok(())
}
