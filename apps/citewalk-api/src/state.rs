use citewalk_config::Config;
use citewalk_service::{JobManager, Providers};

#[derive(Clone)]
pub struct AppState {
	pub manager: JobManager,
}
impl AppState {
	pub fn new(config: Config) -> Self {
		Self { manager: JobManager::new(config) }
	}

	pub fn with_providers(config: Config, providers: Providers) -> Self {
		Self { manager: JobManager::with_providers(config, providers) }
	}
}
