//! Shared state handed to every route handler.

use std::sync::Arc;

use vid2audio_av::{ToolInfo, TranscodeEngine};

use crate::config::Config;
use crate::jobs::JobScheduler;
use crate::notifier::Notifier;

/// Application context shared across handlers via Axum state.
#[derive(Clone)]
pub struct AppContext {
    pub scheduler: Arc<JobScheduler>,
    pub notifier: Arc<Notifier>,
    pub config: Arc<Config>,
    /// Tool availability as discovered at startup.
    pub tools: Arc<Vec<ToolInfo>>,
}

impl AppContext {
    /// Wire a scheduler and notifier around `engine`.
    pub fn new(config: Config, engine: Arc<dyn TranscodeEngine>, tools: Vec<ToolInfo>) -> Self {
        let notifier = Notifier::new(config.queue.observer_buffer);
        let scheduler = JobScheduler::new(
            engine,
            Arc::clone(&notifier),
            config.storage.output_dir.clone(),
            config.queue.retention(),
        );
        Self {
            scheduler,
            notifier,
            config: Arc::new(config),
            tools: Arc::new(tools),
        }
    }
}
