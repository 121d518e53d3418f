//! Application context shared by all route handlers.
//!
//! [`AppContext`] is cloned into every request via Axum state; everything
//! inside is either immutable or internally synchronised behind an `Arc`.

use std::sync::Arc;
use std::time::Duration;

use mf_av::{MediaConverter, ToolRegistry};
use mf_core::config::Config;
use mf_core::events::EventBus;
use mf_jobs::{BatchRunner, JobStore, ResultPackager};

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub store: Arc<JobStore>,
    pub runner: BatchRunner,
    pub packager: Arc<ResultPackager>,
    pub event_bus: Arc<EventBus>,
    pub tools: Arc<ToolRegistry>,
}

impl AppContext {
    /// Wire the job services together around the given converter.
    pub fn new(config: Config, converter: Arc<dyn MediaConverter>, tools: ToolRegistry) -> Self {
        let store = Arc::new(JobStore::new(Duration::from_secs(config.jobs.retention_secs)));
        let event_bus = Arc::new(EventBus::default());
        let runner = BatchRunner::new(
            Arc::clone(&store),
            converter,
            Arc::clone(&event_bus),
            config.uploads.clone(),
            &config.jobs,
        );
        let packager = Arc::new(ResultPackager::new(Arc::clone(&store)));

        Self {
            config: Arc::new(config),
            store,
            runner,
            packager,
            event_bus,
            tools: Arc::new(tools),
        }
    }
}
