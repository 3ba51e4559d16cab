//! Shared application state, wired once at startup and threaded through
//! both listeners (client port and admin port) via axum's `State` extractor.
//!
//! A live config snapshot behind a lock, plus every long-lived collaborator
//! the handlers need, with no handler ever reaching past this struct into a
//! global.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock as AsyncRwLock;

use crate::api::rate_limit::RateLimiter;
use crate::assistant::AssistantService;
use crate::auth::jwt::JwtCodec;
use crate::auth::ticket::TicketStore;
use crate::config::{Config, ConfigHandle};
use crate::jobs::{AsyncRunner, JobStore};
use crate::llm::LlmClient;
use crate::places::PlacesClient;
use crate::ws::WebSocketManager;

pub struct AppState {
    pub config: Arc<ConfigHandle>,
    pub started_at: Instant,
    pub jwt: JwtCodec,
    pub ticket_store: Arc<dyn TicketStore>,
    pub jobs: Arc<JobStore>,
    pub runner: Arc<AsyncRunner>,
    pub ws: Arc<WebSocketManager>,
    pub llm: Arc<dyn LlmClient>,
    pub places: Arc<dyn PlacesClient>,
    pub assistant: AsyncRwLock<Arc<AssistantService>>,
    pub http_limiter: Arc<RateLimiter<std::net::IpAddr>>,
    pub ws_subscribe_limiter: Arc<RateLimiter<String>>,
}

impl AppState {
    /// Build the long-lived collaborators from an initial config, keeping
    /// them stable across a config hot-reload — only `config`'s inner
    /// snapshot and the assistant's model/timeout change on reload.
    pub fn new(
        config: Arc<Config>,
        config_path: PathBuf,
        jwt: JwtCodec,
        ticket_store: Arc<dyn TicketStore>,
        llm: Arc<dyn LlmClient>,
        places: Arc<dyn PlacesClient>,
    ) -> Self {
        let jobs = Arc::new(JobStore::new());
        let runner = Arc::new(AsyncRunner::new(Arc::clone(&jobs)));
        let ws = Arc::new(WebSocketManager::new(Arc::clone(&jobs)));
        let http_limiter = Arc::new(RateLimiter::new(config.gateway.rate_limit_rpm));
        let ws_subscribe_limiter = Arc::new(RateLimiter::new(config.gateway.ws_subscribe_rpm));
        let assistant = AsyncRwLock::new(Arc::new(AssistantService::new(
            Arc::clone(&llm),
            config.llm.assistant.model.clone(),
            std::time::Duration::from_millis(config.llm.assistant.timeout_ms),
        )));

        Self {
            config: Arc::new(ConfigHandle::new(config, config_path)),
            started_at: Instant::now(),
            jwt,
            ticket_store,
            jobs,
            runner,
            ws,
            llm,
            places,
            assistant,
            http_limiter,
            ws_subscribe_limiter,
        }
    }

    /// Rebuild the assistant service against the freshly reloaded config's
    /// per-purpose model/timeout. Called by the config watcher after a
    /// successful reload.
    pub async fn refresh_assistant(&self, config: &Arc<Config>) {
        let mut guard = self.assistant.write().await;
        *guard = Arc::new(AssistantService::new(
            Arc::clone(&self.llm),
            config.llm.assistant.model.clone(),
            std::time::Duration::from_millis(config.llm.assistant.timeout_ms),
        ));
    }
}
