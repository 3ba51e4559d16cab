//! Configuration for the restaurant-search backend-for-frontend.
//!
//! Config is loaded once at startup from a TOML file and validated before
//! the server opens any ports. Invalid configs are rejected with a clear
//! error rather than silently falling back to defaults. Secrets (JWT
//! signing key, provider API keys) are never embedded in the TOML file —
//! only the *name* of the environment variable holding them is configured,
//! resolved at the point of use.
//!
//! # Example
//! ```toml
//! [gateway]
//! client_port = 8080
//! admin_port = 8081
//! frontend_origins = ["https://app.example.com"]
//!
//! [jwt]
//! secret_env = "JWT_SECRET"
//!
//! [features]
//! enable_ai_features = true
//! openai_api_key_env = "OPENAI_API_KEY"
//! ```

use std::{collections::HashSet, path::Path, path::PathBuf, sync::Arc, sync::RwLock};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::llm::LlmPurpose;

/// Deployment environment. Staging is treated identically to production for
/// every security-relevant validation gate — only local
/// development gets the relaxed defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn is_production_like(self) -> bool {
        matches!(self, Self::Staging | Self::Production)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default = "defaults::client_port")]
    pub client_port: u16,
    #[serde(default = "defaults::admin_port")]
    pub admin_port: u16,
    #[serde(default)]
    pub log_level: Option<String>,
    /// Requests per minute per client IP on the search endpoints (default: 100).
    #[serde(default = "defaults::http_rate_limit_rpm")]
    pub rate_limit_rpm: u32,
    /// Subscribe attempts per minute per socket (default: 10).
    #[serde(default = "defaults::ws_subscribe_rpm")]
    pub ws_subscribe_rpm: u32,
    /// Allowed CORS origins. A literal `"*"` is rejected in staging/production.
    #[serde(default)]
    pub frontend_origins: Vec<String>,
    #[serde(default)]
    pub admin_token_env: Option<String>,
    /// Sliding-window size for provider health tracking (default: 10).
    ///
    /// The LLM and Places provider stages each track their last
    /// `health_window` call outcomes. Once a provider's error rate over that
    /// window exceeds `health_error_threshold`, the pipeline fails fast with
    /// a provider-unavailable error instead of issuing the call. Set to 0 to
    /// disable health-based skipping entirely.
    #[serde(default = "defaults::health_window")]
    pub health_window: usize,
    /// Error-rate threshold above which a provider is considered unhealthy
    /// (default: 0.7 = 70%). A provider needs at least 3 samples in the
    /// window before it can be flagged unhealthy.
    #[serde(default = "defaults::health_error_threshold")]
    pub health_error_threshold: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JwtConfig {
    /// Name of the environment variable holding the HS256 signing secret.
    #[serde(default = "defaults::jwt_secret_env")]
    pub secret_env: String,
}

impl JwtConfig {
    pub fn secret(&self) -> Option<String> {
        std::env::var(&self.secret_env).ok()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WsConfig {
    /// Whether a WS connection requires a valid ticket to upgrade (default: true).
    #[serde(default = "defaults::ws_require_auth")]
    pub require_auth: bool,
    /// Env var naming the Redis connection string for the ticket store.
    /// Required when `require_auth` is true in staging/production — the
    /// in-memory default store does not survive a process restart, which
    /// is unacceptable once real users depend on it.
    #[serde(default)]
    pub redis_url_env: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeatureConfig {
    #[serde(default)]
    pub enable_ai_features: bool,
    #[serde(default)]
    pub enable_google_search: bool,
    #[serde(default)]
    pub openai_api_key_env: Option<String>,
    #[serde(default)]
    pub google_api_key_env: Option<String>,
}

/// Per-purpose LLM call configuration, after override resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmStageConfig {
    pub model: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct RawLlmStageOverride {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct RawLlmConfig {
    #[serde(default = "defaults::llm_default_model")]
    default_model: String,
    #[serde(default = "defaults::llm_default_timeout_ms")]
    default_timeout_ms: u64,
    #[serde(default)]
    gate: RawLlmStageOverride,
    #[serde(default)]
    intent: RawLlmStageOverride,
    #[serde(default)]
    base_filters: RawLlmStageOverride,
    #[serde(default)]
    post_constraints: RawLlmStageOverride,
    #[serde(default)]
    route_mapper: RawLlmStageOverride,
    #[serde(default)]
    assistant: RawLlmStageOverride,
}

impl Default for RawLlmStageOverride {
    fn default() -> Self {
        Self { model: None, timeout_ms: None }
    }
}

/// Resolved per-purpose LLM configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub default_model: String,
    pub default_timeout_ms: u64,
    pub gate: LlmStageConfig,
    pub intent: LlmStageConfig,
    pub base_filters: LlmStageConfig,
    pub post_constraints: LlmStageConfig,
    pub route_mapper: LlmStageConfig,
    pub assistant: LlmStageConfig,
}

impl LlmConfig {
    fn from_raw(raw: RawLlmConfig) -> Self {
        let resolve = |over: RawLlmStageOverride| LlmStageConfig {
            model: over.model.unwrap_or_else(|| raw.default_model.clone()),
            timeout_ms: over.timeout_ms.unwrap_or(raw.default_timeout_ms),
        };
        Self {
            default_model: raw.default_model.clone(),
            default_timeout_ms: raw.default_timeout_ms,
            gate: resolve(raw.gate.clone()),
            intent: resolve(raw.intent.clone()),
            base_filters: resolve(raw.base_filters.clone()),
            post_constraints: resolve(raw.post_constraints.clone()),
            route_mapper: resolve(raw.route_mapper.clone()),
            assistant: resolve(raw.assistant.clone()),
        }
    }

    pub fn for_purpose(&self, purpose: LlmPurpose) -> &LlmStageConfig {
        match purpose {
            LlmPurpose::Gate => &self.gate,
            LlmPurpose::Intent => &self.intent,
            LlmPurpose::BaseFilters => &self.base_filters,
            LlmPurpose::PostConstraints => &self.post_constraints,
            LlmPurpose::RouteMapper => &self.route_mapper,
            LlmPurpose::Assistant => &self.assistant,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GoogleMapsConfig {
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "defaults::google_maps_timeout_ms")]
    pub timeout_ms: u64,
    /// Last-resort region-code fallback once no user location, region
    /// candidate, locale suffix, or session default resolves one.
    #[serde(default)]
    pub default_region_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    #[serde(default)]
    environment: Environment,
    gateway: GatewayConfig,
    #[serde(default)]
    jwt: JwtConfig,
    #[serde(default)]
    ws: WsConfig,
    #[serde(default)]
    features: FeatureConfig,
    #[serde(default)]
    llm: RawLlmConfig,
    #[serde(default)]
    google_maps: GoogleMapsConfig,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self { secret_env: defaults::jwt_secret_env() }
    }
}
impl Default for WsConfig {
    fn default() -> Self {
        Self { require_auth: defaults::ws_require_auth(), redis_url_env: None }
    }
}
impl Default for FeatureConfig {
    fn default() -> Self {
        Self { enable_ai_features: false, enable_google_search: false, openai_api_key_env: None, google_api_key_env: None }
    }
}
impl Default for RawLlmConfig {
    fn default() -> Self {
        Self {
            default_model: defaults::llm_default_model(),
            default_timeout_ms: defaults::llm_default_timeout_ms(),
            gate: RawLlmStageOverride::default(),
            intent: RawLlmStageOverride::default(),
            base_filters: RawLlmStageOverride::default(),
            post_constraints: RawLlmStageOverride::default(),
            route_mapper: RawLlmStageOverride::default(),
            assistant: RawLlmStageOverride::default(),
        }
    }
}
impl Default for GoogleMapsConfig {
    fn default() -> Self {
        Self { api_key_env: None, timeout_ms: defaults::google_maps_timeout_ms(), default_region_code: None }
    }
}

/// Top-level resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub gateway: GatewayConfig,
    pub jwt: JwtConfig,
    pub ws: WsConfig,
    pub features: FeatureConfig,
    pub llm: LlmConfig,
    pub google_maps: GoogleMapsConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let raw: RawConfig = toml::from_str(&content).context("parsing config TOML")?;
        let config = Self::from_raw(raw);
        config.validate()?;
        Ok(config)
    }

    fn from_raw(raw: RawConfig) -> Self {
        Self {
            environment: raw.environment,
            gateway: raw.gateway,
            jwt: raw.jwt,
            ws: raw.ws,
            features: raw.features,
            llm: LlmConfig::from_raw(raw.llm),
            google_maps: raw.google_maps,
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        let prod_like = self.environment.is_production_like();

        if prod_like {
            let secret = self.jwt.secret();
            anyhow::ensure!(
                secret.as_deref().map(str::len).unwrap_or(0) >= 32,
                "JWT_SECRET (via `{}`) must be set and at least 32 characters in {:?}",
                self.jwt.secret_env,
                self.environment
            );

            anyhow::ensure!(
                !self.gateway.frontend_origins.iter().any(|o| o == "*"),
                "frontend_origins must not contain a wildcard in {:?}",
                self.environment
            );

            if self.ws.require_auth {
                anyhow::ensure!(
                    self.ws.redis_url_env.is_some(),
                    "ws.redis_url_env must be set when ws.require_auth is true in {:?}",
                    self.environment
                );
            }
        }

        if self.features.enable_ai_features {
            anyhow::ensure!(
                self.features.openai_api_key_env.is_some(),
                "features.enable_ai_features requires features.openai_api_key_env"
            );
        }
        if self.features.enable_google_search {
            anyhow::ensure!(
                self.features.google_api_key_env.is_some() || self.google_maps.api_key_env.is_some(),
                "features.enable_google_search requires google_maps.api_key_env"
            );
        }

        let seen: HashSet<&str> = self.gateway.frontend_origins.iter().map(String::as_str).collect();
        anyhow::ensure!(
            seen.len() == self.gateway.frontend_origins.len(),
            "gateway.frontend_origins contains duplicate entries"
        );

        Ok(())
    }

    /// Build a minimal config suitable for unit tests — no file I/O, no
    /// environment variable dependency.
    #[cfg(test)]
    pub fn default_for_tests() -> Self {
        Self::from_raw(RawConfig {
            environment: Environment::Development,
            gateway: GatewayConfig {
                client_port: defaults::client_port(),
                admin_port: defaults::admin_port(),
                log_level: None,
                rate_limit_rpm: defaults::http_rate_limit_rpm(),
                ws_subscribe_rpm: defaults::ws_subscribe_rpm(),
                frontend_origins: vec!["http://localhost:3000".to_string()],
                admin_token_env: None,
                health_window: defaults::health_window(),
                health_error_threshold: defaults::health_error_threshold(),
            },
            jwt: JwtConfig::default(),
            ws: WsConfig::default(),
            features: FeatureConfig::default(),
            llm: RawLlmConfig::default(),
            google_maps: GoogleMapsConfig::default(),
        })
    }
}

/// Hot-swappable live config snapshot: the lock is held only for the
/// duration of the `Arc::clone`, never across an `await`.
pub struct ConfigHandle {
    inner: RwLock<Arc<Config>>,
    path: PathBuf,
}

impl ConfigHandle {
    pub fn new(config: Arc<Config>, path: PathBuf) -> Self {
        Self { inner: RwLock::new(config), path }
    }

    pub fn current(&self) -> Arc<Config> {
        self.inner.read().expect("config lock poisoned").clone()
    }

    fn replace(&self, new: Arc<Config>) {
        *self.inner.write().expect("config lock poisoned") = new;
    }
}

/// Background task: polls the config file every 5 seconds and hot-reloads
/// on change. Parse/validation failures are logged and ignored — the
/// running config is left unchanged. Security-relevant secrets (JWT,
/// provider keys) are re-resolved from the environment on every reload,
/// never cached from the previous snapshot.
///
/// `on_reload` runs after the handle is swapped, with the new config, so
/// callers that cache derived state (e.g. the assistant's per-purpose
/// model/timeout) can rebuild it. Generic over the callback rather than
/// taking `Arc<AppState>` directly to keep this module free of a
/// dependency on application state.
pub async fn spawn_config_watcher<F, Fut>(handle: Arc<ConfigHandle>, on_reload: F)
where
    F: Fn(Arc<Config>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let path = handle.path.clone();
    let mut last_mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();

    let mut interval = tokio::time::interval(std::time::Duration::from_secs(5));
    interval.tick().await;

    loop {
        interval.tick().await;

        let mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
        if mtime == last_mtime {
            continue;
        }

        match Config::load(&path) {
            Ok(new_cfg) => {
                let new_cfg = Arc::new(new_cfg);
                handle.replace(Arc::clone(&new_cfg));
                info!(path = %path.display(), "config hot-reloaded");
                on_reload(new_cfg).await;
                last_mtime = mtime;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config reload failed — keeping previous config");
            }
        }
    }
}

mod defaults {
    pub fn client_port() -> u16 {
        8080
    }
    pub fn admin_port() -> u16 {
        8081
    }
    pub fn http_rate_limit_rpm() -> u32 {
        100
    }
    pub fn ws_subscribe_rpm() -> u32 {
        10
    }
    pub fn jwt_secret_env() -> String {
        "JWT_SECRET".to_string()
    }
    pub fn ws_require_auth() -> bool {
        true
    }
    pub fn llm_default_model() -> String {
        "gpt-4o-mini".to_string()
    }
    pub fn llm_default_timeout_ms() -> u64 {
        8_000
    }
    pub fn google_maps_timeout_ms() -> u64 {
        8_000
    }
    pub fn health_window() -> usize {
        10
    }
    pub fn health_error_threshold() -> f64 {
        0.7
    }
}
