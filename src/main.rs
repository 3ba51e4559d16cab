use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use tokio::signal;
use tracing::info;

use route2_bff::{auth, config::Config, jobs, llm, places, ws, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::args().nth(1).as_deref() == Some("--healthcheck") {
        return healthcheck().await;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "route2_bff=info,tower_http=warn".into()),
        )
        .init();

    let config_path = std::env::var("ROUTE2_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/etc/route2-bff/config.toml"));

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        client_port = config.gateway.client_port,
        admin_port = config.gateway.admin_port,
        environment = ?config.environment,
        "route2-bff starting"
    );

    let config = Arc::new(config);
    let jwt_secret = config.jwt.secret().unwrap_or_else(|| "dev-only-insecure-secret-0000000000".to_string());
    let jwt = auth::jwt::JwtCodec::new(&jwt_secret);

    let ticket_store: Arc<dyn auth::ticket::TicketStore> = Arc::new(auth::ticket::InMemoryTicketStore::new());

    let llm: Arc<dyn llm::LlmClient> = Arc::new(llm::HttpLlmClient::new(
        std::env::var("LLM_BASE_URL").unwrap_or_else(|_| "https://api.openai.com".to_string()),
        &config
            .features
            .openai_api_key_env
            .as_ref()
            .and_then(|env| std::env::var(env).ok())
            .unwrap_or_default(),
    )?);

    let places: Arc<dyn places::PlacesClient> = Arc::new(places::HttpPlacesClient::new(
        std::env::var("PLACES_BASE_URL").unwrap_or_else(|_| "https://places.googleapis.com".to_string()),
        config
            .google_maps
            .api_key_env
            .as_ref()
            .and_then(|env| std::env::var(env).ok())
            .unwrap_or_default(),
    )?);

    let state = Arc::new(AppState::new(
        Arc::clone(&config),
        config_path.clone(),
        jwt,
        ticket_store,
        llm,
        places,
    ));

    {
        let state = Arc::clone(&state);
        tokio::spawn(config::spawn_config_watcher(Arc::clone(&state.config), move |new_cfg| {
            let state = Arc::clone(&state);
            async move { state.refresh_assistant(&new_cfg).await }
        }));
    }
    jobs::store::spawn_sweeper(Arc::clone(&state.jobs), std::time::Duration::from_secs(60));
    ws::backlog::spawn_sweeper(Arc::clone(state.ws.backlog()), std::time::Duration::from_secs(60));

    let client_addr: SocketAddr = format!("0.0.0.0:{}", config.gateway.client_port).parse()?;
    let admin_addr: SocketAddr = format!("0.0.0.0:{}", config.gateway.admin_port).parse()?;

    info!(%client_addr, "client API listening");
    info!(%admin_addr, "admin API listening");

    let client_listener = tokio::net::TcpListener::bind(client_addr).await?;
    let admin_listener = tokio::net::TcpListener::bind(admin_addr).await?;

    let client_app = route2_bff::build_client_app(Arc::clone(&state));
    let admin_app = route2_bff::build_admin_app(Arc::clone(&state));

    tokio::select! {
        result = axum::serve(client_listener, client_app.into_make_service_with_connect_info::<SocketAddr>()) => {
            result.context("client API server error")?;
        }
        result = axum::serve(admin_listener, admin_app.into_make_service_with_connect_info::<SocketAddr>()) => {
            result.context("admin API server error")?;
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received, draining in-flight jobs");
            state.runner.drain(std::time::Duration::from_secs(10)).await;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Lightweight healthcheck: GET /healthz and exit 0 on 200, 1 otherwise.
/// Invoked via `route2-bff --healthcheck` from a Docker HEALTHCHECK.
async fn healthcheck() -> anyhow::Result<()> {
    let port = std::env::var("ROUTE2_CLIENT_PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(8080);

    let url = format!("http://127.0.0.1:{port}/healthz");
    let resp = reqwest::get(&url).await?;

    if resp.status().is_success() {
        std::process::exit(0);
    } else {
        std::process::exit(1);
    }
}
