use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use ridepool_auth::config::AuthConfig;
use ridepool_auth::infra::accounts::HttpAccountPort;
use ridepool_auth::infra::audit::ChannelAuditLog;
use ridepool_auth::infra::delivery::WebhookMessageSender;
use ridepool_auth::router::build_router;
use ridepool_auth::state::AppState;
use ridepool_auth::usecase::risk::RiskMonitor;
use ridepool_core::config::Config;
use ridepool_core::tracing::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info,ridepool_auth=debug");

    let config = AuthConfig::from_env().context("invalid auth configuration")?;

    let redis_cfg = deadpool_redis::Config::from_url(&config.redis_url);
    let redis = redis_cfg
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .context("failed to create Redis pool")?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .context("failed to build HTTP client")?;

    let (audit, _audit_writer) = ChannelAuditLog::spawn();

    let config = Arc::new(config);
    let mut state = AppState {
        redis,
        accounts: HttpAccountPort::new(http.clone(), &config.accounts_url),
        messages: WebhookMessageSender::new(http, config.delivery_url.clone()),
        config,
        audit,
        risk: RiskMonitor::disabled(),
    };
    let (risk, _risk_worker) =
        RiskMonitor::spawn(state.risk_scorer(), state.config.risk_queue_capacity);
    state.risk = risk;

    let _sweeper = state
        .session_manager()
        .spawn_sweeper(Duration::from_secs(state.config.session_sweep_interval_secs.max(1)));

    let addr = format!("0.0.0.0:{}", state.config.auth_port);
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("auth service listening on {addr}");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;
    Ok(())
}
