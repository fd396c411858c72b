//! Hostkeeper Agent - host health monitor with auto-remediation
//!
//! - Checks services, containers, remote hosts and resource usage every
//!   few minutes, aligned to the wall clock
//! - Restarts failed services and containers
//! - Tells the operator about transitions, not about every cycle
//! - Optional control API for on-demand checks and start/stop/restart

use anyhow::{Context, Result};
use hostkeeper_agent::backends::Backends;
use hostkeeper_agent::config::{MonitorConfig, SinkKind};
use hostkeeper_agent::execution::CommandExecutor;
use hostkeeper_agent::http::{build_router, AppState};
use hostkeeper_agent::notifier::mqtt::MqttSink;
use hostkeeper_agent::notifier::telegram::TelegramSink;
use hostkeeper_agent::notifier::{LogSink, NotificationSink, Notifier};
use hostkeeper_agent::scheduler::Scheduler;
use hostkeeper_agent::state::StateStore;
use hostkeeper_agent::{logging, Monitor};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

fn build_sink(config: &MonitorConfig) -> Result<Arc<dyn NotificationSink>> {
    let sink: Arc<dyn NotificationSink> = match config.notify.sink {
        SinkKind::Telegram => {
            let telegram = &config.notify.telegram;
            let token = telegram
                .token
                .as_deref()
                .context("HOSTKEEPER_TELEGRAM_TOKEN is not set")?;
            Arc::new(TelegramSink::new(
                &telegram.api_base,
                token,
                Duration::from_secs(telegram.timeout_secs),
            )?)
        }
        SinkKind::Mqtt => {
            let mqtt = &config.notify.mqtt;
            Arc::new(MqttSink::connect(
                &mqtt.broker_host,
                mqtt.broker_port,
                &mqtt.client_id,
                &mqtt.topic,
            ))
        }
        SinkKind::Log => Arc::new(LogSink),
    };
    Ok(sink)
}

/// Ctrl-C, or SIGTERM from the service manager
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn serve_api(bind: String, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind control API on {}", bind))?;
    info!("Control API listening on {}", bind);
    axum::serve(listener, build_router(state))
        .await
        .context("Control API server failed")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = MonitorConfig::load()
        .await
        .context("Failed to load configuration")?;

    let _log_guard = logging::init(&config.logging).context("Failed to initialize logging")?;
    info!("🤖 Hostkeeper Agent starting...");
    config.log_summary();

    let executor = CommandExecutor::new(
        Duration::from_secs(config.probes.command_timeout_secs),
        config.commands.use_sudo,
    );
    let backends = Backends::system(executor);

    let sink = build_sink(&config)?;
    info!("Notifications go to the {} sink", sink.name());
    let notifier = Notifier::new(
        sink,
        config.operator_id(),
        config.notify.repeat_alerts,
        Duration::from_secs(config.probes.cpu_resample_delay_secs),
    );

    let store = Arc::new(StateStore::new(&config.state.path));
    let monitor = Arc::new(Monitor::new(
        config.entities(),
        backends,
        config.probe_settings(),
        config.remediation_settings(),
        notifier,
        store,
    ));

    if config.api.enabled {
        let state = AppState {
            monitor: monitor.clone(),
            api_key: std::env::var("HOSTKEEPER_API_KEY").ok().map(Arc::from),
        };
        let bind = config.api.bind.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_api(bind, state).await {
                error!("{:#}", e);
            }
        });
    }

    let scheduler = Scheduler::new(monitor, config.interval());
    scheduler.run_until(shutdown_signal()).await;

    info!("Hostkeeper Agent stopped");
    Ok(())
}
