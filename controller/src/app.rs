use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{
    adapters::{KasaPlug, SwitchBotClient, Telemetry},
    control_loop::ControlLoop,
    ports::SystemClock,
    settings,
};

fn init_tracing(debug: bool) {
    let fallback = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

pub async fn run() -> anyhow::Result<()> {
    let config = settings::load().context("failed to load configuration")?;
    init_tracing(config.debug);

    let timezone = settings::timezone(&config)?;
    let sensor = SwitchBotClient::new(&config.sensor, config.request_timeout())
        .context("failed to build sensor client")?;
    let actuator = KasaPlug::new(&config.actuator, config.request_timeout());
    let telemetry = Telemetry::from_config(&config)
        .await
        .context("failed to set up telemetry")?;
    let telemetry_kind = telemetry.kind();

    let mut control = ControlLoop::new(
        &config,
        sensor,
        actuator,
        telemetry,
        SystemClock::new(timezone),
    );

    info!(
        version = env!("CARGO_PKG_VERSION"),
        profile = if config.presence.is_some() { "presence" } else { "schedule-only" },
        telemetry = telemetry_kind,
        poll_secs = config.poll_interval_secs,
        presence_checks = control.presence_checks_per_cycle(),
        "heatloop starting"
    );

    tokio::select! {
        _ = control.run() => {}
        _ = shutdown_signal() => info!("shutdown requested, stopping control loop"),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!("failed to listen for SIGTERM: {err}");
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
