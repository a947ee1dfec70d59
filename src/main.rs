use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use std::future::Future;
use telemetry_feed::aggregator::{LoadStatus, TelemetryAggregator, TelemetryView};
use telemetry_feed::api_client::BulkFetch;
use telemetry_feed::*;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    tracing::info!(
        agent = %version::user_agent(),
        api = %app_config.backend.base_url,
        stream = %app_config.backend.ws_url,
        "starting"
    );

    let api = Arc::new(api_client::ApiClient::from_config(&app_config.backend)?);
    if !api.health_check().await {
        tracing::warn!(api = %api.base_url(), "backend health check failed; continuing");
    }

    let (stream, driver_handle) = transport::spawn_websocket(
        app_config.backend.ws_url.clone(),
        app_config.stream.reconnect_policy(),
    );
    let aggregator = Arc::new(TelemetryAggregator::new(
        api,
        stream.clone(),
        app_config.history.aggregator_config(),
    ));

    // A failed initial load is recoverable: keep streaming and retry on the summary tick.
    if let Err(e) = aggregator.start().await {
        tracing::warn!(error = %e, "initial load failed; streaming continues");
    }

    run_until_shutdown(
        aggregator.clone(),
        Duration::from_secs(app_config.display.summary_interval_secs),
        shutdown_signal(),
    )
    .await;

    aggregator.stop().await;
    stream.shutdown().await;
    let _ = driver_handle.await;
    Ok(())
}

/// Log a summary on every tick until `shutdown` resolves. The shutdown future is
/// polled across all iterations, so a signal arriving mid-tick is not lost.
/// After a failed load, a refresh runs in the background on the next tick
/// unless one is still in flight.
async fn run_until_shutdown<S: BulkFetch>(
    aggregator: Arc<TelemetryAggregator<S>>,
    every: Duration,
    shutdown: impl Future<Output = ()>,
) {
    let mut summary_tick = tokio::time::interval(every);
    summary_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    tokio::pin!(shutdown);
    let mut retry: Option<tokio::task::JoinHandle<()>> = None;

    loop {
        tokio::select! {
            _ = summary_tick.tick() => {
                let view = aggregator.view();
                let idle = retry.as_ref().is_none_or(|h| h.is_finished());
                if matches!(view.status, LoadStatus::Failed(_)) && idle {
                    let aggregator = aggregator.clone();
                    retry = Some(tokio::spawn(async move {
                        match aggregator.refresh().await {
                            Ok(()) => tracing::info!("telemetry reloaded"),
                            Err(e) => tracing::warn!(
                                error = %e,
                                operation = "refresh",
                                "reload failed; retrying on next tick"
                            ),
                        }
                    }));
                }
                log_summary(&view);
            }
            _ = &mut shutdown => {
                tracing::info!("Received shutdown signal");
                break;
            }
        }
    }

    if let Some(retry) = retry {
        retry.abort();
    }
}

fn log_summary(view: &TelemetryView) {
    let Some(current) = view.current.as_ref() else {
        tracing::info!(
            connected = view.connected,
            loading = view.status.is_loading(),
            "no telemetry yet"
        );
        return;
    };
    let newest_anomaly = view.anomalies.first().map(|a| a.message.as_str());
    tracing::info!(
        connected = view.connected,
        timestamp = %current.timestamp,
        cpu_percent = current.cpu.global_usage,
        memory_percent = current.memory.usage_percent,
        max_temp_c = current.max_temperature(),
        history_len = view.history.len(),
        anomalies_len = view.anomalies.len(),
        newest_anomaly,
        "telemetry"
    );
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
