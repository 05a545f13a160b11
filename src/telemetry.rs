//! Tracing and metrics initialization.

use std::net::SocketAddr;
use std::path::Path;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::{LoggingSettings, MetricsSettings};
use crate::error::{ObserverError, Result};

/// Initialize the global tracing subscriber.
///
/// Returns the appender guard when logging to a file; drop it only at
/// process exit or buffered lines are lost.
///
/// `RUST_LOG` overrides the configured level.
pub fn init_tracing(settings: &LoggingSettings) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.clone()));
    let json = settings.format.eq_ignore_ascii_case("json");

    if let Some(path) = &settings.file_path {
        let path = Path::new(path);
        let directory = path.parent().unwrap_or_else(|| Path::new("."));
        let file_name = path.file_name().map_or_else(
            || "anchor-observer.log".into(),
            |name| name.to_string_lossy().into_owned(),
        );

        let appender = tracing_appender::rolling::never(directory, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);

        if json {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(writer)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
        }
        Some(guard)
    } else {
        if json {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        } else {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
        None
    }
}

/// Install the Prometheus exporter when metrics are enabled.
///
/// # Errors
///
/// Returns an error if the listen address is malformed or the exporter
/// cannot bind.
pub fn init_metrics(settings: &MetricsSettings) -> Result<()> {
    if !settings.enabled {
        return Ok(());
    }

    let addr: SocketAddr = settings
        .socket_addr()
        .parse()
        .map_err(|e| ObserverError::InvalidConfig(format!("metrics address: {e}")))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| ObserverError::Initialization(format!("metrics exporter: {e}")))?;

    tracing::info!(%addr, "metrics exporter listening");
    Ok(())
}
