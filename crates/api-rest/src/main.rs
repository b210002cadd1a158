//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the LIMS REST API on its own.
//!
//! ## Intended use
//! Useful for development and debugging. The workspace's main `lims-run` binary serves the
//! same router after loading a `.env` file.

use api_rest::{build_state, router, RestConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the LIMS REST API server
///
/// # Environment Variables
/// - `LIMS_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `LIMS_REPORT_DIR`: Directory rendered reports are written to (default: "reports")
/// - `LIMS_LAB_NAME` and `LIMS_ENABLE_*`: core configuration
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("lims_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = RestConfig::from_env()?;
    std::fs::create_dir_all(&cfg.report_dir)?;
    tracing::info!(
        "-- Starting {} LIMS REST API on {}",
        cfg.core.lab_name(),
        cfg.addr
    );

    let app = router(build_state(&cfg));

    let listener = tokio::net::TcpListener::bind(&cfg.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
