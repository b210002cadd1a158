use api_rest::{RestConfig, build_state, router};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Targets logged at INFO on top of `RUST_LOG`.
const LOG_TARGETS: [&str; 3] = [env!("CARGO_CRATE_NAME"), "lims_core", "api_rest"];

fn log_filter() -> anyhow::Result<EnvFilter> {
    let mut filter = EnvFilter::from_default_env();
    for target in LOG_TARGETS {
        filter = filter.add_directive(format!("{target}=info").parse()?);
    }
    Ok(filter)
}

/// Main entry point for the LIMS application
///
/// Loads `.env`, resolves the configuration once and serves the REST API.
///
/// # Environment Variables
/// - `LIMS_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `LIMS_REPORT_DIR`: Directory for rendered reports (default: "reports")
/// - `LIMS_LAB_NAME`: Lab name printed on reports (default: "LIMS")
/// - `LIMS_ENABLE_SAMPLE_COLLECTION`, `LIMS_ENABLE_SAMPLE_RECEIVE`,
///   `LIMS_ENABLE_VERIFICATION`: initial workflow switches (default: true)
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If configuration, startup or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(log_filter()?)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = RestConfig::from_env()?;
    std::fs::create_dir_all(&cfg.report_dir)?;

    tracing::info!("++ Starting {} LIMS REST on {}", cfg.core.lab_name(), cfg.addr);
    tracing::info!("++ Reports written to {}", cfg.report_dir.display());

    let app = router(build_state(&cfg));
    let listener = tokio::net::TcpListener::bind(&cfg.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_events_pass_the_filter() {
        assert!(LOG_TARGETS.contains(&module_path!()));
        assert!(LOG_TARGETS.contains(&"lims_run"));
    }

    #[test]
    fn filter_names_every_target() {
        let filter = log_filter().expect("filter").to_string();
        for target in LOG_TARGETS {
            assert!(filter.contains(&format!("{target}=info")), "{filter}");
        }
    }
}
