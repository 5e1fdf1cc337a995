use crate::config::load_target_config;
use crate::core::start_target_with_config;
use clap::Parser;
use etl_config::Environment;
use etl_config::shared::{SentryConfig, TargetConfig};
use etl_telemetry::tracing::{TopLevelFields, init_tracing};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

mod config;
mod core;

/// Loads singer messages read from stdin into a BigQuery table.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file (JSON or YAML). Defaults to the `configuration` directory.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let target_config = load_target_config(args.config.as_deref())?;

    let top_level_fields = TopLevelFields {
        project_id: Some(target_config.project_id.clone()),
        destination_table: Some(format!(
            "{}.{}",
            target_config.dataset_id, target_config.table_id
        )),
    };
    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"), top_level_fields)?;

    // Initialize Sentry before the async runtime starts
    let _sentry_guard = init_sentry(target_config.sentry.as_ref())?;

    // Messages are handled one at a time, a single thread is enough.
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(async_main(target_config))?;

    Ok(())
}

async fn async_main(target_config: TargetConfig) -> anyhow::Result<()> {
    if let Err(err) = start_target_with_config(target_config).await {
        let source: &(dyn std::error::Error + 'static) = err.as_ref();
        sentry::capture_error(source);
        error!("an error occurred in the target: {err:#}");

        return Err(err);
    }

    Ok(())
}

/// Initializes Sentry when a DSN is configured.
///
/// Errors and panics are tagged with the "target-bigquery" service.
fn init_sentry(
    sentry_config: Option<&SentryConfig>,
) -> anyhow::Result<Option<sentry::ClientInitGuard>> {
    let Some(sentry_config) = sentry_config else {
        info!("sentry not configured for target, skipping initialization");

        return Ok(None);
    };

    info!("initializing sentry with supplied dsn");

    let environment = Environment::load()?;
    let guard = sentry::init(sentry::ClientOptions {
        dsn: Some(sentry_config.dsn.parse()?),
        environment: Some(environment.to_string().into()),
        release: Some(env!("CARGO_PKG_VERSION").into()),
        integrations: vec![Arc::new(
            sentry::integrations::panic::PanicIntegration::new(),
        )],
        ..Default::default()
    });

    sentry::configure_scope(|scope| {
        scope.set_tag("service", env!("CARGO_BIN_NAME"));
    });

    Ok(Some(guard))
}
