use anyhow::Context;
use etl::destination::Destination;
use etl::destination::memory::MemoryDestination;
use etl::pipeline::{Pipeline, RunSummary};
use etl_config::shared::{BatchConfig, DestinationConfig, TargetConfig};
use etl_destinations::bigquery::{BigQueryDestination, install_crypto_provider_for_bigquery};
use etl_telemetry::usage::{UsageReport, spawn_usage_report};
use secrecy::ExposeSecret;
use tokio::io::BufReader;
use tracing::{debug, info, warn};

/// Environment variable pointing to the key file used when the config names no credential.
const GOOGLE_APPLICATION_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Starts the target with the provided configuration.
///
/// Builds the configured destination and loads every message of stdin into it. The checkpoint
/// is written to stdout once the input is exhausted and every row has been flushed.
pub async fn start_target_with_config(target_config: TargetConfig) -> anyhow::Result<()> {
    info!("starting target");

    log_config(&target_config);

    if target_config.disable_collection {
        debug!("usage collection disabled");
    } else {
        // Detached, the pipeline never waits for the report.
        spawn_usage_report(UsageReport::new(
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
        ));
    }

    // Static dispatch per destination, like the pipeline itself.
    let summary = match &target_config.destination {
        DestinationConfig::Memory => {
            let destination = MemoryDestination::new();
            run_pipeline(&target_config, destination).await?
        }
        DestinationConfig::BigQuery {
            service_account_key_path,
            service_account_key,
        } => {
            install_crypto_provider_for_bigquery();

            let project_id = target_config.project_id.clone();
            let destination = match (service_account_key_path, service_account_key) {
                (Some(key_path), _) => {
                    BigQueryDestination::new_with_key_path(project_id, key_path).await?
                }
                (None, Some(key)) => {
                    BigQueryDestination::new_with_key(project_id, key.expose_secret()).await?
                }
                (None, None) => {
                    let key_path = std::env::var(GOOGLE_APPLICATION_CREDENTIALS).with_context(
                        || {
                            format!(
                                "no BigQuery credentials configured and {GOOGLE_APPLICATION_CREDENTIALS} is not set"
                            )
                        },
                    )?;
                    BigQueryDestination::new_with_key_path(project_id, &key_path).await?
                }
            };

            run_pipeline(&target_config, destination).await?
        }
    };

    if !summary.rejected_rows.is_empty() {
        warn!(
            rows_rejected = summary.rejected_rows.len(),
            "some rows were rejected by the destination"
        );
    }

    info!("target completed");

    Ok(())
}

/// Runs a pipeline over stdin, writing the checkpoint to stdout.
async fn run_pipeline<D>(target_config: &TargetConfig, destination: D) -> anyhow::Result<RunSummary>
where
    D: Destination + Clone,
{
    let pipeline = Pipeline::new(target_config, destination);

    let input = BufReader::new(tokio::io::stdin());
    let mut output = tokio::io::stdout();
    let summary = pipeline.run(input, &mut output).await?;

    Ok(summary)
}

fn log_config(config: &TargetConfig) {
    debug!(
        project_id = config.project_id,
        dataset_id = config.dataset_id,
        table_id = config.table_id,
        disable_collection = config.disable_collection,
        "target config"
    );
    log_destination_config(&config.destination);
    log_batch_config(&config.batch);
}

fn log_destination_config(config: &DestinationConfig) {
    match config {
        DestinationConfig::Memory => {
            debug!("using memory destination config");
        }
        DestinationConfig::BigQuery {
            service_account_key_path,
            service_account_key,
        } => {
            debug!(
                service_account_key_path = ?service_account_key_path,
                inline_key = service_account_key.is_some(),
                "using bigquery destination config"
            );
        }
    }
}

fn log_batch_config(config: &BatchConfig) {
    debug!(max_size = config.max_size, "batch config");
}
