//! Anonymous usage report sent once at startup.
//!
//! The report is a single GET request carrying the loader name and version. It runs as a
//! detached task: its outcome is only logged at debug level and nothing waits for it.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

/// Endpoint receiving usage reports.
pub const COLLECTOR_URL: &str = "https://collector.stitchdata.com/i";

/// Upper bound for the whole request, connection included.
const REPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// What is reported about the running loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageReport {
    pub loader: String,
    pub version: String,
}

impl UsageReport {
    pub fn new(loader: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            loader: loader.into(),
            version: version.into(),
        }
    }

    /// Query parameters of the structured event sent to the collector.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("e", "se".to_owned()),
            ("aid", "singer".to_owned()),
            ("se_ca", self.loader.clone()),
            ("se_ac", "open".to_owned()),
            ("se_la", self.version.clone()),
        ]
    }
}

/// Spawns the report on the current runtime without waiting for it.
///
/// Must be called from within a tokio runtime.
pub fn spawn_usage_report(report: UsageReport) -> JoinHandle<()> {
    tokio::spawn(async move { send_usage_report(COLLECTOR_URL, &report).await })
}

/// Sends `report` to `url`. Every failure is logged and discarded.
pub async fn send_usage_report(url: &str, report: &UsageReport) {
    let client = match reqwest::Client::builder().timeout(REPORT_TIMEOUT).build() {
        Ok(client) => client,
        Err(err) => {
            debug!(error = %err, "could not build usage report client");
            return;
        }
    };

    match client.get(url).query(&report.query_params()).send().await {
        Ok(response) => debug!(status = %response.status(), "sent usage report"),
        Err(err) => debug!(error = %err, "failed to send usage report"),
    }
}
