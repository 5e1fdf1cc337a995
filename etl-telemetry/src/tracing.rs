use etl_config::Environment;
use serde_json::{Map, Value};
use std::io::{Error, Write};
use std::sync::OnceLock;
use std::{
    backtrace::{Backtrace, BacktraceStatus},
    panic::PanicHookInfo,
    sync::Once,
};
use thiserror::Error;
use tracing::field::display;
use tracing::subscriber::{SetGlobalDefaultError, set_global_default};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::{LogTracer, log_tracer::SetLoggerError};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, FmtSubscriber, Registry, fmt, layer::SubscriberExt};

/// JSON field name for the Google Cloud project in logs.
const PROJECT_KEY_IN_LOG: &str = "project_id";
/// JSON field name for the destination table in logs.
const TABLE_KEY_IN_LOG: &str = "destination_table";

/// Errors that can occur during tracing initialization.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to init log tracer: {0}")]
    InitLogTracer(#[from] SetLoggerError),

    #[error("failed to set global default subscriber: {0}")]
    SetGlobalDefault(#[from] SetGlobalDefaultError),

    #[error("an io error occurred: {0}")]
    Io(#[from] Error),
}

/// Log flusher handle for ensuring logs are written before shutdown.
///
/// Production mode returns a [`WorkerGuard`] that must be kept alive until the process exits,
/// dropping it flushes the buffered log lines.
#[must_use]
pub enum LogFlusher {
    Flusher(WorkerGuard),
    NullFlusher,
}

/// Fields added at the top level of every JSON log entry.
#[derive(Debug, Clone, Default)]
pub struct TopLevelFields {
    pub project_id: Option<String>,
    pub destination_table: Option<String>,
}

impl TopLevelFields {
    fn into_map(self) -> Map<String, Value> {
        let mut map = Map::new();
        if let Some(project_id) = self.project_id {
            map.insert(PROJECT_KEY_IN_LOG.to_owned(), Value::String(project_id));
        }
        if let Some(destination_table) = self.destination_table {
            map.insert(TABLE_KEY_IN_LOG.to_owned(), Value::String(destination_table));
        }

        map
    }
}

static INIT_TEST_TRACING: Once = Once::new();

/// Initializes tracing for tests.
///
/// Call once at the beginning of tests. Set `ENABLE_TRACING=1` to view tracing output:
/// ```bash
/// ENABLE_TRACING=1 cargo test test_name
/// ```
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var("ENABLE_TRACING").is_ok() {
            // Tests always log human readable output, whatever `APP_ENVIRONMENT` says.
            let _log_flusher = init_tracing_for_environment(
                Environment::Dev,
                "test",
                TopLevelFields::default(),
            )
            .expect("Failed to initialize tracing for tests");
        }
    });
}

static TOP_LEVEL_FIELDS: OnceLock<Map<String, Value>> = OnceLock::new();

fn top_level_fields() -> Option<&'static Map<String, Value>> {
    TOP_LEVEL_FIELDS.get().filter(|fields| !fields.is_empty())
}

/// Writer wrapper that injects the top level fields into JSON log entries.
///
/// Fields already present in an entry are left untouched.
struct FieldInjectingWriter<W> {
    inner: W,
}

impl<W> FieldInjectingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W> Write for FieldInjectingWriter<W>
where
    W: Write,
{
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Some(output) = inject_fields(buf) {
            // Report the original length, the caller does not know about the added fields.
            self.inner.write_all(output.as_bytes())?;
            return Ok(buf.len());
        }

        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Returns `buf` with the top level fields added, or `None` if nothing was added.
fn inject_fields(buf: &[u8]) -> Option<String> {
    let fields = top_level_fields()?;
    let json_str = std::str::from_utf8(buf).ok()?;
    let Ok(Value::Object(mut map)) = serde_json::from_str::<Value>(json_str) else {
        return None;
    };

    let mut modified = false;
    for (key, value) in fields {
        if !map.contains_key(key) {
            map.insert(key.clone(), value.clone());
            modified = true;
        }
    }
    if !modified {
        return None;
    }

    let modified = serde_json::to_string(&map).ok()?;
    if json_str.ends_with('\n') {
        Some(format!("{modified}\n"))
    } else {
        Some(modified)
    }
}

/// Initializes tracing for the application.
///
/// Logs always go to stderr, stdout carries the checkpoint only. Development environments
/// get pretty console output, production-like environments JSON lines carrying
/// `top_level_fields`.
pub fn init_tracing(
    app_name: &str,
    top_level_fields: TopLevelFields,
) -> Result<LogFlusher, TracingError> {
    let environment = Environment::load()?;
    init_tracing_for_environment(environment, app_name, top_level_fields)
}

fn init_tracing_for_environment(
    environment: Environment,
    app_name: &str,
    top_level_fields: TopLevelFields,
) -> Result<LogFlusher, TracingError> {
    let _ = TOP_LEVEL_FIELDS.set(top_level_fields.into_map());

    // Initialize the log tracer to capture logs from the `log` crate
    // and send them to the `tracing` subscriber. This captures logs
    // from libraries that use the `log` crate.
    LogTracer::init()?;

    // Set the default log level to `info` if not specified in the `RUST_LOG` environment variable.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_flusher = if environment.is_prod() {
        configure_prod_tracing(filter)?
    } else {
        configure_dev_tracing(filter)?
    };

    set_tracing_panic_hook();

    tracing::debug!(app_name, %environment, "tracing initialized");

    Ok(log_flusher)
}

/// Configures JSON logging to stderr with top level field injection.
fn configure_prod_tracing(filter: EnvFilter) -> Result<LogFlusher, TracingError> {
    // Writing happens on a dedicated thread, so slow stderr consumers do not stall loading.
    let (stderr_writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    let format = fmt::format()
        .with_level(true)
        // ANSI colors are only for terminal output
        .with_ansi(false)
        // Disable target to reduce noise in the logs
        .with_target(false);

    let subscriber = Registry::default().with(filter).with(
        fmt::layer()
            .event_format(format)
            .with_writer(move || FieldInjectingWriter::new(stderr_writer.make_writer()))
            .json()
            .with_current_span(true)
            .with_span_list(true),
    );

    set_global_default(subscriber)?;

    Ok(LogFlusher::Flusher(guard))
}

/// Configures pretty console logging to stderr.
fn configure_dev_tracing(filter: EnvFilter) -> Result<LogFlusher, TracingError> {
    let format = fmt::format()
        .with_level(true)
        .with_ansi(true)
        .pretty()
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    let subscriber = FmtSubscriber::builder()
        .event_format(format)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    set_global_default(subscriber)?;

    Ok(LogFlusher::NullFlusher)
}

/// Replaces the default panic hook so that panics are captured by the tracing system too.
fn set_tracing_panic_hook() {
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        panic_hook(info);
        prev_hook(info);
    }));
}

fn panic_hook(panic_info: &PanicHookInfo) {
    let backtrace = Backtrace::capture();
    let (backtrace, note) = match backtrace.status() {
        BacktraceStatus::Captured => (Some(backtrace), None),
        BacktraceStatus::Disabled => (
            None,
            Some("run with RUST_BACKTRACE=1 to display backtraces"),
        ),
        BacktraceStatus::Unsupported => {
            (None, Some("backtraces are not supported on this platform"))
        }
        _ => (None, Some("backtrace status is unknown")),
    };

    let payload = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    };

    let location = panic_info.location().map(|location| location.to_string());

    tracing::error!(
        panic.payload = payload,
        payload.location = location,
        panic.backtrace = backtrace.map(display),
        panic.note = note,
        "a panic occurred",
    );
}
