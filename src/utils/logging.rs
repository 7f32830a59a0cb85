use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the application.
///
/// Third-party crates stay at `warn`; this crate logs at `default_level`.
/// Output goes to stderr so stdout stays free for piping.
pub fn init(default_level: &str) {
    let lvl = match default_level.to_lowercase().as_str() {
        "error" => "error",
        "warn" | "warning" => "warn",
        "info" => "info",
        "trace" => "trace",
        _ => "debug",
    };

    let filter = EnvFilter::new(format!("warn,{}={lvl}", env!("CARGO_CRATE_NAME")));

    // Use try_init so tests and libraries can call this multiple times without panicking
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Destination for human-readable lines produced while consuming.
///
/// The topology manager only needs something that accepts a formatted string,
/// so tests can swap the console for an in-memory recorder.
pub trait LogSink: Send + Sync {
    fn log(&self, line: &str);
}

/// Writes each line as a `debug` event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, line: &str) {
        debug!("{line}");
    }
}
