//! Structured logging for the launcher and Supervisor.
//!
//! Init-side code writes to stderr directly; between clone and exec there
//! is no place for a logging pipeline.

use tracing_subscriber::EnvFilter;

/// Initializes the tracing subscriber.
///
/// The filter comes from `RUST_LOG` (default `info`); `EUCLID_LOG_JSON=1`
/// switches from human-readable to JSON lines.
pub fn init_observability() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if std::env::var("EUCLID_LOG_JSON").ok().as_deref() == Some("1") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .try_init()?;
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .try_init()?;
    }
    Ok(())
}
