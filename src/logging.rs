//! Console logging setup.
//!
//! Logs go to stderr so command output on stdout stays clean.
//!
//! Set `RUST_LOG` to control the level (default `info`):
//! - `RUST_LOG=debug` shows every issued and applied fetch
//! - `RUST_LOG=net_curfew=trace` for everything from this crate

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber.
///
/// Calling it again, or after something else installed a subscriber, is not an error.
pub fn init_logging() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_line_number(true)
        .compact();

    let init_result = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .try_init();

    if let Err(e) = init_result {
        if e.to_string().contains("already been set") {
            return Ok(());
        }
        return Err(e.into());
    }

    tracing::debug!("Logging initialized");
    Ok(())
}
