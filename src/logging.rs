//! Structured logging setup.
//!
//! Set `RUST_LOG` to control the level (`RUST_LOG=netguard=debug` shows every
//! probed host and every executed enforcement command).

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber. Safe to call more than once.
pub fn init() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .compact();

    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .try_init()
    {
        // Another subsystem or test already installed one
        if e.to_string().contains("already been set") {
            return Ok(());
        }
        return Err(anyhow::anyhow!("Failed to initialize logging: {}", e));
    }

    Ok(())
}
