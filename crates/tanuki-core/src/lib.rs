pub mod error;
pub mod jobs;
pub mod settings;

pub use error::SettingsError;
pub use jobs::JobRunner;
pub use settings::{Settings, SettingsChange};

use anyhow::Result;

/// Initialize the core application
pub fn init() -> Result<()> {
    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Tanuki core initialized");
    Ok(())
}
