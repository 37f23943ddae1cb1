use std::path::PathBuf;

/// Error kinds the orchestrator and startup code branch on.
///
/// Everything else travels as `anyhow::Error` with context attached.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("session not created: {0}")]
    SessionNotCreated(String),

    #[error("created sample city file at {path}; edit it and run again")]
    ConfigMissing { path: PathBuf },

    #[error("no valid cities in {path}")]
    NoCities { path: PathBuf },

    #[error("invalid city file {path}: {reason}")]
    InvalidConfig { path: PathBuf, reason: String },

    #[error("invalid value for {name}: {value:?}")]
    InvalidSetting { name: String, value: String },
}
