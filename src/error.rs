use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::SourceKind;

#[derive(Debug, Error, Diagnostic)]
pub enum MinerError {
    #[error("E-utilities request failed: {0}")]
    TransientNetwork(String),

    #[error("E-utilities returned status {status}: {message}")]
    RegistryStatus { status: u16, message: String },

    #[error("malformed registry response: {0}")]
    MalformedResponse(String),

    #[error("{origin} unavailable: {reason}")]
    SourceUnavailable { origin: SourceKind, reason: String },

    #[error("invalid configuration: {0}")]
    #[diagnostic(help("check st-miner.json and the command-line flags"))]
    Configuration(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("curated catalog for {origin} is unusable: {message}")]
    CuratedData { origin: SourceKind, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to render report: {0}")]
    Report(String),

    #[error("no source produced any records")]
    AllSourcesFailed,
}

impl MinerError {
    /// Collapses any failure below the per-source boundary into `SourceUnavailable`.
    pub fn unavailable(origin: SourceKind, err: MinerError) -> Self {
        let reason = match err {
            MinerError::SourceUnavailable { reason, .. } => reason,
            other => other.to_string(),
        };
        MinerError::SourceUnavailable { origin, reason }
    }
}
