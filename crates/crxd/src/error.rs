//! CLI error types.

use crxd_channel::ChannelError;
use crxd_client::ClientError;
use crxd_config::ConfigError;
use crxd_manifest::ManifestError;
use crxd_pipeline::{BuildError, StepError};
use crxd_watch::WatchError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Channel(#[from] ChannelError),

    #[error("{0}")]
    Watch(#[from] WatchError),

    #[error("{0}")]
    Manifest(#[from] ManifestError),

    #[error("{0}")]
    Build(#[from] BuildError),

    #[error("{0}")]
    Step(#[from] StepError),

    #[error("{0}")]
    Client(#[from] ClientError),
}
