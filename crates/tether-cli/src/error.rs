//! Shell errors.

use thiserror::Error;

/// Failures that end the shell.
#[derive(Debug, Error)]
pub enum CliError {
    /// Terminal I/O failed.
    #[error("terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Credential storage failed.
    #[error(transparent)]
    Store(#[from] tether_core::StoreError),
}
