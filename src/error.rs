//! Error types for tunnel agent supervision
//!
//! All errors carried by a shared start attempt must be handed to every
//! concurrent waiter, so the error type is `Clone`.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Maximum number of characters of agent output carried in an error message.
pub const MAX_ERROR_LEN: usize = 10_000;

/// Errors produced while supervising or invoking the tunnel agent
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The agent reported that its listening address is occupied
    #[error("tunnel agent address already in use: {0}")]
    AddressInUse(String),

    /// The agent wrote to standard error, or exited before becoming ready
    #[error("tunnel agent error: {0}")]
    Process(String),

    /// Failed to set the credential via the one-shot authtoken command
    #[error("cant set authtoken")]
    AuthToken,

    /// The agent binary could not be spawned at all
    #[error("failed to spawn tunnel agent at {0:?}: {1}")]
    Spawn(PathBuf, #[source] Arc<std::io::Error>),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Truncate agent output to at most [`MAX_ERROR_LEN`] characters without
/// splitting a code point.
pub(crate) fn truncate_output(text: &str) -> String {
    if text.chars().count() <= MAX_ERROR_LEN {
        text.to_string()
    } else {
        text.chars().take(MAX_ERROR_LEN).collect()
    }
}
