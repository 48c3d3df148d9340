//! Error handling for Telegram API operations.
//!
//! Remote calls report a [`RemoteError`] so the sync engine can tell flood
//! waits and permission failures apart from everything else. Other layers
//! use `anyhow` with the context helpers below.

use anyhow::{Context, Result};
use grammers_mtsender::InvocationError;

/// Failure of a single remote call.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Telegram asked us to slow down. Never retried here.
    #[error("rate limited by Telegram, retry after {seconds}s")]
    RateLimited { seconds: u32 },

    /// The account lacks the rights for this request (e.g. not an admin).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RemoteError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RemoteError::RateLimited { .. })
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, RemoteError::PermissionDenied(_))
    }

    /// Classify a grammers invocation failure, attaching `what` as context
    /// when it is neither a flood wait nor a permission problem.
    pub fn from_invocation(err: InvocationError, what: impl FnOnce() -> String) -> Self {
        if let InvocationError::Rpc(rpc) = &err {
            if rpc.code == 420 || rpc.name.starts_with("FLOOD_WAIT") {
                return RemoteError::RateLimited {
                    seconds: rpc.value.unwrap_or(0),
                };
            }
            if rpc.code == 403 || PERMISSION_ERRORS.contains(&rpc.name.as_str()) {
                return RemoteError::PermissionDenied(rpc.name.clone());
            }
        }
        RemoteError::Other(anyhow::Error::new(err).context(what()))
    }
}

/// RPC errors that mean "you may not look at this", whatever their code.
const PERMISSION_ERRORS: &[&str] = &[
    "CHAT_ADMIN_REQUIRED",
    "CHANNEL_PRIVATE",
    "CHAT_FORBIDDEN",
    "USER_PRIVACY_RESTRICTED",
    "CHANNEL_PUBLIC_GROUP_NA",
];

/// Extension trait to add Telegram-specific context to errors.
pub trait TgErrorContext<T> {
    /// Add context for authorization check.
    fn context_auth_check(self) -> Result<T>;

    /// Add context for opening the archive database.
    fn context_store(self, path: &str) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> TgErrorContext<T>
    for std::result::Result<T, E>
{
    fn context_auth_check(self) -> Result<T> {
        self.context("Failed to check authorization status")
    }

    fn context_store(self, path: &str) -> Result<T> {
        self.with_context(|| format!("Failed to open archive database at {}", path))
    }
}
