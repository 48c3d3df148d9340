//! Ctrl+C coordination. Archiving loops watch a child token and stop at the
//! next page boundary, so the committed cursor always matches the archive.

use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;

static GLOBAL_SHUTDOWN: OnceLock<ShutdownController> = OnceLock::new();

#[derive(Clone)]
pub struct ShutdownController {
    token: CancellationToken,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Trigger shutdown, notifying all waiting tasks.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A token cancelled together with this controller, for one archiving run.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Set once at startup.
pub fn set_global(controller: ShutdownController) {
    let _ = GLOBAL_SHUTDOWN.set(controller);
}

/// The global controller, or a never-triggered one if unset.
pub fn global() -> ShutdownController {
    GLOBAL_SHUTDOWN
        .get()
        .cloned()
        .unwrap_or_else(ShutdownController::new)
}
