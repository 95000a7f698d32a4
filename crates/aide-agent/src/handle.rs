//! A cloneable handle for stopping a session's agent run from outside.

use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio_util::sync::CancellationToken;

/// All fields are `Arc`-wrapped, so cloning is cheap.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    cancel: Arc<Mutex<CancellationToken>>,
    is_running: Arc<AtomicBool>,
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHandle {
    pub fn new() -> Self {
        Self {
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            is_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Ask the current run to stop. Observed between steps.
    pub fn stop(&self) {
        self.cancel.lock().cancel();
    }

    /// Token for the current run
    pub fn token(&self) -> CancellationToken {
        self.cancel.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Install a fresh token for a new run; a stop from an earlier run
    /// does not carry over.
    pub(crate) fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.cancel.lock() = token.clone();
        self.is_running.store(true, Ordering::Release);
        token
    }

    pub(crate) fn end(&self) {
        self.is_running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_cancels_current_token() {
        let handle = SessionHandle::new();
        let token = handle.begin();
        assert!(handle.is_running());

        handle.clone().stop();
        assert!(token.is_cancelled());

        handle.end();
        assert!(!handle.is_running());
    }

    #[test]
    fn test_begin_resets_stop() {
        let handle = SessionHandle::new();
        handle.stop();
        assert!(handle.token().is_cancelled());
        let fresh = handle.begin();
        assert!(!fresh.is_cancelled());
    }
}
