use crate::types::Mode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::RwLock;

/// Shared kill switch + mode, replacing the global-singleton-settings
/// pattern (spec §9 REDESIGN FLAGS). Owned by the top-level composer and
/// handed to every task by reference; only Safety Rails, the Validator,
/// and an operator command write the kill switch — per spec it is
/// set-once and reset only by an explicit operator action.
#[derive(Clone)]
pub struct TradingControl {
    inner: Arc<Inner>,
}

struct Inner {
    kill_switch: AtomicBool,
    mode: RwLock<Mode>,
}

impl TradingControl {
    pub fn new(mode: Mode) -> Self {
        Self { inner: Arc::new(Inner { kill_switch: AtomicBool::new(false), mode: RwLock::new(mode) }) }
    }

    pub fn is_killed(&self) -> bool {
        self.inner.kill_switch.load(Ordering::SeqCst)
    }

    /// Engage the kill switch. Idempotent; logs only on the transition.
    pub fn engage_kill_switch(&self, reason: &str) {
        let was_set = self.inner.kill_switch.swap(true, Ordering::SeqCst);
        if !was_set {
            tracing::warn!(reason, "kill switch engaged");
        }
    }

    /// Reset the kill switch. Only an operator command should call this.
    pub fn reset_kill_switch(&self) {
        self.inner.kill_switch.store(false, Ordering::SeqCst);
        tracing::info!("kill switch reset by operator");
    }

    pub fn mode(&self) -> Mode {
        *self.inner.mode.read().unwrap()
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.inner.mode.write().unwrap() = mode;
    }
}
