//! Single-flight guard.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Admits one holder at a time; later callers are turned away, not queued.
#[derive(Clone, Debug, Default)]
pub struct ReentrancyGuard {
    busy: Arc<AtomicBool>,
}

impl ReentrancyGuard {
    /// Create an idle guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the guard, `None` if another holder is active.
    pub fn try_enter(&self) -> Option<InFlight> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight {
                busy: Arc::clone(&self.busy),
            })
    }

    /// Whether a holder is active.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Proof of holding a [`ReentrancyGuard`]; releases it on drop.
#[derive(Debug)]
pub struct InFlight {
    busy: Arc<AtomicBool>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
