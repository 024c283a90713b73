//! Credit accounting for outbound call frames.
//!
//! A sender consumes one credit per call frame it puts on the wire; the
//! connection grants credits back as the peer drains them. The counter is
//! shared, so the connection's reader can grant while a response holds a
//! clone for consuming.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CreditTracker {
    credits: Arc<AtomicU32>,
}

impl CreditTracker {
    pub fn new(initial_credits: u32) -> Self {
        Self {
            credits: Arc::new(AtomicU32::new(initial_credits)),
        }
    }

    /// Takes one credit. Returns false, consuming nothing, when none are left.
    pub fn try_consume(&self) -> bool {
        let mut current = self.credits.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return false;
            }
            match self.credits.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Adds credits, saturating at `u32::MAX`.
    pub fn grant(&self, amount: u32) {
        let _ = self
            .credits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_add(amount))
            });
    }

    pub fn available(&self) -> u32 {
        self.credits.load(Ordering::Acquire)
    }

    pub fn is_exhausted(&self) -> bool {
        self.available() == 0
    }
}
