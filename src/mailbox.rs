//! Single-slot cross-thread mailboxes.
//!
//! The ROM picker and its dismiss signal are delivered from a platform
//! thread while the tick loop runs; each travels through an explicitly
//! owned single-slot mailbox with take-and-clear semantics. There is no
//! queue: a second delivery before the first is consumed overwrites it,
//! giving at-most-once delivery per picker invocation.

use std::sync::{Arc, Mutex};

/// ROM bytes plus a display name, delivered by the platform picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomDelivery {
    pub bytes: Vec<u8>,
    pub name: String,
}

/// Mutex-guarded single slot. Clone handles share the slot, so the
/// producer side can live on another thread.
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Deliver a value, replacing any unconsumed one.
    pub fn post(&self, value: T) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(value);
    }

    /// Take the pending value, clearing the slot.
    pub fn take(&self) -> Option<T> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.take()
    }

    pub fn is_pending(&self) -> bool {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.is_some()
    }
}
