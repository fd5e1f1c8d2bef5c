//! Scoped busy-count guards.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use super::handle::AnyHandle;

/// Keeps a resource marked busy while a submitted command buffer may use it.
///
/// Acquiring increments the resource's busy count; dropping decrements it.
/// Command buffers hold these from submit until GPU completion, so the count
/// can never be released twice or forgotten.
pub struct ResourceLock {
    handle: AnyHandle,
    busy: Arc<AtomicU32>,
}

impl ResourceLock {
    pub(crate) fn acquire(handle: AnyHandle, busy: Arc<AtomicU32>) -> Self {
        let previous = busy.fetch_add(1, Ordering::AcqRel);
        log::trace!("Locked {handle:?} (busy {})", previous + 1);
        Self { handle, busy }
    }

    /// The locked resource.
    pub fn handle(&self) -> AnyHandle {
        self.handle
    }
}

impl Drop for ResourceLock {
    fn drop(&mut self) {
        let previous = self.busy.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "busy count underflow on {:?}", self.handle);
        log::trace!("Unlocked {:?} (busy {})", self.handle, previous - 1);
    }
}

impl fmt::Debug for ResourceLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceLock")
            .field("handle", &self.handle)
            .field("busy", &self.busy.load(Ordering::Relaxed))
            .finish()
    }
}
