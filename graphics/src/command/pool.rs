//! Per-queue command buffer pools.

use std::sync::Arc;

use parking_lot::Mutex;
use vesper_core::profiling::profile_function;

use crate::backend::Backend;
use crate::config::QueueThreadMode;
use crate::resources::ResourceRegistry;
use crate::types::QueueType;

use super::buffer::{CommandBuffer, CommandBufferState};

/// Hands out command buffers for one queue and recycles them after the GPU
/// is done with them.
///
/// In [`QueueThreadMode::Synchronous`] every caller records into the same
/// buffer until it is submitted. In [`QueueThreadMode::Multithreaded`] each
/// call gets a buffer of its own.
#[derive(Debug)]
pub struct CommandPool {
    queue: QueueType,
    mode: QueueThreadMode,
    registry: Arc<ResourceRegistry>,
    free: Mutex<Vec<Arc<CommandBuffer>>>,
    shared: Mutex<Option<Arc<CommandBuffer>>>,
    in_flight: Mutex<Vec<Arc<CommandBuffer>>>,
}

impl CommandPool {
    pub fn new(queue: QueueType, mode: QueueThreadMode, registry: Arc<ResourceRegistry>) -> Self {
        Self {
            queue,
            mode,
            registry,
            free: Mutex::new(Vec::new()),
            shared: Mutex::new(None),
            in_flight: Mutex::new(Vec::new()),
        }
    }

    pub fn queue(&self) -> QueueType {
        self.queue
    }

    pub fn mode(&self) -> QueueThreadMode {
        self.mode
    }

    /// A buffer in the Recording state, honoring the queue's thread mode.
    pub fn start_recording(&self) -> Arc<CommandBuffer> {
        match self.mode {
            QueueThreadMode::Multithreaded => self.acquire(),
            QueueThreadMode::Synchronous => {
                let mut shared = self.shared.lock();
                if let Some(cmd) = shared.as_ref()
                    && cmd.state() == CommandBufferState::Recording
                {
                    return Arc::clone(cmd);
                }
                let cmd = self.acquire();
                *shared = Some(Arc::clone(&cmd));
                cmd
            }
        }
    }

    /// A fresh recording buffer regardless of thread mode.
    pub fn acquire(&self) -> Arc<CommandBuffer> {
        let cmd = self.free.lock().pop().unwrap_or_else(|| {
            log::trace!("Allocating {:?} command buffer", self.queue);
            Arc::new(CommandBuffer::new(self.queue, Arc::clone(&self.registry)))
        });
        cmd.begin();
        cmd
    }

    /// Stops sharing `cmd` before it is submitted.
    pub fn detach(&self, cmd: &Arc<CommandBuffer>) {
        let mut shared = self.shared.lock();
        if shared.as_ref().is_some_and(|current| Arc::ptr_eq(current, cmd)) {
            *shared = None;
        }
    }

    /// Tracks a submitted buffer until it completes.
    pub fn track(&self, cmd: Arc<CommandBuffer>) {
        self.in_flight.lock().push(cmd);
    }

    /// Returns a completed buffer to the free list.
    pub fn recycle(&self, cmd: Arc<CommandBuffer>) {
        cmd.recycle();
        self.free.lock().push(cmd);
    }

    /// Completes and recycles every in-flight buffer the backend reports done.
    pub fn poll(&self, backend: &dyn Backend) -> usize {
        profile_function!();

        let done: Vec<Arc<CommandBuffer>> = {
            let mut in_flight = self.in_flight.lock();
            let (done, pending): (Vec<_>, Vec<_>) = in_flight.drain(..).partition(|cmd| {
                cmd.submission()
                    .is_none_or(|submission| backend.is_complete(submission))
            });
            *in_flight = pending;
            done
        };

        let count = done.len();
        for cmd in done {
            cmd.complete();
            self.recycle(cmd);
        }
        count
    }

    /// Completes every in-flight buffer. Only valid once the queue is idle.
    pub fn complete_all(&self) -> usize {
        let done = std::mem::take(&mut *self.in_flight.lock());
        let count = done.len();
        for cmd in done {
            cmd.complete();
            self.recycle(cmd);
        }
        count
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn free_count(&self) -> usize {
        self.free.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;

    fn pool(mode: QueueThreadMode) -> CommandPool {
        CommandPool::new(QueueType::Graphics, mode, Arc::new(ResourceRegistry::new()))
    }

    #[test]
    fn test_synchronous_shares_until_submit() {
        let backend = DummyBackend::new();
        let pool = pool(QueueThreadMode::Synchronous);
        let a = pool.start_recording();
        let b = pool.start_recording();
        assert!(Arc::ptr_eq(&a, &b));

        pool.detach(&a);
        a.submit(&backend).unwrap();
        pool.track(a.clone());

        let c = pool.start_recording();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_multithreaded_hands_out_fresh_buffers() {
        let pool = pool(QueueThreadMode::Multithreaded);
        let a = pool.start_recording();
        let b = pool.start_recording();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.state(), CommandBufferState::Recording);
    }

    #[test]
    fn test_poll_recycles_completed() {
        let backend = DummyBackend::manual();
        let pool = pool(QueueThreadMode::Multithreaded);
        let cmd = pool.start_recording();
        let id = cmd.submit(&backend).unwrap();
        pool.track(cmd.clone());

        assert_eq!(pool.poll(&backend), 0);
        assert_eq!(pool.in_flight_count(), 1);

        backend.complete(id);
        assert_eq!(pool.poll(&backend), 1);
        assert_eq!(cmd.state(), CommandBufferState::Idle);
        assert_eq!(pool.free_count(), 1);

        let reused = pool.start_recording();
        assert!(Arc::ptr_eq(&cmd, &reused));
    }
}
