//! Deferred destruction of native objects.
//!
//! GPU work runs up to `lag` frames behind the CPU, so a native object cannot
//! be freed when the application destroys its handle. Every destroy goes into
//! the ring slot of the current frame and is only handed to the backend when
//! that slot comes around again, `lag + 1` frames later.
//!
//! ```text
//!   lag = 2, ring of 3 slots
//!
//!   frame 10: destroy(A)  -> slot 1
//!   frame 11: flush slot 2 (filled at 8)
//!   frame 12: flush slot 0 (filled at 9)
//!   frame 13: flush slot 1 -> A freed
//! ```
//!
//! Within a flushed slot records are sorted by [`ResourceKind`] so objects go
//! before the objects they reference, and records of one kind keep the order
//! they were destroyed in.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use vesper_core::profiling::{profile_plot, profile_scope};

use crate::backend::Backend;
use crate::config::FrameLag;
use crate::resources::ResourceKind;

/// A native object waiting to be freed.
#[derive(Debug, Clone)]
pub struct DestroyRecord {
    pub kind: ResourceKind,
    /// Native object and auxiliary object (a pipeline's layout, a descriptor
    /// set's pool), or the allocation id for device memory.
    pub payload: [u64; 2],
    /// Several objects of the same kind freed in one call.
    pub array: Option<Box<[u64]>>,
    busy: Option<Arc<AtomicU32>>,
}

impl DestroyRecord {
    /// Record for one native object.
    pub fn new(kind: ResourceKind, payload: [u64; 2]) -> Self {
        Self {
            kind,
            payload,
            array: None,
            busy: None,
        }
    }

    /// Record freeing many objects of one kind together.
    ///
    /// `aux` goes in the second payload word; for descriptor sets it is the
    /// pool they were allocated from.
    pub fn bulk(kind: ResourceKind, aux: u64, objects: Vec<u64>) -> Self {
        Self {
            kind,
            payload: [0, aux],
            array: Some(objects.into_boxed_slice()),
            busy: None,
        }
    }

    /// Attaches the busy counter of the resource being destroyed.
    pub(crate) fn with_busy(mut self, busy: Arc<AtomicU32>) -> Self {
        self.busy = Some(busy);
        self
    }

    fn busy_count(&self) -> u32 {
        self.busy
            .as_ref()
            .map_or(0, |busy| busy.load(Ordering::Acquire))
    }

    /// Number of native objects this record frees.
    pub fn count(&self) -> usize {
        self.array.as_ref().map_or(1, |array| array.len())
    }

    /// Native objects this record frees.
    pub fn objects(&self) -> &[u64] {
        match &self.array {
            Some(array) => array,
            None => &self.payload[..1],
        }
    }
}

impl PartialEq for DestroyRecord {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.payload == other.payload && self.array == other.array
    }
}

#[derive(Debug)]
struct Ring {
    frame: u64,
    slots: Vec<Vec<DestroyRecord>>,
}

impl Ring {
    fn slot_index(&self, frame: u64) -> usize {
        (frame % self.slots.len() as u64) as usize
    }
}

/// Ring of per-frame destroy lists.
#[derive(Debug)]
pub struct DestructionQueue {
    lag: FrameLag,
    ring: Mutex<Ring>,
}

impl DestructionQueue {
    /// Creates an empty queue positioned at frame 0.
    pub fn new(lag: FrameLag) -> Self {
        assert!(lag.get() > 0, "frame lag must be at least 1");
        Self {
            lag,
            ring: Mutex::new(Ring {
                frame: 0,
                slots: (0..lag.ring_len()).map(|_| Vec::new()).collect(),
            }),
        }
    }

    /// Frame lag this queue delays by.
    pub fn lag(&self) -> FrameLag {
        self.lag
    }

    /// Frame destroys are currently recorded into.
    pub fn frame(&self) -> u64 {
        self.ring.lock().frame
    }

    /// Queues a record into the current frame's slot.
    pub fn destroy(&self, record: DestroyRecord) {
        let mut ring = self.ring.lock();
        let slot = ring.slot_index(ring.frame);
        log::trace!(
            "Deferring {:?} x{} at frame {} (slot {slot})",
            record.kind,
            record.count(),
            ring.frame
        );
        ring.slots[slot].push(record);
    }

    /// Queues several records into the current frame's slot.
    pub fn destroy_all(&self, records: impl IntoIterator<Item = DestroyRecord>) {
        let mut ring = self.ring.lock();
        let slot = ring.slot_index(ring.frame);
        ring.slots[slot].extend(records);
    }

    /// Advances one frame and frees the slot filled `lag + 1` frames ago.
    ///
    /// Returns the number of records handed to the backend.
    pub fn advance_frame(&self, backend: &dyn Backend) -> usize {
        profile_scope!("destruction_flush");

        let (frame, records) = {
            let mut ring = self.ring.lock();
            ring.frame += 1;
            let slot = ring.slot_index(ring.frame);
            (ring.frame, std::mem::take(&mut ring.slots[slot]))
        };

        profile_plot!("deferred destroys", records.len());
        if records.is_empty() {
            return 0;
        }

        log::debug!(
            "Frame {frame}: freeing {} records destroyed at frame {}",
            records.len(),
            frame - self.lag.ring_len() as u64
        );
        Self::flush(records, backend)
    }

    /// Frees every pending record, oldest slot first.
    ///
    /// Only valid once the GPU is idle.
    pub fn flush_all(&self, backend: &dyn Backend) -> usize {
        let batches: Vec<Vec<DestroyRecord>> = {
            let mut ring = self.ring.lock();
            let len = ring.slots.len() as u64;
            let frame = ring.frame;
            // The slot after the current one holds the oldest records.
            (1..=len)
                .map(|offset| {
                    let slot = ring.slot_index(frame + offset);
                    std::mem::take(&mut ring.slots[slot])
                })
                .collect()
        };

        let freed: usize = batches
            .into_iter()
            .map(|records| Self::flush(records, backend))
            .sum();
        if freed > 0 {
            log::info!("Freed {freed} deferred records on full flush");
        }
        freed
    }

    /// Number of records waiting in any slot.
    pub fn pending_count(&self) -> usize {
        self.ring.lock().slots.iter().map(Vec::len).sum()
    }

    fn flush(mut records: Vec<DestroyRecord>, backend: &dyn Backend) -> usize {
        // Stable: FIFO order is kept within a kind.
        records.sort_by_key(|record| record.kind);

        for record in &records {
            debug_assert_eq!(
                record.busy_count(),
                0,
                "{:?} freed while a command buffer still references it",
                record.kind
            );
        }

        backend.destroy(&records);
        records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, NativeCall};

    fn record(kind: ResourceKind, object: u64) -> DestroyRecord {
        DestroyRecord::new(kind, [object, 0])
    }

    fn destroyed(backend: &DummyBackend) -> Vec<(ResourceKind, u64)> {
        backend
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                NativeCall::Destroy { kind, object } => Some((kind, object)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_record_frees_after_lag_plus_one() {
        let backend = DummyBackend::new();
        let queue = DestructionQueue::new(FrameLag::new(2));

        queue.destroy(record(ResourceKind::Buffer, 7));
        assert_eq!(queue.advance_frame(&backend), 0);
        assert_eq!(queue.advance_frame(&backend), 0);
        assert!(destroyed(&backend).is_empty());

        assert_eq!(queue.advance_frame(&backend), 1);
        assert_eq!(destroyed(&backend), vec![(ResourceKind::Buffer, 7)]);

        for _ in 0..6 {
            queue.advance_frame(&backend);
        }
        assert_eq!(destroyed(&backend).len(), 1);
    }

    #[test]
    fn test_flush_sorts_by_kind_and_keeps_fifo() {
        let backend = DummyBackend::new();
        let queue = DestructionQueue::new(FrameLag::new(1));

        queue.destroy(record(ResourceKind::Buffer, 1));
        queue.destroy(record(ResourceKind::ImageView, 2));
        queue.destroy(record(ResourceKind::Buffer, 3));
        queue.destroy(record(ResourceKind::DescriptorSet, 4));
        queue.destroy(record(ResourceKind::DeviceMemory, 5));

        queue.advance_frame(&backend);
        queue.advance_frame(&backend);

        assert_eq!(
            destroyed(&backend),
            vec![
                (ResourceKind::DescriptorSet, 4),
                (ResourceKind::ImageView, 2),
                (ResourceKind::Buffer, 1),
                (ResourceKind::Buffer, 3),
                (ResourceKind::DeviceMemory, 5),
            ]
        );
    }

    #[test]
    fn test_flush_all_oldest_first() {
        let backend = DummyBackend::new();
        let queue = DestructionQueue::new(FrameLag::new(2));

        queue.destroy(record(ResourceKind::Image, 1));
        queue.advance_frame(&backend);
        queue.destroy(record(ResourceKind::Image, 2));
        queue.advance_frame(&backend);
        queue.destroy(record(ResourceKind::Image, 3));

        assert_eq!(queue.pending_count(), 3);
        assert_eq!(queue.flush_all(&backend), 3);
        assert_eq!(queue.pending_count(), 0);
        assert_eq!(
            destroyed(&backend),
            vec![
                (ResourceKind::Image, 1),
                (ResourceKind::Image, 2),
                (ResourceKind::Image, 3),
            ]
        );
    }

    #[test]
    fn test_bulk_record() {
        let bulk = DestroyRecord::bulk(ResourceKind::DescriptorSet, 99, vec![1, 2, 3]);
        assert_eq!(bulk.count(), 3);
        assert_eq!(bulk.objects(), &[1, 2, 3]);
        assert_eq!(bulk.payload[1], 99);

        let single = record(ResourceKind::Sampler, 5);
        assert_eq!(single.count(), 1);
        assert_eq!(single.objects(), &[5]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "still references it")]
    fn test_busy_record_panics_at_flush() {
        let backend = DummyBackend::new();
        let queue = DestructionQueue::new(FrameLag::new(1));
        let busy = Arc::new(AtomicU32::new(1));

        queue.destroy(record(ResourceKind::Buffer, 1).with_busy(busy));
        queue.advance_frame(&backend);
        queue.advance_frame(&backend);
    }
}
