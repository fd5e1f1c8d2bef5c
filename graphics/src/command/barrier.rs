//! Coalesced pipeline barriers.
//!
//! Every subresource and buffer that transitions at the same point in a
//! command buffer goes into one [`BarrierBatch`], which the backend submits as
//! a single pipeline barrier with the union of all source and destination
//! stages.

use crate::resources::{Buffer, Handle, Image};
use crate::types::{BufferState, ImageState, PipelineStages};

/// Transition of one image subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageBarrier {
    pub image: Handle<Image>,
    pub mip: u32,
    pub layer: u32,
    pub from: ImageState,
    pub to: ImageState,
}

/// Transition of one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferBarrier {
    pub buffer: Handle<Buffer>,
    pub from: BufferState,
    pub to: BufferState,
}

/// A set of barriers submitted together.
///
/// Barriers are keyed by subresource (or buffer): adding a second barrier for
/// the same key keeps the first `from` state and takes the new `to` state, so
/// a batch never transitions one subresource twice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BarrierBatch {
    images: Vec<ImageBarrier>,
    buffers: Vec<BufferBarrier>,
    src_stages: PipelineStages,
    dst_stages: PipelineStages,
}

impl BarrierBatch {
    /// Create a new empty barrier batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an image subresource transition.
    pub fn add_image(&mut self, barrier: ImageBarrier) {
        self.src_stages |= barrier.from.stages;
        self.dst_stages |= barrier.to.stages;

        let existing = self.images.iter_mut().find(|b| {
            b.image == barrier.image && b.mip == barrier.mip && b.layer == barrier.layer
        });
        match existing {
            Some(existing) => existing.to = barrier.to,
            None => self.images.push(barrier),
        }
    }

    /// Adds a buffer transition.
    pub fn add_buffer(&mut self, barrier: BufferBarrier) {
        self.src_stages |= barrier.from.stages;
        self.dst_stages |= barrier.to.stages;

        match self.buffers.iter_mut().find(|b| b.buffer == barrier.buffer) {
            Some(existing) => existing.to = barrier.to,
            None => self.buffers.push(barrier),
        }
    }

    /// Moves every barrier of `other` into this batch.
    pub fn merge(&mut self, other: BarrierBatch) {
        for barrier in other.images {
            self.add_image(barrier);
        }
        for barrier in other.buffers {
            self.add_buffer(barrier);
        }
    }

    /// Image transitions in insertion order.
    pub fn images(&self) -> &[ImageBarrier] {
        &self.images
    }

    /// Buffer transitions in insertion order.
    pub fn buffers(&self) -> &[BufferBarrier] {
        &self.buffers
    }

    /// Union of all source stages.
    pub fn src_stages(&self) -> PipelineStages {
        self.src_stages
    }

    /// Union of all destination stages.
    pub fn dst_stages(&self) -> PipelineStages {
        self.dst_stages
    }

    /// Check if the batch has any barriers.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.buffers.is_empty()
    }

    /// Get the number of barriers in the batch.
    pub fn len(&self) -> usize {
        self.images.len() + self.buffers.len()
    }

    /// Clear all barriers from the batch.
    pub fn clear(&mut self) {
        self.images.clear();
        self.buffers.clear();
        self.src_stages = PipelineStages::empty();
        self.dst_stages = PipelineStages::empty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BufferAccess, ImageAccess};
    use vesper_core::arena::ArenaKey;

    fn image(index: u32) -> Handle<Image> {
        Handle::from_key(ArenaKey::from_raw_parts(index, 0))
    }

    fn buffer(index: u32) -> Handle<Buffer> {
        Handle::from_key(ArenaKey::from_raw_parts(index, 0))
    }

    #[test]
    fn test_barrier_batch_empty() {
        let batch = BarrierBatch::new();
        assert!(batch.is_empty());
        assert_eq!(batch.len(), 0);
    }

    #[test]
    fn test_stage_masks_are_unioned() {
        let mut batch = BarrierBatch::new();
        batch.add_image(ImageBarrier {
            image: image(0),
            mip: 0,
            layer: 0,
            from: ImageAccess::TransferWrite.state(),
            to: ImageAccess::FragmentShaderRead.state(),
        });
        batch.add_buffer(BufferBarrier {
            buffer: buffer(1),
            from: BufferAccess::ComputeStorageWrite.state(),
            to: BufferAccess::VertexRead.state(),
        });

        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch.src_stages(),
            PipelineStages::TRANSFER | PipelineStages::COMPUTE_SHADER
        );
        assert_eq!(
            batch.dst_stages(),
            PipelineStages::FRAGMENT_SHADER | PipelineStages::VERTEX_INPUT
        );
    }

    #[test]
    fn test_same_key_keeps_first_source() {
        let mut batch = BarrierBatch::new();
        let from = ImageState::UNDEFINED;
        batch.add_image(ImageBarrier {
            image: image(0),
            mip: 1,
            layer: 0,
            from,
            to: ImageAccess::TransferWrite.state(),
        });
        batch.add_image(ImageBarrier {
            image: image(0),
            mip: 1,
            layer: 0,
            from: ImageAccess::TransferWrite.state(),
            to: ImageAccess::FragmentShaderRead.state(),
        });

        assert_eq!(batch.images().len(), 1);
        assert_eq!(batch.images()[0].from, from);
        assert_eq!(batch.images()[0].to, ImageAccess::FragmentShaderRead.state());
    }

    #[test]
    fn test_merge_and_clear() {
        let mut a = BarrierBatch::new();
        a.add_buffer(BufferBarrier {
            buffer: buffer(0),
            from: BufferAccess::TransferWrite.state(),
            to: BufferAccess::IndexRead.state(),
        });
        let mut b = BarrierBatch::new();
        b.add_buffer(BufferBarrier {
            buffer: buffer(1),
            from: BufferAccess::TransferWrite.state(),
            to: BufferAccess::VertexRead.state(),
        });

        a.merge(b);
        assert_eq!(a.buffers().len(), 2);

        a.clear();
        assert!(a.is_empty());
        assert!(a.src_stages().is_empty());
    }
}
