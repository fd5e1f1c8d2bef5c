//! Per-command-buffer subresource state tracking.
//!
//! The tracker remembers the last `{access, layout, stage}` each image
//! subresource and each buffer was left in by this command buffer. A new
//! requirement either is covered by the tracked state (no barrier) or yields
//! exactly one barrier from the tracked to the required state, after which
//! the required state becomes the tracked one.

use std::collections::HashMap;

use crate::resources::{Buffer, Handle, Image};
use crate::types::{AccessFlags, BufferState, ImageState, PipelineStages};

use super::barrier::{BufferBarrier, ImageBarrier};

/// One (image, mip, layer) subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubresourceKey {
    pub image: Handle<Image>,
    pub mip: u32,
    pub layer: u32,
}

impl SubresourceKey {
    pub fn new(image: Handle<Image>, mip: u32, layer: u32) -> Self {
        Self { image, mip, layer }
    }
}

/// Whether a subresource in `tracked` may be used as `required` without a barrier.
///
/// Equal states never need one. A read-only requirement is also covered when
/// the tracked state is read-only, in the same layout, and already made
/// memory visible to every required access and stage.
pub fn image_state_covers(tracked: ImageState, required: ImageState) -> bool {
    tracked == required
        || (tracked.layout == required.layout
            && read_covers(
                tracked.access,
                tracked.stages,
                required.access,
                required.stages,
            ))
}

/// Buffer counterpart of [`image_state_covers`].
pub fn buffer_state_covers(tracked: BufferState, required: BufferState) -> bool {
    tracked == required
        || read_covers(
            tracked.access,
            tracked.stages,
            required.access,
            required.stages,
        )
}

fn read_covers(
    tracked_access: AccessFlags,
    tracked_stages: PipelineStages,
    required_access: AccessFlags,
    required_stages: PipelineStages,
) -> bool {
    !tracked_access.has_write()
        && !required_access.has_write()
        && !tracked_access.is_empty()
        && tracked_access.contains(required_access)
        && tracked_stages.contains(required_stages)
}

/// Last-known states of everything a command buffer touched.
#[derive(Debug, Default)]
pub struct StateTracker {
    images: HashMap<SubresourceKey, ImageState>,
    buffers: HashMap<Handle<Buffer>, BufferState>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracked state of a subresource, if this buffer touched it.
    pub fn image_state(&self, key: SubresourceKey) -> Option<ImageState> {
        self.images.get(&key).copied()
    }

    /// Tracked state of a buffer, if this buffer touched it.
    pub fn buffer_state(&self, buffer: Handle<Buffer>) -> Option<BufferState> {
        self.buffers.get(&buffer).copied()
    }

    /// Current state of a subresource, seeding it from `initial` on first use.
    pub fn resolve_image(
        &mut self,
        key: SubresourceKey,
        initial: impl FnOnce() -> ImageState,
    ) -> ImageState {
        *self.images.entry(key).or_insert_with(initial)
    }

    /// Overwrites the tracked state of a subresource.
    pub fn set_image(&mut self, key: SubresourceKey, state: ImageState) {
        self.images.insert(key, state);
    }

    /// Overwrites the tracked state of a buffer.
    pub fn set_buffer(&mut self, buffer: Handle<Buffer>, state: BufferState) {
        self.buffers.insert(buffer, state);
    }

    /// Brings a subresource into `required`, returning the barrier that needs.
    ///
    /// `initial` supplies the state on first use in this command buffer.
    /// With `force`, a barrier is returned even when the state is covered.
    pub fn transition_image(
        &mut self,
        key: SubresourceKey,
        required: ImageState,
        initial: impl FnOnce() -> ImageState,
        force: bool,
    ) -> Option<ImageBarrier> {
        let tracked = self.resolve_image(key, initial);
        if !force && image_state_covers(tracked, required) {
            return None;
        }
        self.images.insert(key, required);
        Some(ImageBarrier {
            image: key.image,
            mip: key.mip,
            layer: key.layer,
            from: tracked,
            to: required,
        })
    }

    /// Brings a buffer into `required`, returning the barrier that needs.
    ///
    /// On first use the state comes from `initial`; when that is `None` the
    /// buffer has never been used and only its state is recorded.
    pub fn transition_buffer(
        &mut self,
        buffer: Handle<Buffer>,
        required: BufferState,
        initial: impl FnOnce() -> Option<BufferState>,
        force: bool,
    ) -> Option<BufferBarrier> {
        let tracked = match self.buffers.get(&buffer) {
            Some(state) => *state,
            None => match initial() {
                Some(state) => state,
                None => {
                    self.buffers.insert(buffer, required);
                    return None;
                }
            },
        };
        if !force && buffer_state_covers(tracked, required) {
            self.buffers.insert(buffer, tracked);
            return None;
        }
        self.buffers.insert(buffer, required);
        Some(BufferBarrier {
            buffer,
            from: tracked,
            to: required,
        })
    }

    /// Tracked image subresources.
    pub fn images(&self) -> impl Iterator<Item = (SubresourceKey, ImageState)> + '_ {
        self.images.iter().map(|(key, state)| (*key, *state))
    }

    /// Tracked buffers.
    pub fn buffers(&self) -> impl Iterator<Item = (Handle<Buffer>, BufferState)> + '_ {
        self.buffers.iter().map(|(buffer, state)| (*buffer, *state))
    }

    pub fn clear(&mut self) {
        self.images.clear();
        self.buffers.clear();
    }
}
