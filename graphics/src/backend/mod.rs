//! GPU backend abstraction layer.
//!
//! The device talks to the native API only through the [`Backend`] trait,
//! chosen once when the [`RenderDevice`](crate::RenderDevice) is created.
//!
//! # Available Backends
//!
//! - [`DummyBackend`]: records every native call, for tests and headless use
//! - `VulkanBackend` (feature `vulkan-backend`): Vulkan via `ash` and
//!   `gpu-allocator`, built on a device the application created
//!
//! Backends create native objects and return them as opaque
//! [`NativeHandle`]s; they never see the registry except through
//! [`ResourceInternals`] while replaying commands or writing descriptors.

pub mod dummy;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

use std::fmt;

use crate::bindless::BindlessWrite;
use crate::command::Command;
use crate::destruction::DestroyRecord;
use crate::error::GraphicsResult;
use crate::internal::ResourceInternals;
use crate::sync::SubmissionId;
use crate::types::{
    BufferDescriptor, DescriptorPoolDescriptor, DescriptorSetDescriptor,
    DescriptorSetLayoutDescriptor, FramebufferDescriptor, ImageDescriptor, ImageViewDescriptor,
    PipelineDescriptor, QueueType, RenderPassDescriptor, SamplerDescriptor,
};

pub use dummy::{DummyBackend, NativeCall};
#[cfg(feature = "vulkan-backend")]
pub use vulkan::{VulkanBackend, VulkanQueue, VulkanQueues};

/// Opaque native object produced by a backend.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NativeHandle {
    /// The native object itself.
    pub object: u64,
    /// A second native object owned alongside it.
    pub aux: u64,
    /// Backing allocation, freed as a separate `DeviceMemory` record.
    pub memory: Option<u64>,
}

impl NativeHandle {
    /// The null handle.
    pub const NULL: Self = Self {
        object: 0,
        aux: 0,
        memory: None,
    };

    pub const fn new(object: u64) -> Self {
        Self {
            object,
            aux: 0,
            memory: None,
        }
    }

    pub const fn with_aux(mut self, aux: u64) -> Self {
        self.aux = aux;
        self
    }

    pub const fn with_memory(mut self, memory: u64) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn is_null(&self) -> bool {
        self.object == 0
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Native({:#x}", self.object)?;
        if self.aux != 0 {
            write!(f, ", aux {:#x}", self.aux)?;
        }
        if let Some(memory) = self.memory {
            write!(f, ", mem {memory:#x}")?;
        }
        write!(f, ")")
    }
}

/// Native API behind the device.
///
/// Every method may be called from any thread. Creation returns the native
/// objects for a new resource; destruction receives records whose objects the
/// GPU can no longer reference.
pub trait Backend: Send + Sync + fmt::Debug {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Creates a buffer, writing `data` into it when the memory is host visible.
    fn create_buffer(
        &self,
        desc: &BufferDescriptor,
        data: Option<&[u8]>,
    ) -> GraphicsResult<NativeHandle>;

    fn create_image(&self, desc: &ImageDescriptor) -> GraphicsResult<NativeHandle>;

    fn create_image_view(
        &self,
        desc: &ImageViewDescriptor,
        resources: &ResourceInternals<'_>,
    ) -> GraphicsResult<NativeHandle>;

    fn create_sampler(&self, desc: &SamplerDescriptor) -> GraphicsResult<NativeHandle>;

    fn create_render_pass(&self, desc: &RenderPassDescriptor) -> GraphicsResult<NativeHandle>;

    fn create_framebuffer(
        &self,
        desc: &FramebufferDescriptor,
        resources: &ResourceInternals<'_>,
    ) -> GraphicsResult<NativeHandle>;

    /// Creates a pipeline; `aux` of the result holds its pipeline layout.
    fn create_pipeline(
        &self,
        desc: &PipelineDescriptor,
        resources: &ResourceInternals<'_>,
    ) -> GraphicsResult<NativeHandle>;

    fn create_descriptor_set_layout(
        &self,
        desc: &DescriptorSetLayoutDescriptor,
    ) -> GraphicsResult<NativeHandle>;

    fn create_descriptor_pool(
        &self,
        desc: &DescriptorPoolDescriptor,
    ) -> GraphicsResult<NativeHandle>;

    /// Allocates a descriptor set; `aux` of the result holds its pool.
    fn create_descriptor_set(
        &self,
        desc: &DescriptorSetDescriptor,
        resources: &ResourceInternals<'_>,
    ) -> GraphicsResult<NativeHandle>;

    /// Frees native objects. Records arrive sorted in destruction order.
    fn destroy(&self, records: &[DestroyRecord]);

    /// Replays `commands` into a native command buffer and submits it.
    fn submit(
        &self,
        queue: QueueType,
        commands: &[Command],
        resources: &ResourceInternals<'_>,
    ) -> GraphicsResult<SubmissionId>;

    /// Whether a submission has finished executing (non-blocking).
    fn is_complete(&self, submission: SubmissionId) -> bool;

    /// Blocks until every listed submission has finished.
    fn wait(&self, submissions: &[SubmissionId]) -> GraphicsResult<()>;

    /// Blocks until every queue is idle.
    fn wait_idle(&self) -> GraphicsResult<()>;

    /// Writes a batch of bindless descriptor updates.
    ///
    /// Cleared slots arrive as writes with `resource: None`. A backend may
    /// skip them when the binding is `PARTIALLY_BOUND`, as Vulkan does; the
    /// dummy backend records them like any other write.
    fn write_bindless(
        &self,
        writes: &[BindlessWrite],
        resources: &ResourceInternals<'_>,
    ) -> GraphicsResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_handle_builders() {
        let native = NativeHandle::new(0x10).with_aux(0x20).with_memory(3);
        assert_eq!(native.object, 0x10);
        assert_eq!(native.aux, 0x20);
        assert_eq!(native.memory, Some(3));
        assert!(!native.is_null());
        assert!(NativeHandle::NULL.is_null());
        assert_eq!(format!("{native:?}"), "Native(0x10, aux 0x20, mem 0x3)");
    }
}
