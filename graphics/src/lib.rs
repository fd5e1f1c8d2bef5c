//! # Vesper Graphics
//!
//! GPU command recording and resource lifecycle for the Vesper renderer.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`RenderDevice`] - resource creation, submission and frame pacing
//! - [`CommandBuffer`] - command recording with automatic barrier synthesis
//! - [`DestructionQueue`] - frees native objects once the GPU is done with them
//! - [`BindlessAllocator`] - slot allocation for bindless descriptor arrays
//! - [`Backend`] - trait for native API implementations (Vulkan, Dummy)
//!
//! Resources are addressed through typed generational [`Handle`]s. A handle
//! stops resolving the moment its resource is destroyed, while the native
//! object lives on until `frame_lag + 1` frames later.
//!
//! ## Example
//!
//! ```ignore
//! use vesper_graphics::{DummyBackend, GraphicsConfig, QueueType, RenderDevice};
//!
//! let device = RenderDevice::new(GraphicsConfig::default(), Arc::new(DummyBackend::new()))?;
//! device.begin_frame()?;
//! let cmd = device.start_recording(QueueType::Graphics);
//! // Record commands...
//! device.submit(&cmd)?;
//! device.end_frame();
//! ```

pub mod backend;
pub mod bindless;
pub mod command;
pub mod config;
pub mod destruction;
pub mod device;
pub mod error;
pub mod internal;
pub mod profiling;
pub mod resources;
pub mod sync;
pub mod types;

// Re-export main types for convenience
pub use backend::{Backend, DummyBackend, NativeCall, NativeHandle};
#[cfg(feature = "vulkan-backend")]
pub use backend::{VulkanBackend, VulkanQueue, VulkanQueues};
pub use bindless::{
    BindlessAllocator, BindlessCategory, BindlessResource, BindlessUniformDescriptor,
    BindlessUniformId, BindlessWrite,
};
pub use command::{
    BarrierBatch, BufferBarrier, Command, CommandBuffer, CommandBufferState, CommandPool,
    ImageBarrier, Usage,
};
pub use config::{BindlessLimits, FrameLag, GraphicsConfig, QueueModes, QueueThreadMode};
pub use destruction::{DestroyRecord, DestructionQueue};
pub use device::RenderDevice;
pub use error::{GraphicsError, GraphicsResult};
pub use internal::ResourceInternals;
pub use resources::{
    AnyHandle, Buffer, DescriptorPool, DescriptorSet, DescriptorSetLayout, Framebuffer, Handle,
    Image, ImageView, Pipeline, Readiness, RenderPass, ResourceKind, ResourceLock,
    ResourceRegistry, ResourceType, ResourceView, Sampler,
};
pub use sync::{FramePacer, SubmissionId};
pub use types::{
    BufferAccess, BufferDescriptor, BufferUsage, ClearValue, Extent3d, ImageAccess,
    ImageDescriptor, ImageFormat, ImageLayout, ImageUsage, MemoryLocation, QueueType,
    SamplerDescriptor,
};

static_assertions::assert_impl_all!(RenderDevice: Send, Sync);
static_assertions::assert_impl_all!(CommandBuffer: Send, Sync);
static_assertions::assert_impl_all!(CommandPool: Send, Sync);
static_assertions::assert_impl_all!(DestructionQueue: Send, Sync);
static_assertions::assert_impl_all!(BindlessAllocator: Send, Sync);
static_assertions::assert_impl_all!(ResourceRegistry: Send, Sync);
static_assertions::assert_impl_all!(DummyBackend: Send, Sync);
static_assertions::assert_impl_all!(Handle<Buffer>: Send, Sync, Copy);

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
///
/// This should be called before using any graphics functionality.
pub fn init() {
    log::info!("Vesper Graphics v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_dummy_backend() {
        let backend = DummyBackend::new();
        assert_eq!(backend.name(), "Dummy Backend");
    }
}
