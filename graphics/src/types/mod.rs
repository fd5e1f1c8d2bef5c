//! Common types and descriptors for graphics resources.
//!
//! This module contains format enums, usage flags, descriptor structs and the
//! access vocabulary used by the barrier tracker.

mod access;
mod buffer;
mod common;
mod image;
mod pipeline;
mod queue;
mod sampler;

pub use access::{
    AccessFlags, BufferAccess, BufferState, ImageAccess, ImageLayout, ImageState, PipelineStages,
};
pub use buffer::{BufferCopy, BufferDescriptor, BufferUsage, IndexFormat, MemoryLocation};
pub use common::{ClearValue, Extent3d, Offset3d, ScissorRect, Viewport};
pub use image::{
    BufferImageCopy, ImageCopy, ImageDescriptor, ImageDimension, ImageFormat,
    ImageSubresourceRange, ImageUsage, ImageViewDescriptor, ImageViewType,
};
pub use pipeline::{
    AttachmentDescriptor, CullMode, DescriptorBinding, DescriptorPoolDescriptor,
    DescriptorSetDescriptor, DescriptorSetLayoutDescriptor, DescriptorType,
    FramebufferDescriptor, GraphicsPipelineDescriptor, LoadOp, PipelineBindPoint,
    PipelineDescriptor, PipelineKind, PrimitiveTopology, RenderPassDescriptor, ShaderStages,
    StoreOp, VertexAttribute, VertexBufferLayout, VertexFormat,
};
pub use queue::{QueueCapabilities, QueueType};
pub use sampler::{AddressMode, CompareFunction, FilterMode, SamplerDescriptor};
