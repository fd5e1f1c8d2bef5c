//! GPU resource handles, the registry that owns them and busy-count locks.

mod handle;
mod lock;
mod registry;

pub use handle::{
    AnyHandle, Buffer, DescriptorPool, DescriptorSet, DescriptorSetLayout, Framebuffer, Handle,
    Image, ImageView, Pipeline, RenderPass, ResourceKind, ResourceType, Sampler,
};
pub use lock::ResourceLock;
pub use registry::{Pool, Readiness, ResourceEntry, ResourceRegistry, ResourceView};
