//! Typed resource handles.
//!
//! A [`Handle<T>`] is a plain `(index, generation)` pair into the registry
//! pool for resource type `T`. Handles are `Copy` and carry no ownership; a
//! handle whose resource was destroyed simply stops resolving. [`AnyHandle`]
//! is the type-erased form stored in lock lists and barriers.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use vesper_core::arena::ArenaKey;

use crate::types::{
    BufferDescriptor, BufferState, DescriptorPoolDescriptor, DescriptorSetDescriptor,
    DescriptorSetLayoutDescriptor, FramebufferDescriptor, ImageDescriptor, ImageState,
    ImageViewDescriptor, PipelineDescriptor, RenderPassDescriptor, SamplerDescriptor,
};

use super::registry::{Pool, ResourceRegistry};

/// Kind of a native object.
///
/// Declaration order is destruction order: objects that reference others come
/// first, backing memory comes last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    DescriptorSet,
    Framebuffer,
    Pipeline,
    RenderPass,
    DescriptorPool,
    DescriptorSetLayout,
    ImageView,
    Sampler,
    Image,
    Buffer,
    DeviceMemory,
}

impl ResourceKind {
    /// Every kind, in destruction order.
    pub const ALL: [ResourceKind; 11] = [
        ResourceKind::DescriptorSet,
        ResourceKind::Framebuffer,
        ResourceKind::Pipeline,
        ResourceKind::RenderPass,
        ResourceKind::DescriptorPool,
        ResourceKind::DescriptorSetLayout,
        ResourceKind::ImageView,
        ResourceKind::Sampler,
        ResourceKind::Image,
        ResourceKind::Buffer,
        ResourceKind::DeviceMemory,
    ];
}

mod sealed {
    pub trait Sealed {}
}

/// A resource type with a registry pool.
///
/// Implemented by the zero-sized marker types in this module only.
pub trait ResourceType: sealed::Sealed + Send + Sync + Sized + 'static {
    /// Kind tag used in destroy records and lock lists.
    const KIND: ResourceKind;
    /// Creation parameters kept alongside the native object.
    type Descriptor: Clone + fmt::Debug + Send + Sync;
    /// Synchronization state committed at submit time.
    type Committed: Default + fmt::Debug + Send + Sync;

    #[doc(hidden)]
    fn pool(registry: &ResourceRegistry) -> &Pool<Self>;
}

macro_rules! resource_types {
    ($($(#[$meta:meta])* $name:ident => $desc:ty, $committed:ty, $field:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub enum $name {}

            impl sealed::Sealed for $name {}

            impl ResourceType for $name {
                const KIND: ResourceKind = ResourceKind::$name;
                type Descriptor = $desc;
                type Committed = $committed;

                fn pool(registry: &ResourceRegistry) -> &Pool<Self> {
                    &registry.$field
                }
            }
        )*
    };
}

resource_types! {
    /// GPU buffer.
    Buffer => BufferDescriptor, Option<BufferState>, buffers;
    /// GPU image.
    Image => ImageDescriptor, Vec<ImageState>, images;
    /// View onto a range of an image.
    ImageView => ImageViewDescriptor, (), image_views;
    /// Texture sampler.
    Sampler => SamplerDescriptor, (), samplers;
    /// Render pass.
    RenderPass => RenderPassDescriptor, (), render_passes;
    /// Framebuffer binding image views to a render pass.
    Framebuffer => FramebufferDescriptor, (), framebuffers;
    /// Graphics or compute pipeline with its layout.
    Pipeline => PipelineDescriptor, (), pipelines;
    /// Descriptor set layout.
    DescriptorSetLayout => DescriptorSetLayoutDescriptor, (), descriptor_set_layouts;
    /// Descriptor pool.
    DescriptorPool => DescriptorPoolDescriptor, (), descriptor_pools;
    /// Descriptor set allocated from a pool.
    DescriptorSet => DescriptorSetDescriptor, (), descriptor_sets;
}

/// Generation-checked reference to a resource of type `T`.
pub struct Handle<T: ResourceType> {
    key: ArenaKey,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ResourceType> Handle<T> {
    pub(crate) fn from_key(key: ArenaKey) -> Self {
        Self {
            key,
            _marker: PhantomData,
        }
    }

    pub(crate) fn key(self) -> ArenaKey {
        self.key
    }

    /// Slot index in the registry pool.
    pub fn index(self) -> u32 {
        self.key.index()
    }

    /// Generation stamp of the slot when the resource was created.
    pub fn generation(self) -> u32 {
        self.key.generation()
    }

    /// Kind of the referenced resource.
    pub fn kind(self) -> ResourceKind {
        T::KIND
    }

    /// Type-erased form.
    pub fn erase(self) -> AnyHandle {
        AnyHandle {
            kind: T::KIND,
            key: self.key,
        }
    }
}

impl<T: ResourceType> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ResourceType> Copy for Handle<T> {}

impl<T: ResourceType> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T: ResourceType> Eq for Handle<T> {}

impl<T: ResourceType> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl<T: ResourceType> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}({}v{})",
            T::KIND,
            self.key.index(),
            self.key.generation()
        )
    }
}

impl<T: ResourceType> From<Handle<T>> for AnyHandle {
    fn from(handle: Handle<T>) -> Self {
        handle.erase()
    }
}

/// Type-erased resource handle: kind plus index and generation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnyHandle {
    kind: ResourceKind,
    key: ArenaKey,
}

impl AnyHandle {
    /// Kind of the referenced resource.
    pub fn kind(self) -> ResourceKind {
        self.kind
    }

    pub(crate) fn key(self) -> ArenaKey {
        self.key
    }

    /// Recovers the typed handle if the kind matches.
    pub fn downcast<T: ResourceType>(self) -> Option<Handle<T>> {
        (self.kind == T::KIND).then(|| Handle::from_key(self.key))
    }
}

impl fmt::Debug for AnyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}({}v{})",
            self.kind,
            self.key.index(),
            self.key.generation()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_order_is_destruction_order() {
        let mut sorted = ResourceKind::ALL;
        sorted.sort();
        assert_eq!(sorted, ResourceKind::ALL);
        assert!(ResourceKind::DescriptorSet < ResourceKind::DescriptorPool);
        assert!(ResourceKind::ImageView < ResourceKind::Image);
        assert!(ResourceKind::Buffer < ResourceKind::DeviceMemory);
    }

    #[test]
    fn test_erase_and_downcast() {
        let handle = Handle::<Buffer>::from_key(ArenaKey::from_raw_parts(3, 1));
        let any = handle.erase();
        assert_eq!(any.kind(), ResourceKind::Buffer);
        assert_eq!(any.downcast::<Buffer>(), Some(handle));
        assert_eq!(any.downcast::<Image>(), None);
    }

    #[test]
    fn test_debug_format() {
        let handle = Handle::<Image>::from_key(ArenaKey::from_raw_parts(7, 2));
        assert_eq!(format!("{handle:?}"), "Image(7v2)");
    }
}
