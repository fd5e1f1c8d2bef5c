//! Central resource pools.
//!
//! The registry owns one generational [`Arena`] per resource type. Each entry
//! holds the creation descriptor, the backend's [`NativeHandle`], readiness,
//! the busy counter shared with every [`ResourceLock`] taken on it, and the
//! synchronization state committed by the last submitted command buffer.
//!
//! Command buffers and bindless tables only reference entries through
//! handles; removing an entry is the first half of a destroy, the native
//! object itself goes through the destruction queue.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;
use vesper_core::arena::Arena;

use super::handle::{
    AnyHandle, Buffer, DescriptorPool, DescriptorSet, DescriptorSetLayout, Framebuffer, Handle,
    Image, ImageView, Pipeline, RenderPass, ResourceKind, ResourceType, Sampler,
};
use super::lock::ResourceLock;
use crate::backend::NativeHandle;
use crate::destruction::DestroyRecord;
use crate::types::{BufferState, ImageState};

/// Storage for one resource type.
pub type Pool<T> = RwLock<Arena<ResourceEntry<T>>>;

/// Whether a resource may be used yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Readiness {
    /// An initial-data upload is still in flight.
    Pending,
    Ready,
}

/// One live resource.
pub struct ResourceEntry<T: ResourceType> {
    pub(crate) descriptor: T::Descriptor,
    pub(crate) native: NativeHandle,
    pub(crate) readiness: Readiness,
    pub(crate) busy: Arc<AtomicU32>,
    pub(crate) committed: T::Committed,
}

impl<T: ResourceType> ResourceEntry<T> {
    fn new(descriptor: T::Descriptor, native: NativeHandle, readiness: Readiness) -> Self {
        Self {
            descriptor,
            native,
            readiness,
            busy: Arc::new(AtomicU32::new(0)),
            committed: T::Committed::default(),
        }
    }

    /// Number of submitted command buffers still referencing this resource.
    pub(crate) fn busy_count(&self) -> u32 {
        self.busy.load(Ordering::Acquire)
    }

    /// Destroy records for the native object and its backing memory.
    pub(crate) fn destroy_records(&self) -> impl Iterator<Item = DestroyRecord> {
        let object = DestroyRecord::new(T::KIND, [self.native.object, self.native.aux])
            .with_busy(Arc::clone(&self.busy));
        let memory = self.native.memory.map(|memory| {
            DestroyRecord::new(ResourceKind::DeviceMemory, [memory, 0])
                .with_busy(Arc::clone(&self.busy))
        });
        std::iter::once(object).chain(memory)
    }
}

impl<T: ResourceType> fmt::Debug for ResourceEntry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceEntry")
            .field("kind", &T::KIND)
            .field("native", &self.native)
            .field("readiness", &self.readiness)
            .field("busy", &self.busy_count())
            .finish_non_exhaustive()
    }
}

/// Snapshot of a resource returned by `RenderDevice::get`.
#[derive(Debug, Clone)]
pub struct ResourceView<T: ResourceType> {
    pub handle: Handle<T>,
    pub descriptor: T::Descriptor,
    pub native: NativeHandle,
    pub ready: bool,
    pub busy: u32,
}

/// Runs `$body` with `$t` aliased to the marker type for `$kind`.
///
/// `DeviceMemory` has no pool and evaluates `$memory`.
macro_rules! with_resource_type {
    ($kind:expr, $t:ident => $body:expr, memory => $memory:expr) => {
        match $kind {
            ResourceKind::Buffer => {
                type $t = Buffer;
                $body
            }
            ResourceKind::Image => {
                type $t = Image;
                $body
            }
            ResourceKind::ImageView => {
                type $t = ImageView;
                $body
            }
            ResourceKind::Sampler => {
                type $t = Sampler;
                $body
            }
            ResourceKind::RenderPass => {
                type $t = RenderPass;
                $body
            }
            ResourceKind::Framebuffer => {
                type $t = Framebuffer;
                $body
            }
            ResourceKind::Pipeline => {
                type $t = Pipeline;
                $body
            }
            ResourceKind::DescriptorSetLayout => {
                type $t = DescriptorSetLayout;
                $body
            }
            ResourceKind::DescriptorPool => {
                type $t = DescriptorPool;
                $body
            }
            ResourceKind::DescriptorSet => {
                type $t = DescriptorSet;
                $body
            }
            ResourceKind::DeviceMemory => $memory,
        }
    };
}

/// Registry of every live resource, one pool per type.
#[derive(Default)]
pub struct ResourceRegistry {
    pub(crate) buffers: Pool<Buffer>,
    pub(crate) images: Pool<Image>,
    pub(crate) image_views: Pool<ImageView>,
    pub(crate) samplers: Pool<Sampler>,
    pub(crate) render_passes: Pool<RenderPass>,
    pub(crate) framebuffers: Pool<Framebuffer>,
    pub(crate) pipelines: Pool<Pipeline>,
    pub(crate) descriptor_set_layouts: Pool<DescriptorSetLayout>,
    pub(crate) descriptor_pools: Pool<DescriptorPool>,
    pub(crate) descriptor_sets: Pool<DescriptorSet>,
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("buffers", &self.len::<Buffer>())
            .field("images", &self.len::<Image>())
            .field("image_views", &self.len::<ImageView>())
            .field("samplers", &self.len::<Sampler>())
            .field("pipelines", &self.len::<Pipeline>())
            .finish_non_exhaustive()
    }
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new resource.
    pub(crate) fn insert<T: ResourceType>(
        &self,
        descriptor: T::Descriptor,
        native: NativeHandle,
        readiness: Readiness,
    ) -> Handle<T> {
        let key = T::pool(self)
            .write()
            .insert(ResourceEntry::new(descriptor, native, readiness));
        let handle = Handle::from_key(key);
        log::trace!("Registered {handle:?} ({readiness:?})");
        handle
    }

    /// Removes a resource, returning its entry.
    pub(crate) fn remove<T: ResourceType>(&self, handle: Handle<T>) -> Option<ResourceEntry<T>> {
        T::pool(self).write().remove(handle.key())
    }

    /// Runs `f` on a live entry.
    pub(crate) fn with<T: ResourceType, R>(
        &self,
        handle: Handle<T>,
        f: impl FnOnce(&ResourceEntry<T>) -> R,
    ) -> Option<R> {
        T::pool(self).read().get(handle.key()).map(f)
    }

    /// Runs `f` on a live entry mutably.
    pub(crate) fn with_mut<T: ResourceType, R>(
        &self,
        handle: Handle<T>,
        f: impl FnOnce(&mut ResourceEntry<T>) -> R,
    ) -> Option<R> {
        T::pool(self).write().get_mut(handle.key()).map(f)
    }

    /// Native handle of a live resource.
    pub fn native<T: ResourceType>(&self, handle: Handle<T>) -> Option<NativeHandle> {
        self.with(handle, |entry| entry.native)
    }

    /// Native handle of a live resource of any kind.
    pub fn native_any(&self, handle: AnyHandle) -> Option<NativeHandle> {
        with_resource_type!(handle.kind(), T => {
            self.native(Handle::<T>::from_key(handle.key()))
        }, memory => None)
    }

    /// Creation descriptor of a live resource.
    pub fn descriptor<T: ResourceType>(&self, handle: Handle<T>) -> Option<T::Descriptor> {
        self.with(handle, |entry| entry.descriptor.clone())
    }

    /// Snapshot of a live resource.
    pub fn view<T: ResourceType>(&self, handle: Handle<T>) -> Option<ResourceView<T>> {
        self.with(handle, |entry| ResourceView {
            handle,
            descriptor: entry.descriptor.clone(),
            native: entry.native,
            ready: entry.readiness == Readiness::Ready,
            busy: entry.busy_count(),
        })
    }

    /// Whether the handle resolves to a live resource.
    pub fn is_alive<T: ResourceType>(&self, handle: Handle<T>) -> bool {
        T::pool(self).read().contains(handle.key())
    }

    /// Whether a type-erased handle resolves to a live resource.
    pub fn is_alive_any(&self, handle: AnyHandle) -> bool {
        with_resource_type!(handle.kind(), T => {
            self.is_alive(Handle::<T>::from_key(handle.key()))
        }, memory => false)
    }

    /// Whether the resource is alive with no upload in flight.
    pub fn is_ready<T: ResourceType>(&self, handle: Handle<T>) -> bool {
        self.with(handle, |entry| entry.readiness == Readiness::Ready)
            .unwrap_or(false)
    }

    /// Whether any submitted command buffer still holds a lock on the resource.
    pub fn is_busy<T: ResourceType>(&self, handle: Handle<T>) -> bool {
        self.with(handle, |entry| entry.busy_count() > 0)
            .unwrap_or(false)
    }

    /// Number of live resources of type `T`.
    pub fn len<T: ResourceType>(&self) -> usize {
        T::pool(self).read().len()
    }

    pub(crate) fn set_native<T: ResourceType>(
        &self,
        handle: Handle<T>,
        native: NativeHandle,
    ) -> Option<NativeHandle> {
        self.with_mut(handle, |entry| std::mem::replace(&mut entry.native, native))
    }

    pub(crate) fn set_readiness<T: ResourceType>(
        &self,
        handle: Handle<T>,
        readiness: Readiness,
    ) -> bool {
        self.with_mut(handle, |entry| entry.readiness = readiness)
            .is_some()
    }

    pub(crate) fn mark_ready_any(&self, handle: AnyHandle) -> bool {
        with_resource_type!(handle.kind(), T => {
            self.set_readiness(Handle::<T>::from_key(handle.key()), Readiness::Ready)
        }, memory => false)
    }

    /// Takes a lock on a live resource.
    pub(crate) fn lock(&self, handle: AnyHandle) -> Option<ResourceLock> {
        let busy = with_resource_type!(handle.kind(), T => {
            self.with(Handle::<T>::from_key(handle.key()), |entry| Arc::clone(&entry.busy))
        }, memory => None)?;
        Some(ResourceLock::acquire(handle, busy))
    }

    /// State the last submitted command buffer left a subresource in.
    pub(crate) fn committed_image_state(&self, image: Handle<Image>, mip: u32, layer: u32) -> ImageState {
        self.with(image, |entry| {
            let index = (mip * entry.descriptor.array_layers + layer) as usize;
            entry
                .committed
                .get(index)
                .copied()
                .unwrap_or(ImageState::UNDEFINED)
        })
        .unwrap_or(ImageState::UNDEFINED)
    }

    /// State the last submitted command buffer left a buffer in, if any.
    pub(crate) fn committed_buffer_state(&self, buffer: Handle<Buffer>) -> Option<BufferState> {
        self.with(buffer, |entry| entry.committed).flatten()
    }

    /// Records the final states of a submitted command buffer.
    pub(crate) fn commit_states(
        &self,
        images: impl IntoIterator<Item = (Handle<Image>, u32, u32, ImageState)>,
        buffers: impl IntoIterator<Item = (Handle<Buffer>, BufferState)>,
    ) {
        {
            let mut pool = self.images.write();
            for (image, mip, layer, state) in images {
                let Some(entry) = pool.get_mut(image.key()) else {
                    continue;
                };
                let count = entry.descriptor.subresource_count();
                if entry.committed.len() != count {
                    entry.committed.resize(count, ImageState::UNDEFINED);
                }
                let index = (mip * entry.descriptor.array_layers + layer) as usize;
                if let Some(slot) = entry.committed.get_mut(index) {
                    *slot = state;
                }
            }
        }

        let mut pool = self.buffers.write();
        for (buffer, state) in buffers {
            if let Some(entry) = pool.get_mut(buffer.key()) {
                entry.committed = Some(state);
            }
        }
    }

    /// Removes every live resource, returning destroy records for all of them.
    ///
    /// Records come back in destruction order.
    pub(crate) fn drain_records(&self) -> Vec<DestroyRecord> {
        fn drain<T: ResourceType>(registry: &ResourceRegistry, out: &mut Vec<DestroyRecord>) {
            for (_, entry) in T::pool(registry).write().drain() {
                out.extend(entry.destroy_records());
            }
        }

        let mut records = Vec::new();
        drain::<DescriptorSet>(self, &mut records);
        drain::<Framebuffer>(self, &mut records);
        drain::<Pipeline>(self, &mut records);
        drain::<RenderPass>(self, &mut records);
        drain::<DescriptorPool>(self, &mut records);
        drain::<DescriptorSetLayout>(self, &mut records);
        drain::<ImageView>(self, &mut records);
        drain::<Sampler>(self, &mut records);
        drain::<Image>(self, &mut records);
        drain::<Buffer>(self, &mut records);
        records
    }

    /// Handles among `handles` that no longer resolve.
    pub(crate) fn dead_handles<'a>(
        &self,
        handles: impl IntoIterator<Item = &'a AnyHandle>,
    ) -> Vec<AnyHandle> {
        let mut seen = HashSet::new();
        handles
            .into_iter()
            .copied()
            .filter(|handle| seen.insert(*handle) && !self.is_alive_any(*handle))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BufferDescriptor, BufferUsage, ImageDescriptor, ImageFormat, ImageUsage};

    fn buffer_desc() -> BufferDescriptor {
        BufferDescriptor::new(64, BufferUsage::VERTEX)
    }

    #[test]
    fn test_insert_and_resolve() {
        let registry = ResourceRegistry::new();
        let native = NativeHandle::new(42);
        let handle = registry.insert::<Buffer>(buffer_desc(), native, Readiness::Ready);

        assert!(registry.is_alive(handle));
        assert!(registry.is_ready(handle));
        assert_eq!(registry.native(handle), Some(native));
        assert_eq!(registry.native_any(handle.erase()), Some(native));
        assert_eq!(registry.len::<Buffer>(), 1);
    }

    #[test]
    fn test_stale_handle_does_not_resolve() {
        let registry = ResourceRegistry::new();
        let old = registry.insert::<Buffer>(buffer_desc(), NativeHandle::new(1), Readiness::Ready);
        registry.remove(old);
        let new = registry.insert::<Buffer>(buffer_desc(), NativeHandle::new(2), Readiness::Ready);

        assert_eq!(old.index(), new.index());
        assert!(!registry.is_alive(old));
        assert!(registry.native(old).is_none());
        assert!(!registry.is_ready(old));
    }

    #[test]
    fn test_pending_until_marked_ready() {
        let registry = ResourceRegistry::new();
        let handle =
            registry.insert::<Buffer>(buffer_desc(), NativeHandle::new(1), Readiness::Pending);
        assert!(registry.is_alive(handle));
        assert!(!registry.is_ready(handle));

        assert!(registry.mark_ready_any(handle.erase()));
        assert!(registry.is_ready(handle));
    }

    #[test]
    fn test_lock_tracks_busy() {
        let registry = ResourceRegistry::new();
        let handle = registry.insert::<Buffer>(buffer_desc(), NativeHandle::new(1), Readiness::Ready);

        let lock = registry.lock(handle.erase()).unwrap();
        assert!(registry.is_busy(handle));
        drop(lock);
        assert!(!registry.is_busy(handle));
    }

    #[test]
    fn test_committed_image_states() {
        let registry = ResourceRegistry::new();
        let desc = ImageDescriptor::new_2d(8, 8, ImageFormat::Rgba8Unorm, ImageUsage::SAMPLED)
            .with_mip_levels(2)
            .with_array_layers(2);
        let image = registry.insert::<Image>(desc, NativeHandle::new(9), Readiness::Ready);

        assert_eq!(
            registry.committed_image_state(image, 1, 1),
            ImageState::UNDEFINED
        );

        let state = crate::types::ImageAccess::FragmentShaderRead.state();
        registry.commit_states([(image, 1, 1, state)], []);
        assert_eq!(registry.committed_image_state(image, 1, 1), state);
        assert_eq!(
            registry.committed_image_state(image, 0, 1),
            ImageState::UNDEFINED
        );
    }

    #[test]
    fn test_drain_records_in_destruction_order() {
        let registry = ResourceRegistry::new();
        registry.insert::<Buffer>(
            buffer_desc(),
            NativeHandle::new(1).with_memory(100),
            Readiness::Ready,
        );
        registry.insert::<Sampler>(Default::default(), NativeHandle::new(2), Readiness::Ready);

        let kinds: Vec<_> = registry.drain_records().iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::Sampler,
                ResourceKind::Buffer,
                ResourceKind::DeviceMemory
            ]
        );
        assert_eq!(registry.len::<Buffer>(), 0);
    }
}
