//! Bindless descriptor table slot allocation.
//!
//! A bindless uniform is one large, dynamically indexed descriptor array
//! (`binding` of a descriptor set created with update-after-bind). Shaders
//! index it with a slot number, so a freed slot may still be read by command
//! buffers in flight. Freed slots therefore carry the frame from which they
//! may be handed out again, `freed + lag + 1`, the same delay deferred
//! destruction uses.
//!
//! Logical contents change immediately; the descriptor writes that make them
//! visible to the GPU are batched per uniform and handed to the backend on
//! [`BindlessAllocator::flush`].

use std::collections::{BTreeMap, HashMap, VecDeque};

use parking_lot::{Mutex, RwLock};
use vesper_core::profiling::profile_scope;

use crate::backend::Backend;
use crate::config::{BindlessLimits, FrameLag};
use crate::error::{GraphicsError, GraphicsResult};
use crate::internal::ResourceInternals;
use crate::resources::{AnyHandle, Buffer, DescriptorSet, Handle, ImageView, Sampler};
use crate::types::DescriptorType;

/// Kind of resource a bindless table holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindlessCategory {
    SampledImage,
    StorageImage,
    StorageBuffer,
    Sampler,
}

impl BindlessCategory {
    /// Table capacity configured for this category.
    pub fn capacity(self, limits: &BindlessLimits) -> u32 {
        match self {
            Self::SampledImage => limits.sampled_images,
            Self::StorageImage => limits.storage_images,
            Self::StorageBuffer => limits.storage_buffers,
            Self::Sampler => limits.samplers,
        }
    }

    /// Descriptor type of the array binding.
    pub fn descriptor_type(self) -> DescriptorType {
        match self {
            Self::SampledImage => DescriptorType::SampledImage,
            Self::StorageImage => DescriptorType::StorageImage,
            Self::StorageBuffer => DescriptorType::StorageBuffer,
            Self::Sampler => DescriptorType::Sampler,
        }
    }
}

/// A resource stored in a bindless slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindlessResource {
    SampledImage(Handle<ImageView>),
    StorageImage(Handle<ImageView>),
    StorageBuffer(Handle<Buffer>),
    Sampler(Handle<Sampler>),
}

impl BindlessResource {
    pub fn category(&self) -> BindlessCategory {
        match self {
            Self::SampledImage(_) => BindlessCategory::SampledImage,
            Self::StorageImage(_) => BindlessCategory::StorageImage,
            Self::StorageBuffer(_) => BindlessCategory::StorageBuffer,
            Self::Sampler(_) => BindlessCategory::Sampler,
        }
    }

    pub fn handle(&self) -> AnyHandle {
        match *self {
            Self::SampledImage(view) | Self::StorageImage(view) => view.erase(),
            Self::StorageBuffer(buffer) => buffer.erase(),
            Self::Sampler(sampler) => sampler.erase(),
        }
    }
}

/// Identifies a registered bindless uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindlessUniformId(u32);

impl BindlessUniformId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where a bindless uniform lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindlessUniformDescriptor {
    pub category: BindlessCategory,
    /// Descriptor set holding the array.
    pub set: Handle<DescriptorSet>,
    /// Array binding within the set.
    pub binding: u32,
}

impl BindlessUniformDescriptor {
    pub fn new(category: BindlessCategory, set: Handle<DescriptorSet>, binding: u32) -> Self {
        Self {
            category,
            set,
            binding,
        }
    }
}

/// One deferred descriptor write; `None` clears the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindlessWrite {
    pub set: Handle<DescriptorSet>,
    pub binding: u32,
    pub slot: u32,
    pub resource: Option<BindlessResource>,
}

#[derive(Debug, Clone, Copy)]
struct FreeSlot {
    slot: u32,
    reusable_at: u64,
}

#[derive(Debug)]
struct BindlessTable {
    name: String,
    desc: BindlessUniformDescriptor,
    capacity: u32,
    /// Logical contents; the length is the high-water mark of handed-out slots.
    entries: Vec<Option<BindlessResource>>,
    free: VecDeque<FreeSlot>,
    pending: BTreeMap<u32, Option<BindlessResource>>,
}

impl BindlessTable {
    fn allocate(&mut self, resource: BindlessResource, frame: u64) -> u32 {
        let reusable = self
            .free
            .iter()
            .position(|free| frame >= free.reusable_at)
            .and_then(|index| self.free.remove(index));

        let slot = match reusable {
            Some(free) => free.slot,
            None => {
                let slot = self.entries.len() as u32;
                assert!(
                    slot < self.capacity,
                    "bindless uniform `{}` exhausted its {} slots",
                    self.name,
                    self.capacity
                );
                self.entries.push(None);
                slot
            }
        };

        self.entries[slot as usize] = Some(resource);
        self.pending.insert(slot, Some(resource));
        slot
    }

    fn update(&mut self, slot: u32, resource: BindlessResource) {
        let entry = self.entries.get_mut(slot as usize);
        debug_assert!(
            matches!(entry, Some(Some(_))),
            "update of unallocated slot {slot} in bindless uniform `{}`",
            self.name
        );
        if let Some(entry) = entry {
            *entry = Some(resource);
            self.pending.insert(slot, Some(resource));
        }
    }

    fn free(&mut self, slot: u32, reusable_at: u64) {
        let entry = self.entries.get_mut(slot as usize);
        debug_assert!(
            matches!(entry, Some(Some(_))),
            "double free of slot {slot} in bindless uniform `{}`",
            self.name
        );
        if let Some(entry) = entry
            && entry.is_some()
        {
            *entry = None;
            self.free.push_back(FreeSlot { slot, reusable_at });
            self.pending.insert(slot, None);
        }
    }

    fn take_writes(&mut self) -> Vec<BindlessWrite> {
        let set = self.desc.set;
        let binding = self.desc.binding;
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(slot, resource)| BindlessWrite {
                set,
                binding,
                slot,
                resource,
            })
            .collect()
    }

    fn restore_writes(&mut self, writes: Vec<BindlessWrite>) {
        for write in writes {
            self.pending.entry(write.slot).or_insert(write.resource);
        }
    }
}

/// Slot allocator for every registered bindless uniform.
#[derive(Debug)]
pub struct BindlessAllocator {
    lag: FrameLag,
    limits: BindlessLimits,
    names: RwLock<HashMap<String, BindlessUniformId>>,
    tables: RwLock<Vec<Mutex<BindlessTable>>>,
}

impl BindlessAllocator {
    pub fn new(lag: FrameLag, limits: BindlessLimits) -> Self {
        Self {
            lag,
            limits,
            names: RwLock::new(HashMap::new()),
            tables: RwLock::new(Vec::new()),
        }
    }

    /// Frame lag slot reuse is delayed by.
    pub fn lag(&self) -> FrameLag {
        self.lag
    }

    /// Creates the table for a uniform, sized by its category's limit.
    pub fn register_uniform(
        &self,
        name: impl Into<String>,
        desc: BindlessUniformDescriptor,
    ) -> GraphicsResult<BindlessUniformId> {
        let name = name.into();
        let mut names = self.names.write();
        if names.contains_key(&name) {
            return Err(GraphicsError::InvalidParameter(format!(
                "bindless uniform `{name}` is already registered"
            )));
        }

        let capacity = desc.category.capacity(&self.limits);
        let mut tables = self.tables.write();
        let id = BindlessUniformId(tables.len() as u32);
        log::debug!(
            "Registered bindless uniform `{name}` ({:?}, {capacity} slots)",
            desc.category
        );
        tables.push(Mutex::new(BindlessTable {
            name: name.clone(),
            desc,
            capacity,
            entries: Vec::new(),
            free: VecDeque::new(),
            pending: BTreeMap::new(),
        }));
        names.insert(name, id);
        Ok(id)
    }

    /// Looks up a uniform by name.
    pub fn uniform(&self, name: &str) -> Option<BindlessUniformId> {
        self.names.read().get(name).copied()
    }

    fn with_table<R>(
        &self,
        uniform: BindlessUniformId,
        f: impl FnOnce(&mut BindlessTable) -> R,
    ) -> R {
        let tables = self.tables.read();
        let Some(table) = tables.get(uniform.index()) else {
            panic!("unknown bindless uniform {uniform:?}");
        };
        f(&mut table.lock())
    }

    /// Stores `resource` in a slot and returns the slot.
    ///
    /// A freed slot is reused once `frame` reaches its release frame;
    /// otherwise the table grows. Growing past capacity panics.
    pub fn allocate(&self, uniform: BindlessUniformId, resource: BindlessResource, frame: u64) -> u32 {
        self.with_table(uniform, |table| {
            debug_assert_eq!(
                resource.category(),
                table.desc.category,
                "wrong resource category for bindless uniform `{}`",
                table.name
            );
            let slot = table.allocate(resource, frame);
            log::trace!("`{}`[{slot}] = {:?} at frame {frame}", table.name, resource.handle());
            slot
        })
    }

    /// Replaces the resource in an allocated slot.
    pub fn update(&self, uniform: BindlessUniformId, slot: u32, resource: BindlessResource, frame: u64) {
        self.with_table(uniform, |table| {
            debug_assert_eq!(resource.category(), table.desc.category);
            table.update(slot, resource);
            log::trace!("`{}`[{slot}] updated at frame {frame}", table.name);
        })
    }

    /// Releases a slot. It becomes reusable at `frame + lag + 1`.
    pub fn free(&self, uniform: BindlessUniformId, slot: u32, frame: u64) {
        let reusable_at = self.lag.release_frame(frame);
        self.with_table(uniform, |table| {
            table.free(slot, reusable_at);
            log::trace!(
                "`{}`[{slot}] freed at frame {frame}, reusable at {reusable_at}",
                table.name
            );
        })
    }

    /// Hands the uniform's pending descriptor writes to the backend in one call.
    ///
    /// Writes whose descriptor set or resource has been destroyed are dropped
    /// with an error log; destroying either while it is still bound to a slot
    /// is a programmer error caught at the destroy. Returns the number of
    /// writes. On backend failure the writes stay pending.
    pub fn flush(
        &self,
        uniform: BindlessUniformId,
        backend: &dyn Backend,
        resources: &ResourceInternals<'_>,
    ) -> GraphicsResult<usize> {
        profile_scope!("bindless_flush");

        self.with_table(uniform, |table| {
            let mut writes = table.take_writes();
            if writes.is_empty() {
                return Ok(0);
            }
            if !resources.is_alive_any(table.desc.set.erase()) {
                log::error!(
                    "Dropping {} writes to `{}`: {:?} was destroyed",
                    writes.len(),
                    table.name,
                    table.desc.set
                );
                return Ok(0);
            }
            writes.retain(|write| match write.resource {
                Some(resource) if !resources.is_alive_any(resource.handle()) => {
                    log::error!(
                        "Dropping write of destroyed {:?} to `{}`[{}]",
                        resource.handle(),
                        table.name,
                        write.slot
                    );
                    false
                }
                _ => true,
            });
            if writes.is_empty() {
                return Ok(0);
            }

            log::debug!("Flushing {} writes to `{}`", writes.len(), table.name);
            match backend.write_bindless(&writes, resources) {
                Ok(()) => Ok(writes.len()),
                Err(err) => {
                    table.restore_writes(writes);
                    Err(err)
                }
            }
        })
    }

    /// Flushes every registered uniform, continuing past failures.
    ///
    /// Returns the number of writes and the descriptor set of every uniform
    /// whose flush failed.
    pub fn flush_each(
        &self,
        backend: &dyn Backend,
        resources: &ResourceInternals<'_>,
    ) -> (usize, Vec<(Handle<DescriptorSet>, GraphicsError)>) {
        let count = self.tables.read().len();
        let mut written = 0;
        let mut failed = Vec::new();
        for index in 0..count {
            let uniform = BindlessUniformId(index as u32);
            match self.flush(uniform, backend, resources) {
                Ok(n) => written += n,
                Err(err) => {
                    let set = self.with_table(uniform, |table| table.desc.set);
                    failed.push((set, err));
                }
            }
        }
        (written, failed)
    }

    /// Flushes every registered uniform.
    ///
    /// Every uniform is attempted; the first failure is returned.
    pub fn flush_all(
        &self,
        backend: &dyn Backend,
        resources: &ResourceInternals<'_>,
    ) -> GraphicsResult<usize> {
        let (written, failed) = self.flush_each(backend, resources);
        match failed.into_iter().next() {
            Some((_, err)) => Err(err),
            None => Ok(written),
        }
    }

    /// Number of freed slots whose delay ends exactly at `frame`.
    ///
    /// Read-only: slots are reused lazily by [`allocate`](Self::allocate).
    pub fn released_at(&self, frame: u64) -> usize {
        self.tables
            .read()
            .iter()
            .map(|table| {
                table
                    .lock()
                    .free
                    .iter()
                    .filter(|free| free.reusable_at == frame)
                    .count()
            })
            .sum()
    }

    /// Whether a live slot or a uniform's descriptor set refers to `handle`.
    pub fn references(&self, handle: AnyHandle) -> bool {
        self.tables.read().iter().any(|table| {
            let table = table.lock();
            table.desc.set.erase() == handle
                || table
                    .entries
                    .iter()
                    .flatten()
                    .any(|resource| resource.handle() == handle)
        })
    }

    /// Slots currently holding a resource.
    pub fn occupied(&self, uniform: BindlessUniformId) -> usize {
        self.with_table(uniform, |table| {
            table.entries.iter().filter(|entry| entry.is_some()).count()
        })
    }

    /// Resource held by a slot.
    pub fn get(&self, uniform: BindlessUniformId, slot: u32) -> Option<BindlessResource> {
        self.with_table(uniform, |table| {
            table.entries.get(slot as usize).copied().flatten()
        })
    }

    /// Writes waiting for the next flush.
    pub fn pending_writes(&self, uniform: BindlessUniformId) -> usize {
        self.with_table(uniform, |table| table.pending.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, NativeCall, NativeHandle};
    use crate::resources::{Readiness, ResourceRegistry};
    use crate::types::{BufferDescriptor, BufferUsage, DescriptorSetDescriptor};

    struct Fixture {
        registry: ResourceRegistry,
        set: Handle<DescriptorSet>,
        buffers: Vec<Handle<Buffer>>,
    }

    fn fixture() -> Fixture {
        let registry = ResourceRegistry::new();
        let set = registry.insert::<DescriptorSet>(
            DescriptorSetDescriptor {
                label: None,
                pool: Handle::from_key(vesper_core::arena::ArenaKey::from_raw_parts(0, 0)),
                layout: Handle::from_key(vesper_core::arena::ArenaKey::from_raw_parts(0, 0)),
            },
            NativeHandle::new(100),
            Readiness::Ready,
        );
        let buffers = (0..8)
            .map(|i| {
                registry.insert::<Buffer>(
                    BufferDescriptor::new(16, BufferUsage::STORAGE),
                    NativeHandle::new(i + 1),
                    Readiness::Ready,
                )
            })
            .collect();
        Fixture {
            registry,
            set,
            buffers,
        }
    }

    fn allocator(limits: BindlessLimits) -> BindlessAllocator {
        BindlessAllocator::new(FrameLag::new(2), limits)
    }

    #[test]
    fn test_reuse_waits_for_lag() {
        let f = fixture();
        let bindless = allocator(BindlessLimits::default());
        let textures = bindless
            .register_uniform(
                "textures",
                BindlessUniformDescriptor::new(BindlessCategory::StorageBuffer, f.set, 0),
            )
            .unwrap();
        let res = |i: usize| BindlessResource::StorageBuffer(f.buffers[i]);

        for i in 0..3 {
            assert_eq!(bindless.allocate(textures, res(i), 5), i as u32);
        }
        assert_eq!(bindless.allocate(textures, res(3), 5), 3);
        bindless.free(textures, 3, 5);

        assert_ne!(bindless.allocate(textures, res(4), 6), 3);
        assert_ne!(bindless.allocate(textures, res(5), 7), 3);
        assert_eq!(bindless.allocate(textures, res(6), 8), 3);
    }

    #[test]
    fn test_free_clears_entry() {
        let f = fixture();
        let bindless = allocator(BindlessLimits::default());
        let uniform = bindless
            .register_uniform(
                "buffers",
                BindlessUniformDescriptor::new(BindlessCategory::StorageBuffer, f.set, 1),
            )
            .unwrap();

        let res = BindlessResource::StorageBuffer(f.buffers[0]);
        let slot = bindless.allocate(uniform, res, 0);
        assert_eq!(bindless.get(uniform, slot), Some(res));
        assert_eq!(bindless.occupied(uniform), 1);

        bindless.free(uniform, slot, 0);
        assert_eq!(bindless.get(uniform, slot), None);
        assert_eq!(bindless.occupied(uniform), 0);
    }

    #[test]
    fn test_flush_batches_last_write_per_slot() {
        let f = fixture();
        let backend = DummyBackend::new();
        let resources = ResourceInternals::new(&f.registry);
        let bindless = allocator(BindlessLimits::default());
        let uniform = bindless
            .register_uniform(
                "buffers",
                BindlessUniformDescriptor::new(BindlessCategory::StorageBuffer, f.set, 2),
            )
            .unwrap();

        let a = BindlessResource::StorageBuffer(f.buffers[0]);
        let b = BindlessResource::StorageBuffer(f.buffers[1]);
        let slot = bindless.allocate(uniform, a, 0);
        bindless.update(uniform, slot, b, 0);
        assert_eq!(bindless.pending_writes(uniform), 1);

        assert_eq!(bindless.flush(uniform, &backend, &resources).unwrap(), 1);
        assert_eq!(bindless.pending_writes(uniform), 0);
        assert_eq!(
            backend.calls(),
            vec![NativeCall::WriteBindless {
                writes: vec![BindlessWrite {
                    set: f.set,
                    binding: 2,
                    slot,
                    resource: Some(b),
                }]
            }]
        );

        bindless.free(uniform, slot, 1);
        assert_eq!(bindless.flush_all(&backend, &resources).unwrap(), 1);
        assert_eq!(bindless.flush_all(&backend, &resources).unwrap(), 0);
    }

    #[test]
    fn test_cleared_slots_reach_the_backend() {
        let f = fixture();
        let backend = DummyBackend::new();
        let resources = ResourceInternals::new(&f.registry);
        let bindless = allocator(BindlessLimits::default());
        let uniform = bindless
            .register_uniform(
                "buffers",
                BindlessUniformDescriptor::new(BindlessCategory::StorageBuffer, f.set, 0),
            )
            .unwrap();

        let slot = bindless.allocate(uniform, BindlessResource::StorageBuffer(f.buffers[0]), 0);
        bindless.flush(uniform, &backend, &resources).unwrap();
        backend.clear_calls();

        bindless.free(uniform, slot, 0);
        assert_eq!(bindless.flush(uniform, &backend, &resources).unwrap(), 1);
        let calls = backend.calls();
        let [NativeCall::WriteBindless { writes }] = calls.as_slice() else {
            panic!("expected one bindless write, got {calls:?}");
        };
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].slot, slot);
        assert_eq!(writes[0].resource, None);
    }

    #[test]
    fn test_flush_drops_writes_to_destroyed_set() {
        let f = fixture();
        let backend = DummyBackend::new();
        let resources = ResourceInternals::new(&f.registry);
        let bindless = allocator(BindlessLimits::default());
        let uniform = bindless
            .register_uniform(
                "buffers",
                BindlessUniformDescriptor::new(BindlessCategory::StorageBuffer, f.set, 0),
            )
            .unwrap();
        bindless.allocate(uniform, BindlessResource::StorageBuffer(f.buffers[0]), 0);
        assert!(f.registry.remove(f.set).is_some());

        assert_eq!(bindless.flush(uniform, &backend, &resources).unwrap(), 0);
        assert_eq!(bindless.pending_writes(uniform), 0);
        assert!(backend.calls().is_empty());
        assert_eq!(bindless.flush_all(&backend, &resources).unwrap(), 0);
    }

    #[test]
    fn test_flush_drops_writes_of_destroyed_resources() {
        let f = fixture();
        let backend = DummyBackend::new();
        let resources = ResourceInternals::new(&f.registry);
        let bindless = allocator(BindlessLimits::default());
        let uniform = bindless
            .register_uniform(
                "buffers",
                BindlessUniformDescriptor::new(BindlessCategory::StorageBuffer, f.set, 0),
            )
            .unwrap();
        let gone = bindless.allocate(uniform, BindlessResource::StorageBuffer(f.buffers[0]), 0);
        let kept = bindless.allocate(uniform, BindlessResource::StorageBuffer(f.buffers[1]), 0);
        assert!(f.registry.remove(f.buffers[0]).is_some());

        assert_eq!(bindless.flush(uniform, &backend, &resources).unwrap(), 1);
        let calls = backend.calls();
        let [NativeCall::WriteBindless { writes }] = calls.as_slice() else {
            panic!("expected one write batch");
        };
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].slot, kept);
        assert_ne!(writes[0].slot, gone);
    }

    #[test]
    fn test_failed_flush_keeps_writes_and_continues() {
        let f = fixture();
        let backend = DummyBackend::new();
        let resources = ResourceInternals::new(&f.registry);
        let bindless = allocator(BindlessLimits::default());
        let first = bindless
            .register_uniform(
                "first",
                BindlessUniformDescriptor::new(BindlessCategory::StorageBuffer, f.set, 0),
            )
            .unwrap();
        let second = bindless
            .register_uniform(
                "second",
                BindlessUniformDescriptor::new(BindlessCategory::StorageBuffer, f.set, 1),
            )
            .unwrap();
        bindless.allocate(first, BindlessResource::StorageBuffer(f.buffers[0]), 0);
        bindless.allocate(second, BindlessResource::StorageBuffer(f.buffers[1]), 0);

        backend.set_fail_bindless_writes(true);
        let (written, failed) = bindless.flush_each(&backend, &resources);
        assert_eq!(written, 0);
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().all(|(set, _)| *set == f.set));
        assert_eq!(bindless.pending_writes(first), 1);
        assert_eq!(bindless.pending_writes(second), 1);

        backend.set_fail_bindless_writes(false);
        assert_eq!(bindless.flush_all(&backend, &resources).unwrap(), 2);
    }

    #[test]
    fn test_references_slots_and_sets() {
        let f = fixture();
        let bindless = allocator(BindlessLimits::default());
        let uniform = bindless
            .register_uniform(
                "buffers",
                BindlessUniformDescriptor::new(BindlessCategory::StorageBuffer, f.set, 0),
            )
            .unwrap();
        let slot = bindless.allocate(uniform, BindlessResource::StorageBuffer(f.buffers[0]), 0);
        assert!(bindless.references(f.set.erase()));
        assert!(bindless.references(f.buffers[0].erase()));
        assert!(!bindless.references(f.buffers[1].erase()));

        bindless.free(uniform, slot, 0);
        assert!(!bindless.references(f.buffers[0].erase()));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let f = fixture();
        let bindless = allocator(BindlessLimits::default());
        let desc = BindlessUniformDescriptor::new(BindlessCategory::Sampler, f.set, 0);
        let id = bindless.register_uniform("samplers", desc.clone()).unwrap();
        assert_eq!(bindless.uniform("samplers"), Some(id));
        assert!(matches!(
            bindless.register_uniform("samplers", desc),
            Err(GraphicsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_released_at_counts_slots() {
        let f = fixture();
        let bindless = allocator(BindlessLimits::default());
        let uniform = bindless
            .register_uniform(
                "buffers",
                BindlessUniformDescriptor::new(BindlessCategory::StorageBuffer, f.set, 0),
            )
            .unwrap();
        let slot = bindless.allocate(uniform, BindlessResource::StorageBuffer(f.buffers[0]), 1);
        bindless.free(uniform, slot, 1);
        assert_eq!(bindless.released_at(3), 0);
        assert_eq!(bindless.released_at(4), 1);
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn test_capacity_is_hard_limit() {
        let f = fixture();
        let bindless = allocator(BindlessLimits {
            storage_buffers: 2,
            ..Default::default()
        });
        let uniform = bindless
            .register_uniform(
                "buffers",
                BindlessUniformDescriptor::new(BindlessCategory::StorageBuffer, f.set, 0),
            )
            .unwrap();
        for i in 0..3 {
            bindless.allocate(uniform, BindlessResource::StorageBuffer(f.buffers[i]), 0);
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "double free")]
    fn test_double_free_asserts() {
        let f = fixture();
        let bindless = allocator(BindlessLimits::default());
        let uniform = bindless
            .register_uniform(
                "buffers",
                BindlessUniformDescriptor::new(BindlessCategory::StorageBuffer, f.set, 0),
            )
            .unwrap();
        let slot = bindless.allocate(uniform, BindlessResource::StorageBuffer(f.buffers[0]), 0);
        bindless.free(uniform, slot, 0);
        bindless.free(uniform, slot, 0);
    }
}
