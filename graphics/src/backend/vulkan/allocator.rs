//! GPU memory allocator integration using gpu-allocator.
//!
//! Allocations are owned here and addressed by a numeric id, which is what
//! travels in [`NativeHandle::memory`](crate::backend::NativeHandle) and in
//! `DeviceMemory` destroy records.

use std::collections::HashMap;

use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use parking_lot::Mutex;

use crate::error::{GraphicsError, GraphicsResult};

/// Create a memory allocator for the Vulkan device.
pub fn create_allocator(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
) -> GraphicsResult<Allocator> {
    let allocator = Allocator::new(&AllocatorCreateDesc {
        instance: instance.clone(),
        device,
        physical_device,
        debug_settings: Default::default(),
        buffer_device_address: false,
        allocation_sizes: gpu_allocator::AllocationSizes::default(),
    })
    .map_err(|e| {
        GraphicsError::ResourceCreationFailed(format!("Failed to create memory allocator: {}", e))
    })?;

    Ok(allocator)
}

/// Memory block bound to a buffer or image.
#[derive(Debug, Clone, Copy)]
pub struct BoundMemory {
    pub id: u64,
    pub memory: vk::DeviceMemory,
    pub offset: u64,
}

struct Allocations {
    next_id: u64,
    live: HashMap<u64, Allocation>,
}

/// Allocator plus the table of live allocations.
pub struct MemoryManager {
    allocator: Mutex<Allocator>,
    allocations: Mutex<Allocations>,
}

impl std::fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryManager")
            .field("live", &self.live_count())
            .finish_non_exhaustive()
    }
}

impl MemoryManager {
    pub fn new(allocator: Allocator) -> Self {
        Self {
            allocator: Mutex::new(allocator),
            allocations: Mutex::new(Allocations {
                next_id: 1,
                live: HashMap::new(),
            }),
        }
    }

    /// Allocates memory for `requirements` and registers it under a fresh id.
    pub fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: gpu_allocator::MemoryLocation,
        linear: bool,
    ) -> GraphicsResult<BoundMemory> {
        let allocation = self
            .allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| match e {
                gpu_allocator::AllocationError::OutOfMemory => GraphicsError::OutOfMemory,
                other => GraphicsError::ResourceCreationFailed(format!(
                    "Failed to allocate memory for {name}: {other}"
                )),
            })?;

        // SAFETY: the allocation is alive; the memory handle is only used for binding.
        let memory = unsafe { allocation.memory() };
        let offset = allocation.offset();

        let mut allocations = self.allocations.lock();
        let id = allocations.next_id;
        allocations.next_id += 1;
        allocations.live.insert(id, allocation);

        Ok(BoundMemory { id, memory, offset })
    }

    /// Copies `data` into a host-visible allocation.
    pub fn write(&self, id: u64, data: &[u8]) -> GraphicsResult<()> {
        let mut allocations = self.allocations.lock();
        let slice = allocations
            .live
            .get_mut(&id)
            .and_then(|allocation| allocation.mapped_slice_mut())
            .ok_or_else(|| {
                GraphicsError::InvalidParameter(format!("allocation {id} is not host visible"))
            })?;
        if data.len() > slice.len() {
            return Err(GraphicsError::InvalidParameter(format!(
                "{} bytes do not fit a {} byte allocation",
                data.len(),
                slice.len()
            )));
        }
        slice[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Returns an allocation to the allocator.
    pub fn free(&self, id: u64) {
        let Some(allocation) = self.allocations.lock().live.remove(&id) else {
            log::warn!("Free of unknown allocation {id}");
            return;
        };
        if let Err(e) = self.allocator.lock().free(allocation) {
            log::error!("Failed to free allocation {id}: {e}");
        }
    }

    pub fn live_count(&self) -> usize {
        self.allocations.lock().live.len()
    }
}
