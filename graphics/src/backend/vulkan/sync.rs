//! Fence-backed submission tracking.
//!
//! Every queue submission signals a fence of its own. The tracker maps the
//! [`SubmissionId`] handed back to the device onto that fence and the native
//! command buffer, and hands both back for reuse once the fence is signaled.

use std::collections::HashMap;

use ash::vk;

use crate::error::{GraphicsError, GraphicsResult};
use crate::sync::SubmissionId;
use crate::types::QueueType;

/// A submission the GPU may still be executing.
#[derive(Debug, Clone, Copy)]
pub struct InFlight {
    pub queue: QueueType,
    pub command_buffer: vk::CommandBuffer,
    pub fence: vk::Fence,
}

/// Submitted work keyed by id, plus fences ready for reuse.
#[derive(Debug)]
pub struct SubmissionTracker {
    next_id: u64,
    in_flight: HashMap<u64, InFlight>,
    free_fences: Vec<vk::Fence>,
}

impl SubmissionTracker {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            in_flight: HashMap::new(),
            free_fences: Vec::new(),
        }
    }

    /// An unsignaled fence, reused when possible.
    pub fn acquire_fence(&mut self, device: &ash::Device) -> GraphicsResult<vk::Fence> {
        if let Some(fence) = self.free_fences.pop() {
            unsafe { device.reset_fences(&[fence]) }.map_err(|e| {
                GraphicsError::Internal(format!("Failed to reset fence: {:?}", e))
            })?;
            return Ok(fence);
        }
        let fence_info = vk::FenceCreateInfo::default();
        unsafe { device.create_fence(&fence_info, None) }
            .map_err(|e| GraphicsError::Internal(format!("Failed to create fence: {:?}", e)))
    }

    /// Returns a fence that was never submitted.
    pub fn release_fence(&mut self, fence: vk::Fence) {
        self.free_fences.push(fence);
    }

    /// Registers a submission and issues its id.
    pub fn insert(&mut self, in_flight: InFlight) -> SubmissionId {
        let id = self.next_id;
        self.next_id += 1;
        self.in_flight.insert(id, in_flight);
        SubmissionId::new(id)
    }

    pub fn get(&self, id: SubmissionId) -> Option<&InFlight> {
        self.in_flight.get(&id.raw())
    }

    /// Forgets a finished submission, recycling its fence.
    pub fn retire(&mut self, id: SubmissionId) -> Option<InFlight> {
        let done = self.in_flight.remove(&id.raw())?;
        self.free_fences.push(done.fence);
        Some(done)
    }

    /// Forgets every submission. Only valid once the device is idle.
    pub fn retire_all(&mut self) -> Vec<InFlight> {
        let done: Vec<InFlight> = self.in_flight.drain().map(|(_, s)| s).collect();
        self.free_fences.extend(done.iter().map(|s| s.fence));
        done
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Destroys every fence. Only valid once the device is idle.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        for in_flight in self.retire_all() {
            log::trace!("Dropping {:?} submission at teardown", in_flight.queue);
        }
        for fence in self.free_fences.drain(..) {
            unsafe { device.destroy_fence(fence, None) };
        }
    }
}

/// Map a Vulkan result from a wait or submit onto the crate error.
pub fn map_vk_error(context: &str, result: vk::Result) -> GraphicsError {
    match result {
        vk::Result::ERROR_DEVICE_LOST => GraphicsError::DeviceLost,
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
            GraphicsError::OutOfMemory
        }
        other => GraphicsError::SubmissionFailed(format!("{context}: {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_ids_increase_and_retire_recycles_fence() {
        let mut tracker = SubmissionTracker::new();
        let a = tracker.insert(InFlight {
            queue: QueueType::Graphics,
            command_buffer: vk::CommandBuffer::from_raw(1),
            fence: vk::Fence::from_raw(10),
        });
        let b = tracker.insert(InFlight {
            queue: QueueType::Transfer,
            command_buffer: vk::CommandBuffer::from_raw(2),
            fence: vk::Fence::from_raw(11),
        });
        assert!(a < b);
        assert_eq!(tracker.in_flight_count(), 2);

        let done = tracker.retire(a).unwrap();
        assert_eq!(done.queue, QueueType::Graphics);
        assert!(tracker.retire(a).is_none());
        assert_eq!(tracker.free_fences, vec![vk::Fence::from_raw(10)]);
    }

    #[test]
    fn test_device_lost_maps_to_device_lost() {
        assert_eq!(
            map_vk_error("wait", vk::Result::ERROR_DEVICE_LOST),
            GraphicsError::DeviceLost
        );
        assert!(matches!(
            map_vk_error("submit", vk::Result::ERROR_UNKNOWN),
            GraphicsError::SubmissionFailed(_)
        ));
    }
}
