//! Barrier recording for Vulkan.
//!
//! A [`BarrierBatch`] becomes exactly one `vkCmdPipelineBarrier`: image
//! barriers per subresource and buffer barriers over the whole buffer, with
//! the union of the batch's stages on both sides.

use ash::vk;

use super::conversion::{
    aspect_mask, convert_access_flags, convert_image_layout, convert_pipeline_stages,
};
use super::native::{buffer, image};
use crate::command::BarrierBatch;
use crate::error::GraphicsResult;
use crate::internal::ResourceInternals;

/// Native barriers built from a batch.
#[derive(Debug, Default)]
pub struct NativeBarriers {
    pub src_stages: vk::PipelineStageFlags,
    pub dst_stages: vk::PipelineStageFlags,
    pub images: Vec<vk::ImageMemoryBarrier<'static>>,
    pub buffers: Vec<vk::BufferMemoryBarrier<'static>>,
}

impl NativeBarriers {
    /// Resolves every barrier of `batch` to native objects.
    pub fn build(batch: &BarrierBatch, resources: &ResourceInternals<'_>) -> GraphicsResult<Self> {
        let mut src_stages = convert_pipeline_stages(batch.src_stages());
        let mut dst_stages = convert_pipeline_stages(batch.dst_stages());
        if src_stages.is_empty() {
            src_stages = vk::PipelineStageFlags::TOP_OF_PIPE;
        }
        if dst_stages.is_empty() {
            dst_stages = vk::PipelineStageFlags::BOTTOM_OF_PIPE;
        }

        let mut images = Vec::with_capacity(batch.images().len());
        for barrier in batch.images() {
            let format = resources.descriptor(barrier.image)?.format;
            images.push(
                vk::ImageMemoryBarrier::default()
                    .old_layout(convert_image_layout(barrier.from.layout))
                    .new_layout(convert_image_layout(barrier.to.layout))
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(image(resources.native(barrier.image)?))
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: aspect_mask(format),
                        base_mip_level: barrier.mip,
                        level_count: 1,
                        base_array_layer: barrier.layer,
                        layer_count: 1,
                    })
                    .src_access_mask(convert_access_flags(barrier.from.access))
                    .dst_access_mask(convert_access_flags(barrier.to.access)),
            );
        }

        let mut buffers = Vec::with_capacity(batch.buffers().len());
        for barrier in batch.buffers() {
            buffers.push(
                vk::BufferMemoryBarrier::default()
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .buffer(buffer(resources.native(barrier.buffer)?))
                    .offset(0)
                    .size(vk::WHOLE_SIZE)
                    .src_access_mask(convert_access_flags(barrier.from.access))
                    .dst_access_mask(convert_access_flags(barrier.to.access)),
            );
        }

        Ok(Self {
            src_stages,
            dst_stages,
            images,
            buffers,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.buffers.is_empty()
    }

    /// Records all barriers in a single pipeline barrier command.
    ///
    /// Does nothing if there are no barriers.
    pub fn record(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        if self.is_empty() {
            return;
        }

        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                self.src_stages,
                self.dst_stages,
                vk::DependencyFlags::empty(),
                &[],
                &self.buffers,
                &self.images,
            );
        }
    }
}
