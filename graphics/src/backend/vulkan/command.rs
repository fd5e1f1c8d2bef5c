//! Vulkan command pools and command replay.
//!
//! The device records backend-agnostic [`Command`]s; [`record`] replays them
//! into a native command buffer, resolving handles through
//! [`ResourceInternals`] as it goes.

use ash::vk;

use super::barriers::NativeBarriers;
use super::conversion::{
    aspect_mask, convert_bind_point, convert_clear_value, convert_index_format,
};
use super::native;
use crate::command::Command;
use crate::error::{GraphicsError, GraphicsResult};
use crate::internal::ResourceInternals;
use crate::resources::{Handle, Image};
use crate::types::{Extent3d, ImageSubresourceRange, Offset3d, ScissorRect, Viewport};

/// Create a command pool for one queue family.
pub fn create_command_pool(
    device: &ash::Device,
    queue_family_index: u32,
) -> GraphicsResult<vk::CommandPool> {
    let pool_info = vk::CommandPoolCreateInfo::default()
        .queue_family_index(queue_family_index)
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

    let pool = unsafe { device.create_command_pool(&pool_info, None) }.map_err(|e| {
        GraphicsError::ResourceCreationFailed(format!("Failed to create command pool: {:?}", e))
    })?;

    Ok(pool)
}

/// A native command pool and the primary buffers it has handed back.
#[derive(Debug)]
pub struct NativeCommandPool {
    pub pool: vk::CommandPool,
    free: Vec<vk::CommandBuffer>,
}

impl NativeCommandPool {
    pub fn new(pool: vk::CommandPool) -> Self {
        Self {
            pool,
            free: Vec::new(),
        }
    }

    /// A reset primary command buffer.
    pub fn acquire(&mut self, device: &ash::Device) -> GraphicsResult<vk::CommandBuffer> {
        if let Some(cmd) = self.free.pop() {
            unsafe { device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty()) }
                .map_err(|e| {
                    GraphicsError::Internal(format!("Failed to reset command buffer: {:?}", e))
                })?;
            return Ok(cmd);
        }

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { device.allocate_command_buffers(&alloc_info) }.map_err(|e| {
            GraphicsError::Internal(format!("Failed to allocate command buffer: {:?}", e))
        })?;
        buffers
            .into_iter()
            .next()
            .ok_or_else(|| GraphicsError::Internal("Driver returned no command buffer".into()))
    }

    /// Returns a buffer the GPU has finished with.
    pub fn release(&mut self, cmd: vk::CommandBuffer) {
        self.free.push(cmd);
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        self.free.clear();
        unsafe { device.destroy_command_pool(self.pool, None) };
    }
}

/// Replays `commands` into `cmd`, which must be in the recording state.
pub fn record(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    commands: &[Command],
    resources: &ResourceInternals<'_>,
) -> GraphicsResult<()> {
    for command in commands {
        record_command(device, cmd, command, resources)?;
    }
    Ok(())
}

fn record_command(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    command: &Command,
    resources: &ResourceInternals<'_>,
) -> GraphicsResult<()> {
    match command {
        Command::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        } => unsafe {
            device.cmd_draw(cmd, *vertex_count, *instance_count, *first_vertex, *first_instance);
        },
        Command::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        } => unsafe {
            device.cmd_draw_indexed(
                cmd,
                *index_count,
                *instance_count,
                *first_index,
                *vertex_offset,
                *first_instance,
            );
        },
        Command::DrawIndirect {
            buffer,
            offset,
            draw_count,
            stride,
        } => {
            let buffer = native::buffer(resources.native(*buffer)?);
            unsafe { device.cmd_draw_indirect(cmd, buffer, *offset, *draw_count, *stride) };
        }
        Command::Dispatch { x, y, z } => unsafe {
            device.cmd_dispatch(cmd, *x, *y, *z);
        },
        Command::DispatchIndirect { buffer, offset } => {
            let buffer = native::buffer(resources.native(*buffer)?);
            unsafe { device.cmd_dispatch_indirect(cmd, buffer, *offset) };
        }
        Command::CopyBuffer { src, dst, regions } => {
            let regions: Vec<vk::BufferCopy> = regions
                .iter()
                .map(|r| vk::BufferCopy {
                    src_offset: r.src_offset,
                    dst_offset: r.dst_offset,
                    size: r.size,
                })
                .collect();
            let src = native::buffer(resources.native(*src)?);
            let dst = native::buffer(resources.native(*dst)?);
            unsafe { device.cmd_copy_buffer(cmd, src, dst, &regions) };
        }
        Command::CopyBufferToImage { src, dst, regions } => {
            let aspect = image_aspect(*dst, resources)?;
            let regions: Vec<vk::BufferImageCopy> = regions
                .iter()
                .map(|r| {
                    vk::BufferImageCopy::default()
                        .buffer_offset(r.buffer_offset)
                        .buffer_row_length(r.buffer_row_length)
                        .buffer_image_height(0)
                        .image_subresource(subresource_layers(aspect, r.range()))
                        .image_offset(offset_3d(r.image_offset))
                        .image_extent(extent_3d(r.image_extent))
                })
                .collect();
            let src = native::buffer(resources.native(*src)?);
            let dst = native::image(resources.native(*dst)?);
            unsafe {
                device.cmd_copy_buffer_to_image(
                    cmd,
                    src,
                    dst,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &regions,
                );
            }
        }
        Command::CopyImageToBuffer { src, dst, regions } => {
            let aspect = image_aspect(*src, resources)?;
            let regions: Vec<vk::BufferImageCopy> = regions
                .iter()
                .map(|r| {
                    vk::BufferImageCopy::default()
                        .buffer_offset(r.buffer_offset)
                        .buffer_row_length(r.buffer_row_length)
                        .buffer_image_height(0)
                        .image_subresource(subresource_layers(aspect, r.range()))
                        .image_offset(offset_3d(r.image_offset))
                        .image_extent(extent_3d(r.image_extent))
                })
                .collect();
            let src = native::image(resources.native(*src)?);
            let dst = native::buffer(resources.native(*dst)?);
            unsafe {
                device.cmd_copy_image_to_buffer(
                    cmd,
                    src,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    dst,
                    &regions,
                );
            }
        }
        Command::CopyImage { src, dst, regions } => {
            let src_aspect = image_aspect(*src, resources)?;
            let dst_aspect = image_aspect(*dst, resources)?;
            let regions: Vec<vk::ImageCopy> = regions
                .iter()
                .map(|r| vk::ImageCopy {
                    src_subresource: subresource_layers(src_aspect, r.src),
                    src_offset: offset_3d(r.src_offset),
                    dst_subresource: subresource_layers(dst_aspect, r.dst),
                    dst_offset: offset_3d(r.dst_offset),
                    extent: extent_3d(r.extent),
                })
                .collect();
            let src = native::image(resources.native(*src)?);
            let dst = native::image(resources.native(*dst)?);
            unsafe {
                device.cmd_copy_image(
                    cmd,
                    src,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    dst,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &regions,
                );
            }
        }
        Command::FillBuffer {
            buffer,
            offset,
            size,
            value,
        } => {
            let buffer = native::buffer(resources.native(*buffer)?);
            unsafe { device.cmd_fill_buffer(cmd, buffer, *offset, *size, *value) };
        }
        Command::ClearColorImage {
            image,
            range,
            color,
        } => {
            let aspect = image_aspect(*image, resources)?;
            let image = native::image(resources.native(*image)?);
            let clear = vk::ClearColorValue { float32: *color };
            unsafe {
                device.cmd_clear_color_image(
                    cmd,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &clear,
                    &[subresource_range(aspect, *range)],
                );
            }
        }
        Command::BindPipeline {
            pipeline,
            bind_point,
        } => {
            let pipeline = native::pipeline(resources.native(*pipeline)?);
            unsafe { device.cmd_bind_pipeline(cmd, convert_bind_point(*bind_point), pipeline) };
        }
        Command::BindVertexBuffers {
            first_binding,
            buffers,
        } => {
            let mut natives = Vec::with_capacity(buffers.len());
            let mut offsets = Vec::with_capacity(buffers.len());
            for (buffer, offset) in buffers {
                natives.push(native::buffer(resources.native(*buffer)?));
                offsets.push(*offset);
            }
            unsafe { device.cmd_bind_vertex_buffers(cmd, *first_binding, &natives, &offsets) };
        }
        Command::BindIndexBuffer {
            buffer,
            offset,
            format,
        } => {
            let buffer = native::buffer(resources.native(*buffer)?);
            unsafe {
                device.cmd_bind_index_buffer(cmd, buffer, *offset, convert_index_format(*format));
            }
        }
        Command::BindDescriptorSets {
            pipeline,
            bind_point,
            first_set,
            sets,
        } => {
            let layout = native::pipeline_layout(resources.native(*pipeline)?);
            let sets = sets
                .iter()
                .map(|set| resources.native(*set).map(native::descriptor_set))
                .collect::<GraphicsResult<Vec<_>>>()?;
            unsafe {
                device.cmd_bind_descriptor_sets(
                    cmd,
                    convert_bind_point(*bind_point),
                    layout,
                    *first_set,
                    &sets,
                    &[],
                );
            }
        }
        Command::PushConstants {
            pipeline,
            offset,
            data,
        } => {
            let layout = native::pipeline_layout(resources.native(*pipeline)?);
            unsafe {
                device.cmd_push_constants(cmd, layout, vk::ShaderStageFlags::ALL, *offset, data);
            }
        }
        Command::BeginRenderPass {
            render_pass,
            framebuffer,
            area,
            clear_values,
        } => {
            let clear_values: Vec<vk::ClearValue> =
                clear_values.iter().copied().map(convert_clear_value).collect();
            let begin_info = vk::RenderPassBeginInfo::default()
                .render_pass(native::render_pass(resources.native(*render_pass)?))
                .framebuffer(native::framebuffer(resources.native(*framebuffer)?))
                .render_area(rect_2d(*area))
                .clear_values(&clear_values);
            unsafe { device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE) };
        }
        Command::EndRenderPass => unsafe {
            device.cmd_end_render_pass(cmd);
        },
        Command::SetViewport(viewport) => unsafe {
            device.cmd_set_viewport(cmd, 0, &[convert_viewport(*viewport)]);
        },
        Command::SetScissor(scissor) => unsafe {
            device.cmd_set_scissor(cmd, 0, &[rect_2d(*scissor)]);
        },
        Command::Barrier(batch) => {
            NativeBarriers::build(batch, resources)?.record(device, cmd);
        }
    }
    Ok(())
}

fn image_aspect(
    image: Handle<Image>,
    resources: &ResourceInternals<'_>,
) -> GraphicsResult<vk::ImageAspectFlags> {
    Ok(aspect_mask(resources.descriptor(image)?.format))
}

fn subresource_layers(
    aspect: vk::ImageAspectFlags,
    range: ImageSubresourceRange,
) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: aspect,
        mip_level: range.base_mip,
        base_array_layer: range.base_layer,
        layer_count: range.layer_count,
    }
}

pub(super) fn subresource_range(
    aspect: vk::ImageAspectFlags,
    range: ImageSubresourceRange,
) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: range.base_mip,
        level_count: range.mip_count,
        base_array_layer: range.base_layer,
        layer_count: range.layer_count,
    }
}

fn offset_3d(offset: Offset3d) -> vk::Offset3D {
    vk::Offset3D {
        x: offset.x,
        y: offset.y,
        z: offset.z,
    }
}

fn extent_3d(extent: Extent3d) -> vk::Extent3D {
    vk::Extent3D {
        width: extent.width,
        height: extent.height,
        depth: extent.depth,
    }
}

fn rect_2d(rect: ScissorRect) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D {
            x: rect.x,
            y: rect.y,
        },
        extent: vk::Extent2D {
            width: rect.width,
            height: rect.height,
        },
    }
}

fn convert_viewport(viewport: Viewport) -> vk::Viewport {
    vk::Viewport {
        x: viewport.x,
        y: viewport.y,
        width: viewport.width,
        height: viewport.height,
        min_depth: viewport.min_depth,
        max_depth: viewport.max_depth,
    }
}
