//! Recorded command variants.
//!
//! A [`Command`] carries only what the backend needs to replay it. Commands
//! that touch resources report how through [`Command::usages`], which the
//! command buffer feeds into the state tracker before appending.

use crate::resources::{
    AnyHandle, Buffer, DescriptorSet, Framebuffer, Handle, Image, Pipeline, RenderPass,
    ResourceRegistry,
};
use crate::types::{
    BufferAccess, BufferCopy, BufferImageCopy, ClearValue, ImageAccess, ImageCopy,
    ImageSubresourceRange, IndexFormat, PipelineBindPoint, QueueCapabilities, ScissorRect,
    Viewport,
};

use super::barrier::BarrierBatch;

/// How one command touches one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Usage {
    Buffer {
        buffer: Handle<Buffer>,
        access: BufferAccess,
    },
    Image {
        image: Handle<Image>,
        range: ImageSubresourceRange,
        access: ImageAccess,
    },
}

impl Usage {
    /// Buffer usage.
    pub fn buffer(buffer: Handle<Buffer>, access: BufferAccess) -> Self {
        Self::Buffer { buffer, access }
    }

    /// Image usage over `range`.
    pub fn image(image: Handle<Image>, range: ImageSubresourceRange, access: ImageAccess) -> Self {
        Self::Image {
            image,
            range,
            access,
        }
    }

    /// The resource this usage refers to.
    pub fn resource(&self) -> AnyHandle {
        match *self {
            Self::Buffer { buffer, .. } => buffer.erase(),
            Self::Image { image, .. } => image.erase(),
        }
    }
}

/// A recorded command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    DrawIndirect {
        buffer: Handle<Buffer>,
        offset: u64,
        draw_count: u32,
        stride: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    DispatchIndirect {
        buffer: Handle<Buffer>,
        offset: u64,
    },
    CopyBuffer {
        src: Handle<Buffer>,
        dst: Handle<Buffer>,
        regions: Vec<BufferCopy>,
    },
    CopyBufferToImage {
        src: Handle<Buffer>,
        dst: Handle<Image>,
        regions: Vec<BufferImageCopy>,
    },
    CopyImageToBuffer {
        src: Handle<Image>,
        dst: Handle<Buffer>,
        regions: Vec<BufferImageCopy>,
    },
    CopyImage {
        src: Handle<Image>,
        dst: Handle<Image>,
        regions: Vec<ImageCopy>,
    },
    FillBuffer {
        buffer: Handle<Buffer>,
        offset: u64,
        size: u64,
        value: u32,
    },
    ClearColorImage {
        image: Handle<Image>,
        range: ImageSubresourceRange,
        color: [f32; 4],
    },
    BindPipeline {
        pipeline: Handle<Pipeline>,
        bind_point: PipelineBindPoint,
    },
    BindVertexBuffers {
        first_binding: u32,
        buffers: Vec<(Handle<Buffer>, u64)>,
    },
    BindIndexBuffer {
        buffer: Handle<Buffer>,
        offset: u64,
        format: IndexFormat,
    },
    BindDescriptorSets {
        pipeline: Handle<Pipeline>,
        bind_point: PipelineBindPoint,
        first_set: u32,
        sets: Vec<Handle<DescriptorSet>>,
    },
    PushConstants {
        pipeline: Handle<Pipeline>,
        offset: u32,
        data: Vec<u8>,
    },
    BeginRenderPass {
        render_pass: Handle<RenderPass>,
        framebuffer: Handle<Framebuffer>,
        area: ScissorRect,
        clear_values: Vec<ClearValue>,
    },
    EndRenderPass,
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    Barrier(BarrierBatch),
}

fn bind_point_caps(bind_point: PipelineBindPoint) -> QueueCapabilities {
    match bind_point {
        PipelineBindPoint::Graphics => QueueCapabilities::GRAPHICS,
        PipelineBindPoint::Compute => QueueCapabilities::COMPUTE,
    }
}

impl Command {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Draw { .. } => "Draw",
            Self::DrawIndexed { .. } => "DrawIndexed",
            Self::DrawIndirect { .. } => "DrawIndirect",
            Self::Dispatch { .. } => "Dispatch",
            Self::DispatchIndirect { .. } => "DispatchIndirect",
            Self::CopyBuffer { .. } => "CopyBuffer",
            Self::CopyBufferToImage { .. } => "CopyBufferToImage",
            Self::CopyImageToBuffer { .. } => "CopyImageToBuffer",
            Self::CopyImage { .. } => "CopyImage",
            Self::FillBuffer { .. } => "FillBuffer",
            Self::ClearColorImage { .. } => "ClearColorImage",
            Self::BindPipeline { .. } => "BindPipeline",
            Self::BindVertexBuffers { .. } => "BindVertexBuffers",
            Self::BindIndexBuffer { .. } => "BindIndexBuffer",
            Self::BindDescriptorSets { .. } => "BindDescriptorSets",
            Self::PushConstants { .. } => "PushConstants",
            Self::BeginRenderPass { .. } => "BeginRenderPass",
            Self::EndRenderPass => "EndRenderPass",
            Self::SetViewport(_) => "SetViewport",
            Self::SetScissor(_) => "SetScissor",
            Self::Barrier(_) => "Barrier",
        }
    }

    /// Queue capabilities needed to execute this command.
    pub fn required_capabilities(&self) -> QueueCapabilities {
        match self {
            Self::Draw { .. }
            | Self::DrawIndexed { .. }
            | Self::DrawIndirect { .. }
            | Self::BindVertexBuffers { .. }
            | Self::BindIndexBuffer { .. }
            | Self::BeginRenderPass { .. }
            | Self::EndRenderPass
            | Self::SetViewport(_)
            | Self::SetScissor(_) => QueueCapabilities::GRAPHICS,
            Self::Dispatch { .. } | Self::DispatchIndirect { .. } => QueueCapabilities::COMPUTE,
            Self::CopyBuffer { .. }
            | Self::CopyBufferToImage { .. }
            | Self::CopyImageToBuffer { .. }
            | Self::CopyImage { .. }
            | Self::FillBuffer { .. }
            | Self::ClearColorImage { .. } => QueueCapabilities::TRANSFER,
            Self::BindPipeline { bind_point, .. } | Self::BindDescriptorSets { bind_point, .. } => {
                bind_point_caps(*bind_point)
            }
            // Push constants are legal wherever the pipeline could be bound.
            Self::PushConstants { .. } | Self::Barrier(_) => QueueCapabilities::empty(),
        }
    }

    /// Whether this command may only be recorded inside a render pass.
    pub fn requires_render_pass(&self) -> bool {
        matches!(
            self,
            Self::Draw { .. } | Self::DrawIndexed { .. } | Self::DrawIndirect { .. }
        )
    }

    /// Appends how this command touches resources.
    ///
    /// Render pass attachments are resolved through the registry; handles that
    /// no longer resolve contribute nothing.
    pub fn usages(&self, registry: &ResourceRegistry, out: &mut Vec<Usage>) {
        match self {
            Self::DrawIndirect { buffer, .. } | Self::DispatchIndirect { buffer, .. } => {
                out.push(Usage::buffer(*buffer, BufferAccess::IndirectRead));
            }
            Self::CopyBuffer { src, dst, .. } => {
                out.push(Usage::buffer(*src, BufferAccess::TransferRead));
                out.push(Usage::buffer(*dst, BufferAccess::TransferWrite));
            }
            Self::CopyBufferToImage { src, dst, regions } => {
                out.push(Usage::buffer(*src, BufferAccess::TransferRead));
                out.extend(
                    regions
                        .iter()
                        .map(|region| Usage::image(*dst, region.range(), ImageAccess::TransferWrite)),
                );
            }
            Self::CopyImageToBuffer { src, dst, regions } => {
                out.extend(
                    regions
                        .iter()
                        .map(|region| Usage::image(*src, region.range(), ImageAccess::TransferRead)),
                );
                out.push(Usage::buffer(*dst, BufferAccess::TransferWrite));
            }
            Self::CopyImage { src, dst, regions } => {
                for region in regions {
                    out.push(Usage::image(*src, region.src, ImageAccess::TransferRead));
                    out.push(Usage::image(*dst, region.dst, ImageAccess::TransferWrite));
                }
            }
            Self::FillBuffer { buffer, .. } => {
                out.push(Usage::buffer(*buffer, BufferAccess::TransferWrite));
            }
            Self::ClearColorImage { image, range, .. } => {
                out.push(Usage::image(*image, *range, ImageAccess::TransferWrite));
            }
            Self::BindVertexBuffers { buffers, .. } => {
                out.extend(
                    buffers
                        .iter()
                        .map(|(buffer, _)| Usage::buffer(*buffer, BufferAccess::VertexRead)),
                );
            }
            Self::BindIndexBuffer { buffer, .. } => {
                out.push(Usage::buffer(*buffer, BufferAccess::IndexRead));
            }
            Self::BeginRenderPass {
                render_pass,
                framebuffer,
                ..
            } => attachment_usages(registry, *render_pass, *framebuffer, out),
            Self::Draw { .. }
            | Self::DrawIndexed { .. }
            | Self::Dispatch { .. }
            | Self::BindPipeline { .. }
            | Self::BindDescriptorSets { .. }
            | Self::PushConstants { .. }
            | Self::EndRenderPass
            | Self::SetViewport(_)
            | Self::SetScissor(_)
            | Self::Barrier(_) => {}
        }
    }

    /// Appends every resource this command references directly.
    pub fn referenced(&self, registry: &ResourceRegistry, out: &mut Vec<AnyHandle>) {
        match self {
            Self::BindPipeline { pipeline, .. } | Self::PushConstants { pipeline, .. } => {
                out.push(pipeline.erase());
            }
            Self::BindDescriptorSets { pipeline, sets, .. } => {
                out.push(pipeline.erase());
                out.extend(sets.iter().map(|set| set.erase()));
            }
            Self::BeginRenderPass {
                render_pass,
                framebuffer,
                ..
            } => {
                out.push(render_pass.erase());
                out.push(framebuffer.erase());
                if let Some(desc) = registry.descriptor(*framebuffer) {
                    for view in desc.attachments {
                        out.push(view.erase());
                        if let Some(view_desc) = registry.descriptor(view) {
                            out.push(view_desc.image.erase());
                        }
                    }
                }
            }
            _ => {
                let mut usages = Vec::new();
                self.usages(registry, &mut usages);
                out.extend(usages.iter().map(Usage::resource));
            }
        }
    }
}

fn attachment_usages(
    registry: &ResourceRegistry,
    render_pass: Handle<RenderPass>,
    framebuffer: Handle<Framebuffer>,
    out: &mut Vec<Usage>,
) {
    let (Some(pass), Some(fb)) = (
        registry.descriptor(render_pass),
        registry.descriptor(framebuffer),
    ) else {
        return;
    };

    let color_count = pass.color_attachments.len();
    for (index, view) in fb.attachments.iter().enumerate() {
        let Some(view_desc) = registry.descriptor(*view) else {
            continue;
        };
        let access = if index < color_count {
            ImageAccess::ColorAttachmentWrite
        } else {
            ImageAccess::DepthStencilWrite
        };
        out.push(Usage::image(view_desc.image, view_desc.range, access));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NativeHandle;
    use crate::resources::Readiness;
    use crate::types::{BufferDescriptor, BufferUsage};

    #[test]
    fn test_capabilities() {
        assert_eq!(
            Command::Dispatch { x: 1, y: 1, z: 1 }.required_capabilities(),
            QueueCapabilities::COMPUTE
        );
        assert_eq!(
            Command::EndRenderPass.required_capabilities(),
            QueueCapabilities::GRAPHICS
        );
        assert!(
            Command::Barrier(BarrierBatch::new())
                .required_capabilities()
                .is_empty()
        );
    }

    #[test]
    fn test_copy_usages() {
        let registry = ResourceRegistry::new();
        let desc = BufferDescriptor::new(16, BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST);
        let src = registry.insert::<Buffer>(desc.clone(), NativeHandle::new(1), Readiness::Ready);
        let dst = registry.insert::<Buffer>(desc, NativeHandle::new(2), Readiness::Ready);

        let cmd = Command::CopyBuffer {
            src,
            dst,
            regions: vec![BufferCopy::whole(16)],
        };
        let mut usages = Vec::new();
        cmd.usages(&registry, &mut usages);
        assert_eq!(
            usages,
            vec![
                Usage::buffer(src, BufferAccess::TransferRead),
                Usage::buffer(dst, BufferAccess::TransferWrite),
            ]
        );

        let mut refs = Vec::new();
        cmd.referenced(&registry, &mut refs);
        assert_eq!(refs, vec![src.erase(), dst.erase()]);
    }
}
