//! Descriptors for render passes, framebuffers, pipelines and descriptor objects.

use bitflags::bitflags;

use super::ImageFormat;
use crate::resources::{DescriptorPool, DescriptorSetLayout, Handle, ImageView, RenderPass};

/// What happens to an attachment's contents when a render pass begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadOp {
    Load,
    #[default]
    Clear,
    DontCare,
}

/// What happens to an attachment's contents when a render pass ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreOp {
    #[default]
    Store,
    DontCare,
}

/// One attachment of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentDescriptor {
    pub format: ImageFormat,
    pub samples: u32,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
}

impl AttachmentDescriptor {
    /// Single-sampled attachment that clears on load and stores.
    pub fn new(format: ImageFormat) -> Self {
        Self {
            format,
            samples: 1,
            load_op: LoadOp::Clear,
            store_op: StoreOp::Store,
        }
    }

    /// Set the load operation.
    pub fn with_load_op(mut self, load_op: LoadOp) -> Self {
        self.load_op = load_op;
        self
    }

    /// Set the store operation.
    pub fn with_store_op(mut self, store_op: StoreOp) -> Self {
        self.store_op = store_op;
        self
    }
}

/// Descriptor for creating a single-subpass render pass.
///
/// Attachments stay in their attachment layout for the whole pass; layout
/// changes into and out of the pass are issued as explicit barriers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RenderPassDescriptor {
    pub label: Option<String>,
    pub color_attachments: Vec<AttachmentDescriptor>,
    pub depth_attachment: Option<AttachmentDescriptor>,
}

impl RenderPassDescriptor {
    /// Total attachment count, colors first then depth.
    pub fn attachment_count(&self) -> usize {
        self.color_attachments.len() + usize::from(self.depth_attachment.is_some())
    }
}

/// Descriptor for creating a framebuffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FramebufferDescriptor {
    pub label: Option<String>,
    pub render_pass: Handle<RenderPass>,
    /// Views in render pass attachment order, colors first then depth.
    pub attachments: Vec<Handle<ImageView>>,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
}

bitflags! {
    /// Shader stages a binding or push constant range is visible to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
        const ALL_GRAPHICS = Self::VERTEX.bits() | Self::FRAGMENT.bits();
    }
}

/// Kind of resource a descriptor binding holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DescriptorType {
    Sampler,
    SampledImage,
    StorageImage,
    UniformBuffer,
    StorageBuffer,
}

/// One binding of a descriptor set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub ty: DescriptorType,
    pub count: u32,
    pub stages: ShaderStages,
    /// Partially bound and updatable after bind, for bindless tables.
    pub bindless: bool,
}

impl DescriptorBinding {
    /// A single descriptor visible to `stages`.
    pub fn new(binding: u32, ty: DescriptorType, stages: ShaderStages) -> Self {
        Self {
            binding,
            ty,
            count: 1,
            stages,
            bindless: false,
        }
    }

    /// A bindless array of `count` descriptors.
    pub fn bindless(binding: u32, ty: DescriptorType, count: u32, stages: ShaderStages) -> Self {
        Self {
            binding,
            ty,
            count,
            stages,
            bindless: true,
        }
    }
}

/// Descriptor for creating a descriptor set layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DescriptorSetLayoutDescriptor {
    pub label: Option<String>,
    pub bindings: Vec<DescriptorBinding>,
}

impl DescriptorSetLayoutDescriptor {
    /// Whether any binding is a bindless table.
    pub fn has_bindless(&self) -> bool {
        self.bindings.iter().any(|b| b.bindless)
    }
}

/// Descriptor for creating a descriptor pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DescriptorPoolDescriptor {
    pub label: Option<String>,
    pub max_sets: u32,
    pub sizes: Vec<(DescriptorType, u32)>,
    /// Allow sets with bindless layouts.
    pub update_after_bind: bool,
}

/// Descriptor for allocating a descriptor set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorSetDescriptor {
    pub label: Option<String>,
    pub pool: Handle<DescriptorPool>,
    pub layout: Handle<DescriptorSetLayout>,
}

/// Vertex attribute formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Uint32,
    Unorm8x4,
}

/// One vertex attribute within a vertex buffer layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

/// Stride and attributes of one bound vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexBufferLayout {
    pub stride: u32,
    pub per_instance: bool,
    pub attributes: Vec<VertexAttribute>,
}

/// Primitive assembly topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    #[default]
    TriangleList,
    TriangleStrip,
}

/// Face culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

/// Graphics pipeline state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphicsPipelineDescriptor {
    /// SPIR-V words of the vertex shader; entry point `main`.
    pub vertex_spirv: Vec<u32>,
    /// SPIR-V words of the fragment shader; entry point `main`.
    pub fragment_spirv: Option<Vec<u32>>,
    pub vertex_buffers: Vec<VertexBufferLayout>,
    pub topology: PrimitiveTopology,
    pub cull_mode: CullMode,
    pub depth_test: bool,
    pub depth_write: bool,
    pub alpha_blend: bool,
    pub render_pass: Handle<RenderPass>,
}

/// Pipeline variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Graphics(GraphicsPipelineDescriptor),
    /// SPIR-V words of the compute shader; entry point `main`.
    Compute { spirv: Vec<u32> },
}

/// Where a pipeline binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineBindPoint {
    Graphics,
    Compute,
}

/// Descriptor for creating a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineDescriptor {
    pub label: Option<String>,
    pub kind: PipelineKind,
    pub set_layouts: Vec<Handle<DescriptorSetLayout>>,
    /// Push constant block size in bytes, visible to every stage.
    pub push_constant_size: u32,
}

impl PipelineDescriptor {
    /// Bind point matching the pipeline kind.
    pub fn bind_point(&self) -> PipelineBindPoint {
        match self.kind {
            PipelineKind::Graphics(_) => PipelineBindPoint::Graphics,
            PipelineKind::Compute { .. } => PipelineBindPoint::Compute,
        }
    }
}
