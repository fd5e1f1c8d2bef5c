//! Access, pipeline stage and layout vocabulary for barrier synthesis.
//!
//! Commands describe how they touch resources with [`ImageAccess`] and
//! [`BufferAccess`]. Each access mode maps to the exact `{access, layout,
//! stage}` triple the subresource must be in, which the state tracker
//! compares against what it last recorded.

use bitflags::bitflags;

bitflags! {
    /// Memory access types, mirroring the native access masks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccessFlags: u32 {
        const INDIRECT_COMMAND_READ = 1 << 0;
        const INDEX_READ = 1 << 1;
        const VERTEX_ATTRIBUTE_READ = 1 << 2;
        const UNIFORM_READ = 1 << 3;
        const INPUT_ATTACHMENT_READ = 1 << 4;
        const SHADER_READ = 1 << 5;
        const SHADER_WRITE = 1 << 6;
        const COLOR_ATTACHMENT_READ = 1 << 7;
        const COLOR_ATTACHMENT_WRITE = 1 << 8;
        const DEPTH_STENCIL_ATTACHMENT_READ = 1 << 9;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 10;
        const TRANSFER_READ = 1 << 11;
        const TRANSFER_WRITE = 1 << 12;
        const HOST_READ = 1 << 13;
        const HOST_WRITE = 1 << 14;
        const MEMORY_READ = 1 << 15;
        const MEMORY_WRITE = 1 << 16;
    }
}

impl AccessFlags {
    /// Every flag that represents a write.
    pub const WRITES: Self = Self::SHADER_WRITE
        .union(Self::COLOR_ATTACHMENT_WRITE)
        .union(Self::DEPTH_STENCIL_ATTACHMENT_WRITE)
        .union(Self::TRANSFER_WRITE)
        .union(Self::HOST_WRITE)
        .union(Self::MEMORY_WRITE);

    /// Whether any write access is included.
    pub fn has_write(self) -> bool {
        self.intersects(Self::WRITES)
    }
}

bitflags! {
    /// Pipeline stages, mirroring the native stage masks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PipelineStages: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const DRAW_INDIRECT = 1 << 1;
        const VERTEX_INPUT = 1 << 2;
        const VERTEX_SHADER = 1 << 3;
        const FRAGMENT_SHADER = 1 << 7;
        const EARLY_FRAGMENT_TESTS = 1 << 8;
        const LATE_FRAGMENT_TESTS = 1 << 9;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 10;
        const COMPUTE_SHADER = 1 << 11;
        const TRANSFER = 1 << 12;
        const BOTTOM_OF_PIPE = 1 << 13;
        const HOST = 1 << 14;
        const ALL_GRAPHICS = 1 << 15;
        const ALL_COMMANDS = 1 << 16;
    }
}

/// Image layouts a subresource can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageLayout {
    /// Contents undefined; any layout may follow.
    #[default]
    Undefined,
    /// Least optimal, valid for every access.
    General,
    ColorAttachment,
    DepthStencilAttachment,
    DepthStencilReadOnly,
    ShaderReadOnly,
    TransferSrc,
    TransferDst,
    PresentSrc,
}

impl ImageLayout {
    /// Whether this layout is only meaningful for depth/stencil formats.
    pub fn is_depth_stencil(self) -> bool {
        matches!(
            self,
            Self::DepthStencilAttachment | Self::DepthStencilReadOnly
        )
    }
}

/// Tracked state of one image subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageState {
    pub access: AccessFlags,
    pub layout: ImageLayout,
    pub stages: PipelineStages,
}

impl ImageState {
    /// State of an image nothing has touched yet.
    pub const UNDEFINED: Self = Self {
        access: AccessFlags::empty(),
        layout: ImageLayout::Undefined,
        stages: PipelineStages::TOP_OF_PIPE,
    };

    /// Builds a state triple.
    pub const fn new(access: AccessFlags, layout: ImageLayout, stages: PipelineStages) -> Self {
        Self {
            access,
            layout,
            stages,
        }
    }
}

impl Default for ImageState {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

/// Tracked state of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferState {
    pub access: AccessFlags,
    pub stages: PipelineStages,
}

impl BufferState {
    /// State of a buffer nothing has touched yet in this recording.
    pub const NONE: Self = Self {
        access: AccessFlags::empty(),
        stages: PipelineStages::TOP_OF_PIPE,
    };

    /// Builds a state pair.
    pub const fn new(access: AccessFlags, stages: PipelineStages) -> Self {
        Self { access, stages }
    }
}

impl Default for BufferState {
    fn default() -> Self {
        Self::NONE
    }
}

/// How a command touches an image subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageAccess {
    /// Written as a color attachment.
    ColorAttachmentWrite,
    /// Written as a depth/stencil attachment.
    DepthStencilWrite,
    /// Depth test without writes, possibly sampled at the same time.
    DepthStencilReadOnly,
    /// Sampled from a fragment shader.
    FragmentShaderRead,
    /// Sampled from a compute shader.
    ComputeShaderRead,
    /// Storage image read/write from compute.
    ComputeStorageReadWrite,
    /// Source of a copy.
    TransferRead,
    /// Destination of a copy or clear.
    TransferWrite,
    /// Handed to the presentation engine.
    Present,
}

impl ImageAccess {
    /// The state the subresource must be in for this access.
    pub fn state(self) -> ImageState {
        use AccessFlags as A;
        use ImageLayout as L;
        use PipelineStages as S;
        match self {
            Self::ColorAttachmentWrite => ImageState::new(
                A::COLOR_ATTACHMENT_READ | A::COLOR_ATTACHMENT_WRITE,
                L::ColorAttachment,
                S::COLOR_ATTACHMENT_OUTPUT,
            ),
            Self::DepthStencilWrite => ImageState::new(
                A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
                L::DepthStencilAttachment,
                S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS,
            ),
            Self::DepthStencilReadOnly => ImageState::new(
                A::DEPTH_STENCIL_ATTACHMENT_READ | A::SHADER_READ,
                L::DepthStencilReadOnly,
                S::EARLY_FRAGMENT_TESTS | S::FRAGMENT_SHADER,
            ),
            Self::FragmentShaderRead => {
                ImageState::new(A::SHADER_READ, L::ShaderReadOnly, S::FRAGMENT_SHADER)
            }
            Self::ComputeShaderRead => {
                ImageState::new(A::SHADER_READ, L::ShaderReadOnly, S::COMPUTE_SHADER)
            }
            Self::ComputeStorageReadWrite => ImageState::new(
                A::SHADER_READ | A::SHADER_WRITE,
                L::General,
                S::COMPUTE_SHADER,
            ),
            Self::TransferRead => ImageState::new(A::TRANSFER_READ, L::TransferSrc, S::TRANSFER),
            Self::TransferWrite => ImageState::new(A::TRANSFER_WRITE, L::TransferDst, S::TRANSFER),
            Self::Present => {
                ImageState::new(AccessFlags::empty(), L::PresentSrc, S::BOTTOM_OF_PIPE)
            }
        }
    }

    /// Whether this access writes the subresource.
    pub fn is_write(self) -> bool {
        self.state().access.has_write()
    }
}

/// How a command touches a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferAccess {
    VertexRead,
    IndexRead,
    IndirectRead,
    /// Uniform read from vertex or fragment shaders.
    UniformRead,
    /// Storage read from vertex or fragment shaders.
    GraphicsStorageRead,
    ComputeUniformRead,
    ComputeStorageRead,
    ComputeStorageWrite,
    ComputeStorageReadWrite,
    TransferRead,
    TransferWrite,
    HostRead,
}

impl BufferAccess {
    /// The state the buffer must be in for this access.
    pub fn state(self) -> BufferState {
        use AccessFlags as A;
        use PipelineStages as S;
        match self {
            Self::VertexRead => BufferState::new(A::VERTEX_ATTRIBUTE_READ, S::VERTEX_INPUT),
            Self::IndexRead => BufferState::new(A::INDEX_READ, S::VERTEX_INPUT),
            Self::IndirectRead => BufferState::new(A::INDIRECT_COMMAND_READ, S::DRAW_INDIRECT),
            Self::UniformRead => {
                BufferState::new(A::UNIFORM_READ, S::VERTEX_SHADER | S::FRAGMENT_SHADER)
            }
            Self::GraphicsStorageRead => {
                BufferState::new(A::SHADER_READ, S::VERTEX_SHADER | S::FRAGMENT_SHADER)
            }
            Self::ComputeUniformRead => BufferState::new(A::UNIFORM_READ, S::COMPUTE_SHADER),
            Self::ComputeStorageRead => BufferState::new(A::SHADER_READ, S::COMPUTE_SHADER),
            Self::ComputeStorageWrite => BufferState::new(A::SHADER_WRITE, S::COMPUTE_SHADER),
            Self::ComputeStorageReadWrite => {
                BufferState::new(A::SHADER_READ | A::SHADER_WRITE, S::COMPUTE_SHADER)
            }
            Self::TransferRead => BufferState::new(A::TRANSFER_READ, S::TRANSFER),
            Self::TransferWrite => BufferState::new(A::TRANSFER_WRITE, S::TRANSFER),
            Self::HostRead => BufferState::new(A::HOST_READ, S::HOST),
        }
    }

    /// Whether this access writes the buffer.
    pub fn is_write(self) -> bool {
        self.state().access.has_write()
    }
}
