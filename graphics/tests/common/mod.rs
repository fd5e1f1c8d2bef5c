//! Common utilities for device integration tests.
//!
//! Every test drives a [`RenderDevice`] over a [`DummyBackend`], which records
//! each native call so the tests can inspect what reached the "GPU" and when.

#![allow(dead_code)]

use std::sync::Arc;

use vesper_graphics::types::{
    AttachmentDescriptor, DescriptorBinding, DescriptorPoolDescriptor, DescriptorSetDescriptor,
    DescriptorSetLayoutDescriptor, FramebufferDescriptor, ImageViewDescriptor,
    RenderPassDescriptor, ShaderStages,
};
use vesper_graphics::{
    BarrierBatch, BindlessCategory, BindlessUniformDescriptor, BindlessUniformId, Buffer,
    BufferDescriptor, BufferUsage, Command, DescriptorSet, DummyBackend, Framebuffer,
    GraphicsConfig, Handle, Image, ImageDescriptor, ImageFormat, ImageUsage, ImageView,
    MemoryLocation, NativeCall, RenderDevice, RenderPass, ResourceKind,
};

/// Installs the test logger once; later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A device over a dummy backend.
pub struct TestContext {
    pub device: RenderDevice,
    pub backend: Arc<DummyBackend>,
}

impl TestContext {
    /// Submissions complete as soon as they are made.
    pub fn new() -> Self {
        Self::with_config(GraphicsConfig::default(), false)
    }

    /// Submissions stay in flight until the test completes them.
    pub fn manual() -> Self {
        Self::with_config(GraphicsConfig::default(), true)
    }

    pub fn with_config(config: GraphicsConfig, manual: bool) -> Self {
        init_logging();
        let backend = Arc::new(if manual {
            DummyBackend::manual()
        } else {
            DummyBackend::new()
        });
        let device = RenderDevice::new(config, backend.clone()).expect("device creation failed");
        Self { device, backend }
    }

    /// Runs whole frames until the device reaches `frame`.
    pub fn advance_to(&self, frame: u64) {
        while self.device.frame_index() < frame {
            self.next_frame();
        }
    }

    /// Runs one frame and returns the new frame index.
    pub fn next_frame(&self) -> u64 {
        self.device.begin_frame().expect("begin_frame failed");
        self.device.end_frame()
    }

    pub fn buffer(&self, size: u64, usage: BufferUsage) -> Handle<Buffer> {
        self.device
            .create_buffer(&BufferDescriptor::new(size, usage))
            .expect("buffer creation failed")
    }

    pub fn host_buffer(&self, size: u64, usage: BufferUsage) -> Handle<Buffer> {
        self.device
            .create_buffer(&BufferDescriptor::new(size, usage).with_memory(MemoryLocation::CpuToGpu))
            .expect("buffer creation failed")
    }

    pub fn image(&self, width: u32, height: u32, mips: u32, usage: ImageUsage) -> Handle<Image> {
        self.device
            .create_image(
                &ImageDescriptor::new_2d(width, height, ImageFormat::Rgba8Unorm, usage)
                    .with_mip_levels(mips),
            )
            .expect("image creation failed")
    }

    /// A single color attachment render target.
    pub fn color_target(&self, width: u32, height: u32) -> RenderTarget {
        let image = self.image(width, height, 1, ImageUsage::COLOR_ATTACHMENT | ImageUsage::SAMPLED);
        let view = self
            .device
            .create_image_view(&ImageViewDescriptor::new(image))
            .expect("view creation failed");
        let render_pass = self
            .device
            .create_render_pass(&RenderPassDescriptor {
                label: Some("color pass".into()),
                color_attachments: vec![AttachmentDescriptor::new(ImageFormat::Rgba8Unorm)],
                depth_attachment: None,
            })
            .expect("render pass creation failed");
        let framebuffer = self
            .device
            .create_framebuffer(&FramebufferDescriptor {
                label: None,
                render_pass,
                attachments: vec![view],
                width,
                height,
                layers: 1,
            })
            .expect("framebuffer creation failed");
        RenderTarget {
            image,
            view,
            render_pass,
            framebuffer,
        }
    }

    /// A descriptor set holding one bindless array of `category`.
    pub fn bindless_set(&self, category: BindlessCategory, count: u32) -> Handle<DescriptorSet> {
        let layout = self
            .device
            .create_descriptor_set_layout(&DescriptorSetLayoutDescriptor {
                label: Some("bindless".into()),
                bindings: vec![DescriptorBinding::bindless(
                    0,
                    category.descriptor_type(),
                    count,
                    ShaderStages::ALL_GRAPHICS | ShaderStages::COMPUTE,
                )],
            })
            .expect("layout creation failed");
        let pool = self
            .device
            .create_descriptor_pool(&DescriptorPoolDescriptor {
                label: None,
                max_sets: 1,
                sizes: vec![(category.descriptor_type(), count)],
                update_after_bind: true,
            })
            .expect("pool creation failed");
        self.device
            .create_descriptor_set(&DescriptorSetDescriptor {
                label: None,
                pool,
                layout,
            })
            .expect("set creation failed")
    }

    /// Registers a bindless uniform of `category` named `name`.
    pub fn bindless_uniform(&self, name: &str, category: BindlessCategory) -> BindlessUniformId {
        let set = self.bindless_set(category, 1024);
        self.device
            .register_bindless_uniform(name, BindlessUniformDescriptor::new(category, set, 0))
            .expect("uniform registration failed")
    }

    /// Native objects freed so far whose kind is `kind`.
    pub fn destroyed_of(&self, kind: ResourceKind) -> Vec<u64> {
        self.backend
            .destroyed()
            .into_iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, object)| object)
            .collect()
    }

    /// Position of the first call matching `pred`.
    pub fn call_index(&self, pred: impl Fn(&NativeCall) -> bool) -> Option<usize> {
        self.backend.calls().iter().position(pred)
    }
}

/// Handles of a color render target.
#[derive(Debug, Clone, Copy)]
pub struct RenderTarget {
    pub image: Handle<Image>,
    pub view: Handle<ImageView>,
    pub render_pass: Handle<RenderPass>,
    pub framebuffer: Handle<Framebuffer>,
}

/// Every barrier in a command list, in order.
pub fn barriers(commands: &[Command]) -> Vec<&BarrierBatch> {
    commands
        .iter()
        .filter_map(|command| match command {
            Command::Barrier(batch) => Some(batch),
            _ => None,
        })
        .collect()
}

/// Index of the first command matching `pred`.
pub fn position(commands: &[Command], pred: impl Fn(&Command) -> bool) -> usize {
    commands
        .iter()
        .position(pred)
        .unwrap_or_else(|| panic!("command not found in {commands:?}"))
}

