use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use vesper_graphics::types::{
    AttachmentDescriptor, BufferCopy, DescriptorBinding, DescriptorPoolDescriptor,
    DescriptorSetDescriptor, DescriptorSetLayoutDescriptor, FramebufferDescriptor,
    ImageSubresourceRange, ImageViewDescriptor, IndexFormat, RenderPassDescriptor, ScissorRect,
    ShaderStages,
};
use vesper_graphics::{
    BindlessCategory, BindlessResource, BindlessUniformDescriptor, BufferDescriptor, BufferUsage,
    ClearValue, DestroyRecord, DestructionQueue, DummyBackend, FrameLag, GraphicsConfig,
    ImageAccess, ImageDescriptor, ImageFormat, ImageUsage, MemoryLocation, QueueType,
    RenderDevice, ResourceKind, Usage,
};

fn device() -> (RenderDevice, Arc<DummyBackend>) {
    let backend = Arc::new(DummyBackend::new());
    let device = RenderDevice::new(GraphicsConfig::default(), backend.clone())
        .expect("device creation failed");
    (device, backend)
}

// ---------------------------------------------------------------------------
// Recording and barrier synthesis
// ---------------------------------------------------------------------------

fn bench_record_transfers(c: &mut Criterion) {
    let (device, backend) = device();
    let staging = device
        .create_buffer(
            &BufferDescriptor::new(4096, BufferUsage::TRANSFER_SRC)
                .with_memory(MemoryLocation::CpuToGpu),
        )
        .expect("buffer creation failed");
    let targets: Vec<_> = (0..64)
        .map(|_| {
            device
                .create_buffer(&BufferDescriptor::new(
                    4096,
                    BufferUsage::TRANSFER_DST | BufferUsage::STORAGE,
                ))
                .expect("buffer creation failed")
        })
        .collect();

    c.bench_function("record_submit_64_copies", |b| {
        b.iter(|| {
            let cmd = device.start_recording(QueueType::Transfer);
            for target in &targets {
                cmd.copy_buffer(staging, *target, &[BufferCopy::whole(4096)]);
            }
            black_box(device.submit(&cmd).expect("submit failed"));
            device.poll_completions();
            backend.clear_calls();
        });
    });
}

fn bench_record_mip_chain(c: &mut Criterion) {
    let (device, backend) = device();
    let image = device
        .create_image(
            &ImageDescriptor::new_2d(
                1024,
                1024,
                ImageFormat::Rgba8Unorm,
                ImageUsage::SAMPLED | ImageUsage::TRANSFER_DST,
            )
            .with_mip_levels(11),
        )
        .expect("image creation failed");

    c.bench_function("record_mip_chain_transitions_11", |b| {
        b.iter(|| {
            let cmd = device.start_recording(QueueType::Compute);
            for mip in 0..11 {
                cmd.clear_color_image(image, ImageSubresourceRange::single(mip, 0), [0.0; 4]);
                cmd.use_resources(&[Usage::image(
                    image,
                    ImageSubresourceRange::single(mip, 0),
                    ImageAccess::ComputeShaderRead,
                )]);
                cmd.dispatch(16, 16, 1);
            }
            black_box(cmd.len());
            device.submit(&cmd).expect("submit failed");
            device.poll_completions();
            backend.clear_calls();
        });
    });
}

fn bench_record_render_pass(c: &mut Criterion) {
    let (device, backend) = device();
    let color = device
        .create_image(&ImageDescriptor::new_2d(
            256,
            256,
            ImageFormat::Rgba8Unorm,
            ImageUsage::COLOR_ATTACHMENT,
        ))
        .expect("image creation failed");
    let view = device
        .create_image_view(&ImageViewDescriptor::new(color))
        .expect("view creation failed");
    let render_pass = device
        .create_render_pass(&RenderPassDescriptor {
            label: None,
            color_attachments: vec![AttachmentDescriptor::new(ImageFormat::Rgba8Unorm)],
            depth_attachment: None,
        })
        .expect("render pass creation failed");
    let framebuffer = device
        .create_framebuffer(&FramebufferDescriptor {
            label: None,
            render_pass,
            attachments: vec![view],
            width: 256,
            height: 256,
            layers: 1,
        })
        .expect("framebuffer creation failed");
    let meshes: Vec<_> = (0..32)
        .map(|_| {
            let vertices = device
                .create_buffer(&BufferDescriptor::new(4096, BufferUsage::VERTEX))
                .expect("buffer creation failed");
            let indices = device
                .create_buffer(&BufferDescriptor::new(1024, BufferUsage::INDEX))
                .expect("buffer creation failed");
            (vertices, indices)
        })
        .collect();

    c.bench_function("record_render_pass_32_draws", |b| {
        b.iter(|| {
            let cmd = device.start_recording(QueueType::Graphics);
            cmd.begin_render_pass(
                render_pass,
                framebuffer,
                ScissorRect::from_dimensions(256, 256),
                &[ClearValue::color(0.0, 0.0, 0.0, 1.0)],
            );
            for (vertices, indices) in &meshes {
                cmd.bind_vertex_buffers(0, &[(*vertices, 0)]);
                cmd.bind_index_buffer(*indices, 0, IndexFormat::Uint32);
                cmd.draw_indexed(256, 1, 0, 0, 0);
            }
            cmd.end_render_pass();
            black_box(cmd.len());
            device.submit(&cmd).expect("submit failed");
            device.poll_completions();
            backend.clear_calls();
        });
    });
}

// ---------------------------------------------------------------------------
// Deferred destruction
// ---------------------------------------------------------------------------

fn bench_destruction_flush(c: &mut Criterion) {
    let backend = DummyBackend::new();
    let queue = DestructionQueue::new(FrameLag::new(2));
    let kinds = [
        ResourceKind::Buffer,
        ResourceKind::DeviceMemory,
        ResourceKind::ImageView,
        ResourceKind::Image,
        ResourceKind::DescriptorSet,
        ResourceKind::Pipeline,
    ];

    c.bench_function("destruction_defer_flush_1024", |b| {
        b.iter(|| {
            for object in 0..1024u64 {
                let kind = kinds[object as usize % kinds.len()];
                queue.destroy(DestroyRecord::new(kind, [object + 1, 0]));
            }
            let mut freed = 0;
            for _ in 0..3 {
                freed += queue.advance_frame(&backend);
            }
            black_box(freed);
            backend.clear_calls();
        });
    });
}

// ---------------------------------------------------------------------------
// Bindless slots
// ---------------------------------------------------------------------------

fn bench_bindless_churn(c: &mut Criterion) {
    let (device, backend) = device();
    let layout = device
        .create_descriptor_set_layout(&DescriptorSetLayoutDescriptor {
            label: None,
            bindings: vec![DescriptorBinding::bindless(
                0,
                BindlessCategory::StorageBuffer.descriptor_type(),
                4096,
                ShaderStages::COMPUTE,
            )],
        })
        .expect("layout creation failed");
    let pool = device
        .create_descriptor_pool(&DescriptorPoolDescriptor {
            label: None,
            max_sets: 1,
            sizes: vec![(BindlessCategory::StorageBuffer.descriptor_type(), 4096)],
            update_after_bind: true,
        })
        .expect("pool creation failed");
    let set = device
        .create_descriptor_set(&DescriptorSetDescriptor {
            label: None,
            pool,
            layout,
        })
        .expect("set creation failed");
    let uniform = device
        .register_bindless_uniform(
            "storage_buffers",
            BindlessUniformDescriptor::new(BindlessCategory::StorageBuffer, set, 0),
        )
        .expect("uniform registration failed");
    let buffer = device
        .create_buffer(&BufferDescriptor::new(256, BufferUsage::STORAGE))
        .expect("buffer creation failed");

    c.bench_function("bindless_allocate_free_256", |b| {
        b.iter(|| {
            let slots: Vec<u32> = (0..256)
                .map(|_| device.bindless_allocate(uniform, BindlessResource::StorageBuffer(buffer)))
                .collect();
            for slot in &slots {
                device.bindless_free(uniform, *slot);
            }
            black_box(device.flush_bindless().expect("flush failed"));
            for _ in 0..3 {
                device.end_frame();
            }
            backend.clear_calls();
        });
    });
}

criterion_group!(
    benches,
    bench_record_transfers,
    bench_record_mip_chain,
    bench_record_render_pass,
    bench_destruction_flush,
    bench_bindless_churn,
);
criterion_main!(benches);
