//! Command recording integration tests.
//!
//! Barrier synthesis, render pass hoisting, resource locking and queue thread
//! modes, driven through the device the way a renderer uses it.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p vesper-graphics --test recording_tests
//! ```

mod common;

use std::sync::Arc;

use rstest::rstest;

use common::{TestContext, barriers, position};
use vesper_graphics::types::{BufferCopy, ImageSubresourceRange, IndexFormat, ScissorRect};
use vesper_graphics::{
    BufferAccess, BufferUsage, ClearValue, Command, CommandBuffer, CommandBufferState,
    GraphicsConfig, GraphicsError, ImageAccess, ImageLayout, ImageUsage, QueueThreadMode,
    QueueType, Usage,
};

// ============================================================================
// Barrier synthesis
// ============================================================================

/// Copying into a buffer and then binding it as an index buffer needs exactly
/// one barrier, TRANSFER_WRITE to INDEX_READ on the destination.
#[test]
fn test_copy_then_index_read() {
    let ctx = TestContext::new();
    let target = ctx.color_target(32, 32);
    let src = ctx.host_buffer(1024, BufferUsage::TRANSFER_SRC);
    let dst = ctx.buffer(1024, BufferUsage::TRANSFER_DST | BufferUsage::INDEX);

    let cmd = ctx.device.start_recording(QueueType::Graphics);
    cmd.copy_buffer(src, dst, &[BufferCopy::whole(1024)]);
    cmd.begin_render_pass(
        target.render_pass,
        target.framebuffer,
        ScissorRect::from_dimensions(32, 32),
        &[ClearValue::color(0.0, 0.0, 0.0, 1.0)],
    );
    cmd.bind_index_buffer(dst, 0, IndexFormat::Uint32);
    cmd.draw_indexed(256, 1, 0, 0, 0);
    cmd.end_render_pass();

    let commands = cmd.commands();
    let buffer_barriers: Vec<_> = barriers(&commands)
        .into_iter()
        .flat_map(|batch| batch.buffers().iter().copied())
        .collect();
    assert_eq!(buffer_barriers.len(), 1);
    assert_eq!(buffer_barriers[0].buffer, dst);
    assert_eq!(buffer_barriers[0].from, BufferAccess::TransferWrite.state());
    assert_eq!(buffer_barriers[0].to, BufferAccess::IndexRead.state());
}

/// Reusing a subresource in the state it is already in records nothing.
#[test]
fn test_no_barrier_for_same_state() {
    let ctx = TestContext::new();
    let texture = ctx.image(16, 16, 1, ImageUsage::SAMPLED | ImageUsage::TRANSFER_DST);
    let read = Usage::image(
        texture,
        ImageSubresourceRange::single(0, 0),
        ImageAccess::ComputeShaderRead,
    );

    let cmd = ctx.device.start_recording(QueueType::Compute);
    for _ in 0..4 {
        cmd.use_resources(&[read]);
        cmd.dispatch(8, 8, 1);
    }

    let commands = cmd.commands();
    assert_eq!(barriers(&commands).len(), 1);
    assert!(matches!(commands[0], Command::Barrier(_)));
    assert_eq!(commands.len(), 5);
}

/// Transitions are per subresource: touching one mip leaves the others alone.
#[test]
fn test_barriers_track_individual_mips() {
    let ctx = TestContext::new();
    let texture = ctx.image(16, 16, 3, ImageUsage::SAMPLED | ImageUsage::TRANSFER_DST);
    let full = ImageSubresourceRange {
        base_mip: 0,
        mip_count: 3,
        base_layer: 0,
        layer_count: 1,
    };

    let cmd = ctx.device.start_recording(QueueType::Compute);
    cmd.clear_color_image(texture, ImageSubresourceRange::single(1, 0), [1.0; 4]);
    cmd.use_resources(&[Usage::image(texture, full, ImageAccess::ComputeShaderRead)]);
    cmd.dispatch(1, 1, 1);

    let commands = cmd.commands();
    let batches = barriers(&commands);
    assert_eq!(batches.len(), 2);

    let clear = batches[0].images();
    assert_eq!(clear.len(), 1);
    assert_eq!(clear[0].mip, 1);
    assert_eq!(clear[0].to.layout, ImageLayout::TransferDst);

    let read = batches[1].images();
    assert_eq!(read.len(), 3);
    for barrier in read {
        let expected_from = if barrier.mip == 1 {
            ImageLayout::TransferDst
        } else {
            ImageLayout::Undefined
        };
        assert_eq!(barrier.from.layout, expected_from, "mip {}", barrier.mip);
        assert_eq!(barrier.to.layout, ImageLayout::ShaderReadOnly);
    }
}

/// States committed at submit carry over to the next recording, on any queue.
#[test]
fn test_committed_state_carries_across_submissions() {
    let ctx = TestContext::new();
    let texture = ctx.image(8, 8, 1, ImageUsage::SAMPLED | ImageUsage::TRANSFER_DST);

    let upload = ctx.device.start_recording(QueueType::Transfer);
    upload.clear_color_image(texture, ImageSubresourceRange::single(0, 0), [0.5; 4]);
    ctx.device.submit(&upload).unwrap();

    let read = ctx.device.start_recording(QueueType::Compute);
    read.use_resources(&[Usage::image(
        texture,
        ImageSubresourceRange::single(0, 0),
        ImageAccess::ComputeShaderRead,
    )]);
    read.dispatch(1, 1, 1);

    let commands = read.commands();
    let batches = barriers(&commands);
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].images()[0].from, ImageAccess::TransferWrite.state());
    assert_eq!(batches[0].images()[0].to, ImageAccess::ComputeShaderRead.state());
}

// ============================================================================
// Render pass hoisting
// ============================================================================

/// Transitions requested inside a render pass are merged into the barrier
/// ahead of it; nothing lands between begin and end.
#[test]
fn test_render_pass_hoists_barriers() {
    let ctx = TestContext::new();
    let target = ctx.color_target(64, 64);
    let texture = ctx.image(64, 64, 1, ImageUsage::SAMPLED);
    let vertices = ctx.buffer(512, BufferUsage::VERTEX);

    let cmd = ctx.device.start_recording(QueueType::Graphics);
    cmd.begin_render_pass(
        target.render_pass,
        target.framebuffer,
        ScissorRect::from_dimensions(64, 64),
        &[ClearValue::color(0.1, 0.2, 0.3, 1.0)],
    );
    cmd.bind_vertex_buffers(0, &[(vertices, 0)]);
    cmd.use_resources(&[Usage::image(
        texture,
        ImageSubresourceRange::single(0, 0),
        ImageAccess::FragmentShaderRead,
    )]);
    cmd.draw(6, 1, 0, 0);
    cmd.end_render_pass();

    let commands = cmd.commands();
    let begin = position(&commands, |c| matches!(c, Command::BeginRenderPass { .. }));
    let end = position(&commands, |c| matches!(c, Command::EndRenderPass));
    assert!(
        commands[begin + 1..end]
            .iter()
            .all(|c| !matches!(c, Command::Barrier(_))),
        "barrier inside render pass: {commands:?}"
    );

    let batches = barriers(&commands);
    assert_eq!(batches.len(), 1);
    let Command::Barrier(hoisted) = &commands[begin - 1] else {
        panic!("expected a barrier ahead of the pass, got {:?}", commands[begin - 1]);
    };
    let images: Vec<_> = hoisted.images().iter().map(|b| (b.image, b.to.layout)).collect();
    assert!(images.contains(&(target.image, ImageLayout::ColorAttachment)));
    assert!(images.contains(&(texture, ImageLayout::ShaderReadOnly)));
    assert!(hoisted.buffers().is_empty());
}

/// The attachment ends the pass in its attachment state, so reading it
/// afterwards transitions it out.
#[test]
fn test_attachment_read_after_pass() {
    let ctx = TestContext::new();
    let target = ctx.color_target(16, 16);

    let cmd = ctx.device.start_recording(QueueType::Graphics);
    cmd.begin_render_pass(
        target.render_pass,
        target.framebuffer,
        ScissorRect::from_dimensions(16, 16),
        &[ClearValue::color(0.0, 0.0, 0.0, 0.0)],
    );
    cmd.draw(3, 1, 0, 0);
    cmd.end_render_pass();
    cmd.use_resources(&[Usage::image(
        target.image,
        ImageSubresourceRange::single(0, 0),
        ImageAccess::ComputeShaderRead,
    )]);
    cmd.dispatch(1, 1, 1);

    assert_eq!(
        cmd.image_state(target.image, 0, 0),
        Some(ImageAccess::ComputeShaderRead.state())
    );
    let commands = cmd.commands();
    let end = position(&commands, |c| matches!(c, Command::EndRenderPass));
    let Command::Barrier(after) = &commands[end + 1] else {
        panic!("expected a barrier after the pass");
    };
    assert_eq!(after.images()[0].from, ImageAccess::ColorAttachmentWrite.state());
}

// ============================================================================
// Locking
// ============================================================================

/// Busy counts rise on submit and fall only when the GPU completes the work.
#[test]
fn test_locks_rise_on_submit_and_fall_on_completion() {
    let ctx = TestContext::manual();
    let src = ctx.host_buffer(256, BufferUsage::TRANSFER_SRC);
    let dst = ctx.buffer(256, BufferUsage::TRANSFER_DST);

    let cmd = ctx.device.start_recording(QueueType::Transfer);
    cmd.copy_buffer(src, dst, &[BufferCopy::whole(256)]);
    assert_eq!(cmd.locking(), vec![src.erase(), dst.erase()]);
    assert!(!ctx.device.is_busy(src));

    let id = ctx.device.submit(&cmd).unwrap();
    assert_eq!(cmd.state(), CommandBufferState::Executing);
    assert_eq!(cmd.locked_count(), 2);
    assert_eq!(ctx.device.get(src).unwrap().busy, 1);
    assert!(ctx.device.is_busy(dst));

    ctx.device.poll_completions();
    assert!(ctx.device.is_busy(src));

    ctx.backend.complete(id);
    assert_eq!(ctx.device.poll_completions(), 1);
    assert!(!ctx.device.is_busy(src));
    assert!(!ctx.device.is_busy(dst));
    assert_eq!(cmd.state(), CommandBufferState::Idle);
    assert_eq!(ctx.device.pool(QueueType::Transfer).free_count(), 1);
}

/// Two in-flight buffers referencing one resource hold two locks.
#[test]
fn test_locks_count_per_command_buffer() {
    let ctx = TestContext::manual();
    let buffer = ctx.buffer(64, BufferUsage::TRANSFER_DST);

    let mut ids = Vec::new();
    for _ in 0..2 {
        let cmd = ctx.device.start_recording(QueueType::Transfer);
        cmd.fill_buffer(buffer, 0, 64, 0);
        ids.push(ctx.device.submit(&cmd).unwrap());
    }
    assert_eq!(ctx.device.get(buffer).unwrap().busy, 2);

    ctx.backend.complete(ids[0]);
    ctx.device.poll_completions();
    assert_eq!(ctx.device.get(buffer).unwrap().busy, 1);

    ctx.device.wait_idle().unwrap();
    assert_eq!(ctx.device.get(buffer).unwrap().busy, 0);
}

/// A failed submission releases its locks and recycles the buffer.
#[test]
fn test_failed_submit_recycles() {
    let ctx = TestContext::new();
    let buffer = ctx.buffer(64, BufferUsage::TRANSFER_DST);
    ctx.backend.set_fail_submissions(true);

    let cmd = ctx.device.start_recording(QueueType::Transfer);
    cmd.fill_buffer(buffer, 0, 64, 0xff);
    assert!(matches!(
        ctx.device.submit(&cmd),
        Err(GraphicsError::SubmissionFailed(_))
    ));
    assert!(!ctx.device.is_busy(buffer));
    assert_eq!(cmd.state(), CommandBufferState::Idle);
    assert_eq!(ctx.device.pool(QueueType::Transfer).in_flight_count(), 0);
    assert_eq!(ctx.device.pool(QueueType::Transfer).free_count(), 1);
}

// ============================================================================
// Queue thread modes
// ============================================================================

/// Synchronous queues share one recording between threads; multithreaded
/// queues give every thread its own.
#[rstest]
#[case::synchronous(QueueThreadMode::Synchronous, 1)]
#[case::multithreaded(QueueThreadMode::Multithreaded, 4)]
fn test_queue_thread_modes(#[case] mode: QueueThreadMode, #[case] expected: usize) {
    let ctx = TestContext::with_config(
        GraphicsConfig::default().with_queue_mode(QueueType::Transfer, mode),
        false,
    );
    let buffers: Vec<_> = (0..4)
        .map(|_| ctx.buffer(64, BufferUsage::TRANSFER_DST))
        .collect();

    let recorded: Vec<Arc<CommandBuffer>> = std::thread::scope(|s| {
        let workers: Vec<_> = buffers
            .iter()
            .map(|&buffer| {
                let device = &ctx.device;
                s.spawn(move || {
                    let cmd = device.start_recording(QueueType::Transfer);
                    cmd.fill_buffer(buffer, 0, 64, 0);
                    cmd
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().unwrap())
            .collect()
    });

    let mut unique: Vec<Arc<CommandBuffer>> = Vec::new();
    for cmd in recorded {
        if !unique.iter().any(|seen| Arc::ptr_eq(seen, &cmd)) {
            unique.push(cmd);
        }
    }
    assert_eq!(unique.len(), expected);

    for cmd in &unique {
        ctx.device.submit(cmd).unwrap();
    }
    let submissions = ctx.backend.submissions();
    assert_eq!(submissions.len(), expected);
    let fills = submissions
        .iter()
        .flat_map(|(_, commands)| commands)
        .filter(|command| matches!(command, Command::FillBuffer { .. }))
        .count();
    assert_eq!(fills, 4);
}

/// After a synchronous queue's buffer is submitted the next caller gets a
/// fresh recording.
#[test]
fn test_synchronous_queue_restarts_after_submit() {
    let ctx = TestContext::with_config(
        GraphicsConfig::default().with_queue_mode(QueueType::Graphics, QueueThreadMode::Synchronous),
        true,
    );

    let first = ctx.device.start_recording(QueueType::Graphics);
    ctx.device.submit(&first).unwrap();
    let second = ctx.device.start_recording(QueueType::Graphics);
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.state(), CommandBufferState::Recording);
    assert!(Arc::ptr_eq(
        &second,
        &ctx.device.start_recording(QueueType::Graphics)
    ));
}
