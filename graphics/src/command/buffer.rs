//! Command buffers with automatic barrier synthesis.
//!
//! Commands are appended in program order. Before each command is appended,
//! every resource it touches is checked against the [`StateTracker`]; the
//! transitions it needs are coalesced into one [`Command::Barrier`] placed
//! directly ahead of it. Inside a render pass no barrier may be recorded, so
//! transitions needed there are merged into the barrier ahead of the pass's
//! `BeginRenderPass`.
//!
//! Every resource a command references is added to the *locking* list. On
//! submit the list turns into [`ResourceLock`] guards that keep the
//! resources busy until the GPU completes the buffer.
//!
//! # Lifecycle
//!
//! ```text
//! Idle -> Recording -> Submitted -> Executing -> Completed -> Idle
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use vesper_core::pool::{Poolable, Pooled};
use vesper_core::profiling::profile_scope;

use crate::backend::Backend;
use crate::error::{GraphicsError, GraphicsResult};
use crate::internal::ResourceInternals;
use crate::resources::{
    AnyHandle, Buffer, DescriptorSet, Framebuffer, Handle, Image, Pipeline, RenderPass,
    ResourceLock, ResourceRegistry,
};
use crate::sync::SubmissionId;
use crate::types::{
    BufferCopy, BufferImageCopy, BufferState, ClearValue, ImageCopy, ImageState,
    ImageSubresourceRange, IndexFormat, PipelineBindPoint, QueueType, ScissorRect, Viewport,
};

use super::barrier::{BarrierBatch, BufferBarrier, ImageBarrier};
use super::commands::{Command, Usage};
use super::state::{StateTracker, SubresourceKey, buffer_state_covers, image_state_covers};

/// Lifecycle state of a command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandBufferState {
    Idle,
    Recording,
    /// Locked and handed to the backend.
    Submitted,
    /// Running on the GPU.
    Executing,
    /// GPU work finished (or submission failed); locks released.
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TrackedKey {
    Image(SubresourceKey),
    Buffer(Handle<Buffer>),
}

#[derive(Debug)]
struct OpenPass {
    /// Index of the pass's `BeginRenderPass` in the command list.
    begin_index: usize,
    touched: HashSet<TrackedKey>,
}

/// Storage reused across recordings.
#[derive(Debug, Default)]
struct Recording {
    commands: Vec<Command>,
    tracker: StateTracker,
    locking: Vec<AnyHandle>,
    locking_set: HashSet<AnyHandle>,
    open_pass: Option<OpenPass>,
    pending_usages: Vec<Usage>,
    uploads: Vec<AnyHandle>,
    usage_scratch: Vec<Usage>,
    ref_scratch: Vec<AnyHandle>,
}

impl Poolable for Recording {
    fn reset(&mut self) {
        self.commands.clear();
        self.tracker.clear();
        self.locking.clear();
        self.locking_set.clear();
        self.open_pass = None;
        self.pending_usages.clear();
        self.uploads.clear();
        self.usage_scratch.clear();
        self.ref_scratch.clear();
    }
}

impl Recording {
    fn lock(&mut self, handle: AnyHandle) {
        if self.locking_set.insert(handle) {
            self.locking.push(handle);
        }
    }

    fn record(&mut self, registry: &ResourceRegistry, command: Command) {
        let mut usages = std::mem::take(&mut self.usage_scratch);
        usages.clear();
        usages.append(&mut self.pending_usages);
        command.usages(registry, &mut usages);

        let mut refs = std::mem::take(&mut self.ref_scratch);
        refs.clear();
        command.referenced(registry, &mut refs);
        refs.extend(usages.iter().map(Usage::resource));
        for handle in refs.drain(..) {
            self.lock(handle);
        }
        self.ref_scratch = refs;

        let mut batch = BarrierBatch::new();
        for usage in &usages {
            self.require(registry, *usage, false, &mut batch);
        }

        match &command {
            Command::BeginRenderPass { .. } => {
                debug_assert!(
                    self.open_pass.is_none(),
                    "render pass begun inside another render pass"
                );
                self.push_barrier(batch);
                let mut touched = HashSet::new();
                for usage in &usages {
                    collect_keys(usage, &mut touched);
                }
                self.open_pass = Some(OpenPass {
                    begin_index: self.commands.len(),
                    touched,
                });
            }
            Command::EndRenderPass => {
                debug_assert!(self.open_pass.is_some(), "no render pass to end");
                self.hoist(batch);
                self.open_pass = None;
            }
            _ if self.open_pass.is_some() => self.hoist(batch),
            _ => self.push_barrier(batch),
        }

        self.usage_scratch = usages;
        log::trace!("Recorded {}", command.name());
        self.commands.push(command);
    }

    fn require(
        &mut self,
        registry: &ResourceRegistry,
        usage: Usage,
        force: bool,
        batch: &mut BarrierBatch,
    ) {
        match usage {
            Usage::Buffer { buffer, access } => {
                self.require_buffer(registry, buffer, access.state(), force, batch)
            }
            Usage::Image {
                image,
                range,
                access,
            } => {
                debug_assert!(
                    registry
                        .descriptor(image)
                        .is_none_or(|desc| range.fits(&desc)),
                    "{range:?} is outside {image:?}"
                );
                let required = access.state();
                for (mip, layer) in range.iter() {
                    let key = SubresourceKey::new(image, mip, layer);
                    self.require_image(registry, key, required, force, batch);
                }
            }
        }
    }

    fn require_image(
        &mut self,
        registry: &ResourceRegistry,
        key: SubresourceKey,
        required: ImageState,
        force: bool,
        batch: &mut BarrierBatch,
    ) {
        let tracked_key = TrackedKey::Image(key);
        if let Some(pass) = &self.open_pass
            && pass.touched.contains(&tracked_key)
            && let Some(tracked) = self.tracker.image_state(key)
        {
            if image_state_covers(tracked, required) {
                return;
            }
            if tracked.layout == required.layout
                && !tracked.access.has_write()
                && !required.access.has_write()
            {
                let widened = ImageState::new(
                    tracked.access | required.access,
                    tracked.layout,
                    tracked.stages | required.stages,
                );
                self.tracker.set_image(key, widened);
                batch.add_image(ImageBarrier {
                    image: key.image,
                    mip: key.mip,
                    layer: key.layer,
                    from: tracked,
                    to: widened,
                });
                return;
            }
            log::warn!(
                "{:?} mip {} layer {} used as {required:?} after {tracked:?} in the same render pass",
                key.image,
                key.mip,
                key.layer
            );
            debug_assert!(
                false,
                "conflicting transition of {:?} inside a render pass",
                key.image
            );
        }

        let barrier = self.tracker.transition_image(
            key,
            required,
            || registry.committed_image_state(key.image, key.mip, key.layer),
            force,
        );
        if let Some(barrier) = barrier {
            batch.add_image(barrier);
        }
        if let Some(pass) = &mut self.open_pass {
            pass.touched.insert(tracked_key);
        }
    }

    fn require_buffer(
        &mut self,
        registry: &ResourceRegistry,
        buffer: Handle<Buffer>,
        required: BufferState,
        force: bool,
        batch: &mut BarrierBatch,
    ) {
        let tracked_key = TrackedKey::Buffer(buffer);
        if let Some(pass) = &self.open_pass
            && pass.touched.contains(&tracked_key)
            && let Some(tracked) = self.tracker.buffer_state(buffer)
        {
            if buffer_state_covers(tracked, required) {
                return;
            }
            if !tracked.access.has_write() && !required.access.has_write() {
                let widened = BufferState::new(
                    tracked.access | required.access,
                    tracked.stages | required.stages,
                );
                self.tracker.set_buffer(buffer, widened);
                batch.add_buffer(BufferBarrier {
                    buffer,
                    from: tracked,
                    to: widened,
                });
                return;
            }
            log::warn!(
                "{buffer:?} used as {required:?} after {tracked:?} in the same render pass"
            );
            debug_assert!(
                false,
                "conflicting transition of {buffer:?} inside a render pass"
            );
        }

        let barrier = self.tracker.transition_buffer(
            buffer,
            required,
            || registry.committed_buffer_state(buffer),
            force,
        );
        if let Some(barrier) = barrier {
            batch.add_buffer(barrier);
        }
        if let Some(pass) = &mut self.open_pass {
            pass.touched.insert(tracked_key);
        }
    }

    fn push_barrier(&mut self, batch: BarrierBatch) {
        if batch.is_empty() {
            return;
        }
        log::trace!(
            "Barrier: {} transitions, {:?} -> {:?}",
            batch.len(),
            batch.src_stages(),
            batch.dst_stages()
        );
        self.commands.push(Command::Barrier(batch));
    }

    /// Merges `batch` into the barrier ahead of the open render pass.
    fn hoist(&mut self, batch: BarrierBatch) {
        if batch.is_empty() {
            return;
        }
        let Some(pass) = self.open_pass.as_mut() else {
            self.push_barrier(batch);
            return;
        };

        let index = pass.begin_index;
        log::trace!("Hoisting {} transitions ahead of render pass", batch.len());
        if index > 0
            && let Some(Command::Barrier(existing)) = self.commands.get_mut(index - 1)
        {
            existing.merge(batch);
        } else {
            self.commands.insert(index, Command::Barrier(batch));
            pass.begin_index += 1;
        }
    }
}

fn collect_keys(usage: &Usage, out: &mut HashSet<TrackedKey>) {
    match *usage {
        Usage::Buffer { buffer, .. } => {
            out.insert(TrackedKey::Buffer(buffer));
        }
        Usage::Image { image, range, .. } => {
            out.extend(
                range
                    .iter()
                    .map(|(mip, layer)| TrackedKey::Image(SubresourceKey::new(image, mip, layer))),
            );
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CommandBufferState,
    recording: Pooled<Recording>,
    locked: Vec<ResourceLock>,
    uploads: Vec<AnyHandle>,
    submission: Option<SubmissionId>,
}

/// A recording of commands for one queue.
///
/// All methods take `&self`; one mutex serializes every writer. Once
/// submitted the buffer rejects further recording until it is recycled.
pub struct CommandBuffer {
    queue: QueueType,
    registry: Arc<ResourceRegistry>,
    inner: Mutex<Inner>,
}

impl fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CommandBuffer")
            .field("queue", &self.queue)
            .field("state", &inner.state)
            .field("locked", &inner.locked.len())
            .field("submission", &inner.submission)
            .finish()
    }
}

impl CommandBuffer {
    /// Creates an idle command buffer for `queue`.
    pub fn new(queue: QueueType, registry: Arc<ResourceRegistry>) -> Self {
        Self {
            queue,
            registry,
            inner: Mutex::new(Inner {
                state: CommandBufferState::Idle,
                recording: Pooled::default(),
                locked: Vec::new(),
                uploads: Vec::new(),
                submission: None,
            }),
        }
    }

    /// Queue this buffer records for.
    pub fn queue(&self) -> QueueType {
        self.queue
    }

    pub fn state(&self) -> CommandBufferState {
        self.inner.lock().state
    }

    /// Submission id once submitted.
    pub fn submission(&self) -> Option<SubmissionId> {
        self.inner.lock().submission
    }

    /// Idle -> Recording.
    pub fn begin(&self) {
        let mut inner = self.inner.lock();
        debug_assert_eq!(
            inner.state,
            CommandBufferState::Idle,
            "begin on a command buffer that is not idle"
        );
        inner.recording.activate();
        inner.state = CommandBufferState::Recording;
    }

    fn with_recording<R>(&self, f: impl FnOnce(&mut Recording, &ResourceRegistry) -> R) -> Option<R> {
        let mut inner = self.inner.lock();
        if inner.state != CommandBufferState::Recording {
            log::error!(
                "{:?} command buffer is not recording ({:?}); command dropped",
                self.queue,
                inner.state
            );
            debug_assert!(false, "{:?} command buffer is not recording", self.queue);
            return None;
        }
        inner
            .recording
            .get_mut()
            .map(|recording| f(recording, &self.registry))
    }

    /// Appends a command, preceded by the barrier it needs.
    ///
    /// Every resource the command references is locked on submit.
    pub fn add_command(&self, command: Command) {
        debug_assert!(
            self.queue.supports(command.required_capabilities()),
            "{} cannot run on the {:?} queue",
            command.name(),
            self.queue
        );
        debug_assert!(
            !matches!(command, Command::Barrier(_)),
            "explicit barriers go through pipeline_barrier"
        );
        self.with_recording(|recording, registry| {
            debug_assert!(
                !command.requires_render_pass() || recording.open_pass.is_some(),
                "{} recorded outside a render pass",
                command.name()
            );
            recording.record(registry, command);
        });
    }

    /// Adds a resource to the locking list.
    pub fn add_lock_resource(&self, handle: impl Into<AnyHandle>) {
        let handle = handle.into();
        self.with_recording(|recording, _| recording.lock(handle));
    }

    /// Declares resources the next command touches indirectly, such as
    /// images and buffers reached through bound descriptor sets.
    pub fn use_resources(&self, usages: &[Usage]) {
        self.with_recording(|recording, _| recording.pending_usages.extend_from_slice(usages));
    }

    /// Records a barrier bringing every usage into its state, even when the
    /// tracked state already matches. Serializes write-after-write hazards
    /// the tracker does not see, such as two dispatches writing one buffer.
    pub fn pipeline_barrier(&self, usages: &[Usage]) {
        self.with_recording(|recording, registry| {
            debug_assert!(
                recording.open_pass.is_none(),
                "pipeline barrier inside a render pass"
            );
            let mut batch = BarrierBatch::new();
            for usage in usages {
                recording.lock(usage.resource());
                recording.require(registry, *usage, true, &mut batch);
            }
            recording.push_barrier(batch);
        });
    }

    /// Marks a resource as waiting on this buffer; it becomes ready when the
    /// buffer completes.
    pub(crate) fn add_upload(&self, handle: AnyHandle) {
        self.with_recording(|recording, _| {
            recording.lock(handle);
            recording.uploads.push(handle);
        });
    }

    pub fn draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.add_command(Command::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    pub fn draw_indexed(
        &self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.add_command(Command::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        });
    }

    pub fn draw_indirect(&self, buffer: Handle<Buffer>, offset: u64, draw_count: u32, stride: u32) {
        self.add_command(Command::DrawIndirect {
            buffer,
            offset,
            draw_count,
            stride,
        });
    }

    pub fn dispatch(&self, x: u32, y: u32, z: u32) {
        self.add_command(Command::Dispatch { x, y, z });
    }

    pub fn dispatch_indirect(&self, buffer: Handle<Buffer>, offset: u64) {
        self.add_command(Command::DispatchIndirect { buffer, offset });
    }

    pub fn copy_buffer(&self, src: Handle<Buffer>, dst: Handle<Buffer>, regions: &[BufferCopy]) {
        self.add_command(Command::CopyBuffer {
            src,
            dst,
            regions: regions.to_vec(),
        });
    }

    pub fn copy_buffer_to_image(
        &self,
        src: Handle<Buffer>,
        dst: Handle<Image>,
        regions: &[BufferImageCopy],
    ) {
        self.add_command(Command::CopyBufferToImage {
            src,
            dst,
            regions: regions.to_vec(),
        });
    }

    pub fn copy_image_to_buffer(
        &self,
        src: Handle<Image>,
        dst: Handle<Buffer>,
        regions: &[BufferImageCopy],
    ) {
        self.add_command(Command::CopyImageToBuffer {
            src,
            dst,
            regions: regions.to_vec(),
        });
    }

    pub fn copy_image(&self, src: Handle<Image>, dst: Handle<Image>, regions: &[ImageCopy]) {
        self.add_command(Command::CopyImage {
            src,
            dst,
            regions: regions.to_vec(),
        });
    }

    pub fn fill_buffer(&self, buffer: Handle<Buffer>, offset: u64, size: u64, value: u32) {
        self.add_command(Command::FillBuffer {
            buffer,
            offset,
            size,
            value,
        });
    }

    pub fn clear_color_image(
        &self,
        image: Handle<Image>,
        range: ImageSubresourceRange,
        color: [f32; 4],
    ) {
        self.add_command(Command::ClearColorImage {
            image,
            range,
            color,
        });
    }

    /// Binds a pipeline at the bind point its descriptor declares.
    pub fn bind_pipeline(&self, pipeline: Handle<Pipeline>) {
        let bind_point = self
            .registry
            .descriptor(pipeline)
            .map_or(PipelineBindPoint::Graphics, |desc| desc.bind_point());
        self.add_command(Command::BindPipeline {
            pipeline,
            bind_point,
        });
    }

    pub fn bind_vertex_buffers(&self, first_binding: u32, buffers: &[(Handle<Buffer>, u64)]) {
        self.add_command(Command::BindVertexBuffers {
            first_binding,
            buffers: buffers.to_vec(),
        });
    }

    pub fn bind_index_buffer(&self, buffer: Handle<Buffer>, offset: u64, format: IndexFormat) {
        self.add_command(Command::BindIndexBuffer {
            buffer,
            offset,
            format,
        });
    }

    pub fn bind_descriptor_sets(
        &self,
        pipeline: Handle<Pipeline>,
        first_set: u32,
        sets: &[Handle<DescriptorSet>],
    ) {
        let bind_point = self
            .registry
            .descriptor(pipeline)
            .map_or(PipelineBindPoint::Graphics, |desc| desc.bind_point());
        self.add_command(Command::BindDescriptorSets {
            pipeline,
            bind_point,
            first_set,
            sets: sets.to_vec(),
        });
    }

    pub fn push_constants(&self, pipeline: Handle<Pipeline>, offset: u32, data: &[u8]) {
        self.add_command(Command::PushConstants {
            pipeline,
            offset,
            data: data.to_vec(),
        });
    }

    /// Begins a render pass; attachments transition to their attachment
    /// states in the barrier recorded ahead of it.
    pub fn begin_render_pass(
        &self,
        render_pass: Handle<RenderPass>,
        framebuffer: Handle<Framebuffer>,
        area: ScissorRect,
        clear_values: &[ClearValue],
    ) {
        self.add_command(Command::BeginRenderPass {
            render_pass,
            framebuffer,
            area,
            clear_values: clear_values.to_vec(),
        });
    }

    pub fn end_render_pass(&self) {
        self.add_command(Command::EndRenderPass);
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        self.add_command(Command::SetViewport(viewport));
    }

    pub fn set_scissor(&self, scissor: ScissorRect) {
        self.add_command(Command::SetScissor(scissor));
    }

    /// Commands recorded so far, barriers included.
    pub fn commands(&self) -> Vec<Command> {
        self.inner
            .lock()
            .recording
            .get()
            .map(|recording| recording.commands.clone())
            .unwrap_or_default()
    }

    /// Number of recorded commands, barriers included.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .recording
            .get()
            .map_or(0, |recording| recording.commands.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resources that will be locked on submit, in first-use order.
    pub fn locking(&self) -> Vec<AnyHandle> {
        self.inner
            .lock()
            .recording
            .get()
            .map(|recording| recording.locking.clone())
            .unwrap_or_default()
    }

    /// Whether the recording references `handle`, directly or through a
    /// declared usage.
    pub fn references(&self, handle: AnyHandle) -> bool {
        self.inner
            .lock()
            .recording
            .get()
            .is_some_and(|recording| recording.locking_set.contains(&handle))
    }

    /// Number of locks held while the buffer executes.
    pub fn locked_count(&self) -> usize {
        self.inner.lock().locked.len()
    }

    /// Tracked state of an image subresource in this recording.
    pub fn image_state(&self, image: Handle<Image>, mip: u32, layer: u32) -> Option<ImageState> {
        self.inner.lock().recording.get().and_then(|recording| {
            recording
                .tracker
                .image_state(SubresourceKey::new(image, mip, layer))
        })
    }

    /// Tracked state of a buffer in this recording.
    pub fn buffer_state(&self, buffer: Handle<Buffer>) -> Option<BufferState> {
        self.inner
            .lock()
            .recording
            .get()
            .and_then(|recording| recording.tracker.buffer_state(buffer))
    }

    /// Recording -> Submitted -> Executing.
    ///
    /// Locks every referenced resource, hands the commands to the backend and
    /// commits the final tracked states. On failure the locks are released
    /// and the buffer is left Completed.
    pub fn submit(&self, backend: &dyn Backend) -> GraphicsResult<SubmissionId> {
        profile_scope!("command_buffer_submit");

        let mut inner = self.inner.lock();
        debug_assert_eq!(
            inner.state,
            CommandBufferState::Recording,
            "submit of a command buffer that is not recording"
        );
        let Inner {
            state,
            recording,
            locked,
            uploads,
            submission,
        } = &mut *inner;
        let Some(recording) = recording.get_mut() else {
            return Err(GraphicsError::Internal(
                "command buffer has no recording".to_string(),
            ));
        };
        debug_assert!(
            recording.open_pass.is_none(),
            "submit with an open render pass"
        );
        *state = CommandBufferState::Submitted;

        let dead = self.registry.dead_handles(&recording.locking);
        if let Some(first) = dead.first() {
            log::error!(
                "{:?} command buffer references {} destroyed resources",
                self.queue,
                dead.len()
            );
            debug_assert!(false, "{first:?} destroyed while referenced by a recording");
            *state = CommandBufferState::Completed;
            return Err(GraphicsError::InvalidHandle(first.kind()));
        }

        locked.extend(
            recording
                .locking
                .iter()
                .filter_map(|handle| self.registry.lock(*handle)),
        );

        let resources = ResourceInternals::new(&self.registry);
        let id = match backend.submit(self.queue, &recording.commands, &resources) {
            Ok(id) => id,
            Err(err) => {
                log::error!("{:?} submission failed: {err}", self.queue);
                locked.clear();
                *state = CommandBufferState::Completed;
                return Err(err);
            }
        };

        self.registry.commit_states(
            recording
                .tracker
                .images()
                .map(|(key, state)| (key.image, key.mip, key.layer, state)),
            recording.tracker.buffers(),
        );
        uploads.append(&mut recording.uploads);
        *submission = Some(id);
        *state = CommandBufferState::Executing;

        log::debug!(
            "{id:?} on {:?}: {} commands, {} locks",
            self.queue,
            recording.commands.len(),
            locked.len()
        );
        Ok(id)
    }

    /// Recording -> Completed without reaching the backend.
    ///
    /// Used when a submission is refused before any lock is taken.
    pub fn abandon(&self) {
        let mut inner = self.inner.lock();
        debug_assert_eq!(
            inner.state,
            CommandBufferState::Recording,
            "abandon of a command buffer that is not recording"
        );
        inner.locked.clear();
        inner.state = CommandBufferState::Completed;
    }

    /// Executing -> Completed. Releases every lock and marks uploads ready.
    pub fn complete(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CommandBufferState::Completed {
            return;
        }
        debug_assert_eq!(
            inner.state,
            CommandBufferState::Executing,
            "completion of a command buffer that was not submitted"
        );

        let released = inner.locked.len();
        inner.locked.clear();
        for upload in inner.uploads.drain(..) {
            if !self.registry.mark_ready_any(upload) {
                log::debug!("Upload target {upload:?} destroyed before completion");
            }
        }
        inner.state = CommandBufferState::Completed;
        log::trace!(
            "{:?} completed, released {released} locks",
            inner.submission
        );
    }

    /// Completed -> Idle. Keeps the recording storage for the next use.
    pub fn recycle(&self) {
        let mut inner = self.inner.lock();
        debug_assert_eq!(
            inner.state,
            CommandBufferState::Completed,
            "recycle of a command buffer that has not completed"
        );
        inner.recording.release();
        inner.uploads.clear();
        inner.submission = None;
        inner.state = CommandBufferState::Idle;
    }
}
