//! Render device.
//!
//! The [`RenderDevice`] is the one object the renderer owns. It holds the
//! resource registry, deferred destruction, bindless tables, per-queue command
//! pools and frame pacing, and routes every native call through the
//! [`Backend`] it was created with.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use vesper_core::profiling::{frame_mark, profile_plot, profile_scope};

use crate::backend::{Backend, NativeHandle};
use crate::bindless::{BindlessAllocator, BindlessResource, BindlessUniformDescriptor, BindlessUniformId};
use crate::command::{CommandBuffer, CommandPool};
use crate::config::GraphicsConfig;
use crate::destruction::DestructionQueue;
use crate::error::{GraphicsError, GraphicsResult};
use crate::internal::ResourceInternals;
use crate::resources::{
    Buffer, DescriptorPool, DescriptorSet, DescriptorSetLayout, Framebuffer, Handle, Image,
    ImageView, Pipeline, Readiness, RenderPass, ResourceKind, ResourceRegistry, ResourceType,
    ResourceView, Sampler,
};
use crate::sync::{FramePacer, SubmissionId};
use crate::types::{
    BufferCopy, BufferDescriptor, BufferUsage, DescriptorPoolDescriptor, DescriptorSetDescriptor,
    DescriptorSetLayoutDescriptor, FramebufferDescriptor, ImageDescriptor, ImageViewDescriptor,
    MemoryLocation, PipelineDescriptor, QueueType, RenderPassDescriptor, SamplerDescriptor,
};

/// GPU command recording and resource lifecycle for one native device.
///
/// # Thread Safety
///
/// `RenderDevice` is `Send + Sync`. Resources may be created and destroyed
/// from any thread, and each queue's command buffers can be recorded and
/// submitted independently. Frame boundaries (`begin_frame`/`end_frame`) are
/// expected from one thread.
///
/// # Example
///
/// ```ignore
/// let device = RenderDevice::new(GraphicsConfig::default(), Arc::new(DummyBackend::new()))?;
///
/// let vertices = device.create_buffer_with_data(
///     &BufferDescriptor::new(1024, BufferUsage::VERTEX),
///     &bytes,
/// )?;
///
/// device.begin_frame()?;
/// let cmd = device.start_recording(QueueType::Graphics);
/// cmd.bind_vertex_buffers(0, &[(vertices, 0)]);
/// device.submit(&cmd)?;
/// device.end_frame();
/// ```
pub struct RenderDevice {
    config: GraphicsConfig,
    backend: Arc<dyn Backend>,
    registry: Arc<ResourceRegistry>,
    destruction: DestructionQueue,
    bindless: BindlessAllocator,
    pools: [CommandPool; QueueType::COUNT],
    pacer: FramePacer,
    frame: AtomicU64,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for RenderDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderDevice")
            .field("backend", &self.backend.name())
            .field("frame", &self.frame_index())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl RenderDevice {
    /// Creates a device over `backend`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphicsError::InvalidConfig`] if the configuration fails
    /// validation.
    pub fn new(config: GraphicsConfig, backend: Arc<dyn Backend>) -> GraphicsResult<Self> {
        config.validate()?;

        let registry = Arc::new(ResourceRegistry::new());
        let pools = QueueType::ALL
            .map(|queue| CommandPool::new(queue, config.queue_modes.get(queue), Arc::clone(&registry)));

        log::info!(
            "Render device on {} (frame lag {})",
            backend.name(),
            config.frame_lag.get()
        );

        Ok(Self {
            destruction: DestructionQueue::new(config.frame_lag),
            bindless: BindlessAllocator::new(config.frame_lag, config.bindless),
            pacer: FramePacer::new(config.frame_lag),
            config,
            backend,
            registry,
            pools,
            frame: AtomicU64::new(0),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &GraphicsConfig {
        &self.config
    }

    /// Current frame index. Starts at 0 and advances in [`end_frame`](Self::end_frame).
    pub fn frame_index(&self) -> u64 {
        self.frame.load(Ordering::Acquire)
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Read access to every live resource.
    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Native-level access for platform glue.
    pub fn internals(&self) -> ResourceInternals<'_> {
        ResourceInternals::new(&self.registry)
    }

    /// Deferred destruction queue.
    pub fn destruction(&self) -> &DestructionQueue {
        &self.destruction
    }

    /// Bindless slot allocator.
    pub fn bindless(&self) -> &BindlessAllocator {
        &self.bindless
    }

    /// Command pool of `queue`.
    pub fn pool(&self, queue: QueueType) -> &CommandPool {
        &self.pools[queue.index()]
    }

    fn register<T: ResourceType>(&self, desc: T::Descriptor, native: NativeHandle) -> Handle<T> {
        self.registry.insert(desc, native, Readiness::Ready)
    }

    // --- Resources ---

    /// Creates a buffer with undefined contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is zero or the backend fails to create it.
    pub fn create_buffer(&self, desc: &BufferDescriptor) -> GraphicsResult<Handle<Buffer>> {
        validate_buffer(desc)?;
        let native = self.backend.create_buffer(desc, None)?;
        Ok(self.register(desc.clone(), native))
    }

    /// Creates a buffer filled with `data`.
    ///
    /// Host-visible buffers are written directly and are ready at once.
    /// Device-local buffers are filled through a staging buffer copied on the
    /// transfer queue; they stay pending until that copy completes.
    pub fn create_buffer_with_data(
        &self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> GraphicsResult<Handle<Buffer>> {
        profile_scope!("create_buffer_with_data");

        validate_buffer(desc)?;
        if data.len() as u64 > desc.size {
            return Err(GraphicsError::InvalidParameter(format!(
                "{} bytes of data for a {} byte buffer",
                data.len(),
                desc.size
            )));
        }
        if desc.memory.is_host_visible() || data.is_empty() {
            let native = self.backend.create_buffer(desc, Some(data))?;
            return Ok(self.register(desc.clone(), native));
        }

        let mut desc = desc.clone();
        desc.usage |= BufferUsage::TRANSFER_DST;
        let native = self.backend.create_buffer(&desc, None)?;
        let buffer = self
            .registry
            .insert::<Buffer>(desc, native, Readiness::Pending);

        let staging = BufferDescriptor::new(data.len() as u64, BufferUsage::TRANSFER_SRC)
            .with_memory(MemoryLocation::CpuToGpu)
            .with_label("staging");
        let staging = match self.create_buffer_with_data(&staging, data) {
            Ok(staging) => staging,
            Err(err) => {
                self.destroy(buffer);
                return Err(err);
            }
        };

        let cmd = self.pool(QueueType::Transfer).acquire();
        cmd.copy_buffer(staging, buffer, &[BufferCopy::whole(data.len() as u64)]);
        cmd.add_upload(buffer.erase());
        let submitted = self.submit(&cmd);
        self.destroy(staging);

        match submitted {
            Ok(id) => {
                log::debug!("Uploading {} bytes to {buffer:?} in {id:?}", data.len());
                Ok(buffer)
            }
            Err(err) => {
                self.destroy(buffer);
                Err(err)
            }
        }
    }

    /// Creates an image with undefined contents.
    pub fn create_image(&self, desc: &ImageDescriptor) -> GraphicsResult<Handle<Image>> {
        let extent = desc.extent;
        if extent.width == 0 || extent.height == 0 || extent.depth == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "image extent {}x{}x{} has a zero dimension",
                extent.width, extent.height, extent.depth
            )));
        }
        if desc.mip_levels == 0 || desc.array_layers == 0 {
            return Err(GraphicsError::InvalidParameter(
                "image needs at least one mip level and one layer".to_string(),
            ));
        }
        let native = self.backend.create_image(desc)?;
        Ok(self.register(desc.clone(), native))
    }

    pub fn create_image_view(
        &self,
        desc: &ImageViewDescriptor,
    ) -> GraphicsResult<Handle<ImageView>> {
        let image = self
            .registry
            .descriptor(desc.image)
            .ok_or(GraphicsError::InvalidHandle(ResourceKind::Image))?;
        if !desc.range.fits(&image) {
            return Err(GraphicsError::InvalidParameter(format!(
                "view range {:?} is outside the image",
                desc.range
            )));
        }
        let native = self.backend.create_image_view(desc, &self.internals())?;
        Ok(self.register(desc.clone(), native))
    }

    pub fn create_sampler(&self, desc: &SamplerDescriptor) -> GraphicsResult<Handle<Sampler>> {
        let native = self.backend.create_sampler(desc)?;
        Ok(self.register(desc.clone(), native))
    }

    pub fn create_render_pass(
        &self,
        desc: &RenderPassDescriptor,
    ) -> GraphicsResult<Handle<RenderPass>> {
        if desc.attachment_count() == 0 {
            return Err(GraphicsError::InvalidParameter(
                "render pass without attachments".to_string(),
            ));
        }
        let native = self.backend.create_render_pass(desc)?;
        Ok(self.register(desc.clone(), native))
    }

    pub fn create_framebuffer(
        &self,
        desc: &FramebufferDescriptor,
    ) -> GraphicsResult<Handle<Framebuffer>> {
        let pass = self
            .registry
            .descriptor(desc.render_pass)
            .ok_or(GraphicsError::InvalidHandle(ResourceKind::RenderPass))?;
        if pass.attachment_count() != desc.attachments.len() {
            return Err(GraphicsError::InvalidParameter(format!(
                "render pass has {} attachments, framebuffer {}",
                pass.attachment_count(),
                desc.attachments.len()
            )));
        }
        let native = self.backend.create_framebuffer(desc, &self.internals())?;
        Ok(self.register(desc.clone(), native))
    }

    pub fn create_pipeline(&self, desc: &PipelineDescriptor) -> GraphicsResult<Handle<Pipeline>> {
        let native = self.backend.create_pipeline(desc, &self.internals())?;
        Ok(self.register(desc.clone(), native))
    }

    pub fn create_descriptor_set_layout(
        &self,
        desc: &DescriptorSetLayoutDescriptor,
    ) -> GraphicsResult<Handle<DescriptorSetLayout>> {
        let native = self.backend.create_descriptor_set_layout(desc)?;
        Ok(self.register(desc.clone(), native))
    }

    pub fn create_descriptor_pool(
        &self,
        desc: &DescriptorPoolDescriptor,
    ) -> GraphicsResult<Handle<DescriptorPool>> {
        if desc.max_sets == 0 {
            return Err(GraphicsError::InvalidParameter(
                "descriptor pool with max_sets = 0".to_string(),
            ));
        }
        let native = self.backend.create_descriptor_pool(desc)?;
        Ok(self.register(desc.clone(), native))
    }

    pub fn create_descriptor_set(
        &self,
        desc: &DescriptorSetDescriptor,
    ) -> GraphicsResult<Handle<DescriptorSet>> {
        let native = self.backend.create_descriptor_set(desc, &self.internals())?;
        Ok(self.register(desc.clone(), native))
    }

    /// Destroys a resource.
    ///
    /// The handle stops resolving immediately. The native object is freed
    /// `frame_lag + 1` frames from now, after every command buffer that could
    /// reference it has completed. Destroying a stale handle is a programmer
    /// error.
    pub fn destroy<T: ResourceType>(&self, handle: Handle<T>) {
        if self.bindless.references(handle.erase()) {
            log::error!("{handle:?} destroyed while bound to a bindless uniform");
            debug_assert!(false, "{handle:?} destroyed while bound to a bindless uniform");
        }
        match self.registry.remove(handle) {
            Some(entry) => {
                log::trace!("Destroying {handle:?} at frame {}", self.frame_index());
                self.destruction.destroy_all(entry.destroy_records());
            }
            None => {
                log::warn!("Destroy of stale handle {handle:?}");
                debug_assert!(false, "double destroy of {handle:?}");
            }
        }
    }

    /// Snapshot of a live resource.
    pub fn get<T: ResourceType>(&self, handle: Handle<T>) -> Option<ResourceView<T>> {
        self.registry.view(handle)
    }

    /// Whether a resource is alive and has no upload in flight.
    pub fn is_ready<T: ResourceType>(&self, handle: Handle<T>) -> bool {
        self.registry.is_ready(handle)
    }

    pub fn is_alive<T: ResourceType>(&self, handle: Handle<T>) -> bool {
        self.registry.is_alive(handle)
    }

    /// Whether a submitted command buffer still references the resource.
    pub fn is_busy<T: ResourceType>(&self, handle: Handle<T>) -> bool {
        self.registry.is_busy(handle)
    }

    // --- Recording ---

    /// A command buffer in the Recording state for `queue`.
    ///
    /// Synchronous queues hand every caller the same buffer until it is
    /// submitted; multithreaded queues hand out a fresh one per call.
    pub fn start_recording(&self, queue: QueueType) -> Arc<CommandBuffer> {
        self.pool(queue).start_recording()
    }

    /// Submits a recording buffer to its queue.
    ///
    /// Pending bindless writes are flushed first so the submission sees them.
    /// A uniform whose flush fails keeps its writes pending; only buffers that
    /// reference that uniform's descriptor set are refused.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the submission or a bindless flush it
    /// depends on fails; the buffer is then recycled with its locks released.
    pub fn submit(&self, cmd: &Arc<CommandBuffer>) -> GraphicsResult<SubmissionId> {
        profile_scope!("device_submit");

        let (_, failed) = self
            .bindless
            .flush_each(self.backend.as_ref(), &self.internals());

        let pool = self.pool(cmd.queue());
        pool.detach(cmd);

        let mut refused = None;
        for (set, err) in failed {
            if refused.is_none() && cmd.references(set.erase()) {
                refused = Some((set, err));
            } else {
                log::error!("Bindless writes to {set:?} failed and stay pending: {err}");
            }
        }
        if let Some((set, err)) = refused {
            log::error!(
                "{:?} submission refused: bindless writes to {set:?} failed: {err}",
                cmd.queue()
            );
            cmd.abandon();
            pool.recycle(Arc::clone(cmd));
            return Err(err);
        }

        match cmd.submit(self.backend.as_ref()) {
            Ok(id) => {
                self.pacer.record(self.frame_index(), id);
                pool.track(Arc::clone(cmd));
                Ok(id)
            }
            Err(err) => {
                pool.recycle(Arc::clone(cmd));
                Err(err)
            }
        }
    }

    // --- Bindless ---

    /// Registers a bindless uniform backed by an array binding of `desc.set`.
    pub fn register_bindless_uniform(
        &self,
        name: impl Into<String>,
        desc: BindlessUniformDescriptor,
    ) -> GraphicsResult<BindlessUniformId> {
        if !self.registry.is_alive(desc.set) {
            return Err(GraphicsError::InvalidHandle(ResourceKind::DescriptorSet));
        }
        self.bindless.register_uniform(name, desc)
    }

    /// Looks up a bindless uniform by name.
    pub fn bindless_uniform(&self, name: &str) -> Option<BindlessUniformId> {
        self.bindless.uniform(name)
    }

    /// Stores `resource` in a slot of `uniform` at the current frame.
    pub fn bindless_allocate(&self, uniform: BindlessUniformId, resource: BindlessResource) -> u32 {
        self.bindless
            .allocate(uniform, resource, self.frame_index())
    }

    pub fn bindless_update(&self, uniform: BindlessUniformId, slot: u32, resource: BindlessResource) {
        self.bindless
            .update(uniform, slot, resource, self.frame_index());
    }

    /// Frees a slot; it is reused no earlier than `frame_lag + 1` frames later.
    pub fn bindless_free(&self, uniform: BindlessUniformId, slot: u32) {
        self.bindless.free(uniform, slot, self.frame_index());
    }

    /// Writes every pending bindless update to the GPU.
    pub fn flush_bindless(&self) -> GraphicsResult<usize> {
        self.bindless
            .flush_all(self.backend.as_ref(), &self.internals())
    }

    // --- Frames ---

    /// Waits until the submissions made `frame_lag` frames ago have finished,
    /// then recycles completed command buffers.
    pub fn begin_frame(&self) -> GraphicsResult<()> {
        profile_scope!("begin_frame");

        self.pacer
            .begin_frame(self.frame_index(), self.backend.as_ref())?;
        self.poll_completions();
        Ok(())
    }

    /// Closes the current frame.
    ///
    /// Recycles completed command buffers, advances the frame index, frees the
    /// deferred destroys that are `frame_lag + 1` frames old and ages bindless
    /// slots. Returns the new frame index.
    pub fn end_frame(&self) -> u64 {
        profile_scope!("end_frame");

        self.poll_completions();
        let freed = self.destruction.advance_frame(self.backend.as_ref());
        let frame = self.frame.fetch_add(1, Ordering::AcqRel) + 1;
        debug_assert_eq!(self.destruction.frame(), frame);
        let reusable = self.bindless.released_at(frame);

        profile_plot!("frame", frame as f64);
        frame_mark!();
        log::trace!("Frame {frame}: freed {freed} records, {reusable} bindless slots reusable");
        frame
    }

    /// Completes and recycles every command buffer the GPU has finished.
    pub fn poll_completions(&self) -> usize {
        self.pools
            .iter()
            .map(|pool| pool.poll(self.backend.as_ref()))
            .sum()
    }

    /// Blocks until every queue is idle and completes all in-flight buffers.
    ///
    /// For shutdown and rare synchronization points only.
    pub fn wait_idle(&self) -> GraphicsResult<()> {
        profile_scope!("wait_idle");

        self.backend.wait_idle()?;
        let completed: usize = self.pools.iter().map(CommandPool::complete_all).sum();
        self.pacer.reset();
        log::debug!("Device idle, completed {completed} command buffers");
        Ok(())
    }

    /// Waits idle, destroys every remaining resource and frees everything
    /// still queued for destruction.
    ///
    /// Runs once; later calls (and the drop) do nothing.
    pub fn shutdown(&self) -> GraphicsResult<()> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.wait_idle()?;
        let leaked = self.registry.drain_records();
        if !leaked.is_empty() {
            log::debug!("Destroying {} native objects still alive at shutdown", leaked.len());
        }
        self.destruction.destroy_all(leaked);
        let freed = self.destruction.flush_all(self.backend.as_ref());
        log::info!("Render device shut down, freed {freed} native objects");
        Ok(())
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::error!("Render device shutdown failed: {err}");
        }
    }
}

fn validate_buffer(desc: &BufferDescriptor) -> GraphicsResult<()> {
    if desc.size == 0 {
        return Err(GraphicsError::InvalidParameter(
            "buffer size must be non-zero".to_string(),
        ));
    }
    Ok(())
}
