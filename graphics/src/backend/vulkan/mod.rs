//! Vulkan backend using ash and gpu-allocator.
//!
//! The backend does not create the Vulkan instance or device. The application
//! (or its windowing layer) owns them and hands the backend a device plus one
//! queue per role; the backend creates its own command pools, fences and
//! allocator on top.
//!
//! Every resource becomes a plain Vulkan object whose raw handle travels in a
//! [`NativeHandle`]. Buffers and images carry the id of their gpu-allocator
//! allocation, freed through a separate `DeviceMemory` destroy record.

mod allocator;
mod barriers;
mod command;
mod conversion;
mod native;
mod pipeline;
mod sync;

use ash::vk::{self, Handle};
use parking_lot::Mutex;
use vesper_core::profiling::profile_scope;

use self::allocator::{MemoryManager, create_allocator};
use self::command::NativeCommandPool;
use self::conversion::{
    aspect_mask, convert_address_mode, convert_buffer_usage, convert_compare_function,
    convert_descriptor_type, convert_filter_mode, convert_image_format, convert_image_type,
    convert_image_usage, convert_memory_location, convert_mipmap_filter_mode,
    convert_sample_count, convert_view_type,
};
use self::sync::{InFlight, SubmissionTracker, map_vk_error};
use super::{Backend, NativeHandle};
use crate::bindless::{BindlessResource, BindlessWrite};
use crate::command::Command;
use crate::destruction::DestroyRecord;
use crate::error::{GraphicsError, GraphicsResult};
use crate::internal::ResourceInternals;
use crate::resources::ResourceKind;
use crate::sync::SubmissionId;
use crate::types::{
    BufferDescriptor, DescriptorPoolDescriptor, DescriptorSetDescriptor,
    DescriptorSetLayoutDescriptor, FramebufferDescriptor, ImageDescriptor, ImageViewDescriptor,
    PipelineDescriptor, PipelineKind, QueueType, RenderPassDescriptor, SamplerDescriptor,
};

/// Fence waits give up after 10 seconds.
const FENCE_TIMEOUT_NS: u64 = 10_000_000_000;

/// A device queue and the family it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VulkanQueue {
    pub queue: vk::Queue,
    pub family: u32,
}

/// The device queue serving each queue role.
///
/// Roles may share a queue; submissions are serialized either way.
#[derive(Debug, Clone, Copy)]
pub struct VulkanQueues {
    queues: [VulkanQueue; QueueType::COUNT],
}

impl VulkanQueues {
    pub fn new(
        present: VulkanQueue,
        graphics: VulkanQueue,
        transfer: VulkanQueue,
        compute: VulkanQueue,
    ) -> Self {
        let mut queues = [present; QueueType::COUNT];
        queues[QueueType::Graphics.index()] = graphics;
        queues[QueueType::Transfer.index()] = transfer;
        queues[QueueType::Compute.index()] = compute;
        Self { queues }
    }

    /// Every role on one queue.
    pub fn single(queue: VulkanQueue) -> Self {
        Self {
            queues: [queue; QueueType::COUNT],
        }
    }

    pub fn get(&self, role: QueueType) -> VulkanQueue {
        self.queues[role.index()]
    }
}

/// Vulkan-based GPU backend using ash.
pub struct VulkanBackend {
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queues: VulkanQueues,
    memory: MemoryManager,
    /// One pool per queue role; pools need external synchronization.
    command_pools: [Mutex<NativeCommandPool>; QueueType::COUNT],
    /// Also serializes `vkQueueSubmit`, which shared queues require.
    submissions: Mutex<SubmissionTracker>,
}

impl std::fmt::Debug for VulkanBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanBackend")
            .field("queues", &self.queues)
            .field("memory", &self.memory)
            .finish_non_exhaustive()
    }
}

impl VulkanBackend {
    /// Create a backend on an application-owned device.
    ///
    /// The device must outlive the backend. Bindless tables need the
    /// descriptor indexing features (partially bound, update after bind)
    /// enabled at device creation.
    pub fn new(
        instance: ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        queues: VulkanQueues,
    ) -> GraphicsResult<Self> {
        let allocator = create_allocator(&instance, physical_device, device.clone())?;

        let mut pools = Vec::with_capacity(QueueType::COUNT);
        for role in QueueType::ALL {
            match command::create_command_pool(&device, queues.get(role).family) {
                Ok(pool) => pools.push(Mutex::new(NativeCommandPool::new(pool))),
                Err(e) => {
                    for pool in &mut pools {
                        unsafe { pool.get_mut().destroy(&device) };
                    }
                    return Err(e);
                }
            }
        }
        let command_pools: [Mutex<NativeCommandPool>; QueueType::COUNT] = pools
            .try_into()
            .map_err(|_| GraphicsError::Internal("command pool count mismatch".into()))?;

        log::info!("Vulkan backend initialized");

        Ok(Self {
            instance,
            physical_device,
            device,
            queues,
            memory: MemoryManager::new(allocator),
            command_pools,
            submissions: Mutex::new(SubmissionTracker::new()),
        })
    }

    /// Get the Vulkan device.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn queues(&self) -> &VulkanQueues {
        &self.queues
    }

    /// Number of live memory allocations.
    pub fn allocation_count(&self) -> usize {
        self.memory.live_count()
    }

    /// Allocates and binds memory for `buffer`, filling it with `data`.
    fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        desc: &BufferDescriptor,
        data: Option<&[u8]>,
    ) -> GraphicsResult<u64> {
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let memory = self.memory.allocate(
            desc.label.as_deref().unwrap_or("buffer"),
            requirements,
            convert_memory_location(desc.memory),
            true,
        )?;

        let bound = unsafe {
            self.device
                .bind_buffer_memory(buffer, memory.memory, memory.offset)
        }
        .map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to bind buffer memory: {:?}", e))
        })
        .and_then(|()| match data {
            Some(data) if !data.is_empty() => self.memory.write(memory.id, data),
            _ => Ok(()),
        });

        match bound {
            Ok(()) => Ok(memory.id),
            Err(e) => {
                self.memory.free(memory.id);
                Err(e)
            }
        }
    }

    fn bind_image_memory(&self, image: vk::Image, desc: &ImageDescriptor) -> GraphicsResult<u64> {
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        let memory = self.memory.allocate(
            desc.label.as_deref().unwrap_or("image"),
            requirements,
            gpu_allocator::MemoryLocation::GpuOnly,
            false,
        )?;

        let bound = unsafe {
            self.device
                .bind_image_memory(image, memory.memory, memory.offset)
        };
        match bound {
            Ok(()) => Ok(memory.id),
            Err(e) => {
                self.memory.free(memory.id);
                Err(GraphicsError::ResourceCreationFailed(format!(
                    "Failed to bind image memory: {:?}",
                    e
                )))
            }
        }
    }

    fn create_pipeline_object(
        &self,
        desc: &PipelineDescriptor,
        layout: vk::PipelineLayout,
        resources: &ResourceInternals<'_>,
    ) -> GraphicsResult<vk::Pipeline> {
        match &desc.kind {
            PipelineKind::Graphics(graphics) => {
                let pass = resources.descriptor(graphics.render_pass)?;
                let render_pass = native::render_pass(resources.native(graphics.render_pass)?);
                pipeline::create_graphics_pipeline(
                    &self.device,
                    graphics,
                    layout,
                    render_pass,
                    pass.color_attachments.len(),
                )
            }
            PipelineKind::Compute { spirv } => {
                pipeline::create_compute_pipeline(&self.device, spirv, layout)
            }
        }
    }

    fn record_commands(
        &self,
        cmd: vk::CommandBuffer,
        commands: &[Command],
        resources: &ResourceInternals<'_>,
    ) -> GraphicsResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe { self.device.begin_command_buffer(cmd, &begin_info) }.map_err(|e| {
            GraphicsError::Internal(format!("Failed to begin command buffer: {:?}", e))
        })?;

        command::record(&self.device, cmd, commands, resources)?;

        unsafe { self.device.end_command_buffer(cmd) }.map_err(|e| {
            GraphicsError::Internal(format!("Failed to end command buffer: {:?}", e))
        })
    }

    fn retire(&self, submissions: &mut SubmissionTracker, id: SubmissionId) {
        if let Some(done) = submissions.retire(id) {
            self.command_pools[done.queue.index()]
                .lock()
                .release(done.command_buffer);
        }
    }

    fn destroy_object(&self, kind: ResourceKind, object: u64, aux: u64) {
        unsafe {
            match kind {
                ResourceKind::DescriptorSet => self.free_descriptor_sets(aux, &[object]),
                ResourceKind::Framebuffer => self
                    .device
                    .destroy_framebuffer(vk::Framebuffer::from_raw(object), None),
                ResourceKind::Pipeline => {
                    self.device
                        .destroy_pipeline(vk::Pipeline::from_raw(object), None);
                    if aux != 0 {
                        self.device
                            .destroy_pipeline_layout(vk::PipelineLayout::from_raw(aux), None);
                    }
                }
                ResourceKind::RenderPass => self
                    .device
                    .destroy_render_pass(vk::RenderPass::from_raw(object), None),
                ResourceKind::DescriptorPool => self
                    .device
                    .destroy_descriptor_pool(vk::DescriptorPool::from_raw(object), None),
                ResourceKind::DescriptorSetLayout => self.device.destroy_descriptor_set_layout(
                    vk::DescriptorSetLayout::from_raw(object),
                    None,
                ),
                ResourceKind::ImageView => self
                    .device
                    .destroy_image_view(vk::ImageView::from_raw(object), None),
                ResourceKind::Sampler => self
                    .device
                    .destroy_sampler(vk::Sampler::from_raw(object), None),
                ResourceKind::Image => self
                    .device
                    .destroy_image(vk::Image::from_raw(object), None),
                ResourceKind::Buffer => self
                    .device
                    .destroy_buffer(vk::Buffer::from_raw(object), None),
                ResourceKind::DeviceMemory => self.memory.free(object),
            }
        }
    }

    fn free_descriptor_sets(&self, pool: u64, sets: &[u64]) {
        let sets: Vec<vk::DescriptorSet> =
            sets.iter().map(|s| vk::DescriptorSet::from_raw(*s)).collect();
        let freed = unsafe {
            self.device
                .free_descriptor_sets(vk::DescriptorPool::from_raw(pool), &sets)
        };
        if let Err(e) = freed {
            log::error!("Failed to free {} descriptor sets: {:?}", sets.len(), e);
        }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        unsafe {
            // Wait for device to be idle before cleanup
            let _ = self.device.device_wait_idle();

            self.submissions.get_mut().destroy(&self.device);
            for pool in &mut self.command_pools {
                pool.get_mut().destroy(&self.device);
            }
        }

        let leaked = self.memory.live_count();
        if leaked > 0 {
            log::warn!("Vulkan backend dropped with {leaked} live allocations");
        }
    }
}

/// Descriptor payload of one bindless write.
enum WriteInfo {
    Image(usize),
    Buffer(usize),
}

impl Backend for VulkanBackend {
    fn name(&self) -> &'static str {
        "Vulkan Backend (ash)"
    }

    fn create_buffer(
        &self,
        desc: &BufferDescriptor,
        data: Option<&[u8]>,
    ) -> GraphicsResult<NativeHandle> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(convert_buffer_usage(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create buffer: {:?}", e))
        })?;

        match self.bind_buffer_memory(buffer, desc, data) {
            Ok(memory) => Ok(native::native(buffer).with_memory(memory)),
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                Err(e)
            }
        }
    }

    fn create_image(&self, desc: &ImageDescriptor) -> GraphicsResult<NativeHandle> {
        let mut flags = vk::ImageCreateFlags::empty();
        if desc.array_layers >= 6 && desc.extent.width == desc.extent.height {
            flags |= vk::ImageCreateFlags::CUBE_COMPATIBLE;
        }

        let image_info = vk::ImageCreateInfo::default()
            .flags(flags)
            .image_type(convert_image_type(desc.dimension))
            .format(convert_image_format(desc.format))
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: desc.extent.depth,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(desc.array_layers)
            .samples(convert_sample_count(desc.samples))
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(convert_image_usage(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { self.device.create_image(&image_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create image: {:?}", e))
        })?;

        match self.bind_image_memory(image, desc) {
            Ok(memory) => Ok(native::native(image).with_memory(memory)),
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                Err(e)
            }
        }
    }

    fn create_image_view(
        &self,
        desc: &ImageViewDescriptor,
        resources: &ResourceInternals<'_>,
    ) -> GraphicsResult<NativeHandle> {
        let image_desc = resources.descriptor(desc.image)?;
        let image = native::image(resources.native(desc.image)?);
        let format = desc.format.unwrap_or(image_desc.format);

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(convert_view_type(desc.view_type))
            .format(convert_image_format(format))
            .components(vk::ComponentMapping::default())
            .subresource_range(command::subresource_range(aspect_mask(format), desc.range));

        let view = unsafe { self.device.create_image_view(&view_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create image view: {:?}", e))
        })?;

        Ok(native::native(view))
    }

    fn create_sampler(&self, desc: &SamplerDescriptor) -> GraphicsResult<NativeHandle> {
        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(convert_filter_mode(desc.mag_filter))
            .min_filter(convert_filter_mode(desc.min_filter))
            .mipmap_mode(convert_mipmap_filter_mode(desc.mipmap_filter))
            .address_mode_u(convert_address_mode(desc.address_mode_u))
            .address_mode_v(convert_address_mode(desc.address_mode_v))
            .address_mode_w(convert_address_mode(desc.address_mode_w))
            .mip_lod_bias(0.0)
            .anisotropy_enable(desc.anisotropy_clamp > 1)
            .max_anisotropy(desc.anisotropy_clamp as f32)
            .compare_enable(desc.compare.is_some())
            .compare_op(
                desc.compare
                    .map(convert_compare_function)
                    .unwrap_or(vk::CompareOp::ALWAYS),
            )
            .min_lod(desc.lod_min_clamp)
            .max_lod(desc.lod_max_clamp)
            .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK)
            .unnormalized_coordinates(false);

        let sampler = unsafe { self.device.create_sampler(&sampler_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create sampler: {:?}", e))
        })?;

        Ok(native::native(sampler))
    }

    fn create_render_pass(&self, desc: &RenderPassDescriptor) -> GraphicsResult<NativeHandle> {
        pipeline::create_render_pass(&self.device, desc).map(native::native)
    }

    fn create_framebuffer(
        &self,
        desc: &FramebufferDescriptor,
        resources: &ResourceInternals<'_>,
    ) -> GraphicsResult<NativeHandle> {
        let render_pass = native::render_pass(resources.native(desc.render_pass)?);
        let attachments = desc
            .attachments
            .iter()
            .map(|view| resources.native(*view).map(native::image_view))
            .collect::<GraphicsResult<Vec<_>>>()?;

        let framebuffer_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(desc.width)
            .height(desc.height)
            .layers(desc.layers);

        let framebuffer = unsafe { self.device.create_framebuffer(&framebuffer_info, None) }
            .map_err(|e| {
                GraphicsError::ResourceCreationFailed(format!(
                    "Failed to create framebuffer: {:?}",
                    e
                ))
            })?;

        Ok(native::native(framebuffer))
    }

    fn create_pipeline(
        &self,
        desc: &PipelineDescriptor,
        resources: &ResourceInternals<'_>,
    ) -> GraphicsResult<NativeHandle> {
        let set_layouts = desc
            .set_layouts
            .iter()
            .map(|layout| resources.native(*layout).map(native::descriptor_set_layout))
            .collect::<GraphicsResult<Vec<_>>>()?;
        let layout =
            pipeline::create_pipeline_layout(&self.device, &set_layouts, desc.push_constant_size)?;

        match self.create_pipeline_object(desc, layout, resources) {
            Ok(pipeline) => Ok(native::native(pipeline).with_aux(layout.as_raw())),
            Err(e) => {
                unsafe { self.device.destroy_pipeline_layout(layout, None) };
                Err(e)
            }
        }
    }

    fn create_descriptor_set_layout(
        &self,
        desc: &DescriptorSetLayoutDescriptor,
    ) -> GraphicsResult<NativeHandle> {
        pipeline::create_descriptor_set_layout(&self.device, desc).map(native::native)
    }

    fn create_descriptor_pool(
        &self,
        desc: &DescriptorPoolDescriptor,
    ) -> GraphicsResult<NativeHandle> {
        pipeline::create_descriptor_pool(&self.device, desc).map(native::native)
    }

    fn create_descriptor_set(
        &self,
        desc: &DescriptorSetDescriptor,
        resources: &ResourceInternals<'_>,
    ) -> GraphicsResult<NativeHandle> {
        let pool = native::descriptor_pool(resources.native(desc.pool)?);
        let layouts = [native::descriptor_set_layout(resources.native(desc.layout)?)];

        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }.map_err(|e| {
            match e {
                vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL => {
                    GraphicsError::OutOfMemory
                }
                other => GraphicsError::ResourceCreationFailed(format!(
                    "Failed to allocate descriptor set: {:?}",
                    other
                )),
            }
        })?;
        let set = sets.into_iter().next().ok_or_else(|| {
            GraphicsError::ResourceCreationFailed("Driver returned no descriptor set".into())
        })?;

        Ok(native::native(set).with_aux(pool.as_raw()))
    }

    fn destroy(&self, records: &[DestroyRecord]) {
        profile_scope!("vulkan_destroy");

        for record in records {
            if record.kind == ResourceKind::DescriptorSet {
                self.free_descriptor_sets(record.payload[1], record.objects());
                continue;
            }
            for &object in record.objects() {
                self.destroy_object(record.kind, object, record.payload[1]);
            }
        }
    }

    fn submit(
        &self,
        queue: QueueType,
        commands: &[Command],
        resources: &ResourceInternals<'_>,
    ) -> GraphicsResult<SubmissionId> {
        profile_scope!("vulkan_submit");

        let pool = &self.command_pools[queue.index()];
        let cmd = pool.lock().acquire(&self.device)?;
        if let Err(e) = self.record_commands(cmd, commands, resources) {
            pool.lock().release(cmd);
            return Err(e);
        }

        let mut submissions = self.submissions.lock();
        let fence = match submissions.acquire_fence(&self.device) {
            Ok(fence) => fence,
            Err(e) => {
                pool.lock().release(cmd);
                return Err(e);
            }
        };

        let command_buffers = [cmd];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        let submitted = unsafe {
            self.device
                .queue_submit(self.queues.get(queue).queue, &[submit_info], fence)
        };
        if let Err(e) = submitted {
            submissions.release_fence(fence);
            pool.lock().release(cmd);
            return Err(map_vk_error("Failed to submit command buffer", e));
        }

        let id = submissions.insert(InFlight {
            queue,
            command_buffer: cmd,
            fence,
        });
        log::trace!("{queue:?}: {id:?} with {} commands", commands.len());
        Ok(id)
    }

    fn is_complete(&self, submission: SubmissionId) -> bool {
        let mut submissions = self.submissions.lock();
        let Some(in_flight) = submissions.get(submission).copied() else {
            return true;
        };
        match unsafe { self.device.get_fence_status(in_flight.fence) } {
            Ok(true) => {
                self.retire(&mut submissions, submission);
                true
            }
            Ok(false) => false,
            Err(e) => {
                log::error!("Fence status query failed for {submission:?}: {:?}", e);
                false
            }
        }
    }

    fn wait(&self, submissions: &[SubmissionId]) -> GraphicsResult<()> {
        profile_scope!("vulkan_wait");

        // Fences are recycled on retire, so the table stays locked until the
        // wait returns.
        let mut tracker = self.submissions.lock();
        let fences: Vec<vk::Fence> = submissions
            .iter()
            .filter_map(|id| tracker.get(*id).map(|s| s.fence))
            .collect();
        if fences.is_empty() {
            return Ok(());
        }

        match unsafe { self.device.wait_for_fences(&fences, true, FENCE_TIMEOUT_NS) } {
            Ok(()) => {}
            Err(vk::Result::TIMEOUT) => {
                log::warn!(
                    "Fence wait timed out after 10 seconds. \
                     GPU may be hung or fence was never signaled."
                );
                return Err(GraphicsError::SubmissionFailed(
                    "fence wait timed out".into(),
                ));
            }
            Err(e) => return Err(map_vk_error("Fence wait failed", e)),
        }

        for id in submissions {
            self.retire(&mut tracker, *id);
        }
        Ok(())
    }

    fn wait_idle(&self) -> GraphicsResult<()> {
        unsafe { self.device.device_wait_idle() }
            .map_err(|e| map_vk_error("Device wait idle failed", e))?;

        let done = self.submissions.lock().retire_all();
        for in_flight in done {
            self.command_pools[in_flight.queue.index()]
                .lock()
                .release(in_flight.command_buffer);
        }
        Ok(())
    }

    fn write_bindless(
        &self,
        writes: &[BindlessWrite],
        resources: &ResourceInternals<'_>,
    ) -> GraphicsResult<()> {
        let mut image_infos = Vec::new();
        let mut buffer_infos = Vec::new();
        let mut plan = Vec::with_capacity(writes.len());

        for write in writes {
            // Freed slots stay bound to their last descriptor; partially bound
            // tables never read them.
            let Some(resource) = write.resource else {
                continue;
            };
            let set = native::descriptor_set(resources.native(write.set)?);
            let ty = convert_descriptor_type(resource.category().descriptor_type());

            let info = match resource {
                BindlessResource::SampledImage(view) => {
                    image_infos.push(
                        vk::DescriptorImageInfo::default()
                            .image_view(native::image_view(resources.native(view)?))
                            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                    );
                    WriteInfo::Image(image_infos.len() - 1)
                }
                BindlessResource::StorageImage(view) => {
                    image_infos.push(
                        vk::DescriptorImageInfo::default()
                            .image_view(native::image_view(resources.native(view)?))
                            .image_layout(vk::ImageLayout::GENERAL),
                    );
                    WriteInfo::Image(image_infos.len() - 1)
                }
                BindlessResource::Sampler(sampler) => {
                    image_infos.push(
                        vk::DescriptorImageInfo::default()
                            .sampler(native::sampler(resources.native(sampler)?)),
                    );
                    WriteInfo::Image(image_infos.len() - 1)
                }
                BindlessResource::StorageBuffer(buffer) => {
                    buffer_infos.push(
                        vk::DescriptorBufferInfo::default()
                            .buffer(native::buffer(resources.native(buffer)?))
                            .offset(0)
                            .range(vk::WHOLE_SIZE),
                    );
                    WriteInfo::Buffer(buffer_infos.len() - 1)
                }
            };
            plan.push((set, write.binding, write.slot, ty, info));
        }

        let vk_writes: Vec<vk::WriteDescriptorSet> = plan
            .iter()
            .map(|(set, binding, slot, ty, info)| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(*set)
                    .dst_binding(*binding)
                    .dst_array_element(*slot)
                    .descriptor_type(*ty);
                match info {
                    WriteInfo::Image(i) => write.image_info(std::slice::from_ref(&image_infos[*i])),
                    WriteInfo::Buffer(i) => {
                        write.buffer_info(std::slice::from_ref(&buffer_infos[*i]))
                    }
                }
            })
            .collect();

        if !vk_writes.is_empty() {
            unsafe { self.device.update_descriptor_sets(&vk_writes, &[]) };
        }
        Ok(())
    }
}
