//! Dummy GPU backend for testing and headless use.
//!
//! This backend doesn't perform actual GPU operations. It hands out unique
//! fake native handles, logs and records every call as a [`NativeCall`], and
//! tracks submissions so tests can drive GPU completion by hand.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use super::{Backend, NativeHandle};
use crate::bindless::BindlessWrite;
use crate::command::Command;
use crate::destruction::DestroyRecord;
use crate::error::{GraphicsError, GraphicsResult};
use crate::internal::ResourceInternals;
use crate::resources::ResourceKind;
use crate::sync::SubmissionId;
use crate::types::{
    BufferDescriptor, DescriptorPoolDescriptor, DescriptorSetDescriptor,
    DescriptorSetLayoutDescriptor, FramebufferDescriptor, ImageDescriptor, ImageViewDescriptor,
    PipelineDescriptor, QueueType, RenderPassDescriptor, SamplerDescriptor,
};

/// A native call made on the dummy backend.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeCall {
    Create {
        kind: ResourceKind,
        object: u64,
    },
    /// One freed native object; bulk records produce one call per object.
    Destroy {
        kind: ResourceKind,
        object: u64,
    },
    Submit {
        queue: QueueType,
        submission: SubmissionId,
        commands: Vec<Command>,
    },
    WriteBindless {
        writes: Vec<BindlessWrite>,
    },
}

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    next_object: AtomicU64,
    next_submission: AtomicU64,
    /// Submissions complete as soon as they are made.
    auto_complete: bool,
    fail_submissions: AtomicBool,
    fail_bindless_writes: AtomicBool,
    pending: Mutex<BTreeSet<u64>>,
    calls: Mutex<Vec<NativeCall>>,
}

impl DummyBackend {
    /// Create a dummy backend whose submissions complete immediately.
    pub fn new() -> Self {
        Self::with_auto_complete(true)
    }

    /// Create a dummy backend whose submissions stay in flight until
    /// [`complete`](Self::complete), [`complete_all`](Self::complete_all) or a
    /// wait.
    pub fn manual() -> Self {
        Self::with_auto_complete(false)
    }

    fn with_auto_complete(auto_complete: bool) -> Self {
        Self {
            next_object: AtomicU64::new(1),
            next_submission: AtomicU64::new(1),
            auto_complete,
            fail_submissions: AtomicBool::new(false),
            fail_bindless_writes: AtomicBool::new(false),
            pending: Mutex::new(BTreeSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Simulates GPU completion of one submission.
    pub fn complete(&self, submission: SubmissionId) {
        self.pending.lock().remove(&submission.raw());
    }

    /// Simulates GPU completion of every submission.
    pub fn complete_all(&self) {
        self.pending.lock().clear();
    }

    /// Makes every following submission fail with `SubmissionFailed`.
    pub fn set_fail_submissions(&self, fail: bool) {
        self.fail_submissions.store(fail, Ordering::Release);
    }

    /// Makes every following bindless write batch fail with `SubmissionFailed`.
    pub fn set_fail_bindless_writes(&self, fail: bool) {
        self.fail_bindless_writes.store(fail, Ordering::Release);
    }

    /// Submissions still executing.
    pub fn pending_submissions(&self) -> usize {
        self.pending.lock().len()
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<NativeCall> {
        self.calls.lock().clone()
    }

    /// Native objects freed so far, in order.
    pub fn destroyed(&self) -> Vec<(ResourceKind, u64)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                NativeCall::Destroy { kind, object } => Some((*kind, *object)),
                _ => None,
            })
            .collect()
    }

    /// Command lists submitted so far, in order.
    pub fn submissions(&self) -> Vec<(QueueType, Vec<Command>)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                NativeCall::Submit {
                    queue, commands, ..
                } => Some((*queue, commands.clone())),
                _ => None,
            })
            .collect()
    }

    /// Forgets recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn create(&self, kind: ResourceKind, label: Option<&str>) -> NativeHandle {
        let object = self.next_object.fetch_add(1, Ordering::Relaxed);
        log::trace!("DummyBackend: creating {kind:?} {label:?} -> {object:#x}");
        self.calls.lock().push(NativeCall::Create { kind, object });
        NativeHandle::new(object)
    }

    fn allocate_memory(&self) -> u64 {
        self.next_object.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn create_buffer(
        &self,
        desc: &BufferDescriptor,
        data: Option<&[u8]>,
    ) -> GraphicsResult<NativeHandle> {
        if let Some(data) = data
            && data.len() as u64 > desc.size
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "initial data ({} bytes) exceeds buffer size ({})",
                data.len(),
                desc.size
            )));
        }
        let native = self.create(ResourceKind::Buffer, desc.label.as_deref());
        Ok(native.with_memory(self.allocate_memory()))
    }

    fn create_image(&self, desc: &ImageDescriptor) -> GraphicsResult<NativeHandle> {
        let native = self.create(ResourceKind::Image, desc.label.as_deref());
        Ok(native.with_memory(self.allocate_memory()))
    }

    fn create_image_view(
        &self,
        desc: &ImageViewDescriptor,
        resources: &ResourceInternals<'_>,
    ) -> GraphicsResult<NativeHandle> {
        resources.native(desc.image)?;
        Ok(self.create(ResourceKind::ImageView, desc.label.as_deref()))
    }

    fn create_sampler(&self, desc: &SamplerDescriptor) -> GraphicsResult<NativeHandle> {
        Ok(self.create(ResourceKind::Sampler, desc.label.as_deref()))
    }

    fn create_render_pass(&self, desc: &RenderPassDescriptor) -> GraphicsResult<NativeHandle> {
        Ok(self.create(ResourceKind::RenderPass, desc.label.as_deref()))
    }

    fn create_framebuffer(
        &self,
        desc: &FramebufferDescriptor,
        resources: &ResourceInternals<'_>,
    ) -> GraphicsResult<NativeHandle> {
        resources.native(desc.render_pass)?;
        for view in &desc.attachments {
            resources.native(*view)?;
        }
        Ok(self.create(ResourceKind::Framebuffer, desc.label.as_deref()))
    }

    fn create_pipeline(
        &self,
        desc: &PipelineDescriptor,
        resources: &ResourceInternals<'_>,
    ) -> GraphicsResult<NativeHandle> {
        for layout in &desc.set_layouts {
            resources.native(*layout)?;
        }
        let layout = self.allocate_memory();
        Ok(self
            .create(ResourceKind::Pipeline, desc.label.as_deref())
            .with_aux(layout))
    }

    fn create_descriptor_set_layout(
        &self,
        desc: &DescriptorSetLayoutDescriptor,
    ) -> GraphicsResult<NativeHandle> {
        Ok(self.create(ResourceKind::DescriptorSetLayout, desc.label.as_deref()))
    }

    fn create_descriptor_pool(
        &self,
        desc: &DescriptorPoolDescriptor,
    ) -> GraphicsResult<NativeHandle> {
        Ok(self.create(ResourceKind::DescriptorPool, desc.label.as_deref()))
    }

    fn create_descriptor_set(
        &self,
        desc: &DescriptorSetDescriptor,
        resources: &ResourceInternals<'_>,
    ) -> GraphicsResult<NativeHandle> {
        let pool = resources.native(desc.pool)?;
        resources.native(desc.layout)?;
        Ok(self
            .create(ResourceKind::DescriptorSet, desc.label.as_deref())
            .with_aux(pool.object))
    }

    fn destroy(&self, records: &[DestroyRecord]) {
        let mut calls = self.calls.lock();
        for record in records {
            for &object in record.objects() {
                log::trace!("DummyBackend: destroying {:?} {object:#x}", record.kind);
                calls.push(NativeCall::Destroy {
                    kind: record.kind,
                    object,
                });
            }
        }
    }

    fn submit(
        &self,
        queue: QueueType,
        commands: &[Command],
        resources: &ResourceInternals<'_>,
    ) -> GraphicsResult<SubmissionId> {
        if self.fail_submissions.load(Ordering::Acquire) {
            return Err(GraphicsError::SubmissionFailed(
                "dummy backend configured to fail".to_string(),
            ));
        }

        for command in commands {
            if let Command::BindPipeline { pipeline, .. } = command {
                resources.native(*pipeline)?;
            }
        }

        let submission = SubmissionId::new(self.next_submission.fetch_add(1, Ordering::Relaxed));
        log::trace!(
            "DummyBackend: {submission:?} on {queue:?} with {} commands",
            commands.len()
        );
        if !self.auto_complete {
            self.pending.lock().insert(submission.raw());
        }
        self.calls.lock().push(NativeCall::Submit {
            queue,
            submission,
            commands: commands.to_vec(),
        });
        Ok(submission)
    }

    fn is_complete(&self, submission: SubmissionId) -> bool {
        !self.pending.lock().contains(&submission.raw())
    }

    fn wait(&self, submissions: &[SubmissionId]) -> GraphicsResult<()> {
        // Nothing executes, so waiting is the moment the work finishes.
        let mut pending = self.pending.lock();
        for submission in submissions {
            pending.remove(&submission.raw());
        }
        Ok(())
    }

    fn wait_idle(&self) -> GraphicsResult<()> {
        self.complete_all();
        Ok(())
    }

    fn write_bindless(
        &self,
        writes: &[BindlessWrite],
        resources: &ResourceInternals<'_>,
    ) -> GraphicsResult<()> {
        for write in writes {
            resources.native(write.set)?;
        }
        if self.fail_bindless_writes.load(Ordering::Acquire) {
            return Err(GraphicsError::SubmissionFailed(
                "injected bindless write failure".to_string(),
            ));
        }
        log::trace!("DummyBackend: {} bindless writes", writes.len());
        self.calls.lock().push(NativeCall::WriteBindless {
            writes: writes.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ResourceRegistry;
    use crate::types::BufferUsage;

    #[test]
    fn test_unique_handles() {
        let backend = DummyBackend::new();
        let a = backend.create_sampler(&SamplerDescriptor::default()).unwrap();
        let b = backend.create_sampler(&SamplerDescriptor::default()).unwrap();
        assert_ne!(a, b);
        assert!(!a.is_null());
    }

    #[test]
    fn test_buffer_has_memory() {
        let backend = DummyBackend::new();
        let native = backend
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::VERTEX), None)
            .unwrap();
        assert!(native.memory.is_some());
    }

    #[test]
    fn test_oversized_initial_data_rejected() {
        let backend = DummyBackend::new();
        let result = backend.create_buffer(
            &BufferDescriptor::new(2, BufferUsage::VERTEX),
            Some(&[0u8; 8]),
        );
        assert!(matches!(result, Err(GraphicsError::InvalidParameter(_))));
    }

    #[test]
    fn test_manual_completion() {
        let backend = DummyBackend::manual();
        let registry = ResourceRegistry::new();
        let resources = ResourceInternals::new(&registry);

        let id = backend.submit(QueueType::Graphics, &[], &resources).unwrap();
        assert!(!backend.is_complete(id));
        assert_eq!(backend.pending_submissions(), 1);

        backend.complete(id);
        assert!(backend.is_complete(id));
    }

    #[test]
    fn test_wait_completes() {
        let backend = DummyBackend::manual();
        let registry = ResourceRegistry::new();
        let resources = ResourceInternals::new(&registry);

        let id = backend.submit(QueueType::Compute, &[], &resources).unwrap();
        backend.wait(&[id]).unwrap();
        assert!(backend.is_complete(id));
    }

    #[test]
    fn test_bulk_destroy_expands() {
        let backend = DummyBackend::new();
        backend.destroy(&[DestroyRecord::bulk(
            ResourceKind::DescriptorSet,
            5,
            vec![10, 11],
        )]);
        assert_eq!(
            backend.destroyed(),
            vec![
                (ResourceKind::DescriptorSet, 10),
                (ResourceKind::DescriptorSet, 11)
            ]
        );
    }

    #[test]
    fn test_failing_submissions() {
        let backend = DummyBackend::new();
        let registry = ResourceRegistry::new();
        let resources = ResourceInternals::new(&registry);

        backend.set_fail_submissions(true);
        assert!(matches!(
            backend.submit(QueueType::Transfer, &[], &resources),
            Err(GraphicsError::SubmissionFailed(_))
        ));
    }
}
