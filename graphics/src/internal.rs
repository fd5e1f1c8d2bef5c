//! Narrow access to resource internals for backends and platform glue.
//!
//! Application code only sees handles and read-only snapshots. Backends need
//! to resolve handles to native objects while replaying commands, and the
//! layers around them occasionally need to swap a native object (an imported
//! swapchain image after a resize) or flip readiness. [`ResourceInternals`]
//! is that capability, borrowed from the registry for the duration of a call.

use crate::backend::NativeHandle;
use crate::error::{GraphicsError, GraphicsResult};
use crate::resources::{AnyHandle, Handle, Readiness, ResourceRegistry, ResourceType};

/// Borrowed mutator/resolver over the resource registry.
#[derive(Debug, Clone, Copy)]
pub struct ResourceInternals<'a> {
    registry: &'a ResourceRegistry,
}

impl<'a> ResourceInternals<'a> {
    pub(crate) fn new(registry: &'a ResourceRegistry) -> Self {
        Self { registry }
    }

    /// Native object of a live resource.
    pub fn native<T: ResourceType>(&self, handle: Handle<T>) -> GraphicsResult<NativeHandle> {
        self.registry
            .native(handle)
            .ok_or(GraphicsError::InvalidHandle(T::KIND))
    }

    /// Native object of a live resource of any kind.
    pub fn native_any(&self, handle: AnyHandle) -> GraphicsResult<NativeHandle> {
        self.registry
            .native_any(handle)
            .ok_or(GraphicsError::InvalidHandle(handle.kind()))
    }

    /// Whether a handle of any kind still resolves.
    pub fn is_alive_any(&self, handle: AnyHandle) -> bool {
        self.registry.is_alive_any(handle)
    }

    /// Creation descriptor of a live resource.
    pub fn descriptor<T: ResourceType>(&self, handle: Handle<T>) -> GraphicsResult<T::Descriptor> {
        self.registry
            .descriptor(handle)
            .ok_or(GraphicsError::InvalidHandle(T::KIND))
    }

    /// Replaces the native object behind a handle, returning the old one.
    ///
    /// The caller owns the old object and must route it through deferred
    /// destruction if the GPU may still use it.
    pub fn set_native<T: ResourceType>(
        &self,
        handle: Handle<T>,
        native: NativeHandle,
    ) -> GraphicsResult<NativeHandle> {
        let old = self
            .registry
            .set_native(handle, native)
            .ok_or(GraphicsError::InvalidHandle(T::KIND))?;
        log::debug!("Rebound {handle:?}: {old:?} -> {native:?}");
        Ok(old)
    }

    /// Marks a resource ready for use.
    pub fn mark_ready<T: ResourceType>(&self, handle: Handle<T>) -> GraphicsResult<()> {
        self.set_readiness(handle, Readiness::Ready)
    }

    /// Marks a resource as waiting on an upload.
    pub fn mark_pending<T: ResourceType>(&self, handle: Handle<T>) -> GraphicsResult<()> {
        self.set_readiness(handle, Readiness::Pending)
    }

    /// Marks a type-erased resource ready. Returns `false` if it is gone.
    pub fn mark_ready_any(&self, handle: AnyHandle) -> bool {
        self.registry.mark_ready_any(handle)
    }

    fn set_readiness<T: ResourceType>(
        &self,
        handle: Handle<T>,
        readiness: Readiness,
    ) -> GraphicsResult<()> {
        if self.registry.set_readiness(handle, readiness) {
            Ok(())
        } else {
            Err(GraphicsError::InvalidHandle(T::KIND))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{Buffer, ResourceKind};
    use crate::types::{BufferDescriptor, BufferUsage};

    #[test]
    fn test_set_native_and_readiness() {
        let registry = ResourceRegistry::new();
        let handle = registry.insert::<Buffer>(
            BufferDescriptor::new(4, BufferUsage::UNIFORM),
            NativeHandle::new(1),
            Readiness::Pending,
        );
        let internals = ResourceInternals::new(&registry);

        let old = internals.set_native(handle, NativeHandle::new(2)).unwrap();
        assert_eq!(old, NativeHandle::new(1));
        assert_eq!(internals.native(handle).unwrap(), NativeHandle::new(2));

        internals.mark_ready(handle).unwrap();
        assert!(registry.is_ready(handle));
        internals.mark_pending(handle).unwrap();
        assert!(!registry.is_ready(handle));
    }

    #[test]
    fn test_dead_handle_errors() {
        let registry = ResourceRegistry::new();
        let handle = registry.insert::<Buffer>(
            BufferDescriptor::new(4, BufferUsage::UNIFORM),
            NativeHandle::new(1),
            Readiness::Ready,
        );
        registry.remove(handle);
        let internals = ResourceInternals::new(&registry);

        assert_eq!(
            internals.native(handle),
            Err(GraphicsError::InvalidHandle(ResourceKind::Buffer))
        );
        assert!(internals.mark_ready(handle).is_err());
        assert!(!internals.mark_ready_any(handle.erase()));
    }
}
