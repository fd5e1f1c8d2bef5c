//! Device configuration.
//!
//! Everything here is fixed for the lifetime of a [`RenderDevice`](crate::RenderDevice):
//! the frame lag shared by deferred destruction and bindless reuse, the
//! capacity of each bindless table category, and how each queue hands out
//! command buffers.

use crate::error::{GraphicsError, GraphicsResult};
use crate::types::QueueType;

/// Number of frames the CPU may run ahead of the GPU.
///
/// A resource destroyed (or a bindless slot freed) at frame `F` is only
/// released at frame `F + lag + 1`. The same value drives frame pacing,
/// deferred destruction and bindless slot reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameLag(u32);

impl FrameLag {
    /// Creates a frame lag. Zero is rejected by [`GraphicsConfig::validate`].
    pub const fn new(frames: u32) -> Self {
        Self(frames)
    }

    /// Frames in flight.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Number of per-frame slots a delay ring needs (`lag + 1`).
    pub const fn ring_len(self) -> usize {
        self.0 as usize + 1
    }

    /// First frame at which something released at `frame` may be reclaimed.
    pub const fn release_frame(self, frame: u64) -> u64 {
        frame + self.0 as u64 + 1
    }
}

impl Default for FrameLag {
    fn default() -> Self {
        Self(2)
    }
}

/// Capacity of each bindless table category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindlessLimits {
    pub sampled_images: u32,
    pub storage_images: u32,
    pub storage_buffers: u32,
    pub samplers: u32,
}

impl Default for BindlessLimits {
    fn default() -> Self {
        Self {
            sampled_images: 4096,
            storage_images: 1024,
            storage_buffers: 4096,
            samplers: 256,
        }
    }
}

/// How a queue hands out command buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueThreadMode {
    /// All callers record into one shared command buffer until it is submitted.
    Synchronous,
    /// Every call to `start_recording` gets its own command buffer.
    Multithreaded,
}

/// Thread mode per queue role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueModes([QueueThreadMode; QueueType::COUNT]);

impl QueueModes {
    /// Mode of `queue`.
    pub fn get(&self, queue: QueueType) -> QueueThreadMode {
        self.0[queue.index()]
    }

    /// Sets the mode of `queue`.
    pub fn with(mut self, queue: QueueType, mode: QueueThreadMode) -> Self {
        self.0[queue.index()] = mode;
        self
    }
}

impl Default for QueueModes {
    fn default() -> Self {
        let mut modes = [QueueThreadMode::Multithreaded; QueueType::COUNT];
        modes[QueueType::Present.index()] = QueueThreadMode::Synchronous;
        Self(modes)
    }
}

/// Configuration for a [`RenderDevice`](crate::RenderDevice).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GraphicsConfig {
    pub frame_lag: FrameLag,
    pub bindless: BindlessLimits,
    pub queue_modes: QueueModes,
}

impl GraphicsConfig {
    /// Set the frame lag.
    pub fn with_frame_lag(mut self, frames: u32) -> Self {
        self.frame_lag = FrameLag::new(frames);
        self
    }

    /// Set the bindless table capacities.
    pub fn with_bindless_limits(mut self, limits: BindlessLimits) -> Self {
        self.bindless = limits;
        self
    }

    /// Set the thread mode of one queue.
    pub fn with_queue_mode(mut self, queue: QueueType, mode: QueueThreadMode) -> Self {
        self.queue_modes = self.queue_modes.with(queue, mode);
        self
    }

    /// Checks the configuration for values the device cannot run with.
    pub fn validate(&self) -> GraphicsResult<()> {
        if self.frame_lag.get() == 0 {
            return Err(GraphicsError::InvalidConfig(
                "frame lag must be at least 1".to_string(),
            ));
        }

        let limits = [
            ("sampled_images", self.bindless.sampled_images),
            ("storage_images", self.bindless.storage_images),
            ("storage_buffers", self.bindless.storage_buffers),
            ("samplers", self.bindless.samplers),
        ];
        if let Some((name, _)) = limits.iter().find(|(_, capacity)| *capacity == 0) {
            return Err(GraphicsError::InvalidConfig(format!(
                "bindless capacity `{name}` must be non-zero"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GraphicsConfig::default();
        assert_eq!(config.frame_lag.get(), 2);
        assert_eq!(config.bindless.sampled_images, 4096);
        assert_eq!(config.bindless.samplers, 256);
        assert_eq!(
            config.queue_modes.get(QueueType::Present),
            QueueThreadMode::Synchronous
        );
        assert_eq!(
            config.queue_modes.get(QueueType::Graphics),
            QueueThreadMode::Multithreaded
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_lag_rejected() {
        let config = GraphicsConfig::default().with_frame_lag(0);
        assert!(matches!(
            config.validate(),
            Err(GraphicsError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = GraphicsConfig::default().with_bindless_limits(BindlessLimits {
            storage_images: 0,
            ..Default::default()
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("storage_images"));
    }

    #[test]
    fn test_release_frame() {
        let lag = FrameLag::new(2);
        assert_eq!(lag.ring_len(), 3);
        assert_eq!(lag.release_frame(10), 13);
    }

    #[test]
    fn test_queue_mode_override() {
        let config = GraphicsConfig::default()
            .with_queue_mode(QueueType::Transfer, QueueThreadMode::Synchronous);
        assert_eq!(
            config.queue_modes.get(QueueType::Transfer),
            QueueThreadMode::Synchronous
        );
    }
}
