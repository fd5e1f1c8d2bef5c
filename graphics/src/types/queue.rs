//! Hardware queue roles and their capabilities.

use bitflags::bitflags;

bitflags! {
    /// Kinds of work a queue accepts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QueueCapabilities: u32 {
        /// Render passes and draws.
        const GRAPHICS = 1 << 0;
        /// Compute dispatches.
        const COMPUTE = 1 << 1;
        /// Copies, fills and clears.
        const TRANSFER = 1 << 2;
        /// Presentation of swapchain images.
        const PRESENT = 1 << 3;
    }
}

/// The four hardware queue roles a command buffer can be recorded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueueType {
    Present,
    Graphics,
    Transfer,
    Compute,
}

impl QueueType {
    /// Every queue role, in index order.
    pub const ALL: [QueueType; 4] = [
        QueueType::Present,
        QueueType::Graphics,
        QueueType::Transfer,
        QueueType::Compute,
    ];

    /// Number of queue roles.
    pub const COUNT: usize = Self::ALL.len();

    /// Dense index for per-queue tables.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Work this queue role accepts.
    pub fn capabilities(self) -> QueueCapabilities {
        use QueueCapabilities as C;
        match self {
            Self::Present => C::GRAPHICS | C::COMPUTE | C::TRANSFER | C::PRESENT,
            Self::Graphics => C::GRAPHICS | C::COMPUTE | C::TRANSFER,
            Self::Compute => C::COMPUTE | C::TRANSFER,
            Self::Transfer => C::TRANSFER,
        }
    }

    /// Whether this queue accepts work needing `required`.
    pub fn supports(self, required: QueueCapabilities) -> bool {
        self.capabilities().contains(required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_are_dense() {
        for (i, queue) in QueueType::ALL.iter().enumerate() {
            assert_eq!(queue.index(), i);
        }
    }

    #[test]
    fn test_capabilities() {
        assert!(QueueType::Graphics.supports(QueueCapabilities::GRAPHICS));
        assert!(QueueType::Compute.supports(QueueCapabilities::TRANSFER));
        assert!(!QueueType::Compute.supports(QueueCapabilities::GRAPHICS));
        assert!(!QueueType::Transfer.supports(QueueCapabilities::COMPUTE));
        assert!(QueueType::Present.supports(QueueCapabilities::PRESENT));
    }
}
