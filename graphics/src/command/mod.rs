//! Command recording.
//!
//! - [`Command`] - recorded command variants and how they touch resources
//! - [`StateTracker`] - last-known state per subresource and buffer
//! - [`BarrierBatch`] - transitions coalesced into one barrier
//! - [`CommandBuffer`] - recording, barrier synthesis and resource locking
//! - [`CommandPool`] - per-queue buffer reuse

mod barrier;
mod buffer;
mod commands;
mod pool;
mod state;

pub use barrier::{BarrierBatch, BufferBarrier, ImageBarrier};
pub use buffer::{CommandBuffer, CommandBufferState};
pub use commands::{Command, Usage};
pub use pool::CommandPool;
pub use state::{StateTracker, SubresourceKey, buffer_state_covers, image_state_covers};
