//! CPU/GPU synchronization: submission ids and frame pacing.

use std::fmt;

use parking_lot::Mutex;

use crate::backend::Backend;
use crate::config::FrameLag;
use crate::error::GraphicsResult;

/// Identifies one queue submission.
///
/// Ids are issued by the backend in increasing order; completion is queried
/// through [`Backend::is_complete`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubmissionId(u64);

impl SubmissionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Submission#{}", self.0)
    }
}

/// Keeps the CPU at most `lag` frames ahead of the GPU.
///
/// Submissions are recorded against the frame they were made in. Beginning
/// frame `F` waits for everything submitted during frame `F - lag`, which is
/// what makes the frame-count based delays of deferred destruction and
/// bindless reuse safe without per-resource completion queries.
#[derive(Debug)]
pub struct FramePacer {
    lag: FrameLag,
    slots: Mutex<Vec<Vec<SubmissionId>>>,
}

impl FramePacer {
    pub fn new(lag: FrameLag) -> Self {
        assert!(lag.get() > 0, "frame lag must be at least 1");
        Self {
            lag,
            slots: Mutex::new((0..lag.get()).map(|_| Vec::new()).collect()),
        }
    }

    fn slot(&self, frame: u64) -> usize {
        (frame % u64::from(self.lag.get())) as usize
    }

    /// Records a submission made during `frame`.
    pub fn record(&self, frame: u64, submission: SubmissionId) {
        let slot = self.slot(frame);
        self.slots.lock()[slot].push(submission);
    }

    /// Blocks until the submissions of frame `frame - lag` have completed.
    ///
    /// Returns how many submissions were waited on.
    pub fn begin_frame(&self, frame: u64, backend: &dyn Backend) -> GraphicsResult<usize> {
        let slot = self.slot(frame);
        let pending = std::mem::take(&mut self.slots.lock()[slot]);
        if pending.is_empty() {
            return Ok(0);
        }

        log::trace!(
            "Frame {frame}: waiting on {} submissions from frame {}",
            pending.len(),
            frame.saturating_sub(u64::from(self.lag.get()))
        );
        backend.wait(&pending)?;
        Ok(pending.len())
    }

    /// Number of submissions not yet waited on.
    pub fn in_flight(&self) -> usize {
        self.slots.lock().iter().map(Vec::len).sum()
    }

    /// Forgets every recorded submission. Used after a full device wait.
    pub fn reset(&self) {
        for slot in self.slots.lock().iter_mut() {
            slot.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;

    #[test]
    fn test_waits_on_frame_lag_ago() {
        let backend = DummyBackend::new();
        let pacer = FramePacer::new(FrameLag::new(2));

        pacer.record(0, SubmissionId::new(1));
        pacer.record(0, SubmissionId::new(2));
        pacer.record(1, SubmissionId::new(3));
        assert_eq!(pacer.in_flight(), 3);

        // Frame 1 shares no slot with frame 0.
        assert_eq!(pacer.begin_frame(1, &backend).unwrap(), 1);
        assert_eq!(pacer.begin_frame(2, &backend).unwrap(), 2);
        assert_eq!(pacer.in_flight(), 0);
    }

    #[test]
    fn test_reset_forgets_everything() {
        let pacer = FramePacer::new(FrameLag::new(1));
        pacer.record(5, SubmissionId::new(9));
        pacer.reset();
        assert_eq!(pacer.in_flight(), 0);
    }

    #[test]
    #[should_panic(expected = "frame lag must be at least 1")]
    fn test_zero_lag_panics() {
        let _ = FramePacer::new(FrameLag::new(0));
    }
}
