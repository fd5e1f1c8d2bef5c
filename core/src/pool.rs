//! Allocation-preserving recycling.
//!
//! Command buffers are recorded, submitted and reset every frame. Dropping and
//! reallocating their command lists, lock lists and state maps each time is
//! wasted work; [`Pooled<T>`] keeps the value around between uses and only
//! clears it, so `Vec` and `HashMap` capacity survives the reset.
//!
//! # Example
//!
//! ```
//! use vesper_core::pool::{Poolable, Pooled};
//!
//! #[derive(Debug, Default)]
//! struct CommandList {
//!     words: Vec<u32>,
//! }
//!
//! impl Poolable for CommandList {
//!     fn reset(&mut self) {
//!         self.words.clear();
//!     }
//! }
//!
//! let mut list = Pooled::<CommandList>::default();
//! assert!(!list.is_active());
//!
//! list.activate().words.extend_from_slice(&[1, 2, 3]);
//! assert!(list.is_active());
//!
//! list.release();
//! assert!(!list.is_active());
//! assert!(list.inner().words.capacity() >= 3);
//! ```

/// A value that can be cleared in place for reuse.
pub trait Poolable: Default {
    /// Clear contents, keeping allocated capacity.
    fn reset(&mut self);
}

/// A recycled value with an active/pooled flag.
///
/// While pooled the value is cleared and [`get`](Self::get) returns `None`;
/// [`activate`](Self::activate) hands the same allocation back out.
#[derive(Debug, Default)]
pub struct Pooled<T: Poolable> {
    value: T,
    active: bool,
}

impl<T: Poolable> Pooled<T> {
    /// Wraps an active value.
    pub fn new(value: T) -> Self {
        Self {
            value,
            active: true,
        }
    }

    /// Whether the value currently holds live data.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The live value, if active.
    pub fn get(&self) -> Option<&T> {
        self.active.then_some(&self.value)
    }

    /// The live value mutably, if active.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        if self.active {
            Some(&mut self.value)
        } else {
            None
        }
    }

    /// Marks the value active and returns it.
    ///
    /// A value coming back from the pool is already cleared.
    pub fn activate(&mut self) -> &mut T {
        self.active = true;
        &mut self.value
    }

    /// Clears the value and returns it to the pool. No-op when already pooled.
    pub fn release(&mut self) {
        if self.active {
            self.value.reset();
            self.active = false;
        }
    }

    /// The underlying value regardless of state.
    pub fn inner(&self) -> &T {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Lists {
        commands: Vec<u32>,
        locks: Vec<u64>,
    }

    impl Poolable for Lists {
        fn reset(&mut self) {
            self.commands.clear();
            self.locks.clear();
        }
    }

    #[test]
    fn default_is_pooled() {
        let pooled = Pooled::<Lists>::default();
        assert!(!pooled.is_active());
        assert!(pooled.get().is_none());
    }

    #[test]
    fn new_is_active() {
        let pooled = Pooled::new(Lists {
            commands: vec![1],
            locks: vec![],
        });
        assert!(pooled.is_active());
        assert_eq!(pooled.get().unwrap().commands, vec![1]);
    }

    #[test]
    fn release_keeps_capacity() {
        let mut pooled = Pooled::<Lists>::default();
        let lists = pooled.activate();
        lists.commands.extend(0..64);
        lists.locks.extend(0..16);

        pooled.release();

        assert!(pooled.get().is_none());
        assert!(pooled.inner().commands.is_empty());
        assert!(pooled.inner().commands.capacity() >= 64);
        assert!(pooled.inner().locks.capacity() >= 16);
    }

    #[test]
    fn release_twice_is_noop() {
        let mut pooled = Pooled::<Lists>::default();
        pooled.release();
        pooled.release();
        assert!(!pooled.is_active());
    }

    #[test]
    fn reactivate_cycles() {
        let mut pooled = Pooled::<Lists>::default();
        for frame in 0..3u32 {
            pooled.activate().commands.push(frame);
            assert_eq!(pooled.get().unwrap().commands, vec![frame]);
            pooled.release();
        }
    }

    #[test]
    fn get_mut_only_when_active() {
        let mut pooled = Pooled::<Lists>::default();
        assert!(pooled.get_mut().is_none());
        pooled.activate();
        pooled.get_mut().unwrap().locks.push(9);
        assert_eq!(pooled.get().unwrap().locks, vec![9]);
    }
}
