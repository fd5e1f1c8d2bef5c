//! Generational slot arena.
//!
//! [`Arena<T>`] stores values in a dense slot vector and hands out
//! [`ArenaKey`]s made of a slot index and a generation. When a value is
//! removed its slot goes onto a free list and the slot's generation is bumped,
//! so any key still pointing at the old value stops resolving.
//!
//! This is the storage behind every GPU resource pool: a stale handle can never
//! observe a resource that was created later in the same slot.
//!
//! # Example
//!
//! ```
//! use vesper_core::arena::Arena;
//!
//! let mut arena = Arena::new();
//! let a = arena.insert("vertex buffer");
//! assert_eq!(arena.get(a), Some(&"vertex buffer"));
//!
//! arena.remove(a);
//! let b = arena.insert("index buffer");
//!
//! // Same slot, different generation.
//! assert_eq!(a.index(), b.index());
//! assert!(arena.get(a).is_none());
//! ```

/// Index + generation pair identifying a value in an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArenaKey {
    index: u32,
    generation: u32,
}

impl ArenaKey {
    /// Builds a key from raw parts.
    pub const fn from_raw_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index.
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation stamp of the slot at insertion time.
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Dense storage with generation-checked keys.
///
/// Freed slots are reused LIFO, matching how the entity allocator recycles ids.
#[derive(Debug)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    len: usize,
}

impl<T> Arena<T> {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            len: 0,
        }
    }

    /// Creates an empty arena with room for `capacity` values.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            len: 0,
        }
    }

    /// Inserts a value, reusing a freed slot if one exists.
    pub fn insert(&mut self, value: T) -> ArenaKey {
        self.len += 1;

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.value.is_none(), "free list slot {index} is occupied");
            slot.value = Some(value);
            ArenaKey::from_raw_parts(index, slot.generation)
        } else {
            let index = u32::try_from(self.slots.len()).expect("arena exceeded u32::MAX slots");
            self.slots.push(Slot {
                generation: 0,
                value: Some(value),
            });
            ArenaKey::from_raw_parts(index, 0)
        }
    }

    /// Removes and returns the value for `key`.
    ///
    /// Returns `None` if the key is stale or was never issued.
    pub fn remove(&mut self, key: ArenaKey) -> Option<T> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let value = slot.value.take()?;
        // Bump so every outstanding copy of `key` is invalidated on reuse.
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(key.index);
        self.len -= 1;
        Some(value)
    }

    /// Returns the value for `key` if it is still alive.
    pub fn get(&self, key: ArenaKey) -> Option<&T> {
        let slot = self.slots.get(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.value.as_ref()
    }

    /// Returns the value for `key` mutably if it is still alive.
    pub fn get_mut(&mut self, key: ArenaKey) -> Option<&mut T> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Whether `key` refers to a live value.
    pub fn contains(&self, key: ArenaKey) -> bool {
        self.get(key).is_some()
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the arena holds no live values.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates over live values with their keys.
    pub fn iter(&self) -> impl Iterator<Item = (ArenaKey, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (ArenaKey::from_raw_parts(index as u32, slot.generation), value))
        })
    }

    /// Removes every live value, returning them with their keys.
    ///
    /// Generations are bumped exactly as with [`remove`](Self::remove).
    pub fn drain(&mut self) -> Vec<(ArenaKey, T)> {
        let mut drained = Vec::with_capacity(self.len);
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(value) = slot.value.take() {
                drained.push((
                    ArenaKey::from_raw_parts(index as u32, slot.generation),
                    value,
                ));
                slot.generation = slot.generation.wrapping_add(1);
                self.free_list.push(index as u32);
            }
        }
        self.len = 0;
        drained
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}
