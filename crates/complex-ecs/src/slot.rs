//! Slot arena with first-fit index recycling.
//!
//! A [`SlotArena`] is a dense `Vec` of optional occupants plus an ordered set
//! of free indices. Insertion always fills the lowest empty slot before the
//! backing store grows, which keeps the index space dense. Every slot carries
//! a generation counter that is bumped when its occupant is removed, so a key
//! handed out before the removal no longer resolves once the slot is reused.

use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;

// ---------------------------------------------------------------------------
// SlotKey
// ---------------------------------------------------------------------------

/// A handle type that addresses one slot of a [`SlotArena`].
pub trait SlotKey: Copy + Eq {
    /// Build a key from its slot index and slot generation.
    fn from_parts(index: u32, generation: u32) -> Self;

    /// The slot index.
    fn index(self) -> u32;

    /// The generation of the slot at the time the key was issued.
    fn generation(self) -> u32;
}

// ---------------------------------------------------------------------------
// SlotArena
// ---------------------------------------------------------------------------

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Dense storage with tombstoned slots and lowest-index-first reuse.
pub struct SlotArena<K, T> {
    slots: Vec<Slot<T>>,
    /// Indices of empty slots; the smallest is reused first.
    free: BTreeSet<u32>,
    len: usize,
    _key: PhantomData<fn() -> K>,
}

impl<K: SlotKey, T> SlotArena<K, T> {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: BTreeSet::new(),
            len: 0,
            _key: PhantomData,
        }
    }

    /// The key the next insertion will return.
    pub fn next_key(&self) -> K {
        match self.free.first() {
            Some(&index) => K::from_parts(index, self.slots[index as usize].generation),
            None => K::from_parts(self.slots.len() as u32, 0),
        }
    }

    /// Insert a value into the lowest empty slot, growing only when no slot
    /// is free.
    pub fn insert(&mut self, value: T) -> K {
        self.insert_with(|_| value)
    }

    /// Insert the value produced by `f`, which receives the key the value is
    /// about to be stored under.
    pub fn insert_with(&mut self, f: impl FnOnce(K) -> T) -> K {
        let key = self.next_key();
        let index = key.index();
        let value = f(key);
        if self.free.remove(&index) {
            self.slots[index as usize].value = Some(value);
        } else {
            self.slots.push(Slot {
                generation: 0,
                value: Some(value),
            });
        }
        self.len += 1;
        key
    }

    /// Remove the occupant addressed by `key`, tombstoning its slot.
    ///
    /// Returns `None` if the slot is empty or `key` is stale.
    pub fn remove(&mut self, key: K) -> Option<T> {
        let slot = self.slots.get_mut(key.index() as usize)?;
        if slot.generation != key.generation() {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.insert(key.index());
        self.len -= 1;
        Some(value)
    }

    /// Shared access to the occupant addressed by `key`.
    pub fn get(&self, key: K) -> Option<&T> {
        let slot = self.slots.get(key.index() as usize)?;
        if slot.generation != key.generation() {
            return None;
        }
        slot.value.as_ref()
    }

    /// Mutable access to the occupant addressed by `key`.
    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        let slot = self.slots.get_mut(key.index() as usize)?;
        if slot.generation != key.generation() {
            return None;
        }
        slot.value.as_mut()
    }

    /// Whether `key` currently resolves to an occupant.
    pub fn contains(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    /// The key of the current occupant of slot `index`, if any.
    pub fn key_at(&self, index: u32) -> Option<K> {
        let slot = self.slots.get(index as usize)?;
        slot.value
            .as_ref()
            .map(|_| K::from_parts(index, slot.generation))
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots in the backing store, occupied or not.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Occupied slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (K::from_parts(index as u32, slot.generation), value))
        })
    }

    /// Occupied slots in index order, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.value
                .as_mut()
                .map(|value| (K::from_parts(index as u32, generation), value))
        })
    }

    /// Keys of all occupied slots in index order.
    pub fn keys(&self) -> Vec<K> {
        self.iter().map(|(key, _)| key).collect()
    }
}

impl<K: SlotKey, T> Default for SlotArena<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> fmt::Debug for SlotArena<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotArena")
            .field("len", &self.len)
            .field("slot_count", &self.slots.len())
            .field("free", &self.free)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
