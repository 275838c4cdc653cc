//! Entity handles and slot allocation.
//!
//! An [`EntityId`] packs a *generation* in the high 32 bits and a slot
//! *index* in the low 32 bits. Removing an entity bumps the generation of its
//! slot, so a handle kept by a collision callback or an anchor link after the
//! entity is gone can never alias a newer entity that reuses the slot.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// A generational entity handle.
///
/// Layout: `[generation: u32 | index: u32]`
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Build a handle from a slot index and generation.
    #[inline]
    pub fn new(index: u32, generation: u32) -> Self {
        Self((generation as u64) << 32 | index as u64)
    }

    /// Slot index (low 32 bits).
    #[inline]
    pub fn index(self) -> u32 {
        self.0 as u32
    }

    /// Slot generation (high 32 bits).
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// EntityAllocator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct SlotState {
    generation: u32,
    alive: bool,
}

/// Hands out [`EntityId`]s and recycles freed slots.
///
/// Freed slots are reused in FIFO order so that a slot freed during one tick
/// is not immediately handed to an entity spawned in the same tick.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    slots: Vec<SlotState>,
    free: VecDeque<u32>,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a handle, reusing a freed slot when one is available.
    pub fn allocate(&mut self) -> EntityId {
        if let Some(index) = self.free.pop_front() {
            let slot = &mut self.slots[index as usize];
            slot.alive = true;
            return EntityId::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(SlotState {
            generation: 0,
            alive: true,
        });
        EntityId::new(index, 0)
    }

    /// Free a handle's slot and invalidate every outstanding copy of it.
    ///
    /// Returns `false` when the handle was already stale or freed.
    pub fn free(&mut self, id: EntityId) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        let slot = &mut self.slots[id.index() as usize];
        slot.alive = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push_back(id.index());
        true
    }

    /// Whether `id` names a live entity of the current generation.
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.slots
            .get(id.index() as usize)
            .is_some_and(|slot| slot.alive && slot.generation == id.generation())
    }

    /// Number of live handles.
    pub fn alive_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
