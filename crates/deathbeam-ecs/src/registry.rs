//! Live entity storage indexed by spawn order and by type tag.
//!
//! [`EntityRegistry`] is the arena behind the simulation. Every live entity
//! sits in a slot addressed by its [`EntityId`], appears once in the flat
//! spawn-ordered list, and once in the list for its [`TypeTag`]. Spawn and
//! remove keep the three views in step, so after [`EntityRegistry::remove`]
//! no index still names the entity.
//!
//! Iteration during a tick goes through [`EntityRegistry::snapshot`], an owned
//! copy of the spawn order. Entities removed while a phase walks the snapshot
//! are filtered with [`EntityRegistry::contains`]; entities spawned during the
//! phase are not in the snapshot and are first visited next tick.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entity::{EntityAllocator, EntityId};
use crate::EcsError;

// ---------------------------------------------------------------------------
// TypeTag
// ---------------------------------------------------------------------------

/// Gameplay type tag of an entity or a map cell (0-255, 0 = untyped).
///
/// The core never interprets tag values. They drive the per-type index and
/// actor collision allow-lists.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeTag(pub u8);

impl TypeTag {
    /// The untyped tag.
    pub const NONE: Self = Self(0);

    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({})", self.0)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EntityRegistry
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Slot<T> {
    id: EntityId,
    tag: TypeTag,
    value: T,
}

/// Arena of live entities with a flat spawn-ordered index and a per-type
/// index.
#[derive(Debug)]
pub struct EntityRegistry<T> {
    allocator: EntityAllocator,
    slots: Vec<Option<Slot<T>>>,
    order: Vec<EntityId>,
    by_type: HashMap<TypeTag, Vec<EntityId>>,
}

impl<T> EntityRegistry<T> {
    pub fn new() -> Self {
        Self {
            allocator: EntityAllocator::new(),
            slots: Vec::new(),
            order: Vec::new(),
            by_type: HashMap::new(),
        }
    }

    /// Store `value` under a fresh handle, appending it to the flat index and
    /// to the index for `tag`.
    pub fn spawn(&mut self, tag: TypeTag, value: T) -> EntityId {
        let id = self.allocator.allocate();
        let index = id.index() as usize;
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index] = Some(Slot { id, tag, value });
        self.order.push(id);
        self.by_type.entry(tag).or_default().push(id);
        debug!(entity = %id, tag = %tag, "entity spawned");
        id
    }

    /// Remove an entity from every index and hand back its value.
    ///
    /// Returns `None` for a handle that is already gone; removing twice in
    /// one tick is expected and harmless.
    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        if !self.allocator.is_alive(id) {
            return None;
        }
        let slot = self.slots.get_mut(id.index() as usize)?.take()?;
        self.allocator.free(id);
        self.order.retain(|&e| e != id);
        if let Some(list) = self.by_type.get_mut(&slot.tag) {
            list.retain(|&e| e != id);
            if list.is_empty() {
                self.by_type.remove(&slot.tag);
            }
        }
        debug!(entity = %id, tag = %slot.tag, "entity removed");
        Some(slot.value)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.allocator.is_alive(id)
    }

    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.slot(id).map(|slot| &slot.value)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        match self.slots.get_mut(id.index() as usize) {
            Some(Some(slot)) if slot.id == id => Some(&mut slot.value),
            _ => None,
        }
    }

    /// Like [`get`](Self::get), but reports a stale handle as an error.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::StaleEntity`] if `id` is not live.
    pub fn try_get(&self, id: EntityId) -> Result<&T, EcsError> {
        self.get(id).ok_or(EcsError::StaleEntity { entity: id })
    }

    /// The type tag an entity was spawned with.
    pub fn tag_of(&self, id: EntityId) -> Option<TypeTag> {
        self.slot(id).map(|slot| slot.tag)
    }

    /// Live entities of one type, in spawn order. Empty when the type has no
    /// members.
    pub fn by_type(&self, tag: TypeTag) -> &[EntityId] {
        self.by_type.get(&tag).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every live entity, in spawn order.
    pub fn ids(&self) -> &[EntityId] {
        &self.order
    }

    /// Owned copy of the spawn order, stable against spawns and removals made
    /// while it is walked.
    pub fn snapshot(&self) -> Vec<EntityId> {
        self.order.clone()
    }

    /// Iterate `(id, value)` pairs in spawn order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.order
            .iter()
            .filter_map(move |&id| self.get(id).map(|value| (id, value)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn slot(&self, id: EntityId) -> Option<&Slot<T>> {
        match self.slots.get(id.index() as usize) {
            Some(Some(slot)) if slot.id == id => Some(slot),
            _ => None,
        }
    }
}

impl<T> Default for EntityRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
