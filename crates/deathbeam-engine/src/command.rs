//! Deferred structural changes requested from inside entity hooks.
//!
//! While a hook runs, its own actor is borrowed out of the simulation, so
//! anything that would call *another* hook (removing an entity, attaching,
//! dealing damage) or install a freshly spawned actor is written to the
//! [`CommandQueue`] instead. The simulation drains the queue in FIFO order
//! right after each hook returns, so the effect is visible to the next entity
//! in the same tick.
//!
//! Each command records the [`CausalReason`] it was issued for; applying a
//! command logs it with that reason.

use std::collections::VecDeque;
use std::fmt;

use deathbeam_ecs::entity::EntityId;
use serde::{Deserialize, Serialize};

use crate::actor::Actor;
use crate::attach::AttachMode;

// ---------------------------------------------------------------------------
// CausalReason
// ---------------------------------------------------------------------------

/// Why a command was issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CausalReason {
    /// Contact between two entities (self, partner).
    Collision(EntityId, EntityId),
    /// The entity's motion hit the tile grid.
    WorldContact,
    /// The entity outlived its configured lifetime.
    Lifetime,
    /// Spawned from a hook of the given entity.
    SpawnedBy(EntityId),
    /// A gameplay rule inside a hook (e.g. "civilian_rescued").
    GameRule(String),
    /// Issued from outside the tick through the public API.
    Api,
}

impl fmt::Display for CausalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collision(a, b) => write!(f, "collision {a}/{b}"),
            Self::WorldContact => f.write_str("world contact"),
            Self::Lifetime => f.write_str("lifetime expired"),
            Self::SpawnedBy(parent) => write!(f, "spawned by {parent}"),
            Self::GameRule(rule) => write!(f, "rule {rule}"),
            Self::Api => f.write_str("api"),
        }
    }
}

// ---------------------------------------------------------------------------
// CommandKind
// ---------------------------------------------------------------------------

/// The mutation a command performs on its target.
pub enum CommandKind {
    /// Install the behaviour of an entity already placed in the registry.
    Install(Box<dyn Actor>),
    /// Remove the target, running its removal hook.
    Remove,
    /// Attach the target to `parent`, towed or mounted.
    Attach { parent: EntityId, mode: AttachMode },
    /// Detach the target from its anchor.
    Detach,
    /// Deliver damage from `inflictor` to the target.
    Damage { inflictor: EntityId },
}

impl fmt::Debug for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install(_) => f.write_str("Install(..)"),
            Self::Remove => f.write_str("Remove"),
            Self::Attach { parent, mode } => f
                .debug_struct("Attach")
                .field("parent", parent)
                .field("mode", mode)
                .finish(),
            Self::Detach => f.write_str("Detach"),
            Self::Damage { inflictor } => f.debug_struct("Damage").field("inflictor", inflictor).finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// One deferred mutation.
#[derive(Debug)]
pub struct Command {
    pub target: EntityId,
    pub kind: CommandKind,
    pub reason: CausalReason,
    /// Sequence number within the queue's lifetime.
    pub index: u64,
}

// ---------------------------------------------------------------------------
// CommandQueue
// ---------------------------------------------------------------------------

/// FIFO of pending commands.
#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: VecDeque<Command>,
    issued: u64,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, target: EntityId, kind: CommandKind, reason: CausalReason) {
        let index = self.issued;
        self.issued += 1;
        self.pending.push_back(Command {
            target,
            kind,
            reason,
            index,
        });
    }

    pub fn pop(&mut self) -> Option<Command> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Total number of commands ever queued.
    pub fn issued(&self) -> u64 {
        self.issued
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
