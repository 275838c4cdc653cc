//! Deathbeam Engine -- fixed-step 2D tile-world simulation core.
//!
//! This crate builds on [`deathbeam_ecs`] to provide the simulation itself:
//! a [`TileGrid`](tilemap::TileGrid) that turns continuous motion into
//! tile-aware contact, per-entity [`Body`](physics::Body) physics, towing
//! chains in the [`AttachmentGraph`](attach::AttachmentGraph), actor-vs-actor
//! contact and the [`Simulation`](tick::Simulation) driver that sequences them
//! in 0.015 s ticks.
//!
//! Gameplay lives outside the core, in [`Actor`](actor::Actor)
//! implementations that receive hooks.
//!
//! # Quick Start
//!
//! ```
//! use deathbeam_engine::prelude::*;
//!
//! // A 4x4 grid of 8x8 tiles with a solid floor along the bottom row.
//! let mut grid = TileGrid::new(4, 4, 8.0, 8.0).unwrap();
//! for cx in 0..4 {
//!     grid = grid.with_cell(cx, 0, TypeTag::NONE, EdgeFlags::TOP).unwrap();
//! }
//!
//! let mut sim = Simulation::new(grid, SimConfig::default()).unwrap();
//! let crate_box = sim.spawn(ActorDescriptor::default(), 12.0, 20.0, Inert);
//!
//! sim.run_ticks(200);
//! let body = sim.body(crate_box).unwrap();
//! assert!(body.on_ground);
//! assert_eq!(body.position.y, 8.0);
//! ```

#![deny(unsafe_code)]

pub mod actor;
pub mod attach;
pub mod collision;
pub mod command;
pub mod physics;
pub mod snapshot;
pub mod tick;
pub mod tilemap;

/// Re-export the ECS crate for convenience.
pub use deathbeam_ecs;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use deathbeam_ecs::prelude::*;

    pub use crate::actor::{
        Actor, ActorDescriptor, ActorFilter, Anchorable, Collidable, Damageable, Entity, HookCtx, Inert,
    };
    pub use crate::attach::{AttachError, AttachMode, AttachmentGraph};
    pub use crate::command::CausalReason;
    pub use crate::physics::{direction, Body, Extent, PhysicsMode, Position, Velocity};
    pub use crate::snapshot::{AttachmentRecord, BodyRecord, SimSnapshot};
    pub use crate::tick::{ConfigError, SimConfig, SimError, Simulation, TickStats};
    pub use crate::tilemap::{Cell, CellCoord, EdgeFlags, GridError, TileGrid, Trace};
}
