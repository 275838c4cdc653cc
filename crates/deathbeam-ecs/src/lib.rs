//! Deathbeam ECS -- entity identity and type-indexed storage.
//!
//! This crate owns the bookkeeping side of the simulation: generational
//! [`EntityId`](entity::EntityId) handles and the
//! [`EntityRegistry`](registry::EntityRegistry) arena that indexes live
//! entities both in spawn order and by [`TypeTag`](registry::TypeTag).
//!
//! # Quick Start
//!
//! ```
//! use deathbeam_ecs::prelude::*;
//!
//! let mut registry = EntityRegistry::new();
//! let civilian = registry.spawn(TypeTag(2), "civilian");
//! let turret = registry.spawn(TypeTag(150), "turret");
//!
//! assert_eq!(registry.by_type(TypeTag(2)), &[civilian]);
//! registry.remove(civilian);
//! assert!(registry.by_type(TypeTag(2)).is_empty());
//! assert_eq!(registry.ids(), &[turret]);
//! ```

#![deny(unsafe_code)]

pub mod entity;
pub mod registry;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EcsError {
    /// The handle does not name a live entity (removed or never allocated).
    #[error("entity {entity} does not exist (stale or never allocated)")]
    StaleEntity { entity: entity::EntityId },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::entity::{EntityAllocator, EntityId};
    pub use crate::registry::{EntityRegistry, TypeTag};
    pub use crate::EcsError;
}
