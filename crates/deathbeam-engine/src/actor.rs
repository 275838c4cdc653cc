//! Entity configuration, behaviour hooks and the context hooks run in.
//!
//! Each entity is two things:
//!
//! - an [`Entity`] record in the registry: its [`Body`] plus the
//!   [`ActorDescriptor`] it was spawned with (its own copy, mutable by hooks);
//! - an [`Actor`] trait object holding gameplay state and hook code.
//!
//! Optional behaviour is expressed through capability traits. The
//! simulation asks an actor for [`Collidable`], [`Anchorable`] or
//! [`Damageable`] and only dispatches the matching hook when the actor
//! provides it. An actor that is not `Collidable` gets
//! [`HookCtx::default_collide`].
//!
//! Hooks receive a [`HookCtx`]. Reads and body edits take effect immediately;
//! removal, attachment and damage are queued and applied as soon as the hook
//! returns.

use deathbeam_ecs::entity::EntityId;
use deathbeam_ecs::registry::{EntityRegistry, TypeTag};
use serde::{Deserialize, Serialize};

use crate::attach::{AttachMode, AttachmentGraph};
use crate::command::{CausalReason, CommandKind, CommandQueue};
use crate::physics::{Body, Extent, PhysicsMode, Position, Velocity};
use crate::tick::ConfigError;
use crate::tilemap::{CellCoord, TileGrid};

// ---------------------------------------------------------------------------
// ActorFilter
// ---------------------------------------------------------------------------

/// Which other entities an entity collides with.
///
/// In JSON this is either a boolean or a list of type tags.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "FilterRepr", into = "FilterRepr")]
pub enum ActorFilter {
    /// Actor collision disabled.
    None,
    /// Every other collidable entity.
    #[default]
    All,
    /// Only entities with one of these tags.
    Only(Vec<TypeTag>),
}

impl ActorFilter {
    /// Whether actor collision is on at all. An empty allow-list counts as
    /// off.
    pub fn enabled(&self) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Only(tags) => !tags.is_empty(),
        }
    }

    /// Whether an entity tagged `tag` passes this filter.
    pub fn accepts(&self, tag: TypeTag) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Only(tags) => tags.contains(&tag),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum FilterRepr {
    Flag(bool),
    Only(Vec<TypeTag>),
}

impl From<FilterRepr> for ActorFilter {
    fn from(repr: FilterRepr) -> Self {
        match repr {
            FilterRepr::Flag(true) => Self::All,
            FilterRepr::Flag(false) => Self::None,
            FilterRepr::Only(tags) => Self::Only(tags),
        }
    }
}

impl From<ActorFilter> for FilterRepr {
    fn from(filter: ActorFilter) -> Self {
        match filter {
            ActorFilter::None => Self::Flag(false),
            ActorFilter::All => Self::Flag(true),
            ActorFilter::Only(tags) => Self::Only(tags),
        }
    }
}

// ---------------------------------------------------------------------------
// ActorDescriptor
// ---------------------------------------------------------------------------

/// Static configuration of one entity, copied into the entity at spawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorDescriptor {
    pub type_tag: TypeTag,
    pub collide_with_actors: ActorFilter,
    pub collide_with_world: bool,
    pub width: f64,
    pub height: f64,
    /// Base gravity, subtracted from vertical velocity once per tick.
    pub gravity: f64,
    /// Velocity multiplier applied once per tick.
    pub drag: f64,
    pub max_velocity_x: f64,
    pub max_velocity_y: f64,
    /// Initial physics mode. `Attached` is only reachable through attach.
    pub physics: PhysicsMode,
    pub damage_on_collide: bool,
    pub damage: f64,
    pub remove_on_collide: bool,
    /// Maximum distance to the tow anchor while attached.
    pub attached_distance: f64,
    /// Seconds of simulated time before the entity is removed.
    pub lifetime: Option<f64>,
    /// Seconds of simulated time the entity sits out after spawning.
    pub activate_after: Option<f64>,
}

impl Default for ActorDescriptor {
    fn default() -> Self {
        Self {
            type_tag: TypeTag::NONE,
            collide_with_actors: ActorFilter::All,
            collide_with_world: true,
            width: 3.0,
            height: 3.0,
            gravity: 1.5,
            drag: 0.9,
            max_velocity_x: 64.0,
            max_velocity_y: 384.0,
            physics: PhysicsMode::Velocity,
            damage_on_collide: false,
            damage: 0.0,
            remove_on_collide: false,
            attached_distance: 4.0,
            lifetime: None,
            activate_after: None,
        }
    }
}

impl ActorDescriptor {
    pub fn tagged(type_tag: TypeTag) -> Self {
        Self {
            type_tag,
            ..Self::default()
        }
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_filter(mut self, filter: ActorFilter) -> Self {
        self.collide_with_actors = filter;
        self
    }

    pub fn with_physics(mut self, physics: PhysicsMode) -> Self {
        self.physics = physics;
        self
    }

    pub fn with_gravity(mut self, gravity: f64) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn damaging(mut self, damage: f64) -> Self {
        self.damage_on_collide = true;
        self.damage = damage;
        self
    }

    pub fn removed_on_collide(mut self) -> Self {
        self.remove_on_collide = true;
        self
    }

    pub fn max_velocity(&self) -> Velocity {
        Velocity::new(self.max_velocity_x, self.max_velocity_y)
    }

    /// Parse and validate a descriptor. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for malformed JSON, or any error from
    /// [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let descriptor: Self = serde_json::from_str(json)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// # Errors
    ///
    /// [`ConfigError::Descriptor`] for a non-positive size, negative max
    /// velocity or attach distance, or an initial `Attached` mode.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| {
            Err(ConfigError::Descriptor {
                type_tag: self.type_tag,
                reason: reason.to_owned(),
            })
        };
        if !(self.width > 0.0 && self.height > 0.0) {
            return invalid("size must be positive");
        }
        if self.max_velocity_x < 0.0 || self.max_velocity_y < 0.0 {
            return invalid("max velocity must not be negative");
        }
        if self.attached_distance < 0.0 {
            return invalid("attached distance must not be negative");
        }
        if self.physics == PhysicsMode::Attached {
            return invalid("initial physics mode cannot be attached");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// Registry record of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub body: Body,
    pub descriptor: ActorDescriptor,
}

impl Entity {
    pub fn new(descriptor: ActorDescriptor, x: f64, y: f64, time: f64) -> Self {
        let mode = match descriptor.physics {
            PhysicsMode::Attached => {
                tracing::warn!(tag = %descriptor.type_tag, "spawning attached-mode entity as velocity");
                PhysicsMode::Velocity
            }
            mode => mode,
        };
        let body = Body::new(
            Position::new(x, y),
            Extent {
                width: descriptor.width,
                height: descriptor.height,
            },
            mode,
            descriptor.gravity,
            time,
        );
        Self { body, descriptor }
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Gameplay behaviour of an entity. Every hook defaults to doing nothing.
pub trait Actor {
    /// Runs at the start of the entity's step, before base physics.
    fn update(&mut self, _ctx: &mut HookCtx<'_>, _dt: f64) {}

    /// The entity moved into a different cell with a non-zero type tag.
    fn on_cell_entered(&mut self, _ctx: &mut HookCtx<'_>, _cell: CellCoord) {}

    /// Runs before the entity leaves the registry. Its body is still
    /// readable.
    fn on_removed(&mut self, _ctx: &mut HookCtx<'_>) {}

    fn collidable(&mut self) -> Option<&mut dyn Collidable> {
        None
    }

    fn anchorable(&mut self) -> Option<&mut dyn Anchorable> {
        None
    }

    fn damageable(&mut self) -> Option<&mut dyn Damageable> {
        None
    }
}

/// Custom reaction to actor contact.
pub trait Collidable {
    /// `other` overlaps this entity. Call [`HookCtx::default_collide`] to
    /// keep the stock damage/removal behaviour.
    fn on_collide(&mut self, ctx: &mut HookCtx<'_>, other: EntityId, collision: bool) {
        let _ = collision;
        ctx.default_collide(other);
    }
}

/// Reaction to entities attaching to or detaching from this one.
pub trait Anchorable {
    fn on_attached(&mut self, _ctx: &mut HookCtx<'_>, _child: EntityId) {}

    fn on_detached(&mut self, _ctx: &mut HookCtx<'_>, _child: EntityId) {}
}

/// Reaction to damage.
pub trait Damageable {
    fn on_damage(&mut self, ctx: &mut HookCtx<'_>, inflictor: EntityId);
}

/// Actor with no behaviour of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inert;

impl Actor for Inert {}

// ---------------------------------------------------------------------------
// HookCtx
// ---------------------------------------------------------------------------

/// Simulation access for the duration of one hook call.
pub struct HookCtx<'a> {
    pub(crate) id: EntityId,
    pub(crate) time: f64,
    pub(crate) entities: &'a mut EntityRegistry<Entity>,
    pub(crate) grid: &'a mut TileGrid,
    pub(crate) attachments: &'a AttachmentGraph,
    pub(crate) commands: &'a mut CommandQueue,
}

impl HookCtx<'_> {
    /// The entity whose hook is running.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Simulated time at the start of the current tick.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains(id)
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn body(&self, id: EntityId) -> Option<&Body> {
        self.entities.get(id).map(|e| &e.body)
    }

    pub fn body_mut(&mut self, id: EntityId) -> Option<&mut Body> {
        self.entities.get_mut(id).map(|e| &mut e.body)
    }

    /// The entity's own descriptor copy, e.g. to change its collision
    /// filter.
    pub fn descriptor_mut(&mut self, id: EntityId) -> Option<&mut ActorDescriptor> {
        self.entities.get_mut(id).map(|e| &mut e.descriptor)
    }

    pub fn tag_of(&self, id: EntityId) -> Option<TypeTag> {
        self.entities.tag_of(id)
    }

    pub fn by_type(&self, tag: TypeTag) -> &[EntityId] {
        self.entities.by_type(tag)
    }

    pub fn grid(&self) -> &TileGrid {
        &*self.grid
    }

    /// Mutable grid access, for cell metadata.
    pub fn grid_mut(&mut self) -> &mut TileGrid {
        &mut *self.grid
    }

    pub fn parent_of(&self, child: EntityId) -> Option<EntityId> {
        self.attachments.parent_of(child)
    }

    pub fn tow_anchor(&self, child: EntityId) -> Option<EntityId> {
        self.attachments.tow_anchor(child)
    }

    pub fn children(&self, parent: EntityId) -> Vec<EntityId> {
        self.attachments.children(parent)
    }

    /// Push the running entity, clamped to its max velocity.
    pub fn push(&mut self, dx: f64, dy: f64) {
        if let Some(entity) = self.entities.get_mut(self.id) {
            let max = entity.descriptor.max_velocity();
            entity.body.push(dx, dy, max);
        }
    }

    /// Spawn a new entity. It is in the registry at once; its actor is
    /// installed when the hook returns and it is first stepped next tick.
    pub fn spawn(&mut self, descriptor: ActorDescriptor, x: f64, y: f64, actor: impl Actor + 'static) -> EntityId {
        let tag = descriptor.type_tag;
        let id = self.entities.spawn(tag, Entity::new(descriptor, x, y, self.time));
        self.commands.push(id, CommandKind::Install(Box::new(actor)), CausalReason::SpawnedBy(self.id));
        id
    }

    pub fn remove(&mut self, id: EntityId, reason: CausalReason) {
        self.commands.push(id, CommandKind::Remove, reason);
    }

    /// Queue `child` onto the tail of `parent`'s towing chain.
    pub fn attach(&mut self, child: EntityId, parent: EntityId, reason: CausalReason) {
        let kind = CommandKind::Attach {
            parent,
            mode: AttachMode::Tow,
        };
        self.commands.push(child, kind, reason);
    }

    /// Queue `child` to ride `parent` directly, outside its towing chain.
    pub fn mount(&mut self, child: EntityId, parent: EntityId, reason: CausalReason) {
        let kind = CommandKind::Attach {
            parent,
            mode: AttachMode::Mount,
        };
        self.commands.push(child, kind, reason);
    }

    pub fn detach(&mut self, child: EntityId, reason: CausalReason) {
        self.commands.push(child, CommandKind::Detach, reason);
    }

    pub fn damage(&mut self, target: EntityId, inflictor: EntityId, reason: CausalReason) {
        self.commands.push(target, CommandKind::Damage { inflictor }, reason);
    }

    /// Stock contact reaction: take damage from a damaging partner, then
    /// remove self if configured to vanish on contact.
    pub fn default_collide(&mut self, other: EntityId) {
        let reason = CausalReason::Collision(self.id, other);
        if self.entities.get(other).is_some_and(|e| e.descriptor.damage_on_collide) {
            self.damage(self.id, other, reason.clone());
        }
        if self.entities.get(self.id).is_some_and(|e| e.descriptor.remove_on_collide) {
            self.remove(self.id, reason);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
