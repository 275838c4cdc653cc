//! Fixed-timestep simulation driver.
//!
//! [`Simulation`] owns the tile grid, the entity registry, the actors and the
//! attachment graph. [`Simulation::advance`] feeds variable frame time into an
//! accumulator and runs one fixed tick (0.015 s by default) for every whole
//! tick it holds. Each tick walks a snapshot of the registry in spawn order
//! and steps every live entity through:
//!
//! 1. lifetime expiry and activation delay,
//! 2. its `update` hook,
//! 3. base physics for its mode,
//! 4. if it moved: two-pass world collision, then actor collision,
//! 5. if attached: the distance clamp toward its tow anchor,
//! 6. closing the tick (`old_position = position`).
//!
//! Hooks run with their own actor borrowed out, so structural changes they
//! request are queued and applied right after the hook returns. Entities
//! removed mid-tick are skipped for the rest of it. Entities spawned mid-tick
//! are first stepped on the next one.
//!
//! Simulation time is `tick_count * fixed_dt`, never an accumulated sum.
//!
//! # Example
//!
//! ```
//! use deathbeam_engine::prelude::*;
//!
//! let grid = TileGrid::new(4, 4, 8.0, 8.0).unwrap();
//! let mut sim = Simulation::new(grid, SimConfig::default()).unwrap();
//! let rock = sim.spawn(ActorDescriptor::default(), 10.0, 20.0, Inert);
//!
//! let stats = sim.advance(0.05);
//! assert_eq!(stats.ticks, 3);
//! assert!(sim.body(rock).unwrap().position.y < 20.0);
//! ```

use std::collections::HashMap;

use deathbeam_ecs::entity::EntityId;
use deathbeam_ecs::registry::{EntityRegistry, TypeTag};
use deathbeam_ecs::EcsError;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::actor::{Actor, ActorDescriptor, Entity, HookCtx, Inert};
use crate::attach::{AttachError, AttachMode, AttachmentGraph};
use crate::collision::{find_contacts, PairSet};
use crate::command::{CausalReason, Command, CommandKind, CommandQueue};
use crate::physics::{Body, PhysicsMode, Position};
use crate::tilemap::{GridError, TileGrid};

// ---------------------------------------------------------------------------
// SimConfig
// ---------------------------------------------------------------------------

/// Simulation-wide constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seconds per tick. Must be positive and finite.
    pub fixed_dt: f64,
    /// Velocity components below this magnitude snap to zero.
    pub velocity_epsilon: f64,
    /// Extra gravity per towed child, as a fraction of base gravity.
    pub tow_gravity_factor: f64,
    /// Cap on ticks run by one `advance` call. Whole ticks beyond the cap
    /// are dropped. `None` runs every tick the accumulator holds.
    pub max_ticks_per_frame: Option<u32>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            fixed_dt: 0.015,
            velocity_epsilon: 0.001,
            tow_gravity_factor: 0.1,
            max_ticks_per_frame: None,
        }
    }
}

impl SimConfig {
    /// # Errors
    ///
    /// The first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fixed_dt > 0.0 && self.fixed_dt.is_finite()) {
            return Err(ConfigError::FixedDt(self.fixed_dt));
        }
        if !(self.velocity_epsilon >= 0.0 && self.velocity_epsilon.is_finite()) {
            return Err(ConfigError::VelocityEpsilon(self.velocity_epsilon));
        }
        if !(self.tow_gravity_factor >= 0.0 && self.tow_gravity_factor.is_finite()) {
            return Err(ConfigError::TowGravityFactor(self.tow_gravity_factor));
        }
        if self.max_ticks_per_frame == Some(0) {
            return Err(ConfigError::ZeroTickBudget);
        }
        Ok(())
    }

    /// Parse and validate. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] or a validation error.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Invalid simulation or actor configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("fixed_dt must be positive and finite, got {0}")]
    FixedDt(f64),

    #[error("velocity_epsilon must be non-negative and finite, got {0}")]
    VelocityEpsilon(f64),

    #[error("tow_gravity_factor must be non-negative and finite, got {0}")]
    TowGravityFactor(f64),

    #[error("max_ticks_per_frame must be at least 1")]
    ZeroTickBudget,

    #[error("invalid descriptor for type {type_tag}: {reason}")]
    Descriptor { type_tag: TypeTag, reason: String },

    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Any error surfaced by the simulation API.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Attach(#[from] AttachError),

    #[error(transparent)]
    Ecs(#[from] EcsError),
}

// ---------------------------------------------------------------------------
// TickStats
// ---------------------------------------------------------------------------

/// Counters for one `advance`, `tick` or `run_ticks` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickStats {
    pub ticks: u32,
    /// Entity steps run (an entity stepped in three ticks counts three).
    pub entities_stepped: u32,
    /// Distinct colliding pairs, summed over ticks.
    pub collision_pairs: u32,
    pub removals: u32,
    /// Whole ticks discarded by `max_ticks_per_frame`.
    pub dropped_ticks: u32,
}

impl TickStats {
    /// Add another call's counters into these.
    pub fn absorb(&mut self, other: TickStats) {
        self.ticks += other.ticks;
        self.entities_stepped += other.entities_stepped;
        self.collision_pairs += other.collision_pairs;
        self.removals += other.removals;
        self.dropped_ticks += other.dropped_ticks;
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// The simulation: world, entities and the fixed-step clock.
pub struct Simulation {
    config: SimConfig,
    grid: TileGrid,
    entities: EntityRegistry<Entity>,
    actors: HashMap<EntityId, Box<dyn Actor>>,
    attachments: AttachmentGraph,
    commands: CommandQueue,
    accumulator: f64,
    tick_counter: u64,
    pairs: PairSet,
    removed_total: u64,
    last_stats: TickStats,
}

impl Simulation {
    /// # Errors
    ///
    /// [`SimError::Config`] if `config` fails validation.
    pub fn new(grid: TileGrid, config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        Ok(Self {
            config,
            grid,
            entities: EntityRegistry::new(),
            actors: HashMap::new(),
            attachments: AttachmentGraph::new(),
            commands: CommandQueue::new(),
            accumulator: 0.0,
            tick_counter: 0,
            pairs: PairSet::new(),
            removed_total: 0,
            last_stats: TickStats::default(),
        })
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Add an entity at `(x, y)`. It is stepped from the next tick on.
    pub fn spawn(&mut self, descriptor: ActorDescriptor, x: f64, y: f64, actor: impl Actor + 'static) -> EntityId {
        self.spawn_boxed(descriptor, x, y, Box::new(actor))
    }

    pub fn spawn_boxed(&mut self, descriptor: ActorDescriptor, x: f64, y: f64, actor: Box<dyn Actor>) -> EntityId {
        let tag = descriptor.type_tag;
        let id = self.entities.spawn(tag, Entity::new(descriptor, x, y, self.time()));
        self.actors.insert(id, actor);
        id
    }

    /// Remove an entity, running its removal hook. No-op if it is gone.
    pub fn remove(&mut self, id: EntityId) {
        self.remove_now(id, &CausalReason::Api);
        self.flush();
    }

    /// Attach `child` to the tail of `parent`'s towing chain, detaching it
    /// from any previous anchor. Re-attaching the same way to the current
    /// parent is a no-op.
    ///
    /// # Errors
    ///
    /// [`SimError::Attach`] for a removed entity, self-attachment or a cycle.
    pub fn attach(&mut self, child: EntityId, parent: EntityId) -> Result<(), SimError> {
        self.attach_with(child, parent, AttachMode::Tow)
    }

    /// Attach `child` to ride `parent` directly. Mounts are anchored to the
    /// parent itself and add no tow gravity.
    ///
    /// # Errors
    ///
    /// As [`Simulation::attach`].
    pub fn mount(&mut self, child: EntityId, parent: EntityId) -> Result<(), SimError> {
        self.attach_with(child, parent, AttachMode::Mount)
    }

    fn attach_with(&mut self, child: EntityId, parent: EntityId, mode: AttachMode) -> Result<(), SimError> {
        let result = self.attach_now(child, parent, mode);
        self.flush();
        Ok(result?)
    }

    /// Detach `child` from its anchor. No-op if it is not attached.
    pub fn detach(&mut self, child: EntityId) {
        self.detach_now(child);
        self.flush();
    }

    /// Add to an entity's velocity, clamped to its max velocity.
    ///
    /// # Errors
    ///
    /// [`SimError::Ecs`] if the entity is gone.
    pub fn push(&mut self, id: EntityId, dx: f64, dy: f64) -> Result<(), SimError> {
        let entity = self.entities.get_mut(id).ok_or(EcsError::StaleEntity { entity: id })?;
        let max = entity.descriptor.max_velocity();
        entity.body.push(dx, dy, max);
        Ok(())
    }

    // -- clock --------------------------------------------------------------

    /// Feed `frame_dt` seconds of real time and run every whole tick the
    /// accumulator now holds. Non-positive or non-finite input is ignored.
    pub fn advance(&mut self, frame_dt: f64) -> TickStats {
        let mut stats = TickStats::default();
        if frame_dt > 0.0 && frame_dt.is_finite() {
            self.accumulator += frame_dt;
        }
        let dt = self.config.fixed_dt;
        while self.accumulator >= dt {
            if let Some(budget) = self.config.max_ticks_per_frame {
                if stats.ticks >= budget {
                    let dropped = (self.accumulator / dt).floor();
                    self.accumulator -= dropped * dt;
                    stats.dropped_ticks = dropped as u32;
                    warn!(dropped = stats.dropped_ticks, budget, "tick budget exceeded, dropping ticks");
                    break;
                }
            }
            self.accumulator -= dt;
            self.run_tick(&mut stats);
        }
        self.last_stats = stats;
        stats
    }

    /// Run exactly one tick, bypassing the accumulator.
    pub fn tick(&mut self) -> TickStats {
        let mut stats = TickStats::default();
        self.run_tick(&mut stats);
        self.last_stats = stats;
        stats
    }

    /// Run `count` ticks back to back.
    pub fn run_ticks(&mut self, count: u64) -> TickStats {
        let mut total = TickStats::default();
        for _ in 0..count {
            total.absorb(self.tick());
        }
        self.last_stats = total;
        total
    }

    // -- accessors ----------------------------------------------------------

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_counter
    }

    /// Simulated seconds, `tick_count * fixed_dt`.
    pub fn time(&self) -> f64 {
        self.tick_counter as f64 * self.config.fixed_dt
    }

    /// Real time carried over toward the next tick.
    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    pub fn last_stats(&self) -> TickStats {
        self.last_stats
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut TileGrid {
        &mut self.grid
    }

    pub fn entities(&self) -> &EntityRegistry<Entity> {
        &self.entities
    }

    pub fn attachments(&self) -> &AttachmentGraph {
        &self.attachments
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn by_type(&self, tag: TypeTag) -> &[EntityId] {
        self.entities.by_type(tag)
    }

    pub fn body(&self, id: EntityId) -> Option<&Body> {
        self.entities.get(id).map(|e| &e.body)
    }

    pub fn body_mut(&mut self, id: EntityId) -> Option<&mut Body> {
        self.entities.get_mut(id).map(|e| &mut e.body)
    }

    pub fn descriptor(&self, id: EntityId) -> Option<&ActorDescriptor> {
        self.entities.get(id).map(|e| &e.descriptor)
    }

    pub fn descriptor_mut(&mut self, id: EntityId) -> Option<&mut ActorDescriptor> {
        self.entities.get_mut(id).map(|e| &mut e.descriptor)
    }

    /// Whether a live entity stands outside the grid. `false` for removed
    /// entities.
    pub fn is_out_of_bounds(&self, id: EntityId) -> bool {
        self.body(id)
            .is_some_and(|b| self.grid.coord_for(b.position.x, b.position.y).is_none())
    }

    // -- tick internals -----------------------------------------------------

    fn run_tick(&mut self, stats: &mut TickStats) {
        let time = self.time();
        let dt = self.config.fixed_dt;
        let removed_before = self.removed_total;
        self.pairs.clear();
        trace!(tick = self.tick_counter, entities = self.entities.len(), "tick start");

        for id in self.entities.snapshot() {
            if !self.entities.contains(id) {
                continue;
            }
            if self.step_entity(id, time, dt) {
                stats.entities_stepped += 1;
            }
        }

        self.tick_counter += 1;
        stats.ticks += 1;
        stats.collision_pairs += self.pairs.len() as u32;
        stats.removals += (self.removed_total - removed_before) as u32;
    }

    /// Step one entity. Returns `false` if it sat the tick out.
    fn step_entity(&mut self, id: EntityId, time: f64, dt: f64) -> bool {
        let Some(entity) = self.entities.get(id) else {
            return false;
        };
        let spawned_at = entity.body.spawned_at;
        if let Some(lifetime) = entity.descriptor.lifetime {
            if time >= spawned_at + lifetime {
                self.remove_now(id, &CausalReason::Lifetime);
                self.flush();
                return false;
            }
        }
        if let Some(delay) = entity.descriptor.activate_after {
            if time < spawned_at + delay {
                return false;
            }
        }

        self.with_actor(id, time, |actor, ctx| actor.update(ctx, dt));
        self.flush();

        let anchored = self.attachments.tow_anchor(id).is_some();
        let epsilon = self.config.velocity_epsilon;
        let Some(entity) = self.entities.get_mut(id) else {
            return true;
        };
        let body = &mut entity.body;
        if body.velocity.dy > 0.0 {
            body.on_ground = false;
        }
        match body.mode {
            PhysicsMode::None => {}
            PhysicsMode::Velocity => body.integrate(dt, entity.descriptor.drag, epsilon),
            PhysicsMode::Attached => {
                if anchored {
                    body.apply_slack();
                }
            }
        }

        if body.moved() {
            let world = entity.descriptor.collide_with_world;
            let actors = entity.descriptor.collide_with_actors.enabled();
            if world {
                self.collide_with_world(id, time);
            }
            if actors && self.entities.contains(id) {
                self.collide_with_actors(id, time);
            }
        }

        self.correct_attached_distance(id);
        if let Some(entity) = self.entities.get_mut(id) {
            entity.body.sync_old();
        }
        true
    }

    /// Two-pass trace from the tick origin, then ground contact, cell
    /// transitions and removal on world contact.
    fn collide_with_world(&mut self, id: EntityId, time: f64) {
        let Some(entity) = self.entities.get_mut(id) else {
            return;
        };
        let body = &mut entity.body;
        let (from, to) = (body.old_position, body.position);
        let result = self.grid.resolve(from.x, from.y, to.x, to.y);

        body.position = Position::new(result.x, result.y);
        if result.hit_ground {
            body.on_ground = true;
            if body.velocity.dy < 0.0 {
                body.velocity.dy = 0.0;
            }
        } else if to.y < from.y {
            body.on_ground = false;
        }

        let entered = (body.cell != result.cell).then_some(result.cell);
        body.cell = result.cell;
        let remove = result.hit && entity.descriptor.remove_on_collide;

        if let Some(cell) = entered {
            debug!(entity = %id, cell = ?cell, "cell changed");
            let typed = cell.and_then(|coord| self.grid.cell(coord)).filter(|c| !c.cell_type().is_none());
            if let Some(coord) = typed.map(|c| c.coord()) {
                self.with_actor(id, time, |actor, ctx| actor.on_cell_entered(ctx, coord));
                self.flush();
            }
        }
        if remove {
            self.remove_now(id, &CausalReason::WorldContact);
            self.flush();
        }
    }

    fn collide_with_actors(&mut self, id: EntityId, time: f64) {
        for contact in find_contacts(&self.entities, id) {
            if !self.entities.contains(id) {
                break;
            }
            let other = contact.other;
            if !self.entities.contains(other) || !self.pairs.insert(id, other) {
                continue;
            }
            trace!(entity = %id, other = %other, "actor contact");
            self.with_actor(id, time, |actor, ctx| dispatch_collide(actor, ctx, other));
            if contact.notify_other && self.entities.contains(other) {
                self.with_actor(other, time, |actor, ctx| dispatch_collide(actor, ctx, id));
            }
            self.flush();
        }
    }

    fn correct_attached_distance(&mut self, id: EntityId) {
        let Some(anchor) = self.attachments.tow_anchor(id) else {
            return;
        };
        let Some(anchor_position) = self.entities.get(anchor).map(|e| e.body.position) else {
            return;
        };
        if let Some(entity) = self.entities.get_mut(id) {
            if entity.body.mode == PhysicsMode::Attached {
                entity.body.clamp_to_anchor(anchor_position, entity.descriptor.attached_distance);
            }
        }
    }

    // -- commands -----------------------------------------------------------

    fn flush(&mut self) {
        while let Some(command) = self.commands.pop() {
            self.apply(command);
        }
    }

    fn apply(&mut self, command: Command) {
        let Command {
            target,
            kind,
            reason,
            index,
        } = command;
        trace!(command = index, entity = %target, kind = ?kind, %reason, "applying command");
        match kind {
            CommandKind::Install(actor) => {
                if self.entities.contains(target) {
                    self.actors.insert(target, actor);
                } else {
                    debug!(entity = %target, "spawned entity removed before install");
                }
            }
            CommandKind::Remove => self.remove_now(target, &reason),
            CommandKind::Attach { parent, mode } => {
                if let Err(error) = self.attach_now(target, parent, mode) {
                    warn!(entity = %target, parent = %parent, %reason, %error, "attach command skipped");
                }
            }
            CommandKind::Detach => self.detach_now(target),
            CommandKind::Damage { inflictor } => self.damage_now(target, inflictor),
        }
    }

    fn remove_now(&mut self, id: EntityId, reason: &CausalReason) {
        if !self.entities.contains(id) {
            return;
        }
        self.detach_now(id);
        for child in self.attachments.children(id) {
            self.detach_now(child);
        }
        let time = self.time();
        self.with_actor(id, time, |actor, ctx| actor.on_removed(ctx));
        self.actors.remove(&id);
        self.entities.remove(id);
        self.removed_total += 1;
        debug!(entity = %id, %reason, "entity removed");
    }

    fn attach_now(&mut self, child: EntityId, parent: EntityId, mode: AttachMode) -> Result<(), AttachError> {
        for entity in [child, parent] {
            if !self.entities.contains(entity) {
                return Err(AttachError::StaleEntity { entity });
            }
        }
        if child == parent {
            return Err(AttachError::SelfAttach { entity: child });
        }
        let current = self.attachments.link_of(child).map(|link| (link.parent, link.mode));
        if current == Some((parent, mode)) {
            return Ok(());
        }
        if self.attachments.would_cycle(child, parent) {
            return Err(AttachError::Cycle { child, parent });
        }

        self.detach_now(child);
        self.attachments.link(child, parent, mode)?;
        if let Some(entity) = self.entities.get_mut(child) {
            let body = &mut entity.body;
            body.saved_mode = Some(body.mode);
            body.mode = PhysicsMode::Attached;
        }
        self.update_tow_gravity(parent);
        debug!(
            entity = %child,
            parent = %parent,
            ?mode,
            anchor = ?self.attachments.tow_anchor(child),
            "entity attached"
        );

        let time = self.time();
        self.with_actor(parent, time, |actor, ctx| {
            if let Some(anchorable) = actor.anchorable() {
                anchorable.on_attached(ctx, child);
            }
        });
        Ok(())
    }

    fn detach_now(&mut self, child: EntityId) {
        let Some(unlinked) = self.attachments.unlink(child) else {
            return;
        };
        if let Some(entity) = self.entities.get_mut(child) {
            let body = &mut entity.body;
            body.mode = body.saved_mode.take().unwrap_or(PhysicsMode::Velocity);
        }
        let parent = unlinked.parent;
        self.update_tow_gravity(parent);
        debug!(entity = %child, parent = %parent, "entity detached");
        if let Some(next) = unlinked.relinked {
            debug!(entity = %next, anchor = ?self.attachments.tow_anchor(next), "chain relinked");
        }

        if self.entities.contains(parent) {
            let time = self.time();
            self.with_actor(parent, time, |actor, ctx| {
                if let Some(anchorable) = actor.anchorable() {
                    anchorable.on_detached(ctx, child);
                }
            });
        }
    }

    fn damage_now(&mut self, target: EntityId, inflictor: EntityId) {
        if !self.entities.contains(target) {
            return;
        }
        let time = self.time();
        self.with_actor(target, time, |actor, ctx| {
            if let Some(damageable) = actor.damageable() {
                damageable.on_damage(ctx, inflictor);
            }
        });
    }

    /// Effective gravity of a parent: base plus a fraction per towed child.
    fn update_tow_gravity(&mut self, parent: EntityId) {
        let towed = self.attachments.tow_count(parent) as f64;
        let factor = self.config.tow_gravity_factor;
        if let Some(entity) = self.entities.get_mut(parent) {
            entity.body.gravity = entity.descriptor.gravity * (1.0 + factor * towed);
        }
    }

    /// Run `f` against `id`'s actor with a hook context. Entities whose actor
    /// is not installed yet behave as [`Inert`].
    fn with_actor<R>(
        &mut self,
        id: EntityId,
        time: f64,
        f: impl FnOnce(&mut (dyn Actor + 'static), &mut HookCtx<'_>) -> R,
    ) -> R {
        let Self {
            entities,
            grid,
            actors,
            attachments,
            commands,
            ..
        } = self;
        let mut ctx = HookCtx {
            id,
            time,
            entities,
            grid,
            attachments,
            commands,
        };
        match actors.get_mut(&id) {
            Some(actor) => f(&mut **actor, &mut ctx),
            None => f(&mut Inert, &mut ctx),
        }
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("tick", &self.tick_counter)
            .field("entities", &self.entities.len())
            .field("attachments", &self.attachments.len())
            .field("accumulator", &self.accumulator)
            .finish_non_exhaustive()
    }
}

fn dispatch_collide(actor: &mut (dyn Actor + 'static), ctx: &mut HookCtx<'_>, other: EntityId) {
    match actor.collidable() {
        Some(collidable) => collidable.on_collide(ctx, other, true),
        None => ctx.default_collide(other),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
