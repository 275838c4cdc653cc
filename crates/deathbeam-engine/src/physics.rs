//! Per-entity physical state and the integration rules of each physics mode.
//!
//! A [`Body`] is plain data: position, the position at the start of the
//! current tick, velocity, bounding box and contact state. The functions here
//! are the per-tick building blocks the simulation sequences:
//!
//! - [`Body::integrate`] for [`PhysicsMode::Velocity`] entities,
//! - [`Body::apply_slack`] and [`Body::clamp_to_anchor`] for
//!   [`PhysicsMode::Attached`] entities,
//! - nothing at all for [`PhysicsMode::None`].
//!
//! Gravity is applied once per tick and is not scaled by `dt`; the fixed tick
//! length makes the per-tick constant the natural unit.

use serde::{Deserialize, Serialize};

use crate::tilemap::CellCoord;

// ---------------------------------------------------------------------------
// Vectors
// ---------------------------------------------------------------------------

/// World position in grid units (y grows upward).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Position) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// Velocity in grid units per second.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity {
    pub dx: f64,
    pub dy: f64,
}

impl Velocity {
    pub const ZERO: Self = Self { dx: 0.0, dy: 0.0 };

    pub const fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }
}

/// Axis-aligned bounding box size. The box extends right and up from the
/// entity position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub width: f64,
    pub height: f64,
}

// ---------------------------------------------------------------------------
// PhysicsMode
// ---------------------------------------------------------------------------

/// How an entity's position advances each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhysicsMode {
    /// Frozen: no gravity, no velocity.
    None,
    /// Ballistic integration with gravity and drag.
    #[default]
    Velocity,
    /// Towed by an anchor. Entered and left only through attach/detach.
    Attached,
}

// ---------------------------------------------------------------------------
// Body
// ---------------------------------------------------------------------------

/// Physical state of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub position: Position,
    /// Position at the start of the current tick. Synced to `position` once
    /// the tick's physics and collision pass for the entity completes.
    pub old_position: Position,
    pub velocity: Velocity,
    pub extent: Extent,
    pub mode: PhysicsMode,
    /// Mode to restore on detach. Set while attached.
    pub saved_mode: Option<PhysicsMode>,
    /// Resting on a top edge or a slope.
    pub on_ground: bool,
    /// Cell occupied after the last world collision, `None` outside the grid
    /// or before the first one.
    pub cell: Option<CellCoord>,
    /// Effective gravity, including any towing penalty.
    pub gravity: f64,
    /// Simulation time at spawn.
    pub spawned_at: f64,
}

impl Body {
    pub fn new(position: Position, extent: Extent, mode: PhysicsMode, gravity: f64, spawned_at: f64) -> Self {
        Self {
            position,
            old_position: position,
            velocity: Velocity::ZERO,
            extent,
            mode,
            saved_mode: None,
            on_ground: false,
            cell: None,
            gravity,
            spawned_at,
        }
    }

    /// Whether the entity has moved since the start of the tick.
    pub fn moved(&self) -> bool {
        self.position != self.old_position
    }

    /// Close the tick: the current position becomes the next tick's origin.
    pub fn sync_old(&mut self) {
        self.old_position = self.position;
    }

    /// Resize the bounding box. Non-positive or non-finite sizes are ignored.
    pub fn resize(&mut self, width: f64, height: f64) {
        if width > 0.0 && height > 0.0 && width.is_finite() && height.is_finite() {
            self.extent = Extent { width, height };
        } else {
            tracing::warn!(width, height, "ignoring non-positive body size");
        }
    }

    /// Add to the velocity, clamping each axis to `±max`.
    ///
    /// Any upward velocity afterwards lifts the body off the ground.
    pub fn push(&mut self, dx: f64, dy: f64, max: Velocity) {
        self.velocity.dx = abs_clamp(self.velocity.dx + dx, max.dx);
        self.velocity.dy = abs_clamp(self.velocity.dy + dy, max.dy);
        if self.velocity.dy > 0.0 {
            self.on_ground = false;
        }
    }

    /// One tick of ballistic motion.
    ///
    /// Position advances by `velocity * dt`, then gravity is taken off the
    /// vertical velocity, both axes are scaled by `drag`, and components
    /// smaller than `epsilon` snap to exactly zero.
    pub fn integrate(&mut self, dt: f64, drag: f64, epsilon: f64) {
        self.position.x += self.velocity.dx * dt;
        self.position.y += self.velocity.dy * dt;
        self.velocity.dy -= self.gravity;
        self.velocity.dx *= drag;
        self.velocity.dy *= drag;
        if self.velocity.dx.abs() < epsilon {
            self.velocity.dx = 0.0;
        }
        if self.velocity.dy.abs() < epsilon {
            self.velocity.dy = 0.0;
        }
    }

    /// Slack for towed bodies: sag by half the gravity each tick.
    pub fn apply_slack(&mut self) {
        self.position.y -= 0.5 * self.gravity;
    }

    /// Pull the body back toward `anchor` until it is at most `max_distance`
    /// away. Returns whether a correction was applied.
    pub fn clamp_to_anchor(&mut self, anchor: Position, max_distance: f64) -> bool {
        let dx = anchor.x - self.position.x;
        let dy = anchor.y - self.position.y;
        let length = dx.hypot(dy);
        if length <= max_distance {
            return false;
        }
        let excess = length - max_distance;
        self.position.x += dx / length * excess;
        self.position.y += dy / length * excess;
        true
    }

    /// Closed-interval bounding box overlap: touching edges count.
    pub fn overlaps(&self, other: &Body) -> bool {
        let (a, b) = (self.position, other.position);
        !(a.x > b.x + other.extent.width
            || a.x + self.extent.width < b.x
            || a.y > b.y + other.extent.height
            || a.y + self.extent.height < b.y)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Clamp `value` to `[-max, max]`.
pub fn abs_clamp(value: f64, max: f64) -> f64 {
    value.clamp(-max, max)
}

/// Unit vector from `from` to `to`, or `None` when the points coincide.
pub fn direction(from: Position, to: Position) -> Option<(f64, f64)> {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    let length = dx.hypot(dy);
    if length == 0.0 || !length.is_finite() {
        return None;
    }
    Some((dx / length, dy / length))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn body_at(x: f64, y: f64) -> Body {
        Body::new(
            Position::new(x, y),
            Extent {
                width: 3.0,
                height: 3.0,
            },
            PhysicsMode::Velocity,
            1.5,
            0.0,
        )
    }

    // -- 1. Integration -----------------------------------------------------

    #[test]
    fn integrate_moves_then_applies_gravity_and_drag() {
        let mut body = body_at(0.0, 10.0);
        body.velocity = Velocity::new(10.0, 0.0);
        body.integrate(0.015, 0.9, 0.001);

        assert!((body.position.x - 0.15).abs() < 1e-12);
        assert_eq!(body.position.y, 10.0);
        assert!((body.velocity.dx - 9.0).abs() < 1e-12);
        assert!((body.velocity.dy - (-1.35)).abs() < 1e-12);
    }

    #[test]
    fn tiny_velocity_snaps_to_zero() {
        let mut body = body_at(0.0, 0.0);
        body.gravity = 0.0;
        body.velocity = Velocity::new(0.0011, -0.0005);
        body.integrate(0.015, 0.9, 0.001);
        assert_eq!(body.velocity, Velocity::ZERO);
    }

    #[test]
    fn push_clamps_and_lifts_off_ground() {
        let mut body = body_at(0.0, 0.0);
        body.on_ground = true;
        body.push(100.0, 600.0, Velocity::new(64.0, 384.0));
        assert_eq!(body.velocity, Velocity::new(64.0, 384.0));
        assert!(!body.on_ground);

        body.push(-200.0, -1000.0, Velocity::new(64.0, 384.0));
        assert_eq!(body.velocity, Velocity::new(-64.0, -384.0));
    }

    // -- 2. Attachment helpers ----------------------------------------------

    #[test]
    fn slack_sags_by_half_gravity() {
        let mut body = body_at(0.0, 5.0);
        body.apply_slack();
        assert_eq!(body.position.y, 4.25);
    }

    #[test]
    fn clamp_pulls_back_to_exact_distance() {
        let mut body = body_at(10.0, 0.0);
        assert!(body.clamp_to_anchor(Position::new(0.0, 0.0), 4.0));
        assert!((body.position.x - 4.0).abs() < 1e-12);
        assert_eq!(body.position.y, 0.0);
    }

    #[test]
    fn clamp_leaves_close_bodies_alone() {
        let mut body = body_at(3.0, 0.0);
        assert!(!body.clamp_to_anchor(Position::new(0.0, 0.0), 4.0));
        assert_eq!(body.position, Position::new(3.0, 0.0));
    }

    // -- 3. Overlap ---------------------------------------------------------

    #[test]
    fn touching_boxes_overlap() {
        let a = body_at(0.0, 0.0);
        let b = body_at(3.0, 3.0);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[test]
    fn separated_boxes_do_not_overlap() {
        let a = body_at(0.0, 0.0);
        let b = body_at(3.01, 0.0);
        assert!(!a.overlaps(&b));
        let c = body_at(0.0, -3.01);
        assert!(!a.overlaps(&c));
    }

    // -- 4. Helpers ---------------------------------------------------------

    #[test]
    fn direction_of_zero_length_vector_is_none() {
        let p = Position::new(4.0, 4.0);
        assert_eq!(direction(p, p), None);
        let (nx, ny) = direction(p, Position::new(7.0, 8.0)).unwrap();
        assert!((nx - 0.6).abs() < 1e-12);
        assert!((ny - 0.8).abs() < 1e-12);
    }

    #[test]
    fn resize_rejects_non_positive_sizes() {
        let mut body = body_at(0.0, 0.0);
        body.resize(0.0, 5.0);
        assert_eq!(body.extent.width, 3.0);
        body.resize(32.0, 16.0);
        assert_eq!(body.extent.width, 32.0);
    }
}
