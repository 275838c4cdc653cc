//! Headless run: a runner sweeps along a floor and collects the civilians it
//! touches into a towing chain.
//!
//! Run with:
//!   RUST_LOG=deathbeam_engine=debug cargo run --example headless_drop -p deathbeam-engine

use deathbeam_engine::prelude::*;

const RUNNER: TypeTag = TypeTag(1);
const CIVILIAN: TypeTag = TypeTag(2);

// ---------------------------------------------------------------------------
// Actors
// ---------------------------------------------------------------------------

/// Keeps pushing right until it reaches the far wall.
struct Runner;

impl Actor for Runner {
    fn update(&mut self, ctx: &mut HookCtx<'_>, _dt: f64) {
        ctx.push(40.0, 0.0);
    }

    fn anchorable(&mut self) -> Option<&mut dyn Anchorable> {
        Some(self)
    }
}

impl Anchorable for Runner {
    fn on_attached(&mut self, ctx: &mut HookCtx<'_>, child: EntityId) {
        tracing::info!(%child, time = ctx.time(), "civilian picked up");
    }
}

/// Joins the runner's chain on first contact.
struct Civilian;

impl Actor for Civilian {
    fn collidable(&mut self) -> Option<&mut dyn Collidable> {
        Some(self)
    }
}

impl Collidable for Civilian {
    fn on_collide(&mut self, ctx: &mut HookCtx<'_>, other: EntityId, _collision: bool) {
        let me = ctx.id();
        if ctx.parent_of(me).is_none() && ctx.tag_of(other) == Some(RUNNER) {
            ctx.attach(me, other, CausalReason::GameRule("rescued".into()));
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut grid = TileGrid::new(32, 12, 8.0, 8.0)?;
    for cx in 0..32 {
        grid = grid.with_cell(cx, 0, TypeTag::NONE, EdgeFlags::TOP)?;
    }
    for cy in 1..12 {
        grid = grid.with_cell(31, cy, TypeTag::NONE, EdgeFlags::LEFT)?;
    }

    let mut sim = Simulation::new(grid, SimConfig::default())?;
    let runner = sim.spawn(
        ActorDescriptor::tagged(RUNNER).with_size(6.0, 6.0),
        10.0,
        30.0,
        Runner,
    );
    for i in 0..5u32 {
        sim.spawn(
            ActorDescriptor::tagged(CIVILIAN)
                .with_size(4.0, 4.0)
                .with_filter(ActorFilter::Only(vec![RUNNER])),
            40.0 + 36.0 * f64::from(i),
            20.0,
            Civilian,
        );
    }

    // Ten seconds of 60 Hz frames.
    let mut totals = TickStats::default();
    for _ in 0..600 {
        totals.absorb(sim.advance(1.0 / 60.0));
    }

    let chain = sim.attachments().children(runner);
    tracing::info!(
        ticks = totals.ticks,
        pairs = totals.collision_pairs,
        chain = chain.len(),
        "run complete"
    );
    if let Some(body) = sim.body(runner) {
        println!("runner at ({:.2}, {:.2})", body.position.x, body.position.y);
    }
    println!("towing {} civilians", chain.len());
    println!("state hash {}", sim.state_hash());
    Ok(())
}
