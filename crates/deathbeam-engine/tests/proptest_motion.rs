//! Property tests for tracing and attachment correction.

use deathbeam_engine::prelude::*;
use proptest::prelude::*;

/// Coordinates strictly inside a 16x16 grid of 8x8 tiles.
fn inside() -> impl Strategy<Value = f64> {
    (0i32..12_800).prop_map(|v| v as f64 * 0.01)
}

fn coordinate() -> impl Strategy<Value = f64> {
    (-100_000i32..100_000).prop_map(|v| v as f64 * 0.01)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2_000))]

    #[test]
    fn open_cells_never_deflect_motion(
        (ox, oy, nx, ny) in (inside(), inside(), inside(), inside()),
    ) {
        let grid = TileGrid::new(16, 16, 8.0, 8.0).unwrap();
        let trace = grid.trace(ox, oy, nx, ny);
        prop_assert_eq!((trace.x, trace.y), (nx, ny));
        prop_assert!(!trace.hit);
        prop_assert!(!trace.hit_ground);

        let resolved = grid.resolve(ox, oy, nx, ny);
        prop_assert_eq!((resolved.x, resolved.y), (nx, ny));
        prop_assert_eq!(resolved.cell, grid.coord_for(nx, ny));
    }

    #[test]
    fn descending_slope_catches_points_below_its_surface(
        dx in (0i32..800).prop_map(|v| v as f64 * 0.01),
        frac in 0.0f64..0.99,
    ) {
        let grid = TileGrid::new(4, 4, 8.0, 8.0)
            .unwrap()
            .with_cell(1, 1, TypeTag::NONE, EdgeFlags::SLOPE | EdgeFlags::TOP)
            .unwrap();
        let surface = 8.0 - dx;
        let (nx, ny) = (8.0 + dx, 8.0 + surface * frac);

        let trace = grid.trace(12.0, 20.0, nx, ny);
        prop_assert!(trace.hit_ground);
        prop_assert_eq!(trace.x, nx);
        prop_assert!((trace.y - (8.0 + surface)).abs() < 1e-9, "snapped to {}", trace.y);
    }

    #[test]
    fn anchor_clamp_never_leaves_body_beyond_max(
        (x, y, ax, ay) in (coordinate(), coordinate(), coordinate(), coordinate()),
        max in (0i32..2_000).prop_map(|v| v as f64 * 0.01),
    ) {
        let mut body = Body::new(
            Position::new(x, y),
            Extent { width: 3.0, height: 3.0 },
            PhysicsMode::Attached,
            1.5,
            0.0,
        );
        let anchor = Position::new(ax, ay);
        let before = body.position.distance(anchor);
        let corrected = body.clamp_to_anchor(anchor, max);
        let after = body.position.distance(anchor);

        prop_assert_eq!(corrected, before > max);
        prop_assert!(after <= max + 1e-6, "distance {} > max {}", after, max);
        if corrected {
            prop_assert!((after - max).abs() < 1e-6, "pulled to {} instead of {}", after, max);
        }
    }
}
