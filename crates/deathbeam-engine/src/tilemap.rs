//! Tile grid and continuous-motion tracing.
//!
//! A [`TileGrid`] is a fixed rectangle of [`Cell`]s laid out bottom-up:
//! cell `(0, 0)` has its bottom-left corner at the world origin and `cy`
//! grows upward. Each cell carries a type tag, an [`EdgeFlags`] mask that
//! decides how it repels motion, an opaque tile reference for the renderer and
//! a free-form metadata store that gameplay objects use to claim the cell.
//!
//! Collision is resolved by [`TileGrid::trace`], which only ever consults the
//! destination cell and compares it with the origin cell. A single trace can
//! leave diagonal motion half-corrected when it crosses two blocking edges in
//! one tick, so entities always go through [`TileGrid::resolve`], which runs
//! the trace twice, feeding the first result back in.
//!
//! Positions outside the grid are not errors. Moving out of the grid, or
//! into it from outside, passes through untouched; callers use the missing
//! cell to detect entities that left the level.

use std::collections::{BTreeMap, HashMap};

use deathbeam_ecs::registry::TypeTag;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// EdgeFlags
// ---------------------------------------------------------------------------

/// Collision edges of a cell.
///
/// Axis-aligned flags combine freely (a corner cell may block two axes). When
/// [`SLOPE`](Self::SLOPE) is set the cell is a diagonal surface and
/// [`TOP`](Self::TOP) selects its direction instead of acting as an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeFlags(pub u8);

impl EdgeFlags {
    pub const EMPTY: Self = Self(0);

    /// Blocks downward entry and supports whatever lands on it.
    pub const TOP: Self = Self(1 << 0);

    /// Blocks rightward entry.
    pub const LEFT: Self = Self(1 << 1);

    /// Blocks upward entry.
    pub const BOTTOM: Self = Self(1 << 2);

    /// Blocks leftward entry.
    pub const RIGHT: Self = Self(1 << 3);

    /// Diagonal surface. With `TOP` the surface falls from the top-left
    /// corner to the bottom-right, without it it rises from bottom-left to
    /// top-right.
    pub const SLOPE: Self = Self(1 << 7);

    /// Every axis edge.
    pub const SOLID: Self = Self(Self::TOP.0 | Self::LEFT.0 | Self::BOTTOM.0 | Self::RIGHT.0);

    #[inline]
    pub fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    #[inline]
    pub fn intersects(self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    #[inline]
    pub fn is_slope(self) -> bool {
        self.contains(Self::SLOPE)
    }
}

impl std::ops::BitOr for EdgeFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitAnd for EdgeFlags {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

// ---------------------------------------------------------------------------
// Cells
// ---------------------------------------------------------------------------

/// Integer grid coordinates of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    pub cx: i32,
    pub cy: i32,
}

impl CellCoord {
    pub const fn new(cx: i32, cy: i32) -> Self {
        Self { cx, cy }
    }
}

/// One tile of the world grid.
///
/// Geometry, type and edges are fixed once the grid is loaded. Only the
/// metadata store is writable afterwards.
#[derive(Debug, Clone)]
pub struct Cell {
    coord: CellCoord,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    cell_type: TypeTag,
    edges: EdgeFlags,
    tile: Option<u32>,
    metadata: BTreeMap<String, serde_json::Value>,
}

impl Cell {
    pub fn coord(&self) -> CellCoord {
        self.coord
    }

    /// Left edge in world units.
    pub fn x(&self) -> f64 {
        self.x
    }

    /// Bottom edge in world units.
    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn cell_type(&self) -> TypeTag {
        self.cell_type
    }

    pub fn edges(&self) -> EdgeFlags {
        self.edges
    }

    /// Tileset reference for the renderer; `None` for blank cells.
    pub fn tile(&self) -> Option<u32> {
        self.tile
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }

    /// Store a metadata value, returning the value it replaced.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Option<serde_json::Value> {
        self.metadata.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.metadata.remove(key)
    }

    /// Contact rule for motion that ends inside this cell, having started in
    /// `origin`.
    fn contact(&self, origin: &Cell, new_x: f64, new_y: f64) -> Trace {
        let mut trace = Trace::clear(new_x, new_y, Some(self.coord));

        if self.edges.is_slope() {
            // Surfaces run at 45 degrees in world units whatever the tile
            // aspect ratio.
            let dx = new_x - self.x;
            let dy = new_y - self.y;
            let surface = if self.edges.contains(EdgeFlags::TOP) {
                self.height - dx
            } else {
                dx
            };
            if dy <= surface {
                trace.y = self.y + surface;
                trace.hit = true;
                trace.hit_ground = true;
            }
            return trace;
        }

        if self.edges.contains(EdgeFlags::LEFT) && self.x > origin.x {
            trace.x = self.x - 1.0;
            trace.hit = true;
        } else if self.edges.contains(EdgeFlags::RIGHT) && self.x < origin.x {
            trace.x = self.x + self.width;
            trace.hit = true;
        }
        if self.edges.contains(EdgeFlags::TOP) && self.y < origin.y {
            trace.y = self.y + self.height;
            trace.hit = true;
            trace.hit_ground = true;
        } else if self.edges.contains(EdgeFlags::BOTTOM) && self.y > origin.y {
            trace.y = self.y - 1.0;
            trace.hit = true;
        }
        trace
    }
}

/// The four axis neighbours of a cell, looked up fresh from the grid.
#[derive(Debug, Clone, Copy)]
pub struct Neighbors<'a> {
    pub top: Option<&'a Cell>,
    pub bottom: Option<&'a Cell>,
    pub left: Option<&'a Cell>,
    pub right: Option<&'a Cell>,
}

// ---------------------------------------------------------------------------
// Trace
// ---------------------------------------------------------------------------

/// Outcome of tracing a move through the grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trace {
    /// Collision-corrected destination.
    pub x: f64,
    pub y: f64,
    /// Any edge or slope pushed back on the move.
    pub hit: bool,
    /// The move ended on a supporting surface.
    pub hit_ground: bool,
    /// Destination cell, `None` outside the grid.
    pub cell: Option<CellCoord>,
}

impl Trace {
    fn clear(x: f64, y: f64, cell: Option<CellCoord>) -> Self {
        Self {
            x,
            y,
            hit: false,
            hit_ground: false,
            cell,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Grid construction failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GridError {
    #[error("tile size must be positive and finite, got {width}x{height}")]
    InvalidTileSize { width: f64, height: f64 },

    #[error("layer '{layer}' is {rows}x{columns}, expected {expected_rows}x{expected_columns}")]
    LayerShape {
        layer: &'static str,
        rows: usize,
        columns: usize,
        expected_rows: usize,
        expected_columns: usize,
    },

    #[error("cell ({cx}, {cy}) is outside a {width}x{height} grid")]
    OutOfBounds {
        cx: i32,
        cy: i32,
        width: u32,
        height: u32,
    },
}

// ---------------------------------------------------------------------------
// TileGrid
// ---------------------------------------------------------------------------

/// Rectangular grid of cells, fixed in shape after construction.
#[derive(Debug, Clone)]
pub struct TileGrid {
    width: u32,
    height: u32,
    tile_width: f64,
    tile_height: f64,
    /// Row-major, `cy * width + cx`, bottom row first.
    cells: Vec<Cell>,
    by_type: HashMap<TypeTag, Vec<CellCoord>>,
}

impl TileGrid {
    /// Create a grid of blank, untyped cells.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidTileSize`] for a non-positive or
    /// non-finite tile dimension.
    pub fn new(width: u32, height: u32, tile_width: f64, tile_height: f64) -> Result<Self, GridError> {
        if !(tile_width > 0.0 && tile_width.is_finite() && tile_height > 0.0 && tile_height.is_finite()) {
            return Err(GridError::InvalidTileSize {
                width: tile_width,
                height: tile_height,
            });
        }

        let mut cells = Vec::with_capacity(width as usize * height as usize);
        for cy in 0..height as i32 {
            for cx in 0..width as i32 {
                cells.push(Cell {
                    coord: CellCoord::new(cx, cy),
                    x: tile_width * cx as f64,
                    y: tile_height * cy as f64,
                    width: tile_width,
                    height: tile_height,
                    cell_type: TypeTag::NONE,
                    edges: EdgeFlags::EMPTY,
                    tile: None,
                    metadata: BTreeMap::new(),
                });
            }
        }

        let mut grid = Self {
            width,
            height,
            tile_width,
            tile_height,
            cells,
            by_type: HashMap::new(),
        };
        grid.rebuild_type_index();
        Ok(grid)
    }

    /// Build a grid from level layers written top row first, the way map
    /// files store them. Row 0 of each layer becomes the top row of the grid.
    ///
    /// `tiles` uses 0 for "no tile" and `n` for tileset entry `n - 1`.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::LayerShape`] when a layer does not match the shape
    /// of `types`, or [`GridError::InvalidTileSize`] for a bad tile size.
    pub fn from_rows(
        tile_width: f64,
        tile_height: f64,
        types: &[Vec<u8>],
        edges: &[Vec<u8>],
        tiles: Option<&[Vec<u32>]>,
    ) -> Result<Self, GridError> {
        let rows = types.len();
        let columns = types.first().map_or(0, Vec::len);
        check_layer("types", types, rows, columns)?;
        check_layer("edges", edges, rows, columns)?;
        if let Some(tiles) = tiles {
            check_layer("tiles", tiles, rows, columns)?;
        }

        let mut grid = Self::new(columns as u32, rows as u32, tile_width, tile_height)?;
        for (row, (type_row, edge_row)) in types.iter().zip(edges).enumerate() {
            let cy = (rows - row - 1) as i32;
            for (cx, (&cell_type, &edge_bits)) in type_row.iter().zip(edge_row).enumerate() {
                let coord = CellCoord::new(cx as i32, cy);
                let index = grid.index_of(coord).ok_or(GridError::OutOfBounds {
                    cx: coord.cx,
                    cy: coord.cy,
                    width: grid.width,
                    height: grid.height,
                })?;
                let cell = &mut grid.cells[index];
                cell.cell_type = TypeTag(cell_type);
                cell.edges = EdgeFlags(edge_bits);
                cell.tile = tiles
                    .map(|t| t[row][cx])
                    .filter(|&t| t > 0)
                    .map(|t| t - 1);
            }
        }
        grid.rebuild_type_index();
        Ok(grid)
    }

    /// Set the type and edges of one cell while building a grid.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::OutOfBounds`] if the coordinate is not in the grid.
    pub fn with_cell(
        mut self,
        cx: i32,
        cy: i32,
        cell_type: TypeTag,
        edges: EdgeFlags,
    ) -> Result<Self, GridError> {
        let coord = CellCoord::new(cx, cy);
        let index = self.index_of(coord).ok_or(GridError::OutOfBounds {
            cx,
            cy,
            width: self.width,
            height: self.height,
        })?;
        let cell = &mut self.cells[index];
        cell.cell_type = cell_type;
        cell.edges = edges;
        self.rebuild_type_index();
        Ok(self)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tile_width(&self) -> f64 {
        self.tile_width
    }

    pub fn tile_height(&self) -> f64 {
        self.tile_height
    }

    /// Grid coordinates of the cell containing a world position, or `None`
    /// outside the grid.
    pub fn coord_for(&self, x: f64, y: f64) -> Option<CellCoord> {
        if !(x.is_finite() && y.is_finite()) {
            return None;
        }
        let cx = (x / self.tile_width).floor();
        let cy = (y / self.tile_height).floor();
        if cx < 0.0 || cy < 0.0 || cx >= self.width as f64 || cy >= self.height as f64 {
            return None;
        }
        Some(CellCoord::new(cx as i32, cy as i32))
    }

    pub fn cell(&self, coord: CellCoord) -> Option<&Cell> {
        self.index_of(coord).map(|i| &self.cells[i])
    }

    pub fn cell_mut(&mut self, coord: CellCoord) -> Option<&mut Cell> {
        self.index_of(coord).map(move |i| &mut self.cells[i])
    }

    /// The cell containing a world position.
    pub fn cell_at(&self, x: f64, y: f64) -> Option<&Cell> {
        self.coord_for(x, y).and_then(|c| self.cell(c))
    }

    pub fn cell_at_mut(&mut self, x: f64, y: f64) -> Option<&mut Cell> {
        let coord = self.coord_for(x, y)?;
        self.cell_mut(coord)
    }

    pub fn neighbors(&self, coord: CellCoord) -> Neighbors<'_> {
        let CellCoord { cx, cy } = coord;
        Neighbors {
            top: self.cell(CellCoord::new(cx, cy + 1)),
            bottom: self.cell(CellCoord::new(cx, cy - 1)),
            left: self.cell(CellCoord::new(cx - 1, cy)),
            right: self.cell(CellCoord::new(cx + 1, cy)),
        }
    }

    /// Cells whose type tag matches, bottom row first.
    pub fn cells_of_type(&self, cell_type: TypeTag) -> impl Iterator<Item = &Cell> + '_ {
        self.by_type
            .get(&cell_type)
            .into_iter()
            .flatten()
            .filter_map(move |&coord| self.cell(coord))
    }

    /// Trace one straight move from `(old_x, old_y)` to `(new_x, new_y)`.
    ///
    /// Only the destination cell's contact rule is applied. Moves that end
    /// outside the grid, or start outside it, are returned unchanged.
    pub fn trace(&self, old_x: f64, old_y: f64, new_x: f64, new_y: f64) -> Trace {
        let Some(target) = self.cell_at(new_x, new_y) else {
            return Trace::clear(new_x, new_y, None);
        };
        let Some(origin) = self.cell_at(old_x, old_y) else {
            return Trace::clear(new_x, new_y, Some(target.coord));
        };
        target.contact(origin, new_x, new_y)
    }

    /// World collision for one tick: two traces from the same origin, the
    /// second starting from where the first left the entity.
    ///
    /// The flags of both passes are merged and the cell is the one the entity
    /// finally stands in.
    pub fn resolve(&self, old_x: f64, old_y: f64, new_x: f64, new_y: f64) -> Trace {
        let first = self.trace(old_x, old_y, new_x, new_y);
        let second = self.trace(old_x, old_y, first.x, first.y);
        Trace {
            x: second.x,
            y: second.y,
            hit: first.hit || second.hit,
            hit_ground: first.hit_ground || second.hit_ground,
            cell: self.coord_for(second.x, second.y),
        }
    }

    fn index_of(&self, coord: CellCoord) -> Option<usize> {
        if coord.cx < 0 || coord.cy < 0 || coord.cx >= self.width as i32 || coord.cy >= self.height as i32 {
            return None;
        }
        Some(coord.cy as usize * self.width as usize + coord.cx as usize)
    }

    fn rebuild_type_index(&mut self) {
        self.by_type.clear();
        for cell in &self.cells {
            self.by_type.entry(cell.cell_type).or_default().push(cell.coord);
        }
    }
}

fn check_layer<T>(
    layer: &'static str,
    rows_data: &[Vec<T>],
    rows: usize,
    columns: usize,
) -> Result<(), GridError> {
    let bad_row = rows_data.iter().find(|r| r.len() != columns);
    if rows_data.len() != rows || bad_row.is_some() {
        return Err(GridError::LayerShape {
            layer,
            rows: rows_data.len(),
            columns: bad_row.map_or(columns, Vec::len),
            expected_rows: rows,
            expected_columns: columns,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const TILE: f64 = 16.0;

    fn open_grid() -> TileGrid {
        TileGrid::new(8, 8, TILE, TILE).unwrap()
    }

    fn grid_with(cx: i32, cy: i32, edges: EdgeFlags) -> TileGrid {
        open_grid().with_cell(cx, cy, TypeTag::NONE, edges).unwrap()
    }

    // -- 1. Lookup ----------------------------------------------------------

    #[test]
    fn cell_at_divides_by_tile_size() {
        let grid = open_grid();
        let cell = grid.cell_at(17.5, 40.0).unwrap();
        assert_eq!(cell.coord(), CellCoord::new(1, 2));
        assert_eq!(cell.x(), 16.0);
        assert_eq!(cell.y(), 32.0);
    }

    #[test]
    fn out_of_range_lookup_is_none() {
        let grid = open_grid();
        assert!(grid.cell_at(-0.5, 4.0).is_none());
        assert!(grid.cell_at(4.0, -0.5).is_none());
        assert!(grid.cell_at(8.0 * TILE, 4.0).is_none());
        assert!(grid.cell_at(4.0, 8.0 * TILE).is_none());
    }

    #[test]
    fn non_finite_lookup_is_none() {
        let grid = open_grid();
        assert!(grid.cell_at(f64::NAN, f64::NAN).is_none());
        assert!(grid.cell_at(4.0, f64::NAN).is_none());
        assert!(grid.coord_for(f64::INFINITY, 4.0).is_none());
        assert!(grid.coord_for(4.0, f64::NEG_INFINITY).is_none());

        let t = grid.trace(4.0, 4.0, f64::NAN, 4.0);
        assert_eq!(t.cell, None);
        assert!(!t.hit);
    }

    #[test]
    fn neighbours_are_recomputed_lookups() {
        let grid = open_grid();
        let n = grid.neighbors(CellCoord::new(0, 0));
        assert!(n.left.is_none());
        assert!(n.bottom.is_none());
        assert_eq!(n.right.unwrap().coord(), CellCoord::new(1, 0));
        assert_eq!(n.top.unwrap().coord(), CellCoord::new(0, 1));
    }

    #[test]
    fn from_rows_flips_top_row_to_highest_cy() {
        let types = vec![vec![0, 50], vec![2, 0]];
        let edges = vec![vec![0, 0], vec![0, EdgeFlags::TOP.0]];
        let tiles = vec![vec![0, 3], vec![1, 0]];
        let grid = TileGrid::from_rows(TILE, TILE, &types, &edges, Some(&tiles)).unwrap();

        let rescue: Vec<_> = grid.cells_of_type(TypeTag(50)).map(Cell::coord).collect();
        assert_eq!(rescue, vec![CellCoord::new(1, 1)]);
        let floor = grid.cell(CellCoord::new(1, 0)).unwrap();
        assert!(floor.edges().contains(EdgeFlags::TOP));
        assert_eq!(grid.cell(CellCoord::new(1, 1)).unwrap().tile(), Some(2));
        assert_eq!(grid.cell(CellCoord::new(0, 1)).unwrap().tile(), None);
    }

    #[test]
    fn from_rows_rejects_ragged_layers() {
        let types = vec![vec![0, 0], vec![0]];
        let edges = vec![vec![0, 0], vec![0, 0]];
        let err = TileGrid::from_rows(TILE, TILE, &types, &edges, None).unwrap_err();
        assert!(matches!(err, GridError::LayerShape { layer: "types", .. }));
    }

    #[test]
    fn zero_tile_size_is_rejected() {
        assert!(matches!(
            TileGrid::new(2, 2, 0.0, TILE),
            Err(GridError::InvalidTileSize { .. })
        ));
    }

    #[test]
    fn metadata_is_writable() {
        let mut grid = open_grid();
        let cell = grid.cell_at_mut(4.0, 4.0).unwrap();
        assert!(cell.insert("platform", serde_json::json!(7)).is_none());
        assert_eq!(grid.cell_at(4.0, 4.0).unwrap().get("platform"), Some(&serde_json::json!(7)));
        assert!(grid.cell_at_mut(4.0, 4.0).unwrap().remove("platform").is_some());
    }

    // -- 2. Open motion -----------------------------------------------------

    #[test]
    fn open_motion_passes_through() {
        let grid = open_grid();
        let t = grid.trace(5.0, 5.0, 40.0, 70.0);
        assert_eq!((t.x, t.y), (40.0, 70.0));
        assert!(!t.hit);
        assert!(!t.hit_ground);
        assert_eq!(t.cell, Some(CellCoord::new(2, 4)));
    }

    #[test]
    fn leaving_the_grid_is_not_a_collision() {
        let grid = grid_with(0, 0, EdgeFlags::SOLID);
        let t = grid.trace(5.0, 20.0, 5.0, -3.0);
        assert_eq!((t.x, t.y), (5.0, -3.0));
        assert!(!t.hit);
        assert_eq!(t.cell, None);
    }

    #[test]
    fn entering_the_grid_is_not_a_collision() {
        let grid = grid_with(0, 0, EdgeFlags::SOLID);
        let t = grid.trace(5.0, -3.0, 5.0, 5.0);
        assert_eq!((t.x, t.y), (5.0, 5.0));
        assert!(!t.hit);
        assert_eq!(t.cell, Some(CellCoord::new(0, 0)));
    }

    // -- 3. Axis edges ------------------------------------------------------

    #[test]
    fn left_edge_blocks_rightward_entry() {
        let grid = grid_with(2, 1, EdgeFlags::LEFT);
        let t = grid.trace(30.0, 20.0, 33.0, 20.0);
        assert_eq!(t.x, 32.0 - 1.0);
        assert_eq!(t.y, 20.0);
        assert!(t.hit);
        assert!(!t.hit_ground);
    }

    #[test]
    fn right_edge_blocks_leftward_entry() {
        let grid = grid_with(1, 1, EdgeFlags::RIGHT);
        let t = grid.trace(33.0, 20.0, 30.0, 20.0);
        assert_eq!(t.x, 32.0);
        assert!(t.hit);
    }

    #[test]
    fn top_edge_blocks_downward_entry_and_grounds() {
        let grid = grid_with(1, 0, EdgeFlags::TOP);
        let t = grid.trace(20.0, 16.5, 20.0, 15.0);
        assert_eq!(t.y, 16.0);
        assert!(t.hit);
        assert!(t.hit_ground);
    }

    #[test]
    fn bottom_edge_blocks_upward_entry() {
        let grid = grid_with(1, 2, EdgeFlags::BOTTOM);
        let t = grid.trace(20.0, 31.0, 20.0, 33.0);
        assert_eq!(t.y, 31.0);
        assert!(t.hit);
        assert!(!t.hit_ground);
    }

    #[test]
    fn edges_only_block_from_their_side() {
        let grid = grid_with(1, 1, EdgeFlags::LEFT | EdgeFlags::TOP);
        // Entering from the right and from below touches neither flagged edge.
        let t = grid.trace(40.0, 20.0, 30.0, 20.0);
        assert!(!t.hit);
        let t = grid.trace(20.0, 10.0, 20.0, 20.0);
        assert!(!t.hit);
    }

    #[test]
    fn corner_cell_blocks_both_axes() {
        let grid = grid_with(1, 0, EdgeFlags::LEFT | EdgeFlags::TOP);
        let t = grid.trace(14.0, 18.0, 17.0, 15.0);
        assert_eq!((t.x, t.y), (15.0, 16.0));
        assert!(t.hit);
        assert!(t.hit_ground);
    }

    // -- 4. Slopes ----------------------------------------------------------

    #[test]
    fn top_flagged_slope_snaps_onto_descending_surface() {
        let grid = grid_with(1, 0, EdgeFlags::SLOPE | EdgeFlags::TOP);
        // Local dx = 4, surface at 16 - 4 = 12.
        let t = grid.trace(20.0, 18.0, 20.0, 10.0);
        assert_eq!(t.y, 12.0);
        assert_eq!(t.x, 20.0);
        assert!(t.hit);
        assert!(t.hit_ground);
    }

    #[test]
    fn plain_slope_snaps_onto_ascending_surface() {
        let grid = grid_with(1, 0, EdgeFlags::SLOPE);
        // Local dx = 6, surface at 6.
        let t = grid.trace(22.0, 9.0, 22.0, 3.0);
        assert_eq!(t.y, 6.0);
        assert!(t.hit_ground);
    }

    #[test]
    fn point_above_slope_surface_is_free() {
        let grid = grid_with(1, 0, EdgeFlags::SLOPE | EdgeFlags::TOP);
        let t = grid.trace(20.0, 15.5, 20.0, 14.0);
        assert!(!t.hit);
        assert_eq!(t.y, 14.0);
    }

    #[test]
    fn slope_on_wide_tile_keeps_unit_gradient() {
        let grid = TileGrid::new(4, 4, 16.0, 8.0)
            .unwrap()
            .with_cell(1, 1, TypeTag::NONE, EdgeFlags::SLOPE | EdgeFlags::TOP)
            .unwrap();
        // Local (dx = 4, dy = 1): surface at 8 - 4 = 4.
        let t = grid.trace(20.0, 20.0, 20.0, 9.0);
        assert_eq!(t.y, 12.0);
        assert!(t.hit_ground);

        let grid = TileGrid::new(4, 4, 16.0, 8.0)
            .unwrap()
            .with_cell(1, 1, TypeTag::NONE, EdgeFlags::SLOPE)
            .unwrap();
        // Local (dx = 6, dy = 2): surface at 6.
        let t = grid.trace(22.0, 20.0, 22.0, 10.0);
        assert_eq!(t.y, 14.0);
        assert!(t.hit_ground);
    }

    // -- 5. Two-pass resolution ---------------------------------------------

    fn wall_over_floor() -> TileGrid {
        // Cell (2, 0) only has a left edge; the floor cell (1, 0) beside it
        // only has a top edge.
        open_grid()
            .with_cell(2, 0, TypeTag::NONE, EdgeFlags::LEFT)
            .unwrap()
            .with_cell(1, 0, TypeTag::NONE, EdgeFlags::TOP)
            .unwrap()
    }

    #[test]
    fn single_trace_leaves_diagonal_move_in_the_floor() {
        let grid = wall_over_floor();
        let t = grid.trace(30.0, 18.0, 33.0, 14.0);
        // The wall pushes x back into the floor cell, whose edge is never seen.
        assert_eq!((t.x, t.y), (31.0, 14.0));
        assert!(t.hit);
        assert!(!t.hit_ground);
    }

    #[test]
    fn resolve_runs_second_pass_onto_the_floor() {
        let grid = wall_over_floor();
        let r = grid.resolve(30.0, 18.0, 33.0, 14.0);
        assert_eq!((r.x, r.y), (31.0, 16.0));
        assert!(r.hit);
        assert!(r.hit_ground);
        assert_eq!(r.cell, Some(CellCoord::new(1, 1)));
    }

    #[test]
    fn resolve_keeps_a_complete_first_pass() {
        let grid = grid_with(2, 0, EdgeFlags::LEFT | EdgeFlags::TOP);
        let r = grid.resolve(30.0, 20.0, 34.0, 14.0);
        assert_eq!((r.x, r.y), (31.0, 16.0));
        assert!(r.hit_ground);
    }
}
