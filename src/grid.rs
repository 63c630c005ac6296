use std::fmt;

use rand::{Rng, SeedableRng, rngs::StdRng};

/// Number of cells in every generated row.
pub const COLUMNS: usize = 3;

// Ids are spaced so labels stay readable and stable across moves
const ID_STRIDE: BoxId = 100;

pub type BoxId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn from_hex(v: u32) -> Self {
        Self((v >> 16) as u8, (v >> 8) as u8, v as u8)
    }

    pub fn to_hex(self) -> u32 {
        (u32::from(self.0) << 16) | (u32::from(self.1) << 8) | u32::from(self.2)
    }

    /// Rough perceived brightness, used to pick a readable label color.
    pub fn is_light(self) -> bool {
        let luma = 299 * u32::from(self.0) + 587 * u32::from(self.1) + 114 * u32::from(self.2);
        luma > 128_000
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06X}", self.to_hex())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellPos {
    pub row: usize,
    pub col: usize,
}

impl CellPos {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridBox {
    pub id: BoxId,
    pub color: Rgb,
    pub label: String,
}

impl GridBox {
    pub fn new(id: BoxId, color: Rgb) -> Self {
        Self {
            id,
            color,
            label: id.to_string(),
        }
    }
}

/// A table cell; holds at most one box.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cell {
    pub content: Option<GridBox>,
}

impl Cell {
    pub fn with_box(b: GridBox) -> Self {
        Self { content: Some(b) }
    }
}

/// Rows of cells. Cloning produces a fully independent structural copy,
/// which is what the undo history stores.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grid {
    rows: Vec<Vec<Cell>>,
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn cell(&self, pos: CellPos) -> Option<&Cell> {
        self.rows.get(pos.row).and_then(|r| r.get(pos.col))
    }

    pub fn box_at(&self, pos: CellPos) -> Option<&GridBox> {
        self.cell(pos).and_then(|c| c.content.as_ref())
    }

    pub fn contains(&self, pos: CellPos) -> bool {
        self.cell(pos).is_some()
    }

    /// Every box with the position of its cell, in row-major order.
    pub fn boxes(&self) -> impl Iterator<Item = (CellPos, &GridBox)> + '_ {
        self.rows.iter().enumerate().flat_map(|(r, row)| {
            row.iter().enumerate().filter_map(move |(c, cell)| {
                cell.content.as_ref().map(|b| (CellPos::new(r, c), b))
            })
        })
    }

    pub fn box_count(&self) -> usize {
        self.boxes().count()
    }

    /// Box ids in row-major order; empty cells are skipped.
    pub fn ids(&self) -> Vec<BoxId> {
        self.boxes().map(|(_, b)| b.id).collect()
    }

    pub fn push_row(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }

    /// Exchange the contents of two cells. Boxes are moved, not copied.
    /// Returns false (and changes nothing) if either position is outside the grid.
    pub fn swap_cells(&mut self, a: CellPos, b: CellPos) -> bool {
        if !self.contains(a) || !self.contains(b) {
            return false;
        }
        if a == b {
            return true;
        }
        let first = self.rows[a.row][a.col].content.take();
        let second = self.rows[b.row][b.col].content.take();
        self.rows[a.row][a.col].content = second;
        self.rows[b.row][b.col].content = first;
        true
    }
}

/// Generates rows of fresh boxes with unique ids and random colors.
pub struct RowFactory {
    columns: usize,
    rng: StdRng,
}

impl RowFactory {
    pub fn new(columns: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        };
        Self { columns, rng }
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Id of the box generated for `col` when the grid has `row_count` rows.
    /// Row 0 yields 0, 100, 200; later rows continue the sequence so ids
    /// never repeat as long as rows are only appended.
    pub fn box_id(&self, row_count: usize, col: usize) -> BoxId {
        let index = (row_count as BoxId)
            .saturating_mul(self.columns as BoxId)
            .saturating_add(col as BoxId);
        index.saturating_mul(ID_STRIDE)
    }

    pub fn next_row(&mut self, row_count: usize) -> Vec<Cell> {
        (0..self.columns)
            .map(|col| {
                let id = self.box_id(row_count, col);
                Cell::with_box(GridBox::new(id, self.random_color()))
            })
            .collect()
    }

    // Uniform over all 16^6 colors
    fn random_color(&mut self) -> Rgb {
        Rgb::from_hex(self.rng.random_range(0..=0xFF_FFFF))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn grid_of(rows: usize, seed: u64) -> Grid {
        let mut factory = RowFactory::new(COLUMNS, Some(seed));
        let mut grid = Grid::new();
        for _ in 0..rows {
            let row = factory.next_row(grid.row_count());
            grid.push_row(row);
        }
        grid
    }

    #[test]
    fn first_row_ids_are_hundreds() {
        let grid = grid_of(1, 7);
        assert_eq!(grid.ids(), vec![0, 100, 200]);
        let labels: Vec<&str> = grid.boxes().map(|(_, b)| b.label.as_str()).collect();
        assert_eq!(labels, vec!["0", "100", "200"]);
    }

    #[test]
    fn second_row_does_not_reuse_first_row_ids() {
        let grid = grid_of(2, 7);
        assert_eq!(grid.ids(), vec![0, 100, 200, 300, 400, 500]);
    }

    #[test]
    fn ids_stay_distinct_for_very_large_row_counts() {
        let factory = RowFactory::new(COLUMNS, Some(1));
        assert_eq!(factory.box_id(20_000_000, 1), 6_000_000_100);
        assert_ne!(factory.box_id(20_000_000, 0), factory.box_id(0, 0));
        assert!(factory.box_id(20_000_000, 2) < factory.box_id(20_000_001, 0));
    }

    #[test]
    fn seeded_colors_are_deterministic() {
        assert_eq!(grid_of(3, 42), grid_of(3, 42));
    }

    #[test]
    fn rgb_hex_round_trip_and_display() {
        let c = Rgb::from_hex(0x12AB_EF);
        assert_eq!(c, Rgb(0x12, 0xAB, 0xEF));
        assert_eq!(c.to_hex(), 0x12AB_EF);
        assert_eq!(c.to_string(), "#12ABEF");
        assert!(Rgb(255, 255, 255).is_light());
        assert!(!Rgb(0, 0, 40).is_light());
    }

    #[test]
    fn swap_cells_moves_boxes_and_leaves_others() {
        let mut grid = grid_of(2, 1);
        let before = grid.clone();
        assert!(grid.swap_cells(CellPos::new(0, 0), CellPos::new(1, 2)));
        assert_eq!(grid.box_at(CellPos::new(0, 0)), before.box_at(CellPos::new(1, 2)));
        assert_eq!(grid.box_at(CellPos::new(1, 2)), before.box_at(CellPos::new(0, 0)));
        for pos in [CellPos::new(0, 1), CellPos::new(0, 2), CellPos::new(1, 0), CellPos::new(1, 1)] {
            assert_eq!(grid.box_at(pos), before.box_at(pos));
        }
    }

    #[test]
    fn swap_cells_out_of_range_is_rejected() {
        let mut grid = grid_of(1, 1);
        let before = grid.clone();
        assert!(!grid.swap_cells(CellPos::new(0, 0), CellPos::new(4, 0)));
        assert_eq!(grid, before);
    }

    #[test]
    fn swap_with_empty_cell_moves_box_into_it() {
        let b = GridBox::new(5, Rgb(1, 2, 3));
        let mut grid = Grid::from_rows(vec![vec![Cell::with_box(b.clone()), Cell::default()]]);
        assert!(grid.swap_cells(CellPos::new(0, 0), CellPos::new(0, 1)));
        assert_eq!(grid.box_at(CellPos::new(0, 0)), None);
        assert_eq!(grid.box_at(CellPos::new(0, 1)), Some(&b));
    }

    #[test]
    fn clone_is_independent() {
        let mut grid = grid_of(1, 3);
        let copy = grid.clone();
        grid.swap_cells(CellPos::new(0, 0), CellPos::new(0, 1));
        grid.push_row(vec![Cell::default()]);
        assert_eq!(copy.ids(), vec![0, 100, 200]);
        assert_eq!(copy.row_count(), 1);
    }

    proptest! {
        #[test]
        fn appended_rows_have_unique_ids(rows in 0usize..60, seed in any::<u64>()) {
            let grid = grid_of(rows, seed);
            let ids = grid.ids();
            prop_assert_eq!(ids.len(), COLUMNS * rows);
            let unique: HashSet<BoxId> = ids.iter().copied().collect();
            prop_assert_eq!(unique.len(), ids.len());
        }
    }
}
