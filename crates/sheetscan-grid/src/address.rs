//! Cell addresses and the address-keyed [`Grid`].

use std::collections::HashMap;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Position of one cell inside its field.
///
/// - answer blocks: `block` = block index, `row` = question row in the
///   block, `column` = choice index;
/// - column grids: `column` = character column, `row` = row label index;
/// - choices and flags: `column` = option index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellAddress {
    pub block: u32,
    pub row: u32,
    pub column: u32,
}

impl CellAddress {
    pub const fn new(block: u32, row: u32, column: u32) -> Self {
        Self { block, row, column }
    }
}

/// One cell: its address, the label a mark there means, and its canonical
/// pixel center.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub address: CellAddress,
    pub label: String,
    pub center: Point2<f32>,
}

/// A set of mutually exclusive candidate cells decided together
/// (one question, one character column, one choice field or one flag).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionUnit {
    /// Result-tree key: question number, column index or option label.
    /// Empty for single-valued fields.
    pub key: String,
    /// Indices into [`Grid::cells`], in candidate order.
    pub cells: Vec<usize>,
}

/// Dense cell layout of one field in canonical page coordinates.
#[derive(Clone, Debug, Default)]
pub struct Grid {
    cells: Vec<GridCell>,
    index: HashMap<CellAddress, usize>,
    units: Vec<DecisionUnit>,
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a cell; a repeated address replaces the earlier center/label.
    pub fn insert(&mut self, address: CellAddress, label: impl Into<String>, center: Point2<f32>) -> usize {
        let cell = GridCell {
            address,
            label: label.into(),
            center,
        };
        if let Some(&i) = self.index.get(&address) {
            self.cells[i] = cell;
            return i;
        }
        let i = self.cells.len();
        self.cells.push(cell);
        self.index.insert(address, i);
        i
    }

    pub fn push_unit(&mut self, key: impl Into<String>, cells: Vec<usize>) {
        self.units.push(DecisionUnit {
            key: key.into(),
            cells,
        });
    }

    pub fn get(&self, address: &CellAddress) -> Option<&GridCell> {
        self.index.get(address).map(|&i| &self.cells[i])
    }

    pub fn center(&self, address: &CellAddress) -> Option<Point2<f32>> {
        self.get(address).map(|c| c.center)
    }

    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    pub fn units(&self) -> &[DecisionUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Axis-aligned bounds of all centers, `(min, max)`.
    pub fn bounds(&self) -> Option<(Point2<f32>, Point2<f32>)> {
        let first = self.cells.first()?.center;
        Some(self.cells.iter().fold((first, first), |(lo, hi), c| {
            (
                Point2::new(lo.x.min(c.center.x), lo.y.min(c.center.y)),
                Point2::new(hi.x.max(c.center.x), hi.y.max(c.center.y)),
            )
        }))
    }
}
