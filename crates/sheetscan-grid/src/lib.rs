//! Cell grids for answer-sheet fields.
//!
//! A field is described by a [`FieldShape`] and a handful of
//! [`CalibrationAnchors`] measured on the canonical page. [`build_grid`]
//! expands them into a [`Grid`]: every bubble's canonical pixel center,
//! keyed by [`CellAddress`], plus the [`DecisionUnit`]s (questions,
//! character columns, options) that are decided together.

mod address;
mod builder;
mod error;
mod field;
mod roi;
mod shape;

pub use address::{CellAddress, DecisionUnit, Grid, GridCell};
pub use builder::{build_grid, check_within_page, interpolate_rows};
pub use error::FieldConfigError;
pub use field::FieldSpec;
pub use roi::{RoiMask, RoiParams, RoiWindow};
pub use shape::{CalibrationAnchors, FieldClass, FieldShape};
