//! Bubble scoring for answer sheets.
//!
//! The stages run in a fixed order over one page:
//!
//! 1. [`score_grid`] measures every cell of every field ([`ScoreRecord`]);
//! 2. [`PageScores`] collects all scores by calibration group and
//!    [`PageScores::calibrate`] derives each group's ink floor;
//! 3. [`decide`] / [`decide_flag`] classify each decision unit against its
//!    group floor;
//! 4. [`aggregate_columns`] folds character-grid columns into one value.

mod aggregate;
mod calibrate;
mod decision;
mod fill;

pub use aggregate::aggregate_columns;
pub use calibrate::{group_floor, percentile, CalibrationParams, GroupFloor, PageScores};
pub use decision::{decide, decide_flag, Decision, DecisionParams, DecisionProfiles, FieldStatus};
pub use fill::{
    center_weighted_score, fill_ratio, score_cell, score_grid, ScoreMetric, ScoreParams, ScoreRecord,
};
