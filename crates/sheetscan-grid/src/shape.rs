//! Field shapes, field classes and calibration anchors.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::FieldConfigError;

fn default_first_question() -> u32 {
    1
}

/// Physical layout of one field's bubbles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldShape {
    /// Numbered questions laid out as `blocks` side-by-side columns of
    /// `rows_per_block` questions, each offering the same `choices`.
    ///
    /// Anchors: first choice of the first and last row of block 0, then
    /// the first choice of the first row of every further block.
    AnswerBlocks {
        blocks: u32,
        rows_per_block: u32,
        choices: Vec<String>,
        /// Horizontal distance between neighbouring choices, pixels.
        choice_pitch: f32,
        #[serde(default = "default_first_question")]
        first_question: u32,
    },
    /// Write-in character grid (names, ID digits): one selected row label
    /// per column. Anchors: (top row, bottom row) pair per column.
    ColumnGrid { rows: Vec<String> },
    /// Exactly one of `options`; one anchor per option.
    Choice { options: Vec<String> },
    /// Independent yes/no marks; one anchor per option.
    Flags { options: Vec<String> },
}

impl FieldShape {
    pub fn kind(&self) -> &'static str {
        match self {
            FieldShape::AnswerBlocks { .. } => "answer_blocks",
            FieldShape::ColumnGrid { .. } => "column_grid",
            FieldShape::Choice { .. } => "choice",
            FieldShape::Flags { .. } => "flags",
        }
    }

    /// Whether decision units are composed into one string value.
    pub fn is_aggregated(&self) -> bool {
        matches!(self, FieldShape::ColumnGrid { .. })
    }
}

/// Field class; selects the decision profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldClass {
    Answer,
    Letter,
    Digit,
    #[serde(rename = "option")]
    Selection,
    Flag,
}

impl FieldClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldClass::Answer => "answer",
            FieldClass::Letter => "letter",
            FieldClass::Digit => "digit",
            FieldClass::Selection => "option",
            FieldClass::Flag => "flag",
        }
    }
}

/// Ordered, manually measured reference points in canonical pixels.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationAnchors(pub Vec<Point2<f32>>);

impl CalibrationAnchors {
    pub fn new(points: Vec<Point2<f32>>) -> Self {
        Self(points)
    }

    pub fn from_xy(points: &[(f32, f32)]) -> Self {
        Self(points.iter().map(|&(x, y)| Point2::new(x, y)).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn points(&self) -> &[Point2<f32>] {
        &self.0
    }

    pub(crate) fn expect_count(&self, expected: usize) -> Result<(), FieldConfigError> {
        if self.0.len() != expected {
            return Err(FieldConfigError::AnchorCount {
                expected,
                found: self.0.len(),
            });
        }
        self.check_finite()
    }

    pub(crate) fn check_finite(&self) -> Result<(), FieldConfigError> {
        match self
            .0
            .iter()
            .position(|p| !p.x.is_finite() || !p.y.is_finite())
        {
            Some(index) => Err(FieldConfigError::NonFiniteAnchor { index }),
            None => Ok(()),
        }
    }
}
