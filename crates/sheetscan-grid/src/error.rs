/// A field's anchors or shape cannot produce a usable grid.
///
/// Always scoped to one field: the scan orchestrator records it on that
/// field's result and keeps going.
#[derive(thiserror::Error, Clone, Debug, PartialEq)]
pub enum FieldConfigError {
    #[error("expected {expected} calibration anchors, found {found}")]
    AnchorCount { expected: usize, found: usize },
    #[error("anchor {index} is not a finite coordinate")]
    NonFiniteAnchor { index: usize },
    #[error("`{0}` must not be empty")]
    EmptyLabels(&'static str),
    #[error("`{0}` must be >= 1")]
    ZeroDimension(&'static str),
    #[error("choice pitch must be finite and > 0, got {0}")]
    InvalidPitch(f32),
    #[error("first and last row anchors share y = {y}; rows cannot be interpolated")]
    ZeroRowPitch { y: f32 },
    #[error("column grid anchors must come in (top, bottom) pairs, found {0} anchors")]
    UnpairedColumnAnchors(usize),
    #[error("invalid ROI: {0}")]
    InvalidRoi(&'static str),
    #[error("cell `{label}` at ({x:.1}, {y:.1}) lies outside the {width}x{height} page")]
    CellOutsidePage {
        label: String,
        x: f32,
        y: f32,
        width: u32,
        height: u32,
    },
    #[error("field produced an empty grid")]
    EmptyGrid,
}
