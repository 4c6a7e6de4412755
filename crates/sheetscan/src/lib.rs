//! High-level facade crate for the `sheetscan-*` workspace.
//!
//! This crate provides:
//! - re-exports of the pipeline crates (`core`, `grid`, `score`)
//! - [`Template`]: the immutable per-form configuration, loaded from JSON
//! - [`SheetScanner`]: normalize → grid → score → calibrate → decide over one
//!   page, producing a [`ScanResult`] tree
//! - persistence ([`ScanStore`], [`MemoryStore`], [`JsonDirStore`]) and the
//!   bucket trigger layer ([`BucketRunner`])
//! - debug overlays and deterministic synthetic sheets
//!
//! ## Quickstart
//!
//! ```no_run
//! use sheetscan::{InputGeometry, SheetScanner, Template};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let template = Template::load_json("templates/standard_v1.json")?;
//! let scanner = SheetScanner::new(template)?;
//! let result = scanner.scan_path("sheet.jpg", InputGeometry::Raw)?;
//! println!("review required: {}", result.review_required);
//! println!("{}", result.to_json_pretty()?);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `sheetscan::core`: gray views, homographies, binarization, page normalization.
//! - `sheetscan::grid`: anchors, field shapes, `Grid` building, ROI windows.
//! - `sheetscan::score`: fill scoring, auto-calibration, decisions, aggregation.

pub use sheetscan_core as core;
pub use sheetscan_grid as grid;
pub use sheetscan_score as score;

mod overlay;
mod result;
mod scan;
mod store;
pub mod synth;
mod template;
mod trigger;

pub use overlay::{render_overlay, status_color};
pub use result::{FieldNode, FieldResult, ScanResult, ScanSummary};
pub use scan::{InputGeometry, ScanError, SheetScanner};
pub use store::{
    AnswerRow, JsonDirStore, MemoryStore, NewScan, ScanId, ScanRecord, ScanStatus, ScanStore, SectionRow,
    StoreError,
};
pub use template::{Template, TemplateError, TemplateIoError};
pub use trigger::{wait_until_stable, BucketRunner, ProcessedFile, StabilityParams, TriggerError, IMAGE_EXTENSIONS};

pub use sheetscan_score::FieldStatus;

/// Install a `tracing` subscriber and route `log` records into it.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    sheetscan_core::init_tracing(json);
    let _ = tracing_log::LogTracer::init();
}
