//! Versioned form templates: canonical page size, tunables and field layout.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{BinarizeParams, NormalizeParams};
use crate::grid::{FieldClass, FieldSpec, RoiParams};
use crate::score::{CalibrationParams, DecisionParams, DecisionProfiles, ScoreParams};

fn default_version() -> String {
    "1".to_owned()
}

/// Immutable configuration for one physical form layout.
///
/// Loaded once, validated, then shared read-only by every scan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// Canonical page width in pixels; all anchors refer to this frame.
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub normalize: NormalizeParams,
    #[serde(default)]
    pub binarize: BinarizeParams,
    #[serde(default)]
    pub score: ScoreParams,
    #[serde(default)]
    pub calibration: CalibrationParams,
    #[serde(default)]
    pub decision: DecisionProfiles,
    pub fields: Vec<FieldSpec>,
}

/// Template-wide configuration problems. Per-field problems are not
/// reported here; they surface on the field's own result.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("canonical page size must be non-zero, got {width}x{height}")]
    ZeroCanvas { width: u32, height: u32 },
    #[error("duplicate field `{section}.{name}`")]
    DuplicateField { section: String, name: String },
    #[error("calibration percentile must be within 0..=100, got {0}")]
    InvalidPercentile(f32),
    #[error("calibration floors must be finite and non-negative")]
    InvalidFloor,
    #[error("template has no fields")]
    NoFields,
}

#[derive(thiserror::Error, Debug)]
pub enum TemplateIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("invalid template: {0}")]
    Invalid(#[from] TemplateError),
}

impl Template {
    /// Load and validate a JSON template.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, TemplateIoError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, TemplateIoError> {
        let template: Self = serde_json::from_str(raw)?;
        template.validate()?;
        Ok(template)
    }

    /// Write this template as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), TemplateIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.width == 0 || self.height == 0 {
            return Err(TemplateError::ZeroCanvas {
                width: self.width,
                height: self.height,
            });
        }
        if self.fields.is_empty() {
            return Err(TemplateError::NoFields);
        }
        let pct = self.calibration.percentile;
        if !(0.0..=100.0).contains(&pct) {
            return Err(TemplateError::InvalidPercentile(pct));
        }
        let floors = [self.calibration.global_floor, self.calibration.noise_ceiling];
        if floors.iter().any(|f| !f.is_finite() || *f < 0.0) {
            return Err(TemplateError::InvalidFloor);
        }

        let mut seen = BTreeSet::new();
        for f in &self.fields {
            if !seen.insert((f.section.as_str(), f.name.as_str())) {
                return Err(TemplateError::DuplicateField {
                    section: f.section.clone(),
                    name: f.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// `name@version`, as recorded on results.
    pub fn id(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    pub fn roi_for<'a>(&'a self, field: &'a FieldSpec) -> &'a RoiParams {
        field.roi.as_ref().unwrap_or(&self.score.default_roi)
    }

    pub fn decision_for(&self, class: FieldClass) -> &DecisionParams {
        self.decision.for_class(class)
    }

    pub fn field(&self, section: &str, name: &str) -> Option<&FieldSpec> {
        self.fields
            .iter()
            .find(|f| f.section == section && f.name == name)
    }
}
