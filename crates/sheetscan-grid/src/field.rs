use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{build_grid, check_within_page, CalibrationAnchors, FieldClass, FieldConfigError, FieldShape, Grid, RoiParams};

/// One configured field of a template.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Key of the field inside its section.
    pub name: String,
    /// Top-level key of the result tree (`answers`, `student`, ...).
    pub section: String,
    /// Calibration group; defaults to the field name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub class: FieldClass,
    pub shape: FieldShape,
    pub anchors: CalibrationAnchors,
    /// Overrides the template's default measurement window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roi: Option<RoiParams>,
    /// Raw value → display value (e.g. region letter → region name).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub value_map: BTreeMap<String, String>,
    /// Inclusive integer bounds for numeric values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_range: Option<[i64; 2]>,
}

impl FieldSpec {
    pub fn group(&self) -> &str {
        self.group.as_deref().unwrap_or(&self.name)
    }

    /// Build and bounds-check this field's grid on a `width × height` page.
    pub fn build_grid(&self, width: u32, height: u32) -> Result<Grid, FieldConfigError> {
        if let Some(roi) = &self.roi {
            roi.validate()?;
        }
        let grid = build_grid(&self.shape, &self.anchors)?;
        check_within_page(&grid, width, height)?;
        Ok(grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAME_FIELD: &str = r#"{
        "name": "last_name",
        "section": "student",
        "class": "letter",
        "shape": { "kind": "column_grid", "rows": ["A", "B", "C"] },
        "anchors": [[40.0, 100.0], [40.0, 140.0], [60.0, 100.0], [60.0, 140.0]],
        "roi": { "width": 14, "height": 14, "border_pad": 1, "mask": "ellipse" }
    }"#;

    #[test]
    fn field_spec_parses_from_json() {
        let spec: FieldSpec = serde_json::from_str(NAME_FIELD).expect("parse");
        assert_eq!(spec.group(), "last_name");
        assert_eq!(spec.class, FieldClass::Letter);
        assert_eq!(spec.anchors.len(), 4);
        let roi = spec.roi.expect("roi");
        assert_eq!(roi.mask, crate::RoiMask::Ellipse);
        assert_eq!(roi.label_strip_frac, 0.0);

        let grid = spec.build_grid(200, 200).expect("grid");
        assert_eq!(grid.len(), 6);
    }

    #[test]
    fn option_class_uses_short_name() {
        let class: FieldClass = serde_json::from_str("\"option\"").expect("parse");
        assert_eq!(class, FieldClass::Selection);
        assert_eq!(class.as_str(), "option");
    }

    #[test]
    fn invalid_roi_override_fails_the_field() {
        let mut spec: FieldSpec = serde_json::from_str(NAME_FIELD).expect("parse");
        spec.roi = Some(RoiParams {
            width: 4,
            height: 4,
            border_pad: 2,
            ..RoiParams::default()
        });
        assert!(matches!(spec.build_grid(200, 200), Err(FieldConfigError::InvalidRoi(_))));
    }
}
