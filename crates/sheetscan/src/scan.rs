//! Scan orchestration: one canonical page in, one [`ScanResult`] out.
//!
//! The pipeline runs in explicit stages so that calibration always sees the
//! complete page before any cell is judged:
//!
//! 1. build every field's grid (config errors are kept per field);
//! 2. score every cell of every buildable field;
//! 3. collect all scores into [`PageScores`] and calibrate each group;
//! 4. decide, aggregate and apply value rules per field;
//! 5. assemble the result tree and summary.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use image::{imageops::FilterType, DynamicImage, GrayImage};
use log::{debug, info, warn};

use crate::core::{binarize_gray, normalize_page, to_gray, GeometryReport};
use crate::grid::{FieldConfigError, FieldShape, FieldSpec, Grid};
use crate::result::{FieldNode, FieldResult, ScanResult, ScanSummary};
use crate::score::{
    aggregate_columns, decide, decide_flag, score_grid, Decision, DecisionParams, FieldStatus, PageScores,
};
use crate::template::{Template, TemplateError};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Failures that prevent producing any result for a scan.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    #[error("failed to load image {}: {source}", path.display())]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Geometry of the input handed to [`SheetScanner::scan_path`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InputGeometry {
    /// Raw photo or scan; normalize first.
    #[default]
    Raw,
    /// Already canonical and upright.
    Canonical,
}

/// Scanner bound to one validated template.
///
/// Holds no per-scan state; one instance may serve any number of scans.
#[derive(Clone, Debug)]
pub struct SheetScanner {
    template: Template,
}

enum FieldGrid {
    Ready { grid: Grid, scores: Vec<f32> },
    Failed(FieldConfigError),
}

impl SheetScanner {
    pub fn new(template: Template) -> Result<Self, TemplateError> {
        template.validate()?;
        Ok(Self { template })
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Load an image from disk and scan it.
    pub fn scan_path(&self, path: impl AsRef<Path>, input: InputGeometry) -> Result<ScanResult, ScanError> {
        let path = path.as_ref();
        let img = image::open(path).map_err(|source| ScanError::ImageLoad {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("loaded {} ({}x{})", path.display(), img.width(), img.height());
        Ok(self.scan_image(&img, input))
    }

    /// Canonical grayscale page of `img`, plus the normalizer report when
    /// `img` is a raw scan.
    pub fn canonicalize(&self, img: &DynamicImage, input: InputGeometry) -> (GrayImage, Option<GeometryReport>) {
        let t = &self.template;
        let gray = to_gray(img, &t.binarize);
        match input {
            InputGeometry::Canonical => (self.fit_canonical(&gray).into_owned(), None),
            InputGeometry::Raw => {
                let outcome = normalize_page(&gray, t.width, t.height, &t.normalize);
                (outcome.image, Some(outcome.report))
            }
        }
    }

    /// Bring `img` to the canonical page and scan it.
    pub fn scan_image(&self, img: &DynamicImage, input: InputGeometry) -> ScanResult {
        let (page, geometry) = self.canonicalize(img, input);
        let mut result = self.scan_canonical(&page);
        result.geometry = geometry;
        result
    }

    fn fit_canonical<'a>(&self, gray: &'a GrayImage) -> Cow<'a, GrayImage> {
        let t = &self.template;
        if gray.dimensions() == (t.width, t.height) {
            return Cow::Borrowed(gray);
        }
        warn!(
            "page is {}x{}, expected {}x{}; resizing",
            gray.width(),
            gray.height(),
            t.width,
            t.height
        );
        Cow::Owned(image::imageops::resize(gray, t.width, t.height, FilterType::Triangle))
    }

    /// Scan a grayscale page that is already canonical. A page of the wrong
    /// size is resized to the canonical size first.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(template = %self.template.name))
    )]
    pub fn scan_canonical(&self, gray: &GrayImage) -> ScanResult {
        let page = self.fit_canonical(gray);
        let mask = binarize_gray(&page, &self.template.binarize);
        self.scan_mask(&mask)
    }

    /// Run grid → score → calibrate → decide on a canonical ink mask.
    pub fn scan_mask(&self, mask: &GrayImage) -> ScanResult {
        let t = &self.template;

        let fields: Vec<FieldGrid> = t
            .fields
            .iter()
            .map(|spec| self.score_field(mask, spec))
            .collect();

        let mut page = PageScores::new();
        for (spec, field) in t.fields.iter().zip(&fields) {
            if let FieldGrid::Ready { scores, .. } = field {
                page.extend(spec.group(), scores.iter().copied());
            }
        }
        let floors = page.calibrate(&t.calibration);

        let mut sections: BTreeMap<String, BTreeMap<String, FieldNode>> = BTreeMap::new();
        for (spec, field) in t.fields.iter().zip(&fields) {
            let node = match field {
                FieldGrid::Ready { grid, scores } => {
                    let floor = floors
                        .get(spec.group())
                        .map_or(t.calibration.global_floor, |f| f.floor);
                    decide_field(spec, grid, scores, floor, t.decision_for(spec.class))
                }
                FieldGrid::Failed(err) => FieldNode::Leaf(FieldResult::error(err.to_string())),
            };
            sections
                .entry(spec.section.clone())
                .or_default()
                .insert(spec.name.clone(), node);
        }

        let mut result = ScanResult {
            template: t.id(),
            review_required: false,
            sections,
            floors: floors.iter().map(|(g, f)| (g.clone(), f.floor)).collect(),
            geometry: None,
            summary: ScanSummary::default(),
        };
        let mut summary = ScanSummary::default();
        let mut review_required = false;
        for (_, leaf) in result.leaves() {
            summary.count(leaf.status);
            review_required |= leaf.review_required;
        }
        result.summary = summary;
        result.review_required = review_required;
        let s = &result.summary;
        info!(
            "scanned {}: {} ok, {} blank, {} review, {} noise, {} error{}",
            result.template,
            s.ok,
            s.blank,
            s.review,
            s.noise,
            s.error,
            if result.review_required { " (review required)" } else { "" }
        );
        result
    }

    fn score_field(&self, mask: &GrayImage, spec: &FieldSpec) -> FieldGrid {
        let t = &self.template;
        let roi = t.roi_for(spec);
        let built = roi
            .validate()
            .and_then(|_| spec.build_grid(t.width, t.height));
        match built {
            Ok(grid) => {
                let scores = score_grid(mask, &grid, roi, &t.score)
                    .iter()
                    .map(|r| r.value(t.score.metric))
                    .collect();
                FieldGrid::Ready { grid, scores }
            }
            Err(err) => {
                warn!("field {}.{} not evaluated: {err}", spec.section, spec.name);
                FieldGrid::Failed(err)
            }
        }
    }
}

fn unit_scores(grid: &Grid, cells: &[usize], scores: &[f32]) -> Vec<(String, f32)> {
    cells
        .iter()
        .map(|&i| (grid.cells()[i].label.clone(), scores[i]))
        .collect()
}

fn leaf(decision: Decision, candidates: &[(String, f32)]) -> FieldResult {
    FieldResult::from_decision(decision, candidates.iter().cloned().collect())
}

fn decide_field(spec: &FieldSpec, grid: &Grid, scores: &[f32], floor: f32, params: &DecisionParams) -> FieldNode {
    let node = match &spec.shape {
        FieldShape::AnswerBlocks { .. } => FieldNode::Group(
            grid.units()
                .iter()
                .map(|unit| {
                    let candidates = unit_scores(grid, &unit.cells, scores);
                    let d = decide(&candidates, floor, params);
                    (unit.key.clone(), FieldNode::Leaf(leaf(d, &candidates)))
                })
                .collect(),
        ),
        FieldShape::ColumnGrid { .. } => {
            let mut decisions = Vec::with_capacity(grid.units().len());
            let mut columns = Vec::with_capacity(grid.units().len());
            for unit in grid.units() {
                let candidates = unit_scores(grid, &unit.cells, scores);
                let d = decide(&candidates, floor, params);
                columns.push(leaf(d.clone(), &candidates));
                decisions.push(d);
            }
            let mut field = FieldResult::from_decision(aggregate_columns(&decisions), BTreeMap::new());
            field.columns = Some(columns);
            FieldNode::Leaf(field)
        }
        FieldShape::Choice { .. } => {
            let candidates: Vec<(String, f32)> = grid
                .units()
                .iter()
                .flat_map(|unit| unit_scores(grid, &unit.cells, scores))
                .collect();
            FieldNode::Leaf(leaf(decide(&candidates, floor, params), &candidates))
        }
        FieldShape::Flags { .. } => FieldNode::Group(
            grid.units()
                .iter()
                .filter_map(|unit| {
                    let &idx = unit.cells.first()?;
                    let candidates = unit_scores(grid, &unit.cells, scores);
                    let d = decide_flag(&unit.key, scores[idx], floor, params);
                    Some((unit.key.clone(), FieldNode::Leaf(leaf(d, &candidates))))
                })
                .collect(),
        ),
    };
    apply_value_rules(spec, node)
}

/// Range-check numeric answers, then map raw values to display values.
fn apply_value_rules(spec: &FieldSpec, node: FieldNode) -> FieldNode {
    if spec.valid_range.is_none() && spec.value_map.is_empty() {
        return node;
    }
    match node {
        FieldNode::Leaf(mut field) => {
            check_range(spec, &mut field);
            if let Some(mapped) = field.answer.as_ref().and_then(|a| spec.value_map.get(a)) {
                field.answer = Some(mapped.clone());
            }
            FieldNode::Leaf(field)
        }
        FieldNode::Group(children) => FieldNode::Group(
            children
                .into_iter()
                .map(|(k, child)| (k, apply_value_rules(spec, child)))
                .collect(),
        ),
    }
}

fn check_range(spec: &FieldSpec, field: &mut FieldResult) {
    let (Some([lo, hi]), Some(answer)) = (spec.valid_range, field.answer.as_deref()) else {
        return;
    };
    let in_range = answer
        .parse::<i64>()
        .map_or(false, |v| (lo..=hi).contains(&v));
    if !in_range {
        debug!(
            "field {}.{}: value {answer:?} outside {lo}..={hi}",
            spec.section, spec.name
        );
        field.status = FieldStatus::Review;
        field.review_required = true;
    }
}
