//! Per-cell ink measurement on a binarized canonical page.
//!
//! The mask follows the binarizer convention: ink pixels are non-zero.

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use serde::{Deserialize, Serialize};
use sheetscan_grid::{Grid, RoiParams, RoiWindow};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Which measurement feeds calibration and decisions. One metric is used for
/// a whole page so the calibrator sees a single distribution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreMetric {
    /// Ink pixels / measured pixels.
    #[default]
    FillRatio,
    /// Area of central, interior ink components weighted by distance from
    /// the window center, / measured pixels.
    CenterWeighted,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreParams {
    pub metric: ScoreMetric,
    /// Measurement window for fields without their own `roi`.
    pub default_roi: RoiParams,
    /// Components smaller than this (pixels) are specks.
    pub min_component_area: u32,
    /// Components whose bounding box spans more than this fraction of the
    /// footprint width or height are printed matter.
    pub max_component_frac: f32,
    /// Components centered farther than `center_bias × half-diagonal` from
    /// the footprint center do not count.
    pub center_bias: f32,
}

impl Default for ScoreParams {
    fn default() -> Self {
        Self {
            metric: ScoreMetric::FillRatio,
            default_roi: RoiParams::default(),
            min_component_area: 12,
            max_component_frac: 0.9,
            center_bias: 0.55,
        }
    }
}

/// Measurements of one cell, each in `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub fill_ratio: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center_weighted: Option<f32>,
}

impl ScoreRecord {
    /// The score selected by `metric`.
    pub fn value(&self, metric: ScoreMetric) -> f32 {
        match metric {
            ScoreMetric::FillRatio => self.fill_ratio,
            ScoreMetric::CenterWeighted => self.center_weighted.unwrap_or(self.fill_ratio),
        }
    }
}

#[inline]
fn ink_at(mask: &GrayImage, x: i32, y: i32) -> Option<bool> {
    if x < 0 || y < 0 || x >= mask.width() as i32 || y >= mask.height() as i32 {
        return None;
    }
    Some(mask.get_pixel(x as u32, y as u32).0[0] > 0)
}

/// Fraction of measured pixels that are ink. Pixels of the window that fall
/// outside the page are not measured.
pub fn fill_ratio(mask: &GrayImage, window: &RoiWindow) -> f32 {
    let mut measured = 0u32;
    let mut ink = 0u32;
    for dy in 0..window.height {
        for dx in 0..window.width {
            if !window.includes(dx, dy) {
                continue;
            }
            if let Some(is_ink) = ink_at(mask, window.x0 + dx as i32, window.y0 + dy as i32) {
                measured += 1;
                ink += is_ink as u32;
            }
        }
    }
    if measured == 0 {
        0.0
    } else {
        ink as f32 / measured as f32
    }
}

#[derive(Clone, Copy)]
struct ComponentStats {
    area: u32,
    min_x: u32,
    max_x: u32,
    min_y: u32,
    max_y: u32,
    sum_x: u64,
    sum_y: u64,
}

impl ComponentStats {
    fn new() -> Self {
        Self {
            area: 0,
            min_x: u32::MAX,
            max_x: 0,
            min_y: u32::MAX,
            max_y: 0,
            sum_x: 0,
            sum_y: 0,
        }
    }

    fn add(&mut self, x: u32, y: u32) {
        self.area += 1;
        self.min_x = self.min_x.min(x);
        self.max_x = self.max_x.max(x);
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
        self.sum_x += x as u64;
        self.sum_y += y as u64;
    }
}

/// Center-weighted component score.
///
/// Ink inside the measured `window` is split into 8-connected components
/// laid out in `footprint` coordinates. Components that are specks, touch
/// the footprint border, or span most of it are dropped; the rest
/// contribute `area × (1 − d / r)` where `d` is the centroid distance from
/// the footprint center and `r = center_bias × half-diagonal`.
pub fn center_weighted_score(
    mask: &GrayImage,
    footprint: &RoiWindow,
    window: &RoiWindow,
    params: &ScoreParams,
) -> f32 {
    let (fw, fh) = (footprint.width, footprint.height);
    if fw == 0 || fh == 0 {
        return 0.0;
    }
    let mut local = GrayImage::new(fw, fh);
    let mut valid = 0u32;
    for dy in 0..window.height {
        for dx in 0..window.width {
            if !window.includes(dx, dy) {
                continue;
            }
            let (x, y) = (window.x0 + dx as i32, window.y0 + dy as i32);
            let (lx, ly) = (x - footprint.x0, y - footprint.y0);
            if lx < 0 || ly < 0 || lx >= fw as i32 || ly >= fh as i32 {
                continue;
            }
            if let Some(is_ink) = ink_at(mask, x, y) {
                valid += 1;
                if is_ink {
                    local.put_pixel(lx as u32, ly as u32, Luma([255]));
                }
            }
        }
    }
    if valid == 0 {
        return 0.0;
    }

    let labels = connected_components(&local, Connectivity::Eight, Luma([0u8]));
    let mut stats: Vec<ComponentStats> = Vec::new();
    for (x, y, px) in labels.enumerate_pixels() {
        let label = px.0[0] as usize;
        if label == 0 {
            continue;
        }
        if label >= stats.len() {
            stats.resize(label + 1, ComponentStats::new());
        }
        stats[label].add(x, y);
    }

    let cx = fw as f32 / 2.0;
    let cy = fh as f32 / 2.0;
    let radius = params.center_bias * cx.hypot(cy);
    if radius <= 0.0 {
        return 0.0;
    }

    let mut weighted = 0.0f32;
    for s in stats.iter().filter(|s| s.area > 0) {
        if s.area < params.min_component_area {
            continue;
        }
        let touches_border =
            s.min_x <= 1 || s.min_y <= 1 || s.max_x + 2 >= fw || s.max_y + 2 >= fh;
        if touches_border {
            continue;
        }
        let bw = (s.max_x - s.min_x + 1) as f32;
        let bh = (s.max_y - s.min_y + 1) as f32;
        if bw > params.max_component_frac * fw as f32 || bh > params.max_component_frac * fh as f32 {
            continue;
        }
        let px = s.sum_x as f32 / s.area as f32 + 0.5;
        let py = s.sum_y as f32 / s.area as f32 + 0.5;
        let dist = (px - cx).hypot(py - cy);
        if dist > radius {
            continue;
        }
        weighted += s.area as f32 * (1.0 - dist / radius);
    }

    (weighted / valid as f32).clamp(0.0, 1.0)
}

/// Score one cell centered at `center`.
pub fn score_cell(
    mask: &GrayImage,
    center: nalgebra::Point2<f32>,
    roi: &RoiParams,
    params: &ScoreParams,
) -> ScoreRecord {
    let Some(window) = roi.window(center) else {
        return ScoreRecord::default();
    };
    let fill_ratio = fill_ratio(mask, &window);
    let center_weighted = match params.metric {
        ScoreMetric::FillRatio => None,
        ScoreMetric::CenterWeighted => Some(center_weighted_score(
            mask,
            &roi.footprint(center),
            &window,
            params,
        )),
    };
    ScoreRecord {
        fill_ratio,
        center_weighted,
    }
}

/// Score every cell of `grid`; the result is indexed like [`Grid::cells`].
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(cells = grid.len())))]
pub fn score_grid(mask: &GrayImage, grid: &Grid, roi: &RoiParams, params: &ScoreParams) -> Vec<ScoreRecord> {
    grid.cells()
        .iter()
        .map(|cell| score_cell(mask, cell.center, roi, params))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point2;
    use sheetscan_grid::RoiMask;

    fn blob(mask: &mut GrayImage, x0: u32, y0: u32, w: u32, h: u32) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
    }

    fn roi(w: u32, h: u32, pad: u32) -> RoiParams {
        RoiParams {
            width: w,
            height: h,
            border_pad: pad,
            label_strip_frac: 0.0,
            mask: RoiMask::Rect,
        }
    }

    fn cw_params() -> ScoreParams {
        ScoreParams {
            metric: ScoreMetric::CenterWeighted,
            ..ScoreParams::default()
        }
    }

    #[test]
    fn fill_ratio_counts_ink_in_the_padded_window() {
        let mut mask = GrayImage::new(100, 100);
        // footprint 20×20 at (40, 40); padded window (42..58)
        blob(&mut mask, 42, 42, 16, 8);
        let rec = score_cell(&mask, Point2::new(50.0, 50.0), &roi(20, 20, 2), &ScoreParams::default());
        assert_relative_eq!(rec.fill_ratio, 0.5);
        assert_eq!(rec.center_weighted, None);
    }

    #[test]
    fn window_hanging_off_the_page_only_measures_inside() {
        let mask = GrayImage::from_pixel(10, 10, Luma([255]));
        let window = RoiWindow {
            x0: -5,
            y0: -5,
            width: 10,
            height: 10,
            mask: RoiMask::Rect,
        };
        assert_relative_eq!(fill_ratio(&mask, &window), 1.0);

        let outside = RoiWindow { x0: 50, ..window };
        assert_eq!(fill_ratio(&mask, &outside), 0.0);
    }

    #[test]
    fn solid_central_fill_scores_near_one() {
        let mut mask = GrayImage::new(100, 100);
        blob(&mut mask, 36, 40, 28, 20);
        let rec = score_cell(&mask, Point2::new(50.0, 50.0), &roi(32, 24, 2), &cw_params());
        let cw = rec.center_weighted.expect("center weighted");
        assert!(cw > 0.9, "cw = {cw}");
        assert_relative_eq!(rec.value(ScoreMetric::CenterWeighted), cw);
    }

    #[test]
    fn off_center_mark_weighs_less() {
        let r = roi(40, 40, 2);
        let mut centered = GrayImage::new(100, 100);
        blob(&mut centered, 46, 46, 8, 8);
        let mut shifted = GrayImage::new(100, 100);
        blob(&mut shifted, 54, 46, 8, 8);

        let a = score_cell(&centered, Point2::new(50.0, 50.0), &r, &cw_params());
        let b = score_cell(&shifted, Point2::new(50.0, 50.0), &r, &cw_params());
        assert_relative_eq!(a.fill_ratio, b.fill_ratio);
        assert!(a.center_weighted > b.center_weighted);
        assert!(b.center_weighted.unwrap_or(0.0) > 0.0);
    }

    #[test]
    fn border_touching_and_oversized_components_are_ignored() {
        let r = roi(40, 40, 0);
        // outline bleed along the left edge of the footprint (30..70)
        let mut bleed = GrayImage::new(100, 100);
        blob(&mut bleed, 30, 40, 4, 20);
        let rec = score_cell(&bleed, Point2::new(50.0, 50.0), &r, &cw_params());
        assert!(rec.fill_ratio > 0.0);
        assert_eq!(rec.center_weighted, Some(0.0));

        let mut wide = GrayImage::new(100, 100);
        blob(&mut wide, 38, 48, 24, 4);
        let params = ScoreParams {
            max_component_frac: 0.5,
            ..cw_params()
        };
        let rec = score_cell(&wide, Point2::new(50.0, 50.0), &r, &params);
        assert!(rec.fill_ratio > 0.0);
        assert_eq!(rec.center_weighted, Some(0.0));
    }

    #[test]
    fn specks_are_ignored() {
        let mut mask = GrayImage::new(60, 60);
        blob(&mut mask, 29, 29, 3, 3);
        let rec = score_cell(&mask, Point2::new(30.0, 30.0), &roi(20, 20, 2), &cw_params());
        assert_eq!(rec.center_weighted, Some(0.0));
    }
}
