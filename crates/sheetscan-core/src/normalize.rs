//! Page normalization: raw scan → canonical-size upright grayscale page.
//!
//! Every branch ends in a canonical-size image. When the page outline cannot
//! be used, the scan is resized as-is; when there is too little ink to judge
//! skew, no rotation is applied. Each such decision is recorded as a
//! [`GeometryFallback`] in the returned [`GeometryReport`].

use image::{GrayImage, Luma};
use imageproc::contours::BorderType;
use imageproc::distance_transform::Norm;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::polygon::{
    approx_polygon_closed, arc_length, min_area_rect, order_quad_corners, polygon_area,
};
use crate::threshold::{count_foreground, threshold_inverted};
use crate::{homography_from_4pt, rect_corners, warp_perspective_gray, GrayImageView};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskewParams {
    /// Gray level at or below which a pixel counts as dark foreground.
    pub dark_level: u8,
    /// Radius of the closing kernel that merges dark strokes.
    pub close_radius: u8,
    /// Minimum dark-pixel count required to estimate skew.
    pub min_signal: usize,
    /// Estimated skew below this magnitude (degrees) is left uncorrected.
    pub min_angle_deg: f32,
}

impl Default for DeskewParams {
    fn default() -> Self {
        Self {
            dark_level: 180,
            close_radius: 2,
            min_signal: 1000,
            min_angle_deg: 0.1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeParams {
    /// Gaussian sigma before edge detection.
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Douglas-Peucker tolerance as a fraction of the contour perimeter.
    pub approx_epsilon_frac: f32,
    /// The page contour must cover at least this fraction of the scan.
    pub min_page_area_frac: f32,
    pub deskew: DeskewParams,
}

impl Default for NormalizeParams {
    fn default() -> Self {
        Self {
            blur_sigma: 1.4,
            canny_low: 50.0,
            canny_high: 150.0,
            approx_epsilon_frac: 0.02,
            min_page_area_frac: 0.2,
            deskew: DeskewParams::default(),
        }
    }
}

/// A non-fatal geometry decision taken while normalizing.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeometryFallback {
    #[error("no page-sized contour found; resized the scan directly")]
    NoPageContour,
    #[error("page contour simplified to {vertices} vertices; resized the scan directly")]
    NotQuadrilateral { vertices: usize },
    #[error("page quadrilateral is degenerate; resized the scan directly")]
    DegenerateQuad,
    #[error("only {pixels} dark pixels; skipped deskew")]
    LowInkSignal { pixels: usize },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeometryReport {
    /// Page corners in the source scan, TL/TR/BR/BL, when perspective
    /// correction was applied.
    pub page_quad: Option<[[f32; 2]; 4]>,
    /// Clockwise rotation applied by deskew, degrees.
    pub rotation_deg: f32,
    pub fallbacks: Vec<GeometryFallback>,
}

#[derive(Clone, Debug)]
pub struct NormalizeOutcome {
    pub image: GrayImage,
    pub report: GeometryReport,
}

/// Largest outer contour of the edge map, as float points, with its area.
fn largest_outer_contour(edges: &GrayImage) -> Option<(Vec<Point2<f32>>, f32)> {
    imageproc::contours::find_contours::<i32>(edges)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.points.len() >= 4)
        .map(|c| {
            let pts: Vec<Point2<f32>> = c
                .points
                .iter()
                .map(|p| Point2::new(p.x as f32, p.y as f32))
                .collect();
            let area = polygon_area(&pts);
            (pts, area)
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

/// Find the page quadrilateral in a grayscale scan, TL/TR/BR/BL.
pub fn find_page_quad(
    gray: &GrayImage,
    params: &NormalizeParams,
) -> Result<[Point2<f32>; 4], GeometryFallback> {
    let blurred = if params.blur_sigma > 0.0 {
        imageproc::filter::gaussian_blur_f32(gray, params.blur_sigma)
    } else {
        gray.clone()
    };
    let edges = imageproc::edges::canny(&blurred, params.canny_low, params.canny_high);

    let (contour, area) = largest_outer_contour(&edges).ok_or(GeometryFallback::NoPageContour)?;
    let scan_area = gray.width() as f32 * gray.height() as f32;
    if area < params.min_page_area_frac * scan_area {
        log::debug!(
            "largest contour covers {:.1}% of the scan",
            100.0 * area / scan_area.max(1.0)
        );
        return Err(GeometryFallback::NoPageContour);
    }

    let eps = params.approx_epsilon_frac * arc_length(&contour, true);
    let approx = approx_polygon_closed(&contour, eps);
    if approx.len() != 4 {
        return Err(GeometryFallback::NotQuadrilateral {
            vertices: approx.len(),
        });
    }
    Ok(order_quad_corners(&[approx[0], approx[1], approx[2], approx[3]]))
}

/// Perspective-correct (or resize) a scan to `width × height`.
pub fn rectify_page(
    gray: &GrayImage,
    width: u32,
    height: u32,
    params: &NormalizeParams,
    report: &mut GeometryReport,
) -> GrayImage {
    let fallback = match find_page_quad(gray, params) {
        Ok(quad) => match homography_from_4pt(&rect_corners(width, height), &quad) {
            Some(h_src_from_canon) => {
                report.page_quad = Some(quad.map(|p| [p.x, p.y]));
                let view = GrayImageView::from_image(gray);
                return warp_perspective_gray(&view, &h_src_from_canon, width, height);
            }
            None => GeometryFallback::DegenerateQuad,
        },
        Err(fallback) => fallback,
    };

    log::warn!("geometry fallback: {fallback}");
    report.fallbacks.push(fallback);
    image::imageops::resize(gray, width, height, image::imageops::FilterType::Triangle)
}

/// Estimated skew of the dark content, radians in `(-π/4, π/4]`.
///
/// Positive values mean the content is rotated clockwise on screen.
pub fn estimate_skew(gray: &GrayImage, params: &DeskewParams) -> Result<f32, GeometryFallback> {
    let dark = threshold_inverted(gray, params.dark_level);
    let dark = if params.close_radius > 0 {
        imageproc::morphology::close(&dark, Norm::LInf, params.close_radius)
    } else {
        dark
    };

    let pixels = count_foreground(&dark);
    if pixels < params.min_signal {
        return Err(GeometryFallback::LowInkSignal { pixels });
    }

    // row extremes are enough for the hull
    let (w, h) = dark.dimensions();
    let mut extremes = Vec::with_capacity(2 * h as usize);
    let raw = dark.as_raw();
    for y in 0..h as usize {
        let row = &raw[y * w as usize..(y + 1) * w as usize];
        let first = row.iter().position(|&v| v > 0);
        let last = row.iter().rposition(|&v| v > 0);
        if let (Some(a), Some(b)) = (first, last) {
            extremes.push(Point2::new(a as f32, y as f32));
            if b != a {
                extremes.push(Point2::new(b as f32, y as f32));
            }
        }
    }

    min_area_rect(&extremes)
        .map(|r| r.skew())
        .ok_or(GeometryFallback::LowInkSignal { pixels })
}

/// Rotate the page so its dark content is axis-aligned.
pub fn deskew(gray: &GrayImage, params: &DeskewParams, report: &mut GeometryReport) -> GrayImage {
    match estimate_skew(gray, params) {
        Ok(skew) if skew.to_degrees().abs() >= params.min_angle_deg => {
            report.rotation_deg = -skew.to_degrees();
            log::debug!("deskew by {:.2}°", report.rotation_deg);
            rotate_about_center(gray, -skew, Interpolation::Bilinear, Luma([255]))
        }
        Ok(_) => gray.clone(),
        Err(fallback) => {
            log::warn!("geometry fallback: {fallback}");
            report.fallbacks.push(fallback);
            gray.clone()
        }
    }
}

/// Full normalization: page rectification followed by deskew.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(gray, params), fields(w = gray.width(), h = gray.height()))
)]
pub fn normalize_page(
    gray: &GrayImage,
    width: u32,
    height: u32,
    params: &NormalizeParams,
) -> NormalizeOutcome {
    let mut report = GeometryReport::default();
    let rectified = rectify_page(gray, width, height, params, &mut report);
    let image = deskew(&rectified, &params.deskew, &mut report);
    NormalizeOutcome { image, report }
}
