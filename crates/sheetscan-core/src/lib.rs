//! Core image plumbing for answer-sheet scanning.
//!
//! This crate knows nothing about answer sheets as such: it provides
//! grayscale views and sampling, planar homographies with perspective
//! warping, ink-mask binarization, and the page normalizer that turns a
//! raw scan into a canonical-size upright image.

mod binarize;
mod homography;
mod image;
mod logger;
mod normalize;
pub mod polygon;
mod threshold;

pub use binarize::{
    binarize, binarize_gray, rgb_to_hsv, suppress_dropout_color, to_gray, BinarizeParams,
    DropoutColor, ThresholdMethod,
};
pub use homography::{homography_from_4pt, rect_corners, warp_perspective_gray, Homography};
pub use image::{sample_bilinear, sample_bilinear_u8, GrayImageView};
pub use normalize::{
    deskew, estimate_skew, find_page_quad, normalize_page, rectify_page, DeskewParams,
    GeometryFallback, GeometryReport, NormalizeOutcome, NormalizeParams,
};
pub use threshold::{adaptive_mean_inverted, count_foreground, otsu_inverted, threshold_inverted};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, level_from_verbosity};
