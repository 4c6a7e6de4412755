//! Ink-mask binarization of canonical page images.
//!
//! Pipeline: optional dropout-colour whitening (colour input only), grayscale,
//! Gaussian blur, Otsu or adaptive-mean threshold (inverted, ink = 255), then
//! an optional morphological close that joins broken pencil strokes.

use image::{DynamicImage, GrayImage, RgbImage};
use imageproc::distance_transform::Norm;
use serde::{Deserialize, Serialize};

use crate::threshold::{adaptive_mean_inverted, otsu_inverted};

/// Thresholding strategy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThresholdMethod {
    /// Single global level from Otsu's method.
    Otsu,
    /// Local box mean; ink must be `offset` levels darker than its neighbourhood.
    AdaptiveMean { block_radius: u32, offset: i32 },
}

impl Default for ThresholdMethod {
    fn default() -> Self {
        Self::AdaptiveMean {
            block_radius: 10,
            offset: 10,
        }
    }
}

/// HSV window of a printed "dropout" ink that the scanner should ignore.
///
/// Hue is in degrees `[0, 360)`, saturation and value in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DropoutColor {
    pub hue_min: f32,
    pub hue_max: f32,
    pub min_saturation: f32,
    pub min_value: f32,
}

impl Default for DropoutColor {
    /// Orange form print.
    fn default() -> Self {
        Self {
            hue_min: 6.0,
            hue_max: 40.0,
            min_saturation: 0.31,
            min_value: 0.39,
        }
    }
}

impl DropoutColor {
    /// True when an RGB pixel falls inside the dropout window.
    pub fn matches(&self, rgb: [u8; 3]) -> bool {
        let (h, s, v) = rgb_to_hsv(rgb);
        s >= self.min_saturation && v >= self.min_value && h >= self.hue_min && h <= self.hue_max
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinarizeParams {
    /// Gaussian sigma applied before thresholding; `0` disables the blur.
    pub blur_sigma: f32,
    pub method: ThresholdMethod,
    /// Radius of the square closing kernel; `0` disables the close.
    pub close_radius: u8,
    pub dropout: Option<DropoutColor>,
}

impl Default for BinarizeParams {
    fn default() -> Self {
        Self {
            blur_sigma: 1.0,
            method: ThresholdMethod::default(),
            close_radius: 1,
            dropout: Some(DropoutColor::default()),
        }
    }
}

/// `(hue°, saturation, value)` of an sRGB triple.
pub fn rgb_to_hsv(rgb: [u8; 3]) -> (f32, f32, f32) {
    let r = rgb[0] as f32 / 255.0;
    let g = rgb[1] as f32 / 255.0;
    let b = rgb[2] as f32 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta <= f32::EPSILON {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let sat = if max <= f32::EPSILON { 0.0 } else { delta / max };
    (hue, sat, max)
}

/// Whiten every pixel that matches `dropout`, in place. Returns the count.
pub fn suppress_dropout_color(img: &mut RgbImage, dropout: &DropoutColor) -> usize {
    let mut n = 0;
    for px in img.pixels_mut() {
        if dropout.matches(px.0) {
            px.0 = [255, 255, 255];
            n += 1;
        }
    }
    n
}

/// Grayscale conversion with dropout suppression applied to colour sources.
pub fn to_gray(img: &DynamicImage, params: &BinarizeParams) -> GrayImage {
    match (img, params.dropout.as_ref()) {
        (DynamicImage::ImageLuma8(g), _) => g.clone(),
        (_, Some(dropout)) => {
            let mut rgb = img.to_rgb8();
            let n = suppress_dropout_color(&mut rgb, dropout);
            log::debug!("dropout suppression whitened {n} pixels");
            DynamicImage::ImageRgb8(rgb).to_luma8()
        }
        (_, None) => img.to_luma8(),
    }
}

/// Ink mask of a grayscale image: ink = 255, paper = 0.
pub fn binarize_gray(gray: &GrayImage, params: &BinarizeParams) -> GrayImage {
    let smoothed;
    let src = if params.blur_sigma > 0.0 {
        smoothed = imageproc::filter::gaussian_blur_f32(gray, params.blur_sigma);
        &smoothed
    } else {
        gray
    };

    let mask = match params.method {
        ThresholdMethod::Otsu => {
            let (mask, level) = otsu_inverted(src);
            log::debug!("otsu level {level}");
            mask
        }
        ThresholdMethod::AdaptiveMean {
            block_radius,
            offset,
        } => adaptive_mean_inverted(src, block_radius.max(1), offset),
    };

    if params.close_radius > 0 {
        imageproc::morphology::close(&mask, Norm::LInf, params.close_radius)
    } else {
        mask
    }
}

/// Convenience: [`to_gray`] followed by [`binarize_gray`].
pub fn binarize(img: &DynamicImage, params: &BinarizeParams) -> GrayImage {
    binarize_gray(&to_gray(img, params), params)
}
