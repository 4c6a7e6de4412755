//! Measurement windows around grid cells.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::FieldConfigError;

/// Extra mask applied inside the window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoiMask {
    #[default]
    Rect,
    /// Inscribed ellipse, for round bubbles.
    Ellipse,
}

/// Window geometry around a cell center, canonical pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiParams {
    /// Full bubble footprint.
    pub width: u32,
    pub height: u32,
    /// Pixels trimmed from every side to keep the printed outline out.
    pub border_pad: u32,
    /// Fraction of the width trimmed from the left for a printed label.
    pub label_strip_frac: f32,
    pub mask: RoiMask,
}

impl Default for RoiParams {
    fn default() -> Self {
        Self {
            width: 32,
            height: 24,
            border_pad: 2,
            label_strip_frac: 0.0,
            mask: RoiMask::Rect,
        }
    }
}

/// Concrete pixel window, origin at its top-left pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoiWindow {
    pub x0: i32,
    pub y0: i32,
    pub width: u32,
    pub height: u32,
    pub mask: RoiMask,
}

impl RoiParams {
    pub fn validate(&self) -> Result<(), FieldConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(FieldConfigError::InvalidRoi("width and height must be >= 1"));
        }
        if !(0.0..1.0).contains(&self.label_strip_frac) {
            return Err(FieldConfigError::InvalidRoi("label_strip_frac must be in [0, 1)"));
        }
        let (left, pad_w, pad_h) = self
            .trims()
            .ok_or(FieldConfigError::InvalidRoi("border_pad is out of range"))?;
        if self.width <= pad_w || self.height <= pad_h || i32::try_from(left).is_err() {
            return Err(FieldConfigError::InvalidRoi("padding leaves an empty window"));
        }
        Ok(())
    }

    /// Left offset (label strip plus pad) and the total horizontal and
    /// vertical trim; `None` on overflow.
    fn trims(&self) -> Option<(u32, u32, u32)> {
        let strip = (self.width as f32 * self.label_strip_frac).floor() as u32;
        let pad2 = self.border_pad.checked_mul(2)?;
        let left = strip.checked_add(self.border_pad)?;
        let pad_w = strip.checked_add(pad2)?;
        Some((left, pad_w, pad2))
    }

    /// Unpadded rectangular bubble footprint centered at `center`.
    pub fn footprint(&self, center: Point2<f32>) -> RoiWindow {
        RoiWindow {
            x0: (center.x - self.width as f32 / 2.0).round() as i32,
            y0: (center.y - self.height as f32 / 2.0).round() as i32,
            width: self.width,
            height: self.height,
            mask: RoiMask::Rect,
        }
    }

    /// Measured window for a cell centered at `center`, or `None` if the
    /// padding consumes it entirely.
    pub fn window(&self, center: Point2<f32>) -> Option<RoiWindow> {
        let RoiWindow { x0, y0, .. } = self.footprint(center);
        let (left, pad_w, pad_h) = self.trims()?;

        let width = self.width.checked_sub(pad_w)?;
        let height = self.height.checked_sub(pad_h)?;
        if width == 0 || height == 0 {
            return None;
        }
        Some(RoiWindow {
            x0: x0.checked_add(i32::try_from(left).ok()?)?,
            y0: y0.checked_add(i32::try_from(self.border_pad).ok()?)?,
            width,
            height,
            mask: self.mask,
        })
    }
}

impl RoiWindow {
    /// Window center in pixel coordinates (pixel centers at `+0.5`).
    pub fn center(&self) -> Point2<f32> {
        Point2::new(
            self.x0 as f32 + self.width as f32 / 2.0,
            self.y0 as f32 + self.height as f32 / 2.0,
        )
    }

    /// Whether the pixel at window-local `(dx, dy)` is measured.
    #[inline]
    pub fn includes(&self, dx: u32, dy: u32) -> bool {
        if dx >= self.width || dy >= self.height {
            return false;
        }
        match self.mask {
            RoiMask::Rect => true,
            RoiMask::Ellipse => {
                let rx = self.width as f32 / 2.0;
                let ry = self.height as f32 / 2.0;
                let nx = (dx as f32 + 0.5 - rx) / rx;
                let ny = (dy as f32 + 0.5 - ry) / ry;
                nx * nx + ny * ny <= 1.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_strip_and_padding_shrink_the_window() {
        let params = RoiParams {
            width: 32,
            height: 24,
            border_pad: 3,
            label_strip_frac: 0.25,
            mask: RoiMask::Rect,
        };
        let w = params.window(Point2::new(100.0, 50.0)).expect("window");
        // full box starts at (84, 38); 8 px label strip + 3 px pad on the left
        assert_eq!((w.x0, w.y0), (95, 41));
        assert_eq!((w.width, w.height), (18, 18));
        assert!(params.validate().is_ok());
    }

    #[test]
    fn over_padded_window_is_rejected() {
        let params = RoiParams {
            width: 10,
            height: 10,
            border_pad: 5,
            ..RoiParams::default()
        };
        assert!(params.window(Point2::new(0.0, 0.0)).is_none());
        assert!(params.validate().is_err());
    }

    #[test]
    fn huge_pad_is_a_config_error() {
        let params = RoiParams {
            border_pad: 3_000_000_000,
            ..RoiParams::default()
        };
        assert_eq!(
            params.validate(),
            Err(FieldConfigError::InvalidRoi("border_pad is out of range"))
        );
        assert!(params.window(Point2::new(100.0, 100.0)).is_none());
    }

    #[test]
    fn ellipse_mask_excludes_corners() {
        let w = RoiWindow {
            x0: 0,
            y0: 0,
            width: 10,
            height: 10,
            mask: RoiMask::Ellipse,
        };
        assert!(w.includes(5, 5));
        assert!(!w.includes(0, 0));
        assert!(!w.includes(9, 9));
        assert!(!w.includes(10, 5));
    }
}
