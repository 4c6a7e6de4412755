//! Global and local thresholding of 8-bit grayscale images.
//!
//! All functions produce *inverted* masks: dark input (ink) becomes 255,
//! light paper becomes 0.

use image::GrayImage;

/// Pixels `<= level` become foreground.
pub fn threshold_inverted(gray: &GrayImage, level: u8) -> GrayImage {
    let mut out = gray.clone();
    for px in out.pixels_mut() {
        px.0[0] = if px.0[0] <= level { 255 } else { 0 };
    }
    out
}

/// Otsu's global threshold followed by [`threshold_inverted`].
///
/// Returns the mask together with the chosen level.
pub fn otsu_inverted(gray: &GrayImage) -> (GrayImage, u8) {
    let level = imageproc::contrast::otsu_level(gray);
    (threshold_inverted(gray, level), level)
}

/// Summed-area table with a zero guard row/column, `(w+1) × (h+1)`.
struct IntegralImage {
    stride: usize,
    sums: Vec<u64>,
}

impl IntegralImage {
    fn new(gray: &GrayImage) -> Self {
        let w = gray.width() as usize;
        let h = gray.height() as usize;
        let stride = w + 1;
        let mut sums = vec![0u64; stride * (h + 1)];
        let raw = gray.as_raw();
        for y in 0..h {
            let mut row_acc = 0u64;
            for x in 0..w {
                row_acc += raw[y * w + x] as u64;
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row_acc;
            }
        }
        Self { stride, sums }
    }

    /// Sum over the half-open box `[x0, x1) × [y0, y1)`.
    #[inline]
    fn box_sum(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> u64 {
        let s = self.stride;
        self.sums[y1 * s + x1] + self.sums[y0 * s + x0]
            - self.sums[y0 * s + x1]
            - self.sums[y1 * s + x0]
    }
}

/// Local mean thresholding.
///
/// A pixel is ink when it is more than `offset` darker than the mean of the
/// `(2r+1)²` box around it (clipped at the image border).
pub fn adaptive_mean_inverted(gray: &GrayImage, block_radius: u32, offset: i32) -> GrayImage {
    let (w, h) = gray.dimensions();
    let mut out = GrayImage::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }
    let integral = IntegralImage::new(gray);
    let r = block_radius as usize;
    let (wu, hu) = (w as usize, h as usize);

    for y in 0..hu {
        let y0 = y.saturating_sub(r);
        let y1 = (y + r + 1).min(hu);
        for x in 0..wu {
            let x0 = x.saturating_sub(r);
            let x1 = (x + r + 1).min(wu);
            let count = ((x1 - x0) * (y1 - y0)) as f32;
            let mean = integral.box_sum(x0, y0, x1, y1) as f32 / count;
            let v = gray.get_pixel(x as u32, y as u32).0[0] as f32;
            if v < mean - offset as f32 {
                out.put_pixel(x as u32, y as u32, image::Luma([255]));
            }
        }
    }
    out
}

/// Number of non-zero pixels in a mask.
pub fn count_foreground(mask: &GrayImage) -> usize {
    mask.as_raw().iter().filter(|&&v| v > 0).count()
}
