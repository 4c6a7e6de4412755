//! Deterministic synthetic answer sheets for tests and demos.
//!
//! Sheets are rendered straight onto the canonical page of a template: every
//! cell gets a printed outline, and the requested cells get a solid pencil
//! fill at a chosen intensity. Nothing is random.

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_ellipse_mut, draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::grid::{FieldSpec, Grid, RoiMask, RoiWindow};
use crate::template::Template;

/// Which cell to fill: `unit` is the question number, column index or flag
/// label of the decision unit, `label` the cell's choice label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mark {
    pub section: String,
    pub field: String,
    pub unit: String,
    pub label: String,
}

impl Mark {
    pub fn new(section: &str, field: &str, unit: &str, label: &str) -> Self {
        Self {
            section: section.to_owned(),
            field: field.to_owned(),
            unit: unit.to_owned(),
            label: label.to_owned(),
        }
    }

    fn matches(&self, spec: &FieldSpec, unit: &str, label: &str) -> bool {
        self.section == spec.section && self.field == spec.name && self.unit == unit && self.label == label
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SynthParams {
    pub paper: u8,
    /// Printed bubble outline intensity.
    pub outline: u8,
    /// Pencil intensity of filled cells; lower is darker.
    pub ink: u8,
    /// Filled fraction of the bubble footprint, per axis.
    pub fill_frac: f32,
    /// Printed outline colour of the RGB rendering.
    pub outline_rgb: [u8; 3],
}

impl Default for SynthParams {
    fn default() -> Self {
        Self {
            paper: 245,
            outline: 170,
            ink: 40,
            fill_frac: 0.75,
            outline_rgb: [240, 140, 40],
        }
    }
}

fn cells_of<'a>(grid: &'a Grid) -> impl Iterator<Item = (&'a str, usize)> + 'a {
    grid.units()
        .iter()
        .flat_map(|u| u.cells.iter().map(move |&i| (u.key.as_str(), i)))
}

fn rect_of(w: &RoiWindow) -> Rect {
    Rect::at(w.x0, w.y0).of_size(w.width.max(1), w.height.max(1))
}

/// Draw outlines and fills through `paint`, which receives the footprint and
/// whether the cell is marked.
fn render_cells(template: &Template, marks: &[Mark], mut paint: impl FnMut(&RoiWindow, RoiMask, bool)) {
    for spec in &template.fields {
        let Ok(grid) = spec.build_grid(template.width, template.height) else {
            continue;
        };
        let roi = template.roi_for(spec);
        for (unit, idx) in cells_of(&grid) {
            let cell = &grid.cells()[idx];
            let marked = marks.iter().any(|m| m.matches(spec, unit, &cell.label));
            paint(&roi.footprint(cell.center), roi.mask, marked);
        }
    }
}

fn fill_window(footprint: &RoiWindow, frac: f32) -> RoiWindow {
    let w = ((footprint.width as f32 * frac).round() as u32).max(1);
    let h = ((footprint.height as f32 * frac).round() as u32).max(1);
    let c = footprint.center();
    RoiWindow {
        x0: (c.x - w as f32 / 2.0).round() as i32,
        y0: (c.y - h as f32 / 2.0).round() as i32,
        width: w,
        height: h,
        mask: footprint.mask,
    }
}

/// Grayscale canonical sheet.
pub fn render_sheet(template: &Template, marks: &[Mark], params: &SynthParams) -> GrayImage {
    let mut img = GrayImage::from_pixel(template.width, template.height, Luma([params.paper]));
    render_cells(template, marks, |footprint, mask, marked| {
        draw_hollow_rect_mut(&mut img, rect_of(footprint), Luma([params.outline]));
        if marked {
            paint_fill(&mut img, footprint, mask, params.fill_frac, Luma([params.ink]));
        }
    });
    img
}

/// Colour canonical sheet with outlines printed in `outline_rgb`.
pub fn render_sheet_rgb(template: &Template, marks: &[Mark], params: &SynthParams) -> RgbImage {
    let paper = Rgb([params.paper; 3]);
    let mut img = RgbImage::from_pixel(template.width, template.height, paper);
    render_cells(template, marks, |footprint, mask, marked| {
        draw_hollow_rect_mut(&mut img, rect_of(footprint), Rgb(params.outline_rgb));
        if marked {
            paint_fill(&mut img, footprint, mask, params.fill_frac, Rgb([params.ink; 3]));
        }
    });
    img
}

fn paint_fill<P>(img: &mut image::ImageBuffer<P, Vec<u8>>, footprint: &RoiWindow, mask: RoiMask, frac: f32, color: P)
where
    P: image::Pixel<Subpixel = u8>,
{
    let fill = fill_window(footprint, frac);
    match mask {
        RoiMask::Rect => draw_filled_rect_mut(img, rect_of(&fill), color),
        RoiMask::Ellipse => {
            let c = fill.center();
            draw_filled_ellipse_mut(
                img,
                (c.x as i32, c.y as i32),
                (fill.width / 2) as i32,
                (fill.height / 2) as i32,
                color,
            );
        }
    }
}

/// Place a sheet on a dark background, scaled by `scale`, as a crude
/// stand-in for a photographed page.
pub fn embed_in_photo(sheet: &GrayImage, scale: f32, margin: u32, background: u8) -> GrayImage {
    let w = ((sheet.width() as f32 * scale).round() as u32).max(1);
    let h = ((sheet.height() as f32 * scale).round() as u32).max(1);
    let page = image::imageops::resize(sheet, w, h, image::imageops::FilterType::Triangle);
    let mut photo = GrayImage::from_pixel(w + 2 * margin, h + 2 * margin, Luma([background]));
    image::imageops::replace(&mut photo, &page, margin as i64, margin as i64);
    photo
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> Template {
        Template::from_json_str(
            r#"{
            "name": "t", "width": 200, "height": 120,
            "fields": [{ "name": "q", "section": "answers", "class": "answer",
                "shape": { "kind": "choice", "options": ["A", "B"] },
                "anchors": [[50, 60], [120, 60]] }]
        }"#,
        )
        .expect("template")
    }

    #[test]
    fn marked_cell_is_filled_and_others_are_not() {
        let t = template();
        let img = render_sheet(&t, &[Mark::new("answers", "q", "", "B")], &SynthParams::default());
        assert_eq!(img.dimensions(), (200, 120));
        assert_eq!(img.get_pixel(120, 60).0[0], 40);
        assert_eq!(img.get_pixel(50, 60).0[0], 245);
        // outline of cell A: footprint 32x24 centered at (50, 60)
        assert_eq!(img.get_pixel(34, 60).0[0], 170);
    }

    #[test]
    fn rendering_is_deterministic() {
        let t = template();
        let marks = [Mark::new("answers", "q", "", "A")];
        let a = render_sheet(&t, &marks, &SynthParams::default());
        let b = render_sheet(&t, &marks, &SynthParams::default());
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn photo_embedding_adds_margin() {
        let sheet = GrayImage::from_pixel(100, 50, Luma([250]));
        let photo = embed_in_photo(&sheet, 2.0, 10, 30);
        assert_eq!(photo.dimensions(), (220, 120));
        assert_eq!(photo.get_pixel(0, 0).0[0], 30);
        assert_eq!(photo.get_pixel(110, 60).0[0], 250);
    }
}
