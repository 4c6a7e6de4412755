//! Debug overlay: every measured window drawn on the canonical page.

use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::grid::{FieldShape, FieldSpec, Grid};
use crate::result::{FieldNode, FieldResult, ScanResult};
use crate::score::FieldStatus;
use crate::template::Template;

const UNSCORED: Rgb<u8> = Rgb([40, 90, 230]);

pub fn status_color(status: FieldStatus) -> Rgb<u8> {
    match status {
        FieldStatus::Ok => Rgb([30, 170, 60]),
        FieldStatus::Blank => Rgb([150, 150, 150]),
        FieldStatus::Review => Rgb([240, 150, 0]),
        FieldStatus::Noise => Rgb([200, 0, 200]),
        FieldStatus::Error => Rgb([220, 20, 20]),
    }
}

/// Leaf deciding unit `unit_index` (key `unit_key`) of a field.
fn unit_leaf<'a>(
    spec: &FieldSpec,
    node: &'a FieldNode,
    unit_index: usize,
    unit_key: &str,
) -> Option<&'a FieldResult> {
    match &spec.shape {
        FieldShape::AnswerBlocks { .. } | FieldShape::Flags { .. } => node.child(unit_key)?.as_leaf(),
        FieldShape::ColumnGrid { .. } => node.as_leaf()?.columns.as_ref()?.get(unit_index),
        FieldShape::Choice { .. } => node.as_leaf(),
    }
}

fn draw_field(canvas: &mut RgbImage, template: &Template, spec: &FieldSpec, grid: &Grid, node: Option<&FieldNode>) {
    let roi = template.roi_for(spec);
    for (u, unit) in grid.units().iter().enumerate() {
        let leaf = node.and_then(|n| unit_leaf(spec, n, u, &unit.key));
        let color = leaf.map_or(UNSCORED, |l| status_color(l.status));
        for &idx in &unit.cells {
            let cell = &grid.cells()[idx];
            let Some(w) = roi.window(cell.center) else {
                continue;
            };
            draw_hollow_rect_mut(canvas, Rect::at(w.x0, w.y0).of_size(w.width, w.height), color);
            let chosen = leaf
                .and_then(|l| l.answer.as_deref())
                .map_or(false, |a| a == cell.label || is_flag_answer(spec, a, &unit.key));
            if chosen && leaf.map_or(false, |l| l.status == FieldStatus::Ok) {
                let (cx, cy) = (cell.center.x.round() as i32, cell.center.y.round() as i32);
                draw_filled_circle_mut(canvas, (cx, cy), 3, color);
            }
        }
    }
}

fn is_flag_answer(spec: &FieldSpec, answer: &str, unit_key: &str) -> bool {
    matches!(spec.shape, FieldShape::Flags { .. }) && answer == unit_key
}

/// Draw the template's windows on `canonical`, coloured by the status of
/// the matching leaf in `result` (blue when no result is given).
pub fn render_overlay(canonical: &GrayImage, template: &Template, result: Option<&ScanResult>) -> RgbImage {
    let mut canvas = image::DynamicImage::ImageLuma8(canonical.clone()).to_rgb8();
    for spec in &template.fields {
        let grid = match spec.build_grid(template.width, template.height) {
            Ok(grid) => grid,
            Err(err) => {
                log::warn!("overlay: skipping {}.{}: {err}", spec.section, spec.name);
                continue;
            }
        };
        let node = result.and_then(|r| r.field(&spec.section, &spec.name));
        draw_field(&mut canvas, template, spec, &grid, node);
    }
    canvas
}
