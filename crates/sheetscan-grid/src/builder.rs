//! Anchor → grid expansion.

use nalgebra::Point2;

use crate::{CalibrationAnchors, CellAddress, FieldConfigError, FieldShape, Grid};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// `rows` evenly spaced coordinates from `first` to `last` inclusive.
///
/// A single row sits at `first`. With more than one row the endpoints must
/// differ; the sequence is then strictly monotonic in either direction.
pub fn interpolate_rows(first: f32, last: f32, rows: u32) -> Result<Vec<f32>, FieldConfigError> {
    match rows {
        0 => Err(FieldConfigError::ZeroDimension("rows")),
        1 => Ok(vec![first]),
        _ => {
            if (last - first).abs() <= f32::EPSILON {
                return Err(FieldConfigError::ZeroRowPitch { y: first });
            }
            let pitch = (last - first) / (rows - 1) as f32;
            Ok((0..rows).map(|i| first + i as f32 * pitch).collect())
        }
    }
}

fn non_empty<'a>(labels: &'a [String], what: &'static str) -> Result<&'a [String], FieldConfigError> {
    if labels.is_empty() {
        Err(FieldConfigError::EmptyLabels(what))
    } else {
        Ok(labels)
    }
}

fn build_answer_blocks(
    anchors: &CalibrationAnchors,
    blocks: u32,
    rows_per_block: u32,
    choices: &[String],
    choice_pitch: f32,
    first_question: u32,
) -> Result<Grid, FieldConfigError> {
    if blocks == 0 {
        return Err(FieldConfigError::ZeroDimension("blocks"));
    }
    if rows_per_block == 0 {
        return Err(FieldConfigError::ZeroDimension("rows_per_block"));
    }
    let choices = non_empty(choices, "choices")?;
    if !choice_pitch.is_finite() || choice_pitch <= 0.0 {
        return Err(FieldConfigError::InvalidPitch(choice_pitch));
    }
    anchors.expect_count(blocks as usize + 1)?;

    let pts = anchors.points();
    let (first, last) = (pts[0], pts[1]);
    let rows_y = interpolate_rows(first.y, last.y, rows_per_block)?;

    // block 0 origin is the first-row anchor; later blocks have their own
    let origins_x: Vec<f32> = std::iter::once(first.x)
        .chain(pts[2..].iter().map(|p| p.x))
        .collect();

    let mut grid = Grid::new();
    for (block, &origin_x) in origins_x.iter().enumerate() {
        for (row, &y) in rows_y.iter().enumerate() {
            let question = first_question + block as u32 * rows_per_block + row as u32;
            let cells = choices
                .iter()
                .enumerate()
                .map(|(col, label)| {
                    let x = origin_x + col as f32 * choice_pitch;
                    grid.insert(
                        CellAddress::new(block as u32, row as u32, col as u32),
                        label.as_str(),
                        Point2::new(x, y),
                    )
                })
                .collect();
            grid.push_unit(question.to_string(), cells);
        }
    }
    Ok(grid)
}

fn build_column_grid(anchors: &CalibrationAnchors, rows: &[String]) -> Result<Grid, FieldConfigError> {
    let rows = non_empty(rows, "rows")?;
    let n = anchors.len();
    if n < 2 || n % 2 != 0 {
        return Err(FieldConfigError::UnpairedColumnAnchors(n));
    }
    anchors.check_finite()?;

    let mut grid = Grid::new();
    for (col, pair) in anchors.points().chunks_exact(2).enumerate() {
        let (top, bottom) = (pair[0], pair[1]);
        let ys = interpolate_rows(top.y, bottom.y, rows.len() as u32)?;
        let xs = if rows.len() > 1 {
            let dx = (bottom.x - top.x) / (rows.len() - 1) as f32;
            (0..rows.len()).map(|i| top.x + i as f32 * dx).collect()
        } else {
            vec![top.x]
        };
        let cells = rows
            .iter()
            .enumerate()
            .map(|(row, label)| {
                grid.insert(
                    CellAddress::new(0, row as u32, col as u32),
                    label.as_str(),
                    Point2::new(xs[row], ys[row]),
                )
            })
            .collect();
        grid.push_unit(col.to_string(), cells);
    }
    Ok(grid)
}

fn insert_options(grid: &mut Grid, anchors: &CalibrationAnchors, options: &[String]) -> Vec<usize> {
    options
        .iter()
        .zip(anchors.points())
        .enumerate()
        .map(|(col, (label, p))| grid.insert(CellAddress::new(0, 0, col as u32), label.as_str(), *p))
        .collect()
}

/// Expand a field's anchors into its full cell grid.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip(anchors), fields(kind = shape.kind())))]
pub fn build_grid(shape: &FieldShape, anchors: &CalibrationAnchors) -> Result<Grid, FieldConfigError> {
    let grid = match shape {
        FieldShape::AnswerBlocks {
            blocks,
            rows_per_block,
            choices,
            choice_pitch,
            first_question,
        } => build_answer_blocks(
            anchors,
            *blocks,
            *rows_per_block,
            choices,
            *choice_pitch,
            *first_question,
        )?,
        FieldShape::ColumnGrid { rows } => build_column_grid(anchors, rows)?,
        FieldShape::Choice { options } => {
            let options = non_empty(options, "options")?;
            anchors.expect_count(options.len())?;
            let mut grid = Grid::new();
            let cells = insert_options(&mut grid, anchors, options);
            grid.push_unit("", cells);
            grid
        }
        FieldShape::Flags { options } => {
            let options = non_empty(options, "options")?;
            anchors.expect_count(options.len())?;
            let mut grid = Grid::new();
            let cells = insert_options(&mut grid, anchors, options);
            for (label, idx) in options.iter().zip(cells) {
                grid.push_unit(label.as_str(), vec![idx]);
            }
            grid
        }
    };

    if grid.is_empty() {
        return Err(FieldConfigError::EmptyGrid);
    }
    log::debug!(
        "built {} grid: {} cells in {} units",
        shape.kind(),
        grid.len(),
        grid.units().len()
    );
    Ok(grid)
}

/// Reject grids whose cell centers fall outside a `width × height` page.
pub fn check_within_page(grid: &Grid, width: u32, height: u32) -> Result<(), FieldConfigError> {
    for cell in grid.cells() {
        let p = cell.center;
        if p.x < 0.0 || p.y < 0.0 || p.x >= width as f32 || p.y >= height as f32 {
            return Err(FieldConfigError::CellOutsidePage {
                label: cell.label.clone(),
                x: p.x,
                y: p.y,
                width,
                height,
            });
        }
    }
    Ok(())
}
