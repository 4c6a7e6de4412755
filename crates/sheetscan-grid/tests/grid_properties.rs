use approx::assert_relative_eq;
use sheetscan_grid::{build_grid, CalibrationAnchors, CellAddress, FieldShape};

fn letters(n: usize) -> Vec<String> {
    (0..n).map(|i| char::from(b'A' + i as u8).to_string()).collect()
}

#[test]
fn answer_block_rows_are_monotonic_and_evenly_spaced() {
    for rows in 2..=12u32 {
        for &(first, last) in &[(400.0f32, 730.0f32), (730.0, 400.0), (12.5, 13.75)] {
            let shape = FieldShape::AnswerBlocks {
                blocks: 2,
                rows_per_block: rows,
                choices: letters(4),
                choice_pitch: 48.0,
                first_question: 1,
            };
            let anchors =
                CalibrationAnchors::from_xy(&[(700.0, first), (702.0, last), (1050.0, first + 1.0)]);
            let grid = build_grid(&shape, &anchors).expect("grid");

            for block in 0..2 {
                let ys: Vec<f32> = (0..rows)
                    .map(|r| grid.center(&CellAddress::new(block, r, 0)).expect("cell").y)
                    .collect();
                let pitch = (last - first) / (rows - 1) as f32;
                for (i, w) in ys.windows(2).enumerate() {
                    assert!(
                        (w[1] - w[0]) * pitch.signum() > 0.0,
                        "rows={rows} block={block} i={i}"
                    );
                    assert_relative_eq!(w[1] - w[0], pitch, epsilon = 1e-3);
                }
                assert_relative_eq!(ys[0], first, epsilon = 1e-3);
            }
        }
    }
}

#[test]
fn column_grid_rows_are_monotonic_per_column() {
    let rows = letters(26);
    let shape = FieldShape::ColumnGrid { rows: rows.clone() };
    let mut pts = Vec::new();
    for col in 0..15 {
        let x = 300.0 + col as f32 * 37.3;
        pts.push((x, 1200.0 + col as f32 * 0.4));
        pts.push((x + 0.8, 2150.0 + col as f32 * 0.3));
    }
    let grid = build_grid(&shape, &CalibrationAnchors::from_xy(&pts)).expect("grid");
    assert_eq!(grid.len(), 15 * 26);
    assert_eq!(grid.units().len(), 15);

    for unit in grid.units() {
        let ys: Vec<f32> = unit.cells.iter().map(|&i| grid.cells()[i].center.y).collect();
        let labels: Vec<&str> = unit.cells.iter().map(|&i| grid.cells()[i].label.as_str()).collect();
        assert_eq!(labels.first(), Some(&"A"));
        assert_eq!(labels.last(), Some(&"Z"));
        let pitch = ys[1] - ys[0];
        assert!(pitch > 0.0);
        for w in ys.windows(2) {
            assert_relative_eq!(w[1] - w[0], pitch, epsilon = 1e-3);
        }
    }
}
