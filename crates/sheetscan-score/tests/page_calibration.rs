use image::{GrayImage, Luma};
use sheetscan_grid::{build_grid, CalibrationAnchors, FieldShape, RoiParams};
use sheetscan_score::{
    decide, group_floor, score_grid, CalibrationParams, DecisionParams, FieldStatus, PageScores, ScoreParams,
};

#[test]
fn floor_separates_background_from_real_marks() {
    let params = CalibrationParams::default();
    let mut scores = vec![0.0f32; 120];
    // faint paper texture
    scores.extend([0.012, 0.02, 0.025, 0.03, 0.05, 0.061, 0.07, 0.08]);
    // real marks
    scores.extend((0..20).map(|i| 0.3 + i as f32 * 0.01));

    let f = group_floor(&scores, &params);
    let min_mark = 0.3;
    assert!(f.floor > 0.0 && f.floor < min_mark, "floor = {}", f.floor);
    assert!(f.floor >= params.global_floor);

    // only zeros and marks: nothing to sample, global floor
    let mut sparse = vec![0.0f32; 160];
    sparse.extend((0..40).map(|i| 0.3 + i as f32 * 0.005));
    let f = group_floor(&sparse, &params);
    assert!(!f.dynamic);
    assert!(f.floor > 0.0 && f.floor < min_mark);
}

#[test]
fn collect_then_calibrate_then_decide_on_a_rendered_block() {
    let choices: Vec<String> = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
    let shape = FieldShape::AnswerBlocks {
        blocks: 1,
        rows_per_block: 4,
        choices,
        choice_pitch: 40.0,
        first_question: 1,
    };
    let anchors = CalibrationAnchors::from_xy(&[(40.0, 40.0), (40.0, 160.0)]);
    let grid = build_grid(&shape, &anchors).expect("grid");

    // Q1 → B, Q2 → D, Q3 blank, Q4 → A and C
    let marks = [(1u32, 0u32), (3, 1), (0, 3), (2, 3)];
    let mut mask = GrayImage::new(220, 200);
    for &(choice, row) in &marks {
        let cx = 40 + choice * 40;
        let cy = 40 + row * 40;
        for y in cy - 8..cy + 8 {
            for x in cx - 12..cx + 12 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
    }

    let roi = RoiParams::default();
    let records = score_grid(&mask, &grid, &roi, &ScoreParams::default());

    let mut page = PageScores::new();
    page.extend("math", records.iter().map(|r| r.fill_ratio));
    let floors = page.calibrate(&CalibrationParams::default());
    let floor = floors["math"].floor;

    let outcomes: Vec<_> = grid
        .units()
        .iter()
        .map(|unit| {
            let candidates: Vec<(&str, f32)> = unit
                .cells
                .iter()
                .map(|&i| (grid.cells()[i].label.as_str(), records[i].fill_ratio))
                .collect();
            (unit.key.as_str(), decide(&candidates, floor, &DecisionParams::default()))
        })
        .collect();

    assert_eq!(outcomes[0].0, "1");
    assert_eq!(outcomes[0].1.answer.as_deref(), Some("B"));
    assert_eq!(outcomes[1].1.answer.as_deref(), Some("D"));
    assert_eq!(outcomes[2].1.status, FieldStatus::Blank);
    assert_eq!(outcomes[3].1.status, FieldStatus::Review);
}
