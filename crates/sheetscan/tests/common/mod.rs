#![allow(dead_code)]

use std::path::PathBuf;

use sheetscan::synth::Mark;
use sheetscan::Template;

pub fn template_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../templates/standard_v1.json")
}

pub fn standard_template() -> Template {
    Template::load_json(template_path()).expect("standard template")
}

/// Ground truth for math questions 1..=20.
pub const MATH_KEY: &str = "ABCDDCBAABCDDCBAABCD";

/// Filled cells of the reference sheet: name ADA, born on the 7th, female,
/// SSC only, region C, every math question answered, science 1..=3.
pub fn reference_marks() -> Vec<Mark> {
    let mut marks = Vec::new();
    for (col, letter) in ["A", "D", "A"].iter().enumerate() {
        marks.push(Mark::new("student", "last_name", &col.to_string(), letter));
    }
    marks.push(Mark::new("student", "birth_day", "0", "0"));
    marks.push(Mark::new("student", "birth_day", "1", "7"));
    marks.push(Mark::new("student", "gender", "", "F"));
    marks.push(Mark::new("student", "programs", "SSC", "SSC"));
    marks.push(Mark::new("current_school", "region", "", "C"));
    for (i, c) in MATH_KEY.chars().enumerate() {
        marks.push(Mark::new("answers", "math", &(i + 1).to_string(), &c.to_string()));
    }
    for (q, c) in [(1, "B"), (2, "C"), (3, "A")] {
        marks.push(Mark::new("answers", "science", &q.to_string(), c));
    }
    marks
}
