//! Mark decisions: candidate scores + group floor → outcome.

use serde::{Deserialize, Serialize};
use sheetscan_grid::FieldClass;

/// Outcome tag of a field or decision unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldStatus {
    /// One clear mark.
    Ok,
    /// No mark above the floor.
    Blank,
    /// Ambiguous top two (several marks or an erasure).
    Review,
    /// Every candidate is uniformly high: the window reads printed content.
    Noise,
    /// The field could not be evaluated (configuration error).
    Error,
}

impl FieldStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldStatus::Ok => "OK",
            FieldStatus::Blank => "BLANK",
            FieldStatus::Review => "REVIEW",
            FieldStatus::Noise => "NOISE",
            FieldStatus::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for FieldStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds for one field class.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionParams {
    /// The winner must score at least `dominance_ratio ×` the runner-up.
    pub dominance_ratio: f32,
    /// ... and beat it by at least this much.
    pub min_gap: f32,
    /// NOISE when even the lowest candidate exceeds `floor × uniform_factor`.
    pub uniform_factor: f32,
    /// OK decisions below this confidence still ask for review.
    pub review_confidence: f32,
    /// Flags: a mark needs `score >= floor × flag_mark_factor`.
    pub flag_mark_factor: f32,
    /// Flags: marks within this band above the mark threshold ask for review.
    pub flag_review_band: f32,
}

impl Default for DecisionParams {
    fn default() -> Self {
        Self {
            dominance_ratio: 1.5,
            min_gap: 0.04,
            uniform_factor: 3.0,
            review_confidence: 0.15,
            flag_mark_factor: 1.0,
            flag_review_band: 0.05,
        }
    }
}

/// Decision thresholds for every field class.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionProfiles {
    pub answer: DecisionParams,
    pub letter: DecisionParams,
    pub digit: DecisionParams,
    pub option: DecisionParams,
    pub flag: DecisionParams,
}

impl Default for DecisionProfiles {
    fn default() -> Self {
        let grid_char = DecisionParams {
            min_gap: 0.07,
            ..DecisionParams::default()
        };
        Self {
            answer: DecisionParams::default(),
            letter: grid_char,
            digit: grid_char,
            option: grid_char,
            flag: DecisionParams::default(),
        }
    }
}

impl DecisionProfiles {
    pub fn for_class(&self, class: FieldClass) -> &DecisionParams {
        match class {
            FieldClass::Answer => &self.answer,
            FieldClass::Letter => &self.letter,
            FieldClass::Digit => &self.digit,
            FieldClass::Selection => &self.option,
            FieldClass::Flag => &self.flag,
        }
    }
}

/// Result of deciding one unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub status: FieldStatus,
    pub answer: Option<String>,
    /// `top − second` for single-select units, in `[0, 1]`.
    pub confidence: f32,
    pub review_required: bool,
}

impl Decision {
    pub fn blank() -> Self {
        Self {
            status: FieldStatus::Blank,
            answer: None,
            confidence: 0.0,
            review_required: true,
        }
    }
}

/// Classify one single-select unit.
///
/// Precedence: NOISE, BLANK, OK, REVIEW. Ties keep candidate order.
pub fn decide<S: AsRef<str>>(candidates: &[(S, f32)], floor: f32, params: &DecisionParams) -> Decision {
    if candidates.is_empty() {
        return Decision::blank();
    }
    let mut ranked: Vec<(&str, f32)> = candidates.iter().map(|(l, s)| (l.as_ref(), *s)).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let (top_label, top) = ranked[0];
    let second = ranked.get(1).map_or(0.0, |c| c.1);
    let lowest = ranked[ranked.len() - 1].1;
    let gap = (top - second).clamp(0.0, 1.0);

    if ranked.len() >= 2 && lowest > floor * params.uniform_factor {
        return Decision {
            status: FieldStatus::Noise,
            answer: None,
            confidence: 0.0,
            review_required: true,
        };
    }
    if top < floor {
        return Decision::blank();
    }
    if top >= second * params.dominance_ratio && top - second >= params.min_gap {
        return Decision {
            status: FieldStatus::Ok,
            answer: Some(top_label.to_owned()),
            confidence: gap,
            review_required: gap < params.review_confidence,
        };
    }
    Decision {
        status: FieldStatus::Review,
        answer: None,
        confidence: gap,
        review_required: true,
    }
}

/// Classify one independent yes/no mark.
///
/// A clear blank is a definite "no" (status BLANK, no review). A mark sets
/// the answer to `label`; marks barely above the threshold ask for review.
pub fn decide_flag(label: &str, score: f32, floor: f32, params: &DecisionParams) -> Decision {
    let threshold = floor * params.flag_mark_factor;
    let confidence = (score - threshold).abs().clamp(0.0, 1.0);
    if score >= threshold {
        Decision {
            status: FieldStatus::Ok,
            answer: Some(label.to_owned()),
            confidence,
            review_required: score < threshold + params.flag_review_band,
        }
    } else {
        Decision {
            status: FieldStatus::Blank,
            answer: None,
            confidence,
            review_required: false,
        }
    }
}
