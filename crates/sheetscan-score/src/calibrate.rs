//! Per-page, per-group ink floors.
//!
//! Pencil darkness, exposure and paper tone change from sheet to sheet, so
//! the floor below which a cell counts as unmarked is derived from the page
//! itself: a low percentile of the group's small non-zero scores, never
//! below a global minimum.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationParams {
    /// Lower clamp for every floor.
    pub global_floor: f32,
    /// Scores strictly above this are assumed to read printed content and are
    /// excluded from the sample.
    pub noise_ceiling: f32,
    /// Minimum sample size for a dynamic floor.
    pub min_samples: usize,
    /// Percentile (0..=100) of the filtered sample used as the floor.
    pub percentile: f32,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            global_floor: 0.04,
            noise_ceiling: 0.15,
            min_samples: 6,
            percentile: 20.0,
        }
    }
}

/// The floor chosen for one calibration group on one page.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupFloor {
    pub floor: f32,
    /// Scores that survived filtering.
    pub samples: usize,
    /// False when the global floor was used for lack of samples.
    pub dynamic: bool,
}

/// Linear-interpolated percentile of an ascending slice (`pct` in 0..=100).
pub fn percentile(sorted: &[f32], pct: f32) -> Option<f32> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f32;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f32;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Floor for one group from all of its cell scores on the page.
pub fn group_floor(scores: &[f32], params: &CalibrationParams) -> GroupFloor {
    let mut sample: Vec<f32> = scores
        .iter()
        .copied()
        .filter(|&s| s > 0.0 && s <= params.noise_ceiling)
        .collect();
    sample.sort_by(|a, b| a.total_cmp(b));

    if sample.len() < params.min_samples {
        return GroupFloor {
            floor: params.global_floor,
            samples: sample.len(),
            dynamic: false,
        };
    }
    let floor = percentile(&sample, params.percentile)
        .unwrap_or(params.global_floor)
        .max(params.global_floor);
    GroupFloor {
        floor,
        samples: sample.len(),
        dynamic: true,
    }
}

/// Every cell score of a page, bucketed by calibration group.
///
/// This is the collect stage: it is filled completely before any floor is
/// computed or any decision is made.
#[derive(Clone, Debug, Default)]
pub struct PageScores {
    groups: BTreeMap<String, Vec<f32>>,
}

impl PageScores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, group: &str, scores: impl IntoIterator<Item = f32>) {
        self.groups.entry(group.to_owned()).or_default().extend(scores);
    }

    pub fn group(&self, group: &str) -> Option<&[f32]> {
        self.groups.get(group).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Compute one floor per group.
    pub fn calibrate(&self, params: &CalibrationParams) -> BTreeMap<String, GroupFloor> {
        self.groups
            .iter()
            .map(|(name, scores)| {
                let floor = group_floor(scores, params);
                log::info!(
                    "calibration group {name}: floor {:.4} from {} samples{}",
                    floor.floor,
                    floor.samples,
                    if floor.dynamic { "" } else { " (global)" }
                );
                (name.clone(), floor)
            })
            .collect()
    }
}
