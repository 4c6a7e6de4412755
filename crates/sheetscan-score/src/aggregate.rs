//! Compose per-column decisions of a character grid into one value.

use crate::{Decision, FieldStatus};

/// Aggregate the column decisions of a write-in field, left to right.
///
/// Columns after the last non-blank column are trailing space and dropped.
/// Inside the kept range every column must be a clean OK: a blank gap or an
/// ambiguous/noisy column makes the field REVIEW and is rendered as a space
/// in the value. Confidence is the mean over OK columns. A field with no
/// marks at all is BLANK with confidence 0 and asks for review.
pub fn aggregate_columns(columns: &[Decision]) -> Decision {
    let Some(last) = columns.iter().rposition(|c| c.status != FieldStatus::Blank) else {
        return Decision::blank();
    };
    let kept = &columns[..=last];

    let mut value = String::new();
    let mut conf_sum = 0.0f32;
    let mut ok_count = 0usize;
    let mut clean = true;
    let mut review = false;

    for col in kept {
        review |= col.review_required;
        match (col.status, col.answer.as_deref()) {
            (FieldStatus::Ok, Some(label)) => {
                value.push_str(label);
                conf_sum += col.confidence;
                ok_count += 1;
            }
            _ => {
                value.push(' ');
                clean = false;
            }
        }
    }

    let confidence = if ok_count == 0 {
        0.0
    } else {
        conf_sum / ok_count as f32
    };
    let status = if clean {
        FieldStatus::Ok
    } else {
        FieldStatus::Review
    };
    let trimmed = value.trim();

    Decision {
        status,
        answer: (!trimmed.is_empty()).then(|| trimmed.to_owned()),
        confidence,
        review_required: review || !clean,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(label: &str, confidence: f32, review_required: bool) -> Decision {
        Decision {
            status: FieldStatus::Ok,
            answer: Some(label.to_owned()),
            confidence,
            review_required,
        }
    }

    fn review() -> Decision {
        Decision {
            status: FieldStatus::Review,
            answer: None,
            confidence: 0.01,
            review_required: true,
        }
    }

    #[test]
    fn trailing_blanks_are_trimmed() {
        let d = aggregate_columns(&[ok("A", 0.8, false), Decision::blank(), Decision::blank()]);
        assert_eq!(d.status, FieldStatus::Ok);
        assert_eq!(d.answer.as_deref(), Some("A"));
        assert!((d.confidence - 0.8).abs() < 1e-6);
        assert!(!d.review_required);

        let flagged = aggregate_columns(&[ok("A", 0.1, true), Decision::blank()]);
        assert!(flagged.review_required);
        assert_eq!(flagged.status, FieldStatus::Ok);
    }

    #[test]
    fn internal_gap_forces_review() {
        let d = aggregate_columns(&[ok("A", 0.9, false), Decision::blank(), ok("B", 0.9, false)]);
        assert_eq!(d.status, FieldStatus::Review);
        assert_eq!(d.answer.as_deref(), Some("A B"));
        assert!(d.review_required);
        assert!((d.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn ambiguous_column_forces_review() {
        let d = aggregate_columns(&[ok("J", 0.7, false), review(), ok("N", 0.5, false)]);
        assert_eq!(d.status, FieldStatus::Review);
        assert!(d.review_required);
        assert!((d.confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn trailing_ambiguity_is_kept() {
        let d = aggregate_columns(&[ok("A", 0.9, false), review(), Decision::blank()]);
        assert_eq!(d.status, FieldStatus::Review);
        assert_eq!(d.answer.as_deref(), Some("A"));
    }

    #[test]
    fn empty_grid_is_blank_and_flagged() {
        let d = aggregate_columns(&[Decision::blank(), Decision::blank()]);
        assert_eq!(d.status, FieldStatus::Blank);
        assert_eq!(d.answer, None);
        assert_eq!(d.confidence, 0.0);
        assert!(d.review_required);
        assert_eq!(aggregate_columns(&[]).status, FieldStatus::Blank);
    }
}
