//! Result tree of one scanned sheet.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::GeometryReport;
use crate::score::{Decision, FieldStatus};

/// Decision for one leaf of the result tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldResult {
    pub answer: Option<String>,
    pub status: FieldStatus,
    pub confidence: f32,
    pub review_required: bool,
    /// Raw per-candidate scores, label → score.
    #[serde(default)]
    pub scores: BTreeMap<String, f32>,
    /// Per-column leaves of an aggregated character grid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<FieldResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FieldResult {
    pub fn from_decision(decision: Decision, scores: BTreeMap<String, f32>) -> Self {
        Self {
            answer: decision.answer,
            status: decision.status,
            confidence: decision.confidence,
            review_required: decision.review_required,
            scores,
            columns: None,
            error: None,
        }
    }

    /// Null value tagged ERROR; the field could not be evaluated.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            answer: None,
            status: FieldStatus::Error,
            confidence: 0.0,
            review_required: true,
            scores: BTreeMap::new(),
            columns: None,
            error: Some(message.into()),
        }
    }
}

/// A leaf or a named group of nodes (questions of a block, flag options).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldNode {
    Leaf(FieldResult),
    Group(BTreeMap<String, FieldNode>),
}

impl FieldNode {
    /// Every leaf below this node with its dotted path relative to it.
    pub fn leaves(&self) -> Vec<(String, &FieldResult)> {
        let mut out = Vec::new();
        self.collect_leaves(String::new(), &mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, prefix: String, out: &mut Vec<(String, &'a FieldResult)>) {
        match self {
            FieldNode::Leaf(leaf) => out.push((prefix, leaf)),
            FieldNode::Group(children) => {
                for (key, child) in children {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{prefix}.{key}")
                    };
                    child.collect_leaves(path, out);
                }
            }
        }
    }

    pub fn as_leaf(&self) -> Option<&FieldResult> {
        match self {
            FieldNode::Leaf(leaf) => Some(leaf),
            FieldNode::Group(_) => None,
        }
    }

    pub fn child(&self, key: &str) -> Option<&FieldNode> {
        match self {
            FieldNode::Leaf(_) => None,
            FieldNode::Group(children) => children.get(key),
        }
    }

    pub fn review_required(&self) -> bool {
        self.leaves().iter().any(|(_, l)| l.review_required)
    }
}

/// Leaf counts per status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub ok: usize,
    pub blank: usize,
    pub review: usize,
    pub noise: usize,
    pub error: usize,
}

impl ScanSummary {
    pub fn count(&mut self, status: FieldStatus) {
        match status {
            FieldStatus::Ok => self.ok += 1,
            FieldStatus::Blank => self.blank += 1,
            FieldStatus::Review => self.review += 1,
            FieldStatus::Noise => self.noise += 1,
            FieldStatus::Error => self.error += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.ok + self.blank + self.review + self.noise + self.error
    }
}

/// Full result of one sheet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    /// `name@version` of the template used.
    pub template: String,
    /// OR over every leaf's flag.
    pub review_required: bool,
    /// section → field → node.
    pub sections: BTreeMap<String, BTreeMap<String, FieldNode>>,
    /// Dynamic ink floor per calibration group.
    pub floors: BTreeMap<String, f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<GeometryReport>,
    pub summary: ScanSummary,
}

impl ScanResult {
    /// Every leaf with its `section.field[.key]` path, in key order.
    pub fn leaves(&self) -> Vec<(String, &FieldResult)> {
        let mut out = Vec::new();
        for (section, fields) in &self.sections {
            for (name, node) in fields {
                for (sub, leaf) in node.leaves() {
                    let path = if sub.is_empty() {
                        format!("{section}.{name}")
                    } else {
                        format!("{section}.{name}.{sub}")
                    };
                    out.push((path, leaf));
                }
            }
        }
        out
    }

    pub fn field(&self, section: &str, name: &str) -> Option<&FieldNode> {
        self.sections.get(section)?.get(name)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(answer: Option<&str>, status: FieldStatus, review: bool) -> FieldResult {
        FieldResult {
            answer: answer.map(str::to_owned),
            status,
            confidence: 0.5,
            review_required: review,
            scores: BTreeMap::new(),
            columns: None,
            error: None,
        }
    }

    #[test]
    fn leaves_walk_groups_with_paths() {
        let mut block = BTreeMap::new();
        block.insert("1".to_owned(), FieldNode::Leaf(leaf(Some("A"), FieldStatus::Ok, false)));
        block.insert("2".to_owned(), FieldNode::Leaf(leaf(None, FieldStatus::Blank, true)));
        let node = FieldNode::Group(block);

        let leaves = node.leaves();
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].0, "1");
        assert!(node.review_required());
        assert_eq!(
            node.child("1").and_then(FieldNode::as_leaf).and_then(|l| l.answer.as_deref()),
            Some("A")
        );
    }

    #[test]
    fn leaf_json_shape() {
        let mut scores = BTreeMap::new();
        scores.insert("A".to_owned(), 0.75);
        let result = FieldResult {
            scores,
            ..leaf(Some("A"), FieldStatus::Ok, false)
        };
        let json = serde_json::to_value(FieldNode::Leaf(result)).expect("json");
        assert_eq!(json["answer"], "A");
        assert_eq!(json["status"], "OK");
        assert_eq!(json["review_required"], false);
        assert_eq!(json["scores"]["A"], 0.75);
        assert!(json.get("columns").is_none());

        let back: FieldNode = serde_json::from_value(json).expect("parse");
        assert!(back.as_leaf().is_some());
    }

    #[test]
    fn error_leaf_is_flagged() {
        let e = FieldResult::error("needs 2 anchors, found 1");
        assert_eq!(e.status, FieldStatus::Error);
        assert_eq!(e.answer, None);
        assert!(e.review_required);
    }
}
