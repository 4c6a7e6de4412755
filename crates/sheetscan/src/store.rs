//! Persistence of scan results.
//!
//! A scan is written in one all-or-nothing step (parent record plus every
//! derived row); its final location and status are updated separately once
//! the source file has been moved.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::grid::FieldClass;
use crate::result::{FieldNode, ScanResult};
use crate::template::Template;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanId(pub u64);

impl std::fmt::Display for ScanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    #[default]
    Pending,
    Success,
    Error,
}

/// One non-answer section (student info, school info) flattened to
/// field → value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SectionRow {
    pub section: String,
    pub fields: BTreeMap<String, Option<String>>,
    pub review_required: bool,
    pub raw: serde_json::Value,
}

/// One answered question.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnswerRow {
    /// Name of the answer field (usually the subject).
    pub subject: String,
    pub question: String,
    pub answer: Option<String>,
    pub status: String,
    pub confidence: f32,
    pub review_required: bool,
    pub raw: serde_json::Value,
}

/// Everything written by [`ScanStore::persist_scan`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewScan {
    pub file_name: String,
    pub source_path: PathBuf,
    pub scanned_at: DateTime<Utc>,
    pub review_required: bool,
    pub result: ScanResult,
    pub sections: Vec<SectionRow>,
    pub answers: Vec<AnswerRow>,
}

impl NewScan {
    /// Derive child rows from `result`. Fields of class `answer` become
    /// [`AnswerRow`]s, every other section becomes a [`SectionRow`].
    pub fn new(source_path: &Path, result: ScanResult, template: &Template) -> Result<Self, StoreError> {
        let file_name = source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut answers = Vec::new();
        let mut sections = Vec::new();
        for (section, fields) in &result.sections {
            let mut row = SectionRow {
                section: section.clone(),
                fields: BTreeMap::new(),
                review_required: false,
                raw: serde_json::Value::Null,
            };
            let mut raw = serde_json::Map::new();
            for (name, node) in fields {
                let is_answer = template
                    .field(section, name)
                    .map_or(false, |f| f.class == FieldClass::Answer);
                if is_answer {
                    answers.extend(answer_rows(name, node)?);
                    continue;
                }
                for (path, leaf) in node.leaves() {
                    let key = if path.is_empty() {
                        name.clone()
                    } else {
                        format!("{name}.{path}")
                    };
                    row.review_required |= leaf.review_required;
                    row.fields.insert(key, leaf.answer.clone());
                }
                raw.insert(name.clone(), serde_json::to_value(node)?);
            }
            if !row.fields.is_empty() {
                row.raw = serde_json::Value::Object(raw);
                sections.push(row);
            }
        }

        Ok(Self {
            file_name,
            source_path: source_path.to_path_buf(),
            scanned_at: Utc::now(),
            review_required: result.review_required,
            result,
            sections,
            answers,
        })
    }
}

fn answer_rows(subject: &str, node: &FieldNode) -> Result<Vec<AnswerRow>, StoreError> {
    node.leaves()
        .into_iter()
        .map(|(question, leaf)| {
            Ok(AnswerRow {
                subject: subject.to_owned(),
                question,
                answer: leaf.answer.clone(),
                status: leaf.status.as_str().to_owned(),
                confidence: leaf.confidence,
                review_required: leaf.review_required,
                raw: serde_json::to_value(leaf)?,
            })
        })
        .collect()
}

/// A persisted scan.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: ScanId,
    pub status: ScanStatus,
    /// Where the source file ended up; `None` until relocated.
    pub final_path: Option<PathBuf>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub scan: NewScan,
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("unknown scan {0}")]
    UnknownScan(ScanId),
}

/// Storage collaborator for scan results.
pub trait ScanStore {
    /// Store the parent record and all child rows atomically; status starts
    /// as [`ScanStatus::Pending`].
    fn persist_scan(&mut self, scan: NewScan) -> Result<ScanId, StoreError>;

    /// Record where the source file was moved and the final outcome.
    fn update_scan_status(&mut self, id: ScanId, final_path: &Path, status: ScanStatus) -> Result<(), StoreError>;

    fn load(&self, id: ScanId) -> Result<ScanRecord, StoreError>;
}

/// In-process store.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<ScanId, ScanRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> impl Iterator<Item = &ScanRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ScanStore for MemoryStore {
    fn persist_scan(&mut self, scan: NewScan) -> Result<ScanId, StoreError> {
        let id = ScanId(self.records.keys().next_back().map_or(1, |k| k.0 + 1));
        self.records.insert(
            id,
            ScanRecord {
                id,
                status: ScanStatus::Pending,
                final_path: None,
                updated_at: scan.scanned_at,
                scan,
            },
        );
        Ok(id)
    }

    fn update_scan_status(&mut self, id: ScanId, final_path: &Path, status: ScanStatus) -> Result<(), StoreError> {
        let record = self.records.get_mut(&id).ok_or(StoreError::UnknownScan(id))?;
        record.final_path = Some(final_path.to_path_buf());
        record.status = status;
        record.updated_at = Utc::now();
        Ok(())
    }

    fn load(&self, id: ScanId) -> Result<ScanRecord, StoreError> {
        self.records.get(&id).cloned().ok_or(StoreError::UnknownScan(id))
    }
}

/// One JSON document per scan, `scan-NNNNNN.json`, in a directory.
///
/// Every write goes to a temporary file in the same directory and is then
/// renamed over the target, so readers never see a partial record. New
/// records never replace an existing file: when several stores share the
/// directory, a writer that loses an id moves on to the next one.
#[derive(Clone, Debug)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: ScanId) -> PathBuf {
        self.dir.join(format!("scan-{id}.json"))
    }

    /// Ids of every stored scan, ascending.
    pub fn ids(&self) -> Result<Vec<ScanId>, StoreError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let Some(num) = name
                .to_str()
                .and_then(|n| n.strip_prefix("scan-"))
                .and_then(|n| n.strip_suffix(".json"))
            else {
                continue;
            };
            if let Ok(n) = num.parse() {
                ids.push(ScanId(n));
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn stage(&self, record: &ScanRecord) -> Result<tempfile::NamedTempFile, StoreError> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut tmp, record)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        Ok(tmp)
    }

    fn write_record(&self, record: &ScanRecord) -> Result<(), StoreError> {
        self.stage(record)?
            .persist(self.path_for(record.id))
            .map_err(|e| e.error)?;
        Ok(())
    }
}

impl ScanStore for JsonDirStore {
    fn persist_scan(&mut self, scan: NewScan) -> Result<ScanId, StoreError> {
        let mut record = ScanRecord {
            id: ScanId(self.ids()?.last().map_or(1, |k| k.0 + 1)),
            status: ScanStatus::Pending,
            final_path: None,
            updated_at: scan.scanned_at,
            scan,
        };
        loop {
            let tmp = self.stage(&record)?;
            match tmp.persist_noclobber(self.path_for(record.id)) {
                Ok(_) => break,
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                    log::debug!("scan id {} taken, retrying", record.id);
                    let next = self.ids()?.last().map_or(1, |k| k.0 + 1);
                    record.id = ScanId(next.max(record.id.0 + 1));
                }
                Err(e) => return Err(e.error.into()),
            }
        }
        log::debug!("stored scan {} in {}", record.id, self.dir.display());
        Ok(record.id)
    }

    fn update_scan_status(&mut self, id: ScanId, final_path: &Path, status: ScanStatus) -> Result<(), StoreError> {
        let mut record = self.load(id)?;
        record.final_path = Some(final_path.to_path_buf());
        record.status = status;
        record.updated_at = Utc::now();
        self.write_record(&record)
    }

    fn load(&self, id: ScanId) -> Result<ScanRecord, StoreError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(StoreError::UnknownScan(id));
        }
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{FieldResult, ScanSummary};
    use crate::score::FieldStatus;

    fn leaf(answer: Option<&str>, review: bool) -> FieldNode {
        FieldNode::Leaf(FieldResult {
            answer: answer.map(str::to_owned),
            status: if answer.is_some() { FieldStatus::Ok } else { FieldStatus::Blank },
            confidence: 0.6,
            review_required: review,
            scores: BTreeMap::new(),
            columns: None,
            error: None,
        })
    }

    fn template() -> Template {
        Template::from_json_str(
            r#"{
            "name": "t", "width": 300, "height": 300,
            "fields": [
                { "name": "math", "section": "answers", "class": "answer",
                  "shape": { "kind": "answer_blocks", "blocks": 1, "rows_per_block": 2,
                             "choices": ["A", "B"], "choice_pitch": 30 },
                  "anchors": [[50, 50], [50, 100]] },
                { "name": "gender", "section": "student", "class": "option",
                  "shape": { "kind": "choice", "options": ["M", "F"] },
                  "anchors": [[50, 200], [90, 200]] }
            ]
        }"#,
        )
        .expect("template")
    }

    fn result() -> ScanResult {
        let mut math = BTreeMap::new();
        math.insert("1".to_owned(), leaf(Some("A"), false));
        math.insert("2".to_owned(), leaf(None, true));
        let mut answers = BTreeMap::new();
        answers.insert("math".to_owned(), FieldNode::Group(math));
        let mut student = BTreeMap::new();
        student.insert("gender".to_owned(), leaf(Some("F"), false));

        let mut sections = BTreeMap::new();
        sections.insert("answers".to_owned(), answers);
        sections.insert("student".to_owned(), student);
        ScanResult {
            template: "t@1".into(),
            review_required: true,
            sections,
            floors: BTreeMap::new(),
            geometry: None,
            summary: ScanSummary::default(),
        }
    }

    fn new_scan(name: &str) -> NewScan {
        NewScan::new(Path::new(name), result(), &template()).expect("scan")
    }

    #[test]
    fn new_scan_splits_answers_and_sections() {
        let scan = NewScan::new(Path::new("/bucket/sheet-01.png"), result(), &template()).expect("scan");
        assert_eq!(scan.file_name, "sheet-01.png");
        assert_eq!(scan.answers.len(), 2);
        assert_eq!(scan.answers[0].subject, "math");
        assert_eq!(scan.answers[0].question, "1");
        assert_eq!(scan.answers[1].status, "BLANK");
        assert_eq!(scan.sections.len(), 1);
        assert_eq!(scan.sections[0].fields["gender"].as_deref(), Some("F"));
        assert!(!scan.sections[0].review_required);
        assert_eq!(scan.sections[0].raw["gender"]["answer"], "F");
        assert_eq!(scan.answers[0].raw["answer"], "A");
    }

    #[test]
    fn memory_store_tracks_status() {
        let mut store = MemoryStore::new();
        let id = store
            .persist_scan(new_scan("a.png"))
            .expect("persist");
        assert_eq!(store.load(id).expect("load").status, ScanStatus::Pending);

        store
            .update_scan_status(id, Path::new("success/a.png"), ScanStatus::Success)
            .expect("update");
        let rec = store.load(id).expect("load");
        assert_eq!(rec.status, ScanStatus::Success);
        assert_eq!(rec.final_path.as_deref(), Some(Path::new("success/a.png")));

        assert!(matches!(
            store.update_scan_status(ScanId(99), Path::new("x"), ScanStatus::Error),
            Err(StoreError::UnknownScan(ScanId(99)))
        ));
    }

    #[test]
    fn json_dir_store_round_trips_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = JsonDirStore::open(dir.path().join("db")).expect("open");
        let first = store
            .persist_scan(new_scan("a.png"))
            .expect("persist");
        let second = store
            .persist_scan(new_scan("b.png"))
            .expect("persist");
        assert_eq!((first, second), (ScanId(1), ScanId(2)));
        assert!(store.dir().join("scan-000001.json").is_file());

        store
            .update_scan_status(second, Path::new("error/b.png"), ScanStatus::Error)
            .expect("update");
        let rec = store.load(second).expect("load");
        assert_eq!(rec.status, ScanStatus::Error);
        assert_eq!(rec.scan.file_name, "b.png");
        assert_eq!(rec.scan.answers.len(), 2);
        assert_eq!(store.ids().expect("ids"), vec![ScanId(1), ScanId(2)]);

        // no temp files left behind
        let entries = fs::read_dir(store.dir()).expect("dir").count();
        assert_eq!(entries, 2);
    }

    #[test]
    fn stores_sharing_a_directory_never_reuse_an_id() {
        use std::sync::{Arc, Barrier};

        const WRITERS: usize = 16;
        let dir = tempfile::tempdir().expect("tempdir");
        let db = dir.path().join("db");
        let barrier = Arc::new(Barrier::new(WRITERS));

        let handles: Vec<_> = (0..WRITERS)
            .map(|i| {
                let db = db.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    let mut store = JsonDirStore::open(db).expect("open");
                    let scan = new_scan(&format!("sheet-{i}.png"));
                    barrier.wait();
                    store.persist_scan(scan).expect("persist")
                })
            })
            .collect();
        let mut ids: Vec<ScanId> = handles.into_iter().map(|h| h.join().expect("writer")).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), WRITERS);

        let store = JsonDirStore::open(&db).expect("open");
        assert_eq!(store.ids().expect("ids"), ids);
        let mut names: Vec<String> = ids
            .iter()
            .map(|&id| store.load(id).expect("load").scan.file_name)
            .collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), WRITERS);
    }
}
