mod common;

use std::fs;
use std::time::Duration;

use sheetscan::synth::{render_sheet, SynthParams};
use sheetscan::{
    BucketRunner, InputGeometry, JsonDirStore, MemoryStore, ScanStatus, ScanStore, SheetScanner, StabilityParams,
};

use common::{reference_marks, standard_template};

fn fast() -> StabilityParams {
    StabilityParams {
        poll_interval: Duration::from_millis(5),
        timeout: Duration::from_secs(2),
    }
}

fn write_reference_sheet(path: &std::path::Path) {
    let template = standard_template();
    render_sheet(&template, &reference_marks(), &SynthParams::default())
        .save(path)
        .expect("save sheet");
}

#[test]
fn bucket_pass_persists_and_relocates_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bucket = dir.path().join("bucket");
    fs::create_dir_all(&bucket).expect("bucket");
    write_reference_sheet(&bucket.join("b-sheet.png"));
    fs::write(bucket.join("a-broken.png"), b"not an image").expect("write");
    fs::write(bucket.join("notes.txt"), b"ignored").expect("write");

    let scanner = SheetScanner::new(standard_template()).expect("scanner");
    let mut runner = BucketRunner::new(scanner, MemoryStore::new(), &bucket)
        .with_input(InputGeometry::Canonical)
        .with_stability(fast());

    let processed = runner.process_existing().expect("pass");
    assert_eq!(processed.len(), 2);

    let broken = &processed[0];
    assert_eq!(broken.status, ScanStatus::Error);
    assert_eq!(broken.id, None);
    assert!(broken.error.as_deref().is_some_and(|e| e.contains("a-broken.png")));
    assert_eq!(broken.destination, bucket.join("error").join("a-broken.png"));
    assert!(broken.destination.is_file());

    let good = &processed[1];
    assert_eq!(good.status, ScanStatus::Success);
    assert_eq!(good.destination, bucket.join("success").join("b-sheet.png"));
    assert!(!bucket.join("b-sheet.png").exists());
    assert!(bucket.join("notes.txt").exists());

    let id = good.id.expect("persisted");
    let record = runner.store().load(id).expect("record");
    assert_eq!(record.status, ScanStatus::Success);
    assert_eq!(record.final_path.as_deref(), Some(good.destination.as_path()));
    assert_eq!(record.scan.file_name, "b-sheet.png");
    // 20 math + 5 science questions
    assert_eq!(record.scan.answers.len(), 25);
    let student = record
        .scan
        .sections
        .iter()
        .find(|s| s.section == "student")
        .expect("student row");
    assert_eq!(student.fields["last_name"].as_deref(), Some("ADA"));
    assert_eq!(student.fields["programs.SSC"].as_deref(), Some("SSC"));

    // second pass finds nothing new
    assert!(runner.process_existing().expect("pass").is_empty());
}

#[test]
fn watch_stops_when_asked_and_writes_json_records() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bucket = dir.path().join("bucket");
    fs::create_dir_all(&bucket).expect("bucket");
    write_reference_sheet(&bucket.join("sheet.png"));

    let scanner = SheetScanner::new(standard_template()).expect("scanner");
    let store = JsonDirStore::open(dir.path().join("db")).expect("store");
    let mut runner = BucketRunner::new(scanner, store, &bucket)
        .with_input(InputGeometry::Canonical)
        .with_stability(fast());

    let mut passes = 0;
    let processed = runner
        .watch(Duration::from_millis(1), || {
            passes += 1;
            passes >= 2
        })
        .expect("watch");
    assert_eq!(processed, 1);
    assert_eq!(passes, 2);

    let store = runner.into_store();
    let ids = store.ids().expect("ids");
    assert_eq!(ids.len(), 1);
    let record = store.load(ids[0]).expect("load");
    assert_eq!(record.status, ScanStatus::Success);
    assert!(record.scan.review_required);
}

#[test]
fn blocked_success_dir_files_each_scan_as_error_and_keeps_going() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bucket = dir.path().join("bucket");
    fs::create_dir_all(&bucket).expect("bucket");
    // a plain file where the success directory should go
    fs::write(bucket.join("success"), b"in the way").expect("write");
    write_reference_sheet(&bucket.join("one.png"));
    write_reference_sheet(&bucket.join("two.png"));

    let scanner = SheetScanner::new(standard_template()).expect("scanner");
    let mut runner = BucketRunner::new(scanner, MemoryStore::new(), &bucket)
        .with_input(InputGeometry::Canonical)
        .with_stability(fast());

    let processed = runner.process_existing().expect("pass");
    assert_eq!(processed.len(), 2);
    for file in &processed {
        assert_eq!(file.status, ScanStatus::Error);
        assert!(file.error.as_deref().is_some_and(|e| e.contains("success/")));
        assert_eq!(file.destination.parent(), Some(bucket.join("error").as_path()));
        assert!(file.destination.is_file());

        let record = runner.store().load(file.id.expect("persisted")).expect("record");
        assert_eq!(record.status, ScanStatus::Error);
        assert_eq!(record.final_path.as_deref(), Some(file.destination.as_path()));
    }
    assert!(runner.pending_files().expect("pending").is_empty());
}
