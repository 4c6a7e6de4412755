//! File trigger layer: stability poll, scan, persist, relocate.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::scan::{InputGeometry, ScanError, SheetScanner};
use crate::store::{NewScan, ScanId, ScanStatus, ScanStore, StoreError};

/// Extensions picked up from a bucket directory.
pub const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(thiserror::Error, Debug)]
pub enum TriggerError {
    #[error("{} still changing after {waited:?}", path.display())]
    StabilityTimeout { path: PathBuf, waited: Duration },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StabilityParams {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for StabilityParams {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Block until two consecutive size reads of `path` match; returns the size.
pub fn wait_until_stable(path: &Path, params: &StabilityParams) -> Result<u64, TriggerError> {
    let start = Instant::now();
    let mut last = fs::metadata(path)?.len();
    loop {
        thread::sleep(params.poll_interval);
        let size = fs::metadata(path)?.len();
        if size == last {
            return Ok(size);
        }
        last = size;
        let waited = start.elapsed();
        if waited >= params.timeout {
            return Err(TriggerError::StabilityTimeout {
                path: path.to_path_buf(),
                waited,
            });
        }
    }
}

/// Outcome of one bucket file.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessedFile {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub status: ScanStatus,
    /// Set when the scan was persisted.
    pub id: Option<ScanId>,
    pub review_required: bool,
    pub error: Option<String>,
}

/// Processes image files dropped into a bucket directory.
///
/// Successful scans go to `<bucket>/success`, failed ones to
/// `<bucket>/error`.
pub struct BucketRunner<S: ScanStore> {
    scanner: SheetScanner,
    store: S,
    bucket: PathBuf,
    stability: StabilityParams,
    input: InputGeometry,
}

impl<S: ScanStore> BucketRunner<S> {
    pub fn new(scanner: SheetScanner, store: S, bucket: impl Into<PathBuf>) -> Self {
        Self {
            scanner,
            store,
            bucket: bucket.into(),
            stability: StabilityParams::default(),
            input: InputGeometry::Raw,
        }
    }

    pub fn with_stability(mut self, stability: StabilityParams) -> Self {
        self.stability = stability;
        self
    }

    pub fn with_input(mut self, input: InputGeometry) -> Self {
        self.input = input;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn success_dir(&self) -> PathBuf {
        self.bucket.join("success")
    }

    pub fn error_dir(&self) -> PathBuf {
        self.bucket.join("error")
    }

    fn scan_and_persist(&mut self, path: &Path) -> Result<(ScanId, bool), TriggerError> {
        wait_until_stable(path, &self.stability)?;
        let result = self.scanner.scan_path(path, self.input)?;
        let review = result.review_required;
        let scan = NewScan::new(path, result, self.scanner.template())?;
        let id = self.store.persist_scan(scan)?;
        Ok((id, review))
    }

    /// Scan one file, persist it and move it to `success/` or `error/`.
    ///
    /// Never fails: every problem with this file is logged and reported in
    /// the returned [`ProcessedFile`]. A file that cannot be moved stays
    /// where it is and is reported with that path as its destination.
    pub fn process_file(&mut self, path: &Path) -> ProcessedFile {
        match self.scan_and_persist(path) {
            Ok((id, review_required)) => self.finish_persisted(path, id, review_required),
            Err(err) => {
                warn!("failed to process {}: {err}", path.display());
                let (destination, error) = match relocate(path, &self.error_dir()) {
                    Ok(dest) => {
                        info!("moved {} -> {}", path.display(), dest.display());
                        (dest, err.to_string())
                    }
                    Err(move_err) => {
                        error!("could not move {} out of the bucket: {move_err}", path.display());
                        (path.to_path_buf(), format!("{err}; file not moved: {move_err}"))
                    }
                };
                ProcessedFile {
                    source: path.to_path_buf(),
                    destination,
                    status: ScanStatus::Error,
                    id: None,
                    review_required: true,
                    error: Some(error),
                }
            }
        }
    }

    /// Relocate a persisted scan's file and record where it went. A file
    /// that cannot reach `success/` is filed under `error/` instead.
    fn finish_persisted(&mut self, path: &Path, id: ScanId, review_required: bool) -> ProcessedFile {
        let (destination, status, mut error) = match relocate(path, &self.success_dir()) {
            Ok(dest) => (dest, ScanStatus::Success, None),
            Err(err) => {
                warn!("scan {id}: could not move {} to success/: {err}", path.display());
                let note = format!("could not move to success/: {err}");
                match relocate(path, &self.error_dir()) {
                    Ok(dest) => (dest, ScanStatus::Error, Some(note)),
                    Err(move_err) => {
                        error!("scan {id}: could not move {} out of the bucket: {move_err}", path.display());
                        (path.to_path_buf(), ScanStatus::Error, Some(format!("{note}; {move_err}")))
                    }
                }
            }
        };

        if let Err(err) = self.store.update_scan_status(id, &destination, status) {
            error!("scan {id}: failed to record final status: {err}");
            let note = format!("status not recorded: {err}");
            error = Some(match error {
                Some(prev) => format!("{prev}; {note}"),
                None => note,
            });
        }
        info!("scan {id}: {} -> {}", path.display(), destination.display());

        ProcessedFile {
            source: path.to_path_buf(),
            destination,
            status,
            id: Some(id),
            review_required,
            error,
        }
    }

    /// Image files currently in the bucket, in name order.
    pub fn pending_files(&self) -> Result<Vec<PathBuf>, TriggerError> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.bucket)? {
            let path = entry?.path();
            if path.is_file() && is_image(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// One pass over every image already in the bucket.
    pub fn process_existing(&mut self) -> Result<Vec<ProcessedFile>, TriggerError> {
        let files = self.pending_files()?;
        if !files.is_empty() {
            info!("processing {} file(s) in {}", files.len(), self.bucket.display());
        }
        Ok(files.iter().map(|f| self.process_file(f)).collect())
    }

    /// Poll the bucket every `interval` until `stop` returns true.
    pub fn watch(&mut self, interval: Duration, mut stop: impl FnMut() -> bool) -> Result<usize, TriggerError> {
        info!("watching {}", self.bucket.display());
        let mut processed = 0;
        loop {
            processed += self.process_existing()?.len();
            if stop() {
                return Ok(processed);
            }
            thread::sleep(interval);
        }
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Move `path` into `dir`, keeping its name unless that is taken.
fn relocate(path: &Path, dir: &Path) -> Result<PathBuf, TriggerError> {
    fs::create_dir_all(dir)?;
    let name = path
        .file_name()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"))?;
    let mut dest = dir.join(name);
    if dest.exists() {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f");
        dest = dir.join(format!("{stamp}-{}", name.to_string_lossy()));
    }
    if fs::rename(path, &dest).is_err() {
        fs::copy(path, &dest)?;
        fs::remove_file(path)?;
    }
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fast() -> StabilityParams {
        StabilityParams {
            poll_interval: Duration::from_millis(5),
            timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn finished_file_is_stable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.png");
        fs::write(&path, b"12345").expect("write");
        assert_eq!(wait_until_stable(&path, &fast()).expect("stable"), 5);
    }

    #[test]
    fn growing_file_times_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("grow.png");
        fs::write(&path, b"x").expect("write");

        let writer_path = path.clone();
        let writer = thread::spawn(move || {
            let mut f = fs::OpenOptions::new().append(true).open(writer_path).expect("open");
            for _ in 0..200 {
                f.write_all(&[0u8; 64]).expect("append");
                f.flush().expect("flush");
                thread::sleep(Duration::from_millis(2));
            }
        });

        let params = StabilityParams {
            poll_interval: Duration::from_millis(20),
            timeout: Duration::from_millis(100),
        };
        let err = wait_until_stable(&path, &params).expect_err("timeout");
        assert!(matches!(err, TriggerError::StabilityTimeout { .. }));
        writer.join().expect("writer");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = wait_until_stable(Path::new("/nonexistent/sheet.png"), &fast()).expect_err("missing");
        assert!(matches!(err, TriggerError::Io(_)));
    }

    #[test]
    fn relocate_avoids_clobbering() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("success");
        let a = dir.path().join("s.png");
        fs::write(&a, b"one").expect("write");
        let first = relocate(&a, &target).expect("move");
        assert_eq!(first, target.join("s.png"));

        fs::write(&a, b"two").expect("write");
        let second = relocate(&a, &target).expect("move");
        assert_ne!(first, second);
        assert!(!a.exists());
        assert_eq!(fs::read(second).expect("read"), b"two");
    }

    #[test]
    fn image_extensions_are_case_insensitive() {
        assert!(is_image(Path::new("x.PNG")));
        assert!(is_image(Path::new("x.jpeg")));
        assert!(!is_image(Path::new("x.txt")));
        assert!(!is_image(Path::new("x")));
    }
}
