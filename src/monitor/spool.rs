//! Segment input from the capture collaborator's spool directory.
//!
//! Layout: `<spool>/<station_id>/<name>.json`, one [`Segment`] per file.
//! File names sort in capture order. A file is removed only once its cycle
//! succeeded; undecodable files are renamed to `*.rejected` and skipped.
//! Files that cannot be read right now stay where they are.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::detection::domain::Segment;
use crate::error::{Error, Result, ResultExt};

const REJECTED_EXTENSION: &str = "rejected";

/// A segment waiting to be processed, with the key needed to acknowledge it.
#[derive(Debug, Clone)]
pub struct PendingSegment {
    pub key: PathBuf,
    pub segment: Segment,
}

/// Where station loops get their segments from.
#[async_trait]
pub trait SegmentSource: Send + Sync {
    /// Pending segments of a station in capture order.
    async fn pending(&self, station_id: i64) -> Result<Vec<PendingSegment>>;

    /// Mark a segment as done so it is not returned again.
    async fn ack(&self, segment: &PendingSegment) -> Result<()>;
}

pub struct SpoolSource {
    root: PathBuf,
}

impl SpoolSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn station_dir(&self, station_id: i64) -> PathBuf {
        self.root.join(station_id.to_string())
    }
}

#[async_trait]
impl SegmentSource for SpoolSource {
    async fn pending(&self, station_id: i64) -> Result<Vec<PendingSegment>> {
        let dir = self.station_dir(station_id);
        tokio::task::spawn_blocking(move || scan_station_dir(&dir, station_id))
            .await
            .map_err(|e| Error::TaskJoin(e.to_string()))?
    }

    async fn ack(&self, segment: &PendingSegment) -> Result<()> {
        tokio::fs::remove_file(&segment.key)
            .await
            .with_context(format!("removing {}", segment.key.display()))
    }
}

fn scan_station_dir(dir: &Path, station_id: i64) -> Result<Vec<PendingSegment>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    Ok(paths
        .into_iter()
        .filter_map(|path| load(path, station_id))
        .collect())
}

/// Read one spool file, moving it aside if it can never be decoded.
fn load(path: PathBuf, station_id: i64) -> Option<PendingSegment> {
    match read_segment(&path, station_id) {
        Ok(segment) => Some(PendingSegment { key: path, segment }),
        Err(e @ Error::InvalidSegment(_)) => {
            tracing::warn!(target: "monitor", path = %path.display(), "Rejecting segment file: {}", e);
            let rejected = path.with_extension(REJECTED_EXTENSION);
            if let Err(e) = std::fs::rename(&path, &rejected) {
                tracing::error!(target: "monitor", path = %path.display(), "Failed to move rejected segment aside: {}", e);
            }
            None
        }
        Err(e) => {
            tracing::warn!(target: "monitor", path = %path.display(), "Skipping unreadable segment file: {}", e);
            None
        }
    }
}

fn read_segment(path: &Path, station_id: i64) -> Result<Segment> {
    let contents = std::fs::read(path).with_context(format!("reading {}", path.display()))?;
    let mut segment: Segment =
        serde_json::from_slice(&contents).map_err(|e| Error::InvalidSegment(e.to_string()))?;

    if segment.station_id != station_id {
        return Err(Error::InvalidSegment(format!(
            "segment belongs to station {}, found in spool of station {}",
            segment.station_id, station_id
        )));
    }
    if segment.reference.is_none() {
        segment.reference = path.file_name().map(|n| n.to_string_lossy().into_owned());
    }
    Ok(segment)
}
