//! Source discovery and the format-specific readers.
//!
//! The core only ever sees a [`SourceManifest`]: an ordered list of tagged
//! byte sources plus an optional relational snapshot. Where the bytes came
//! from (a directory listing, a zip archive, a test fixture) does not
//! matter past this point.

pub mod archive;
pub mod business_json;
pub mod review_csv;
pub mod snapshot;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::constants;
use crate::error::ParseError;
use crate::table::RowSet;

pub use archive::{discover_archive, fetch_archive, load_archive};
pub use business_json::BusinessJsonReader;
pub use review_csv::ReviewCsvReader;
pub use snapshot::SnapshotReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    BusinessJson,
    ReviewCsv,
    Snapshot,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            constants::JSON_EXTENSION => Some(SourceFormat::BusinessJson),
            constants::CSV_EXTENSION => Some(SourceFormat::ReviewCsv),
            constants::SQLITE_EXTENSION => Some(SourceFormat::Snapshot),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::BusinessJson => "json",
            SourceFormat::ReviewCsv => "csv",
            SourceFormat::Snapshot => "sqlite",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tagged byte source.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub format: SourceFormat,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, format: SourceFormat, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            format,
            bytes: bytes.into(),
        }
    }
}

/// Where the relational snapshot lives.
#[derive(Debug, Clone)]
pub enum SnapshotSource {
    Path(PathBuf),
    Bytes { name: String, bytes: Vec<u8> },
}

impl SnapshotSource {
    pub fn name(&self) -> String {
        match self {
            SnapshotSource::Path(p) => p.display().to_string(),
            SnapshotSource::Bytes { name, .. } => name.clone(),
        }
    }
}

/// Everything one pipeline run consumes.
#[derive(Debug, Clone, Default)]
pub struct SourceManifest {
    pub businesses: Vec<SourceFile>,
    pub reviews: Vec<SourceFile>,
    pub snapshot: Option<SnapshotSource>,
}

impl SourceManifest {
    /// Add a source, routing it by format. A second snapshot replaces nothing
    /// and is ignored with a warning.
    pub fn push(&mut self, source: SourceFile) {
        match source.format {
            SourceFormat::BusinessJson => self.businesses.push(source),
            SourceFormat::ReviewCsv => self.reviews.push(source),
            SourceFormat::Snapshot => {
                if self.snapshot.is_some() {
                    warn!(name = %source.name, "additional relational snapshot ignored");
                } else {
                    self.snapshot = Some(SnapshotSource::Bytes {
                        name: source.name,
                        bytes: source.bytes,
                    });
                }
            }
        }
    }
}

/// Common contract of the byte-stream readers.
pub trait SourceReader {
    fn read(&self, source: &SourceFile) -> Result<RowSet, ParseError>;
}

/// Scan `dir` (non-recursive) for sources. Each family is ordered by file
/// name. The first `.sqlite` file becomes the snapshot; it is read from disk
/// in place rather than loaded into memory.
pub fn discover(dir: &Path) -> std::io::Result<SourceManifest> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let mut manifest = SourceManifest::default();
    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match SourceFormat::from_path(&path) {
            Some(SourceFormat::Snapshot) => {
                if manifest.snapshot.is_some() {
                    warn!(path = %path.display(), "additional relational snapshot ignored");
                } else {
                    manifest.snapshot = Some(SnapshotSource::Path(path));
                }
            }
            Some(format) => {
                let bytes = fs::read(&path)?;
                debug!(%name, %format, bytes = bytes.len(), "discovered source");
                manifest.push(SourceFile::new(name, format, bytes));
            }
            None => debug!(path = %path.display(), "skipping unrecognised file"),
        }
    }

    info!(
        dir = %dir.display(),
        businesses = manifest.businesses.len(),
        reviews = manifest.reviews.len(),
        snapshot = manifest.snapshot.is_some(),
        "source discovery complete"
    );
    Ok(manifest)
}
