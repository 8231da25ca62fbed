//! Zip archives as a source of inputs.
//!
//! The published dataset ships as an archive that wraps a second archive
//! holding the actual files. Nested `.zip` entries are walked in place, so
//! the layout inside does not matter, only the extensions do.

use std::io::{Cursor, Read};
use std::path::Path;

use tracing::{debug, info, instrument};
use zip::ZipArchive;

use crate::constants;
use crate::error::ArchiveError;
use crate::sources::{SourceFile, SourceFormat, SourceManifest};

/// Build a manifest from the bytes of a (possibly nested) zip archive.
///
/// Entries of each archive are visited in name order. As with a directory
/// scan, the first `.sqlite` entry becomes the snapshot and unknown entries
/// are skipped.
pub fn discover_archive(bytes: &[u8]) -> Result<SourceManifest, ArchiveError> {
    let mut manifest = SourceManifest::default();
    walk(bytes, "", 0, &mut manifest)?;
    info!(
        businesses = manifest.businesses.len(),
        reviews = manifest.reviews.len(),
        snapshot = manifest.snapshot.is_some(),
        "archive discovery complete"
    );
    Ok(manifest)
}

fn walk(bytes: &[u8], parent: &str, depth: usize, manifest: &mut SourceManifest) -> Result<(), ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();

    for name in names {
        let qualified = format!("{}{}", parent, name);
        let mut entry = archive.by_name(&name)?;
        if entry.is_dir() {
            continue;
        }
        let path = Path::new(&name);
        let is_zip = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(constants::ZIP_EXTENSION));
        let format = SourceFormat::from_path(path);
        if !is_zip && format.is_none() {
            debug!(entry = %qualified, "skipping unrecognised archive entry");
            continue;
        }

        let mut content = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut content).map_err(|error| ArchiveError::Entry {
            name: qualified.clone(),
            error,
        })?;
        drop(entry);

        match format {
            Some(format) => {
                debug!(entry = %qualified, %format, bytes = content.len(), "discovered archive entry");
                manifest.push(SourceFile::new(qualified, format, content));
            }
            None => {
                if depth + 1 >= constants::MAX_ARCHIVE_DEPTH {
                    return Err(ArchiveError::TooDeep(qualified));
                }
                walk(&content, &format!("{}/", qualified), depth + 1, manifest)?;
            }
        }
    }
    Ok(())
}

/// Load an archive from an http(s) URL or a local path and walk it.
pub async fn load_archive(location: &str) -> Result<SourceManifest, ArchiveError> {
    let bytes = if location.starts_with("http://") || location.starts_with("https://") {
        fetch_archive(location).await?
    } else {
        tokio::fs::read(location).await.map_err(|error| ArchiveError::Read {
            path: location.to_string(),
            error,
        })?
    };
    discover_archive(&bytes)
}

/// Download an archive over HTTP(S).
#[instrument]
pub async fn fetch_archive(url: &str) -> Result<Vec<u8>, ArchiveError> {
    let http_error = |error: reqwest::Error| ArchiveError::Http {
        url: url.to_string(),
        error,
    };
    let resp = reqwest::get(url).await.map_err(http_error)?;
    let status = resp.status();
    if !status.is_success() {
        return Err(ArchiveError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    let bytes = resp.bytes().await.map_err(http_error)?;
    info!(bytes = bytes.len(), "archive downloaded");
    Ok(bytes.to_vec())
}
