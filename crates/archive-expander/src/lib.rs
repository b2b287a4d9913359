//! ZIP archive detection and single-level expansion.
//!
//! Expansion is deliberately not recursive: a ZIP found inside an already
//! expanded ZIP is left as an opaque blob (single-level expansion only).

use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive at '{path}' could not be read: {message}")]
    Unreadable { path: String, message: String },
}

/// A raw input blob: an originating path (diagnostic only, not semantic) and
/// its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub path: String,
    pub bytes: Vec<u8>,
}

/// True if `bytes` begins with the 4-byte ZIP local-file-header signature
/// family: `50 4B (03|05|07) (04|06|08)`.
pub fn is_archive(bytes: &[u8]) -> bool {
    matches!(
        bytes,
        [0x50, 0x4B, 0x03 | 0x05 | 0x07, 0x04 | 0x06 | 0x08, ..]
    )
}

/// Expands a single ZIP blob into its member entries, preserving each
/// member's path. Directory entries are skipped.
pub fn expand(blob: &Blob) -> Result<Vec<Blob>, ArchiveError> {
    let cursor = Cursor::new(&blob.bytes);
    let mut archive = zip::ZipArchive::new(cursor).map_err(|err| ArchiveError::Unreadable {
        path: blob.path.clone(),
        message: err.to_string(),
    })?;

    let mut members = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| ArchiveError::Unreadable {
                path: blob.path.clone(),
                message: err.to_string(),
            })?;
        if entry.is_dir() {
            continue;
        }
        let path = entry
            .enclosed_name()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| entry.name().to_string());
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        std::io::Read::read_to_end(&mut entry, &mut bytes).map_err(|err| {
            ArchiveError::Unreadable {
                path: blob.path.clone(),
                message: err.to_string(),
            }
        })?;
        members.push(Blob { path, bytes });
    }
    Ok(members)
}

/// Replaces every archive blob in `blobs` with its expanded members
/// (single-level). Non-archive blobs pass through unchanged. Archives that
/// fail to expand are dropped and reported via `errors`.
pub fn expand_all(blobs: Vec<Blob>) -> (Vec<Blob>, Vec<ArchiveError>) {
    let mut out = Vec::with_capacity(blobs.len());
    let mut errors = Vec::new();
    for blob in blobs {
        if is_archive(&blob.bytes) {
            match expand(&blob) {
                Ok(members) => out.extend(members),
                Err(err) => {
                    tracing::warn!(path = %blob.path, error = %err, "failed to expand archive");
                    errors.push(err);
                }
            }
        } else {
            out.push(blob);
        }
    }
    (out, errors)
}
