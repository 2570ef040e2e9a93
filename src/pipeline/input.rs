//! Input loading: read a user-supplied PDF into a [`SourceFile`].
//!
//! The `%PDF` magic bytes are checked up front so that a mislabelled file is
//! rejected when it is added, not minutes later when the renderer chokes.

use crate::error::Pdf2MdError;
use crate::queue::SourceFile;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const PDF_MIME: &str = "application/pdf";

/// Reject `bytes` unless they start with `%PDF`.
pub fn check_magic(path: &Path, bytes: &[u8]) -> Result<(), Pdf2MdError> {
    if bytes.len() >= 4 && &bytes[..4] == b"%PDF" {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    Err(Pdf2MdError::NotAPdf {
        path: path.to_path_buf(),
        magic,
    })
}

/// Read a whole PDF from disk.
pub async fn read_pdf_bytes(path: &Path) -> Result<Vec<u8>, Pdf2MdError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        ErrorKind::PermissionDenied => Pdf2MdError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => Pdf2MdError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;
    check_magic(path, &bytes)?;
    Ok(bytes)
}

/// Load `path` as a queueable source file, remembering where it came from.
pub async fn read_pdf(path: impl AsRef<Path>) -> Result<SourceFile, Pdf2MdError> {
    let path = path.as_ref();
    let bytes = read_pdf_bytes(path).await?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string());

    let source_path = std::fs::canonicalize(path).unwrap_or_else(|_| PathBuf::from(path));
    debug!("Loaded {} ({} bytes)", source_path.display(), bytes.len());
    Ok(SourceFile::from_bytes(name, bytes).with_path(source_path))
}
