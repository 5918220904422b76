//! Input enumeration: list the PDFs a batch run will process.
//!
//! The directory is read once, non-recursively, and entries are kept in the
//! order the file system returns them. No sorting is applied; the output
//! array follows the same order.

use crate::config::SuffixMatch;
use crate::error::Pdf2FieldsError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// List the entries of `dir` whose name passes the `.pdf` filter.
///
/// Directories named `*.pdf` are skipped. Under [`SuffixMatch::CaseSensitive`]
/// a warning is logged for every `*.PDF`-style name that was left out.
pub async fn list_pdf_files(
    dir: &Path,
    suffix_match: SuffixMatch,
) -> Result<Vec<PathBuf>, Pdf2FieldsError> {
    if !dir.is_dir() {
        return Err(Pdf2FieldsError::InputDirNotFound {
            path: dir.to_path_buf(),
        });
    }

    let unreadable = |source: std::io::Error| Pdf2FieldsError::InputDirUnreadable {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(unreadable)?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(unreadable)? {
        let name = entry.file_name().to_string_lossy().into_owned();

        if !suffix_match.matches(&name) {
            if SuffixMatch::IgnoreCase.matches(&name) {
                warn!(
                    "Skipping '{}': extension is not lowercase '.pdf' (use case-insensitive matching to include it)",
                    name
                );
            }
            continue;
        }

        let path = entry.path();
        // metadata() follows symlinks, so a link to a PDF still counts.
        if tokio::fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
            warn!("Skipping '{}': it is a directory", path.display());
            continue;
        }

        files.push(path);
    }

    debug!("Found {} PDF files in {}", files.len(), dir.display());
    Ok(files)
}
