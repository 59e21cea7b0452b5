//! Local source corpus gathered from the operator's project.
//!
//! The walk is iterative and bounded: it stops descending at `CorpusLimits::max_depth` and
//! keeps at most `CorpusLimits::max_bytes` of file content. Entry order follows the
//! operating system's directory listing and is not guaranteed to be stable.

use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::CorpusLimits;
use crate::error::AppError;

/// Directory names never descended into, matched by exact name at any depth.
pub const IGNORED_DIRECTORIES: &[&str] = &[
    "node_modules",
    "bower_components",
    "dist",
    "build",
    ".git",
    ".vscode",
];

/// One file of the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusEntry {
    /// Path relative to the corpus root, `/`-separated.
    pub path: String,
    pub bytes: Vec<u8>,
}

fn is_ignored_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| IGNORED_DIRECTORIES.contains(&name))
}

fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Walk `root` and read every regular file outside the ignored directories.
///
/// Symbolic links are resolved, so linked files and directories are part of the corpus.
///
/// Unreadable entries below the root are skipped with a warning; an unusable root is
/// `DirectoryUnreadable`.
pub fn collect_entries(root: &Path, limits: &CorpusLimits) -> Result<Vec<CorpusEntry>, AppError> {
    if !root.is_dir() {
        return Err(AppError::DirectoryUnreadable(root.to_path_buf()));
    }

    let mut entries = Vec::new();
    let mut total: u64 = 0;
    // Links are followed; walkdir reports link cycles as errors, which are skipped below.
    let walker = WalkDir::new(root)
        .follow_links(true)
        .max_depth(limits.max_depth)
        .into_iter()
        .filter_entry(|e| !is_ignored_dir(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable corpus entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        if total.saturating_add(size) > limits.max_bytes {
            warn!(
                path = %path.display(),
                size,
                budget = limits.max_bytes,
                "corpus byte budget exhausted, skipping file"
            );
            continue;
        }

        match std::fs::read(path) {
            Ok(bytes) => {
                total = total.saturating_add(bytes.len() as u64);
                entries.push(CorpusEntry {
                    path: relative_path(root, path),
                    bytes,
                });
            }
            Err(e) => warn!(path = %path.display(), error = %e, "failed to read corpus file"),
        }
    }

    Ok(entries)
}

/// Decode entries into `"<path>: <content>\n"` records.
///
/// Content is decoded lossily; binary files come through as replacement characters rather
/// than being skipped.
pub fn render_corpus(entries: &[CorpusEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&entry.path);
        out.push_str(": ");
        out.push_str(&String::from_utf8_lossy(&entry.bytes));
        out.push('\n');
    }
    out
}

/// Gather the corpus for `root` off the async runtime.
pub async fn collect_corpus(root: PathBuf, limits: CorpusLimits) -> Result<String, AppError> {
    let entries = tokio::task::spawn_blocking(move || collect_entries(&root, &limits))
        .await
        .map_err(|e| AppError::Io(std::io::Error::other(format!("corpus task failed: {e}"))))??;

    let corpus = render_corpus(&entries);
    info!(files = entries.len(), bytes = corpus.len(), "local corpus collected");
    Ok(corpus)
}
