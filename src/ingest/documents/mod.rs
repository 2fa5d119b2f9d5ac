// Corpus discovery: walks a directory tree and loads matching text files


use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

use crate::ingest::normalize::prepare_document;

/// A source document ready for chunking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Path relative to the corpus root, with `/` separators
    pub id: String,
    pub file_name: String,
    /// Normalized text
    pub text: String,
}

impl Document {
    /// Build a document from raw text, normalizing it
    #[inline]
    pub fn from_raw(id: impl Into<String>, file_name: impl Into<String>, raw: &str) -> Self {
        Self {
            id: id.into(),
            file_name: file_name.into(),
            text: prepare_document(raw),
        }
    }
}

/// Load every file under `root` whose extension is in `extensions`.
///
/// The walk is recursive and sorted so ids come out in a stable order.
/// Unreadable files and files with no text after normalization are skipped.
#[inline]
pub fn read_documents(root: &Path, extensions: &[String]) -> Result<Vec<Document>> {
    if !root.is_dir() {
        bail!("Documents directory does not exist: {}", root.display());
    }
    info!("Loading documents from {}", root.display());

    let mut files = Vec::new();
    collect_files(root, &mut files)
        .with_context(|| format!("Failed to scan {}", root.display()))?;
    files.sort();

    let mut documents = Vec::new();
    let mut matched = 0_usize;
    for path in files {
        if !has_extension(&path, extensions) {
            continue;
        }
        matched += 1;

        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Skipping unreadable file {}: {}", path.display(), e);
                continue;
            }
        };

        let id = document_id(root, &path);
        let file_name = path
            .file_name()
            .map_or_else(|| id.clone(), |n| n.to_string_lossy().into_owned());
        let document = Document::from_raw(id, file_name, &raw);
        if document.text.is_empty() {
            warn!("No content found in {}", path.display());
            continue;
        }

        debug!(
            "Loaded {} ({} characters)",
            document.id,
            document.text.chars().count()
        );
        documents.push(document);
    }

    info!(
        "Loaded {}/{} matching files from {}",
        documents.len(),
        matched,
        root.display()
    );
    Ok(documents)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&entry.path(), files)?;
        } else if file_type.is_file() {
            files.push(entry.path());
        }
    }
    Ok(())
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            extensions
                .iter()
                .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
        })
}

fn document_id(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
