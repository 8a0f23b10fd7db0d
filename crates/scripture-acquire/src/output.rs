use anyhow::{Context, Result};
use scripture_clean::output::{chapter_file_name, chapter_from_file_name, write_atomic};
use scripture_clean::WriteError;
use scripture_model::{Canon, Checkpoint, RawChapterPayload, RunReport, VersionConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Provenance for a raw tree: which edition and snapshot it came from and the
/// canon used to walk it. Lets the cleaning-only pass run with nothing but a
/// version code and output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    pub version: VersionConfig,
    pub route: String,
    pub canon: Canon,
}

/// A raw chapter file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChapterFile {
    pub book: String,
    pub chapter: u16,
    pub path: PathBuf,
}

/// Persists raw chapter responses verbatim under
/// `{output_dir}/raw/{version_code}/{BOOK}/{chapter}.json`, alongside the
/// run manifest and resume checkpoint.
#[derive(Debug, Clone)]
pub struct RawWriter {
    root: PathBuf,
}

impl RawWriter {
    pub fn new(output_dir: &Path, version_code: &str) -> Self {
        Self {
            root: output_dir.join("raw").join(version_code),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn chapter_path(&self, book: &str, chapter: u16) -> PathBuf {
        self.root.join(book).join(chapter_file_name(chapter))
    }

    pub fn write(&self, payload: &RawChapterPayload) -> Result<PathBuf, WriteError> {
        let path = self.chapter_path(&payload.chapter.book.code, payload.chapter.chapter);
        write_atomic(&path, payload.body.as_bytes())?;
        tracing::debug!(path = %path.display(), bytes = payload.body.len(), "Wrote raw chapter");
        Ok(path)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.json")
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.root.join("checkpoint.json")
    }

    pub fn write_manifest(&self, manifest: &RunManifest) -> Result<()> {
        let mut json = serde_json::to_string_pretty(manifest)?;
        json.push('\n');
        write_atomic(&self.manifest_path(), json.as_bytes())?;
        tracing::info!(path = %self.manifest_path().display(), "Wrote run manifest");
        Ok(())
    }

    pub fn read_manifest(&self) -> Result<Option<RunManifest>> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let manifest = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(manifest))
    }

    pub fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), WriteError> {
        let path = self.checkpoint_path();
        let json = serde_json::to_string_pretty(checkpoint)
            .map_err(|source| WriteError::Serialize { path: path.clone(), source })?;
        write_atomic(&path, json.as_bytes())
    }

    /// The saved checkpoint, or `None` if no run has written one yet.
    pub fn load_checkpoint(&self) -> Result<Option<Checkpoint>> {
        let path = self.checkpoint_path();
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let checkpoint = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(checkpoint))
    }

    /// Every chapter file in the raw tree. Book directories are returned in
    /// name order and chapters numerically; callers with a canon re-sort.
    pub fn list_chapters(&self) -> Result<Vec<RawChapterFile>> {
        let mut files = Vec::new();
        if !self.root.is_dir() {
            return Ok(files);
        }

        let mut books: Vec<_> = fs::read_dir(&self.root)
            .with_context(|| format!("Failed to list {}", self.root.display()))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .collect();
        books.sort_by_key(|e| e.file_name());

        for book_dir in books {
            let book = book_dir.file_name().to_string_lossy().to_string();
            let mut chapters: Vec<RawChapterFile> = fs::read_dir(book_dir.path())?
                .filter_map(|e| e.ok())
                .filter_map(|e| {
                    let chapter = chapter_from_file_name(&e.file_name().to_string_lossy())?;
                    Some(RawChapterFile {
                        book: book.clone(),
                        chapter,
                        path: e.path(),
                    })
                })
                .collect();
            chapters.sort_by_key(|c| c.chapter);
            files.extend(chapters);
        }
        Ok(files)
    }
}

/// Path of the run report for an edition.
pub fn report_path(output_dir: &Path, version_code: &str) -> PathBuf {
    output_dir.join(format!("{version_code}.report.json"))
}

pub fn write_report(output_dir: &Path, report: &RunReport) -> Result<PathBuf> {
    let path = report_path(output_dir, &report.version_code);
    let mut json = serde_json::to_string_pretty(report)?;
    json.push('\n');
    write_atomic(&path, json.as_bytes())?;
    tracing::info!(path = %path.display(), "Wrote run report");
    Ok(path)
}
