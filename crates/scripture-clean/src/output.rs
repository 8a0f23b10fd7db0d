use scripture_model::{ChapterRef, VerseRecord};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl WriteError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        WriteError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Write `contents` to `path` by way of a sibling temp file and a rename, so
/// readers only ever see the old file or the complete new one. Existing
/// files are replaced, never appended to.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), WriteError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| WriteError::io(parent, e))?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    if let Err(e) = fs::write(&tmp, contents) {
        let _ = fs::remove_file(&tmp);
        return Err(WriteError::io(&tmp, e));
    }
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        WriteError::io(path, e)
    })
}

/// Check that an output root exists (creating it if needed) and accepts
/// writes. Failing this is fatal for a whole run.
pub fn ensure_writable(dir: &Path) -> Result<(), WriteError> {
    fs::create_dir_all(dir).map_err(|e| WriteError::io(dir, e))?;
    let probe = dir.join(".write-probe");
    fs::write(&probe, b"ok").map_err(|e| WriteError::io(&probe, e))?;
    fs::remove_file(&probe).map_err(|e| WriteError::io(&probe, e))
}

/// File name of one chapter inside its book directory.
pub fn chapter_file_name(chapter: u16) -> String {
    format!("{chapter}.json")
}

/// Parse a chapter number back out of a file name written by this crate.
pub fn chapter_from_file_name(name: &str) -> Option<u16> {
    name.strip_suffix(".json")?.parse().ok()
}

/// Persists cleaned verse records, one JSON file per chapter under
/// `{output_dir}/cleaned/{version_code}/{BOOK}/{chapter}.json`.
#[derive(Debug, Clone)]
pub struct CleanWriter {
    root: PathBuf,
}

impl CleanWriter {
    pub fn new(output_dir: &Path, version_code: &str) -> Self {
        Self {
            root: output_dir.join("cleaned").join(version_code),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn chapter_path(&self, book: &str, chapter: u16) -> PathBuf {
        self.root.join(book).join(chapter_file_name(chapter))
    }

    /// Write one chapter's records as a pretty JSON array with a trailing
    /// newline. The same records always produce the same bytes.
    pub fn write(
        &self,
        chapter: &ChapterRef,
        records: &[VerseRecord],
    ) -> Result<PathBuf, WriteError> {
        let path = self.chapter_path(&chapter.book.code, chapter.chapter);
        let mut json = serde_json::to_string_pretty(records)
            .map_err(|source| WriteError::Serialize { path: path.clone(), source })?;
        json.push('\n');
        write_atomic(&path, json.as_bytes())?;
        tracing::debug!(path = %path.display(), verses = records.len(), "Wrote cleaned chapter");
        Ok(path)
    }

    pub fn read(&self, book: &str, chapter: u16) -> anyhow::Result<Vec<VerseRecord>> {
        read_chapter(&self.chapter_path(book, chapter))
    }
}

/// Load a cleaned chapter file.
pub fn read_chapter(path: &Path) -> anyhow::Result<Vec<VerseRecord>> {
    use anyhow::Context;
    let json =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let records = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scripture_model::Canon;

    fn records() -> Vec<VerseRecord> {
        [(1, "In the beginning"), (2, "And the earth")]
            .into_iter()
            .map(|(verse, text)| VerseRecord {
                book: "GEN".into(),
                chapter: 1,
                verse,
                text: text.into(),
            })
            .collect()
    }

    #[test]
    fn test_write_layout_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CleanWriter::new(dir.path(), "KJV");
        let chapter = Canon::protestant().chapter_ref("GEN", 1).unwrap();

        let path = writer.write(&chapter, &records()).unwrap();
        assert_eq!(path, dir.path().join("cleaned/KJV/GEN/1.json"));
        let first = fs::read(&path).unwrap();

        // Re-writing replaces rather than appends.
        writer.write(&chapter, &records()).unwrap();
        assert_eq!(fs::read(&path).unwrap(), first);
        assert!(first.ends_with(b"\n"));
        assert_eq!(writer.read("GEN", 1).unwrap(), records());

        // No temp file left behind.
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_chapter_file_names() {
        assert_eq!(chapter_file_name(12), "12.json");
        assert_eq!(chapter_from_file_name("12.json"), Some(12));
        assert_eq!(chapter_from_file_name("12.json.tmp"), None);
        assert_eq!(chapter_from_file_name("manifest.json"), None);
    }

    #[test]
    fn test_ensure_writable() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        ensure_writable(&nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(fs::read_dir(&nested).unwrap().count(), 0);
    }
}
