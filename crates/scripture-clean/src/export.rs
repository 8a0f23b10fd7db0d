//! Flat CSV export of a cleaned tree: one `{BOOK}.csv` per book with columns
//! `book,chapter,verse,text`, chapters in numeric order.

use crate::output::{chapter_from_file_name, read_chapter, write_atomic, CleanWriter};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Spreadsheet tools read the file as UTF-8 only with this mark.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvSummary {
    pub books: usize,
    pub rows: usize,
}

/// Directory the CSV files for `version_code` land in.
pub fn csv_root(output_dir: &Path, version_code: &str) -> PathBuf {
    output_dir.join("csv").join(version_code)
}

/// Write `{output_dir}/csv/{version_code}/{BOOK}.csv` for every book in the
/// cleaned tree. Existing files are replaced; the same cleaned tree always
/// produces the same bytes.
pub fn export_csv(output_dir: &Path, version_code: &str) -> Result<CsvSummary> {
    let cleaned = CleanWriter::new(output_dir, version_code);
    let out = csv_root(output_dir, version_code);
    let mut summary = CsvSummary::default();
    if !cleaned.root().is_dir() {
        tracing::warn!(root = %cleaned.root().display(), "No cleaned tree to export");
        return Ok(summary);
    }

    let mut books: Vec<PathBuf> = fs::read_dir(cleaned.root())
        .with_context(|| format!("Failed to list {}", cleaned.root().display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    books.sort();

    for dir in books {
        let Some(book) = dir.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        let mut chapters: Vec<(u16, PathBuf)> = fs::read_dir(&dir)
            .with_context(|| format!("Failed to list {}", dir.display()))?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                chapter_from_file_name(&name).map(|n| (n, e.path()))
            })
            .collect();
        if chapters.is_empty() {
            continue;
        }
        chapters.sort_by_key(|(n, _)| *n);

        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(UTF8_BOM.to_vec());
        writer.write_record(["book", "chapter", "verse", "text"])?;
        let mut rows = 0;
        for (_, path) in &chapters {
            for record in read_chapter(path)? {
                let chapter = record.chapter.to_string();
                let verse = record.verse.to_string();
                writer.write_record([
                    record.book.as_str(),
                    chapter.as_str(),
                    verse.as_str(),
                    record.text.as_str(),
                ])?;
                rows += 1;
            }
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to finish CSV for {book}: {}", e.error()))?;

        let path = out.join(format!("{book}.csv"));
        write_atomic(&path, &bytes)?;
        tracing::debug!(path = %path.display(), rows, "Wrote CSV");
        summary.books += 1;
        summary.rows += rows;
    }

    tracing::info!(
        books = summary.books,
        rows = summary.rows,
        dir = %out.display(),
        "Exported CSV"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scripture_model::{Canon, VerseRecord};

    fn record(chapter: u16, verse: u16, text: &str) -> VerseRecord {
        VerseRecord { book: "GEN".into(), chapter, verse, text: text.into() }
    }

    fn write(dir: &Path, chapter: u16, records: &[VerseRecord]) {
        let canon = Canon::protestant();
        CleanWriter::new(dir, "KJV")
            .write(&canon.chapter_ref("GEN", chapter).unwrap(), records)
            .unwrap();
    }

    #[test]
    fn test_chapters_in_numeric_order_with_quoting() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), 10, &[record(10, 1, "These are the generations")]);
        write(
            dir.path(),
            2,
            &[record(2, 1, "Thus the heavens"), record(2, 4, "He said, \"Let there be\"")],
        );

        let summary = export_csv(dir.path(), "KJV").unwrap();
        assert_eq!(summary, CsvSummary { books: 1, rows: 3 });

        let bytes = fs::read(dir.path().join("csv/KJV/GEN.csv")).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        assert_eq!(
            text,
            "book,chapter,verse,text\n\
             GEN,2,1,Thus the heavens\n\
             GEN,2,4,\"He said, \"\"Let there be\"\"\"\n\
             GEN,10,1,These are the generations\n"
        );
    }

    #[test]
    fn test_rerun_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), 1, &[record(1, 1, "In the beginning")]);

        export_csv(dir.path(), "KJV").unwrap();
        let first = fs::read(dir.path().join("csv/KJV/GEN.csv")).unwrap();
        export_csv(dir.path(), "KJV").unwrap();
        assert_eq!(fs::read(dir.path().join("csv/KJV/GEN.csv")).unwrap(), first);
    }

    #[test]
    fn test_missing_tree_exports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(export_csv(dir.path(), "KJV").unwrap(), CsvSummary::default());
        assert!(!dir.path().join("csv").exists());
    }
}
