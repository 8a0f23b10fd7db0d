use anyhow::Result;
use scripture_acquire::extract::{chapter_markup, Extractor};
use scripture_acquire::RawWriter;
use scripture_clean::output::read_chapter;
use scripture_clean::CleanWriter;
use scripture_model::{BookRef, Canon, ChapterRef, VerseRecord};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{chapter}: raw chapter has no cleaned counterpart")]
    MissingCleaned { chapter: String },

    #[error("{chapter}: {cleaned} cleaned verses but {raw} fragments in the raw markup")]
    CountMismatch { chapter: String, cleaned: usize, raw: usize },

    #[error("{chapter}: verse {verse} does not follow verse {previous}")]
    VersesUnordered { chapter: String, previous: u16, verse: u16 },

    #[error("{chapter}:{verse}: record carries the wrong reference ({found})")]
    WrongReference { chapter: String, verse: u16, found: String },

    #[error("{chapter}:{verse}: empty verse text")]
    EmptyText { chapter: String, verse: u16 },

    #[error("{chapter}:{verse}: residual markup in '{text}'")]
    ResidualMarkup { chapter: String, verse: u16, text: String },

    #[error("{chapter}:{verse}: footnote or verse-number glyph in '{text}'")]
    ResidualMarker { chapter: String, verse: u16, text: String },

    #[error("{chapter}: {message}")]
    Unreadable { chapter: String, message: String },
}

const MARKER_GLYPHS: &str = "⁰¹²³⁴⁵⁶⁷⁸⁹";

/// Check the cleaned tree for `version_code` against its raw tree.
///
/// Returns every problem found; an empty list means the tree is valid.
/// Errors are only returned when the trees cannot be read at all.
pub fn validate_tree(output_dir: &Path, version_code: &str) -> Result<Vec<ValidationError>> {
    let raw = RawWriter::new(output_dir, version_code);
    let cleaned = CleanWriter::new(output_dir, version_code);
    if !raw.root().is_dir() {
        anyhow::bail!("No raw tree at {}", raw.root().display());
    }
    let canon = raw.read_manifest()?.map(|m| m.canon);
    let extractor = Extractor::new();

    let mut errors = Vec::new();
    let files = raw.list_chapters()?;
    for file in &files {
        let chapter = chapter_ref(canon.as_ref(), &file.book, file.chapter);
        let cleaned_path = cleaned.chapter_path(&file.book, file.chapter);
        if !cleaned_path.exists() {
            errors.push(ValidationError::MissingCleaned {
                chapter: chapter.to_string(),
            });
            continue;
        }

        let records = match read_chapter(&cleaned_path) {
            Ok(r) => r,
            Err(e) => {
                errors.push(ValidationError::Unreadable {
                    chapter: chapter.to_string(),
                    message: format!("{e:#}"),
                });
                continue;
            }
        };

        let fragments = std::fs::read_to_string(&file.path)
            .map_err(|e| e.to_string())
            .and_then(|body| chapter_markup(&body).map_err(|e| e.to_string()))
            .and_then(|markup| {
                extractor
                    .extract_markup(&chapter, &markup)
                    .map_err(|e| e.to_string())
            });
        match fragments {
            Ok(fragments) if fragments.len() != records.len() => {
                errors.push(ValidationError::CountMismatch {
                    chapter: chapter.to_string(),
                    cleaned: records.len(),
                    raw: fragments.len(),
                });
            }
            Ok(_) => {}
            Err(message) => errors.push(ValidationError::Unreadable {
                chapter: chapter.to_string(),
                message,
            }),
        }

        errors.extend(validate_records(&chapter, &records));
    }

    if errors.is_empty() {
        tracing::info!(version = version_code, chapters = files.len(), "Cleaned tree is valid");
    } else {
        for e in &errors {
            tracing::warn!("{e}");
        }
    }
    Ok(errors)
}

/// Structural checks on one cleaned chapter.
pub fn validate_records(chapter: &ChapterRef, records: &[VerseRecord]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let name = chapter.to_string();
    let mut previous: Option<u16> = None;

    for record in records {
        let same_book = record.book.eq_ignore_ascii_case(&chapter.book.code);
        if !same_book || record.chapter != chapter.chapter {
            errors.push(ValidationError::WrongReference {
                chapter: name.clone(),
                verse: record.verse,
                found: format!("{}.{}", record.book, record.chapter),
            });
        }
        if let Some(prev) = previous {
            if record.verse <= prev {
                errors.push(ValidationError::VersesUnordered {
                    chapter: name.clone(),
                    previous: prev,
                    verse: record.verse,
                });
            }
        }
        previous = Some(record.verse);

        let text = record.text.as_str();
        if text.trim().is_empty() {
            errors.push(ValidationError::EmptyText {
                chapter: name.clone(),
                verse: record.verse,
            });
        }
        if has_markup(text) {
            errors.push(ValidationError::ResidualMarkup {
                chapter: name.clone(),
                verse: record.verse,
                text: text.to_string(),
            });
        }
        if text.chars().any(|c| MARKER_GLYPHS.contains(c)) {
            errors.push(ValidationError::ResidualMarker {
                chapter: name.clone(),
                verse: record.verse,
                text: text.to_string(),
            });
        }
    }
    errors
}

/// A `<` that opens a tag, or an HTML entity reference.
fn has_markup(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.windows(2).any(|w| w[0] == b'<' && (w[1].is_ascii_alphabetic() || w[1] == b'/'))
        || ["&amp;", "&lt;", "&gt;", "&quot;", "&nbsp;", "&#"].iter().any(|e| text.contains(e))
}

fn chapter_ref(canon: Option<&Canon>, book: &str, chapter: u16) -> ChapterRef {
    canon
        .and_then(|c| c.chapter_ref(book, chapter).ok())
        .unwrap_or_else(|| ChapterRef {
            book: BookRef {
                index: 0,
                code: book.to_string(),
                name: book.to_string(),
            },
            chapter,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gen1() -> ChapterRef {
        Canon::protestant().chapter_ref("GEN", 1).unwrap()
    }

    fn record(verse: u16, text: &str) -> VerseRecord {
        VerseRecord {
            book: "GEN".into(),
            chapter: 1,
            verse,
            text: text.into(),
        }
    }

    fn chapter_json(verses: &[(u16, &str)]) -> String {
        let mut html = String::from(r#"<div class="p">"#);
        for (v, text) in verses {
            html.push_str(&format!(
                r#"<span class="verse v{v}" data-usfm="GEN.1.{v}"><span class="label">{v}</span>"#
            ));
            html.push_str(&format!(r#"<span class="content">{text}</span></span>"#));
        }
        html.push_str("</div>");
        serde_json::json!({"pageProps": {"chapterInfo": {"content": html}}}).to_string()
    }

    fn seed(dir: &Path, raw_verses: &[(u16, &str)], cleaned: Option<&[VerseRecord]>) {
        let raw = RawWriter::new(dir, "KJV");
        let path = raw.chapter_path("GEN", 1);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, chapter_json(raw_verses)).unwrap();
        if let Some(records) = cleaned {
            CleanWriter::new(dir, "KJV").write(&gen1(), records).unwrap();
        }
    }

    #[test]
    fn test_valid_records() {
        let records = vec![
            record(1, "In the beginning"),
            record(3, "And God said, \"Let there be light\""),
        ];
        assert!(validate_records(&gen1(), &records).is_empty());
    }

    #[test]
    fn test_unordered_and_empty() {
        let records = vec![record(2, "b"), record(2, "  "), record(1, "a")];
        let errors = validate_records(&gen1(), &records);
        let unordered = |verse| ValidationError::VersesUnordered {
            chapter: "GEN.1".into(),
            previous: 2,
            verse,
        };
        assert!(errors.contains(&unordered(2)));
        assert!(errors.contains(&unordered(1)));
        assert!(errors.contains(&ValidationError::EmptyText { chapter: "GEN.1".into(), verse: 2 }));
    }

    #[test]
    fn test_residue_detected() {
        let records = vec![
            record(1, "In the <i>beginning</i>"),
            record(2, "God¹ created"),
            record(3, "x &amp; y"),
        ];
        let errors = validate_records(&gen1(), &records);
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0], ValidationError::ResidualMarkup { verse: 1, .. }));
        assert!(matches!(errors[1], ValidationError::ResidualMarker { verse: 2, .. }));
        assert!(matches!(errors[2], ValidationError::ResidualMarkup { verse: 3, .. }));
        // A bare comparison sign is text, not markup.
        assert!(validate_records(&gen1(), &[record(1, "a < b")]).is_empty());
    }

    #[test]
    fn test_tree_count_mismatch_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), &[(1, "a"), (2, "b")], Some(&[record(1, "a")]));
        let errors = validate_tree(dir.path(), "KJV").unwrap();
        assert_eq!(
            errors,
            vec![ValidationError::CountMismatch { chapter: "GEN.1".into(), cleaned: 1, raw: 2 }]
        );

        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), &[(1, "a")], None);
        let errors = validate_tree(dir.path(), "KJV").unwrap();
        assert_eq!(errors, vec![ValidationError::MissingCleaned { chapter: "GEN.1".into() }]);
    }

    #[test]
    fn test_tree_valid() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), &[(1, "a"), (2, "b")], Some(&[record(1, "a"), record(2, "b")]));
        assert!(validate_tree(dir.path(), "KJV").unwrap().is_empty());
    }
}
