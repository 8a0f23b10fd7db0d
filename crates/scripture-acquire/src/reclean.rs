//! Cleaning-only pass: rebuild the cleaned tree from raw files on disk
//! without touching the network.

use crate::extract::{chapter_markup, Extractor};
use crate::output::RawWriter;
use anyhow::{bail, Context, Result};
use scripture_clean::output::ensure_writable;
use scripture_clean::{CleanWriter, Cleaner, RuleSet};
use scripture_model::{BookRef, Canon, ChapterRef};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanSummary {
    pub chapters: usize,
    pub verses: usize,
    /// `(chapter, reason)` for raw files that could not be re-extracted or written.
    pub failed: Vec<(String, String)>,
}

/// Re-run extraction and cleaning over `{output_dir}/raw/{version_code}`.
///
/// The locale and canon come from the run manifest; `locale` overrides the
/// manifest's. Chapters are processed in canonical order, and running the
/// pass twice over the same raw tree yields byte-identical output.
pub fn clean_tree(
    output_dir: &Path,
    version_code: &str,
    locale: Option<&str>,
    rules: Option<&RuleSet>,
) -> Result<CleanSummary> {
    let raw = RawWriter::new(output_dir, version_code);
    if !raw.root().is_dir() {
        bail!("No raw tree at {}; run a fetch first", raw.root().display());
    }
    let manifest = raw.read_manifest()?;

    let locale = match (locale, &manifest) {
        (Some(l), _) => l.to_string(),
        (None, Some(m)) => m.version.locale.clone(),
        (None, None) => bail!(
            "No manifest in {}; pass a locale explicitly",
            raw.root().display()
        ),
    };
    let canon = manifest.map(|m| m.canon);

    let mut cleaner = Cleaner::for_locale(&locale);
    if let Some(rules) = rules {
        cleaner = cleaner.with_rules(rules);
    }

    let cleaned = CleanWriter::new(output_dir, version_code);
    ensure_writable(cleaned.root()).context("Cleaned output root is not writable")?;

    let mut files = raw.list_chapters()?;
    if let Some(canon) = &canon {
        files.sort_by_key(|f| {
            let pos = canon
                .books
                .iter()
                .position(|b| b.code.eq_ignore_ascii_case(&f.book))
                .unwrap_or(usize::MAX);
            (pos, f.chapter)
        });
    }
    tracing::info!(
        version = version_code,
        locale = %locale,
        chapters = files.len(),
        "Cleaning raw tree"
    );

    let extractor = Extractor::new();
    let mut summary = CleanSummary::default();
    for file in files {
        let chapter = chapter_ref(canon.as_ref(), &file.book, file.chapter);
        let result = fs::read_to_string(&file.path)
            .map_err(|e| e.to_string())
            .and_then(|body| chapter_markup(&body).map_err(|e| e.to_string()))
            .and_then(|markup| {
                extractor
                    .extract_markup(&chapter, &markup)
                    .map_err(|e| e.to_string())
            });

        let fragments = match result {
            Ok(f) => f,
            Err(reason) => {
                tracing::warn!(chapter = %chapter, "Skipping raw chapter: {reason}");
                summary.failed.push((chapter.to_string(), reason));
                continue;
            }
        };

        let records: Vec<_> = fragments.iter().map(|f| cleaner.clean(f)).collect();
        match cleaned.write(&chapter, &records) {
            Ok(_) => {
                summary.chapters += 1;
                summary.verses += records.len();
            }
            Err(e) => {
                tracing::error!(chapter = %chapter, error = %e, "Failed to write cleaned chapter");
                summary.failed.push((chapter.to_string(), e.to_string()));
            }
        }
    }

    tracing::info!(
        chapters = summary.chapters,
        verses = summary.verses,
        failed = summary.failed.len(),
        "Cleaning finished"
    );
    Ok(summary)
}

/// Resolve a raw file's book directory against the canon, or stand in a
/// bare reference for books the canon does not list.
fn chapter_ref(canon: Option<&Canon>, book: &str, chapter: u16) -> ChapterRef {
    if let Some(r) = canon.and_then(|c| c.chapter_ref(book, chapter).ok()) {
        return r;
    }
    ChapterRef {
        book: BookRef {
            index: 0,
            code: book.to_string(),
            name: book.to_string(),
        },
        chapter,
    }
}
