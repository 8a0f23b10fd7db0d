use crate::canon::ChapterRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One chapter response body, exactly as the service returned it.
#[derive(Debug, Clone)]
pub struct RawChapterPayload {
    pub chapter: ChapterRef,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

/// Raw, unnormalized text of a single verse as sliced out of chapter markup.
///
/// `raw_text` still carries inline markup (footnotes, cross-references,
/// character styles); stripping it is the cleaner's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerseFragment {
    pub chapter: ChapterRef,
    pub verse: u16,
    pub raw_text: String,
}

/// The canonical output unit: one verse of markup-free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerseRecord {
    /// USFM book code (e.g., "GEN").
    pub book: String,
    pub chapter: u16,
    pub verse: u16,
    pub text: String,
}
