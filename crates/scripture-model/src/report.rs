use crate::canon::ChapterRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure classes for a single chapter's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network or service trouble; retried with backoff before being recorded.
    Transient,
    /// The edition does not contain this chapter. Counted as skipped.
    NotFound,
    /// The response or its markup had an unexpected shape.
    Malformed,
    /// Local disk trouble while persisting this chapter.
    IoFailure,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Transient => "transient",
            FailureKind::NotFound => "not_found",
            FailureKind::Malformed => "malformed",
            FailureKind::IoFailure => "io_failure",
        };
        f.write_str(s)
    }
}

/// A chapter that ended without usable output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterFailure {
    pub book: String,
    pub chapter: u16,
    pub kind: FailureKind,
    pub message: String,
}

impl ChapterFailure {
    pub fn new(chapter: &ChapterRef, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            book: chapter.book.code.clone(),
            chapter: chapter.chapter,
            kind,
            message: message.into(),
        }
    }
}

/// How a run ended as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every chapter succeeded or was legitimately absent.
    Complete,
    /// At least one chapter ended in an unresolved failure.
    Incomplete,
    /// The build id stopped being honoured mid-run; aborted early.
    SessionExpired,
    /// Stopped by a cancel request.
    Cancelled,
}

/// Run-level summary, written next to the output trees and logged at the end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub version_code: String,
    pub build_id: String,
    pub canon: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped: usize,
    /// Chapters never attempted because the run was cancelled or aborted.
    pub not_attempted: usize,
    pub verses: usize,
    pub failed: Vec<ChapterFailure>,
    /// NotFound chapters, listed for reference; they are not failures.
    pub skipped_chapters: Vec<String>,
    pub session_expired: bool,
    pub cancelled: bool,
}

impl RunReport {
    pub fn new(version_code: &str, build_id: &str, canon: &str) -> Self {
        Self {
            version_code: version_code.to_string(),
            build_id: build_id.to_string(),
            canon: canon.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            attempted: 0,
            succeeded: 0,
            skipped: 0,
            not_attempted: 0,
            verses: 0,
            failed: Vec::new(),
            skipped_chapters: Vec::new(),
            session_expired: false,
            cancelled: false,
        }
    }

    pub fn record_success(&mut self, verses: usize) {
        self.attempted += 1;
        self.succeeded += 1;
        self.verses += verses;
    }

    pub fn record_skipped(&mut self, chapter: &ChapterRef) {
        self.attempted += 1;
        self.skipped += 1;
        self.skipped_chapters.push(chapter.to_string());
    }

    pub fn record_failure(&mut self, failure: ChapterFailure) {
        self.attempted += 1;
        self.failed.push(failure);
    }

    pub fn record_not_attempted(&mut self) {
        self.not_attempted += 1;
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn status(&self) -> RunStatus {
        if self.session_expired {
            RunStatus::SessionExpired
        } else if self.cancelled {
            RunStatus::Cancelled
        } else if !self.failed.is_empty() {
            RunStatus::Incomplete
        } else {
            RunStatus::Complete
        }
    }
}
