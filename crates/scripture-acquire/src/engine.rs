use crate::cancel::CancelSignal;
use crate::client::{ContentClient, FetchError};
use crate::extract::Extractor;
use crate::limiter::RateLimiter;
use crate::output::{self, RawWriter, RunManifest};
use crate::policy::FetchPolicy;
use crate::transport::Transport;
use anyhow::{Context, Result};
use futures_util::StreamExt;
use scripture_clean::output::ensure_writable;
use scripture_clean::{CleanWriter, Cleaner};
use scripture_model::{
    Canon, ChapterFailure, ChapterRef, Checkpoint, FailureKind, RunReport, VersionConfig,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Per-run shared state, built once and passed explicitly to every fetch.
#[derive(Debug)]
pub struct RunContext {
    pub config: VersionConfig,
    pub limiter: RateLimiter,
    pub cancel: Arc<CancelSignal>,
}

impl RunContext {
    pub fn new(config: VersionConfig, policy: &FetchPolicy) -> Self {
        Self {
            config,
            limiter: RateLimiter::new(policy.workers, policy.min_interval),
            cancel: Arc::new(CancelSignal::new()),
        }
    }

    /// Share an externally owned cancel signal (e.g. wired to Ctrl-C).
    pub fn with_cancel(mut self, cancel: Arc<CancelSignal>) -> Self {
        self.cancel = cancel;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub output_dir: PathBuf,
    /// Continue from the saved checkpoint instead of the first chapter.
    pub resume: bool,
    pub route: String,
}

/// How one chapter's fetch → extract → write → clean → write pipeline ended.
#[derive(Debug)]
enum ChapterOutcome {
    Success { verses: usize },
    NotFound(String),
    Failed(FailureKind, String),
    Cancelled,
}

impl ChapterOutcome {
    /// Outcomes that look like a dead session when they pile up.
    fn is_session_symptom(&self) -> bool {
        matches!(
            self,
            ChapterOutcome::NotFound(_)
                | ChapterOutcome::Failed(FailureKind::Malformed, _)
                | ChapterOutcome::Failed(FailureKind::Transient, _)
        )
    }
}

struct Pipeline<'a, T> {
    client: &'a ContentClient<T>,
    ctx: &'a RunContext,
    extractor: Extractor,
    cleaner: &'a Cleaner,
    raw: RawWriter,
    cleaned: CleanWriter,
}

impl<T: Transport> Pipeline<'_, T> {
    async fn process(&self, chapter: &ChapterRef) -> ChapterOutcome {
        if self.ctx.cancel.is_cancelled() {
            return ChapterOutcome::Cancelled;
        }

        let policy = self.client.policy();
        let mut malformed_retries = 0;
        let (payload, fragments) = loop {
            let payload = match self.client.fetch(chapter, self.ctx).await {
                Ok(p) => p,
                Err(FetchError::Malformed(msg)) if malformed_retries < policy.malformed_retries => {
                    malformed_retries += 1;
                    tracing::warn!(chapter = %chapter, "{msg}; refetching once");
                    continue;
                }
                Err(FetchError::Cancelled) => return ChapterOutcome::Cancelled,
                Err(FetchError::NotFound(msg)) => return ChapterOutcome::NotFound(msg),
                Err(e) => {
                    let kind = e.kind().unwrap_or(FailureKind::Transient);
                    return ChapterOutcome::Failed(kind, e.to_string());
                }
            };
            match self.extractor.extract(&payload) {
                Ok(fragments) => break (payload, fragments),
                Err(e) if malformed_retries < policy.malformed_retries => {
                    malformed_retries += 1;
                    tracing::warn!(
                        chapter = %chapter,
                        error = %e,
                        "Unparseable chapter; refetching once"
                    );
                }
                Err(e) => return ChapterOutcome::Failed(FailureKind::Malformed, e.to_string()),
            }
        };

        if let Err(e) = self.raw.write(&payload) {
            return ChapterOutcome::Failed(FailureKind::IoFailure, e.to_string());
        }

        let records: Vec<_> = fragments.iter().map(|f| self.cleaner.clean(f)).collect();
        if let Err(e) = self.cleaned.write(chapter, &records) {
            return ChapterOutcome::Failed(FailureKind::IoFailure, e.to_string());
        }
        ChapterOutcome::Success { verses: records.len() }
    }

    /// Re-request a chapter that worked earlier in the run. If it no longer
    /// does, the build id has gone stale.
    async fn session_alive(&self, probe: &ChapterRef) -> bool {
        match self.client.fetch_once(probe, self.ctx).await {
            Ok(payload) => self.extractor.extract(&payload).is_ok(),
            Err(e) => {
                tracing::warn!(chapter = %probe, error = %e, "Session probe failed");
                false
            }
        }
    }
}

/// Fetch and clean every chapter of `canon`.
///
/// Chapters run through a bounded pool of `FetchPolicy::workers` concurrent
/// pipelines; results are consumed, logged and checkpointed in canonical
/// order. A per-chapter failure is recorded and the run continues. An
/// unwritable output root, a bad checkpoint, or a failed manifest write are
/// fatal and returned as errors.
pub async fn run_fetch<T: Transport>(
    client: &ContentClient<T>,
    ctx: &RunContext,
    canon: &Canon,
    cleaner: &Cleaner,
    options: &RunOptions,
) -> Result<RunReport> {
    let config = &ctx.config;
    let raw = RawWriter::new(&options.output_dir, &config.version_code);
    let cleaned = CleanWriter::new(&options.output_dir, &config.version_code);
    ensure_writable(raw.root()).context("Raw output root is not writable")?;
    ensure_writable(cleaned.root()).context("Cleaned output root is not writable")?;

    raw.write_manifest(&RunManifest {
        version: config.clone(),
        route: options.route.clone(),
        canon: canon.clone(),
    })?;

    let saved = if options.resume { raw.load_checkpoint()? } else { None };
    let chapters = match &saved {
        Some(checkpoint) => {
            tracing::info!(next = ?checkpoint.next, "Resuming from checkpoint");
            canon.chapters_from(checkpoint)?
        }
        None => {
            if options.resume {
                tracing::info!("No checkpoint found; starting from the beginning");
            }
            canon.chapters()
        }
    };

    let total = chapters.size_hint().0;
    let policy = client.policy();
    tracing::info!(
        version = %config.version_code,
        build_id = %config.build_id,
        canon = %canon.name,
        chapters = total,
        workers = policy.workers,
        "Starting fetch"
    );

    let pipeline = Pipeline {
        client,
        ctx,
        extractor: Extractor::new(),
        cleaner,
        raw: raw.clone(),
        cleaned,
    };

    let mut report = RunReport::new(&config.version_code, &config.build_id, &canon.name);
    // Position of the first unresolved chapter; the checkpoint never moves
    // past it.
    let mut frontier: Option<usize> = None;
    let mut streak = 0usize;
    // First chapter of the current failure streak, with its position.
    let mut streak_start: Option<(usize, ChapterRef)> = None;
    let mut last_success: Option<ChapterRef> = None;
    let mut position = 0usize;

    let worker = &pipeline;
    let results = futures_util::stream::iter(chapters)
        .map(move |chapter| async move {
            let outcome = worker.process(&chapter).await;
            (chapter, outcome)
        })
        .buffered(policy.workers.max(1));
    let mut results = std::pin::pin!(results);

    while let Some((chapter, outcome)) = results.next().await {
        position += 1;
        let resolved = matches!(
            outcome,
            ChapterOutcome::Success { .. } | ChapterOutcome::NotFound(_)
        );

        if outcome.is_session_symptom() {
            if streak == 0 {
                streak_start = Some((position, chapter.clone()));
            }
            streak += 1;
        } else if matches!(outcome, ChapterOutcome::Success { .. }) {
            streak = 0;
            streak_start = None;
        }

        match &outcome {
            ChapterOutcome::Success { verses } => {
                tracing::info!(
                    position,
                    total,
                    chapter = %chapter,
                    verses = *verses,
                    "Saved chapter"
                );
                report.record_success(*verses);
                last_success = Some(chapter.clone());
            }
            ChapterOutcome::NotFound(msg) => {
                tracing::info!(
                    position,
                    total,
                    chapter = %chapter,
                    "Not in this edition ({msg}); skipped"
                );
                report.record_skipped(&chapter);
            }
            ChapterOutcome::Failed(kind, msg) => {
                tracing::error!(position, total, chapter = %chapter, kind = %kind, "{msg}");
                report.record_failure(ChapterFailure::new(&chapter, *kind, msg.clone()));
            }
            ChapterOutcome::Cancelled => {
                report.record_not_attempted();
            }
        }

        // The checkpoint only advances across a contiguous prefix of
        // resolved chapters, so a resume re-fetches the first failure.
        if frontier.is_none() {
            if resolved {
                save_checkpoint(&raw, &canon.checkpoint_after(&chapter));
            } else {
                frontier = Some(position);
                save_checkpoint(&raw, &Checkpoint::at(&chapter));
            }
        }

        if streak >= policy.session_failure_threshold && !report.session_expired {
            let alive = match &last_success {
                Some(probe) => {
                    tracing::warn!(
                        streak,
                        probe = %probe,
                        "Unusual run of failed chapters; checking session"
                    );
                    pipeline.session_alive(probe).await
                }
                None => false,
            };
            if alive {
                tracing::info!(streak, "Session still valid; treating the run as absent content");
                streak = 0;
                streak_start = None;
            } else {
                tracing::error!(
                    streak,
                    build_id = %config.build_id,
                    "Build id no longer accepted; aborting run. Fetch a fresh build id and resume"
                );
                report.session_expired = true;
                ctx.cancel.cancel();

                // NotFound answers inside the streak came from the stale
                // session, so a resume must fetch them again.
                if let Some((start, first)) = &streak_start {
                    if frontier.map_or(true, |f| f > *start) {
                        frontier = Some(*start);
                        save_checkpoint(&raw, &Checkpoint::at(first));
                    }
                }
            }
        }
    }

    report.cancelled = ctx.cancel.is_cancelled() && !report.session_expired;
    report.finish();
    log_summary(&report);
    output::write_report(&options.output_dir, &report)?;
    Ok(report)
}

fn save_checkpoint(raw: &RawWriter, checkpoint: &Checkpoint) {
    if let Err(e) = raw.save_checkpoint(checkpoint) {
        tracing::warn!(error = %e, "Could not save checkpoint");
    }
}

fn log_summary(report: &RunReport) {
    tracing::info!(
        attempted = report.attempted,
        succeeded = report.succeeded,
        skipped = report.skipped,
        failed = report.failed.len(),
        not_attempted = report.not_attempted,
        verses = report.verses,
        status = ?report.status(),
        "Run finished"
    );
    for failure in &report.failed {
        tracing::warn!(
            book = %failure.book,
            chapter = failure.chapter,
            kind = %failure.kind,
            "Failed: {}",
            failure.message
        );
    }
}
