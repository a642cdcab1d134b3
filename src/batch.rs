//! Batch shrinking.
//!
//! Runs the planner over a list of source videos and drives the transcoder
//! for each one:
//!
//! ```text
//! probe → plan → cache lookup → transcode (or reuse) → record
//! ```
//!
//! ## Jobs and status
//!
//! Every source becomes a [`BatchJob`]: the immutable input path plus a
//! [`StatusCell`] any observer can snapshot while the batch runs. A job moves
//! `Pending → Processing → Done | Failed` and never back.
//!
//! ## Failure isolation
//!
//! A job that fails (unreadable media, degenerate geometry, transcoder
//! error, cancellation) ends in [`JobStatus::Failed`] and the rest of the
//! batch carries on. Only problems with the output directory itself abort
//! the whole run.
//!
//! ## Output naming
//!
//! `clip.mov` shrunk by 50% with suffix `pct` becomes `clip-50pct.mp4` in
//! the output directory. Sources sharing a stem get `-2`, `-3`, ... in input
//! order so no two jobs write the same file.
//!
//! ## Parallel Processing
//!
//! Jobs run in parallel using [rayon](https://docs.rs/rayon). The pool size
//! comes from `[processing] max_processes`; see
//! [`effective_threads`](crate::config::effective_threads).

use crate::cache::{self, CacheManifest, CacheStats};
use crate::config::ShrinkConfig;
use crate::planner::{
    BackendError, CancelFlag, Dimensions, ExportPreset, PlanError, PlanSettings, TranscodeParams,
    VideoBackend, VideoPlan, batch_total, plan_transcode, plan_video, probe_video,
    transcode_video,
};
use rayon::prelude::*;
use serde::Serialize;
use std::cell::Cell;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a single job failed.
#[derive(Error, Debug)]
pub enum ItemError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a finished job got its output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    /// Output already on disk from an earlier run.
    Cached,
    /// Earlier output copied under a new name.
    Copied,
    /// Freshly encoded.
    Transcoded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing {
        progress: f32,
    },
    Done {
        output: PathBuf,
        bytes: u64,
        export: ExportStatus,
    },
    Failed {
        error: String,
    },
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Failed { .. })
    }
}

/// Shared, lockable [`JobStatus`].
#[derive(Debug)]
pub struct StatusCell(Mutex<JobStatus>);

impl StatusCell {
    pub fn new(status: JobStatus) -> Self {
        Self(Mutex::new(status))
    }

    /// Copy of the current status.
    pub fn get(&self) -> JobStatus {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replace the status. Finished states are final and ignore updates.
    pub fn set(&self, status: JobStatus) {
        let mut current = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if !current.is_finished() {
            *current = status;
        }
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new(JobStatus::Pending)
    }
}

/// One source video in a batch.
#[derive(Debug)]
pub struct BatchJob {
    pub source: PathBuf,
    status: StatusCell,
}

impl BatchJob {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            status: StatusCell::default(),
        }
    }

    /// Snapshot of the job's status.
    pub fn status(&self) -> JobStatus {
        self.status.get()
    }

    fn set_status(&self, status: JobStatus) {
        self.status.set(status);
    }
}

/// Build pending jobs from a list of sources.
pub fn jobs_from_sources(sources: &[PathBuf]) -> Vec<BatchJob> {
    sources.iter().map(BatchJob::new).collect()
}

/// Everything a batch needs besides its jobs.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub reduction_percent: f64,
    pub settings: PlanSettings,
    pub preset: ExportPreset,
    pub output_dir: PathBuf,
    pub suffix: String,
    pub use_cache: bool,
}

impl BatchOptions {
    pub fn from_config(
        config: &ShrinkConfig,
        reduction_percent: f64,
        output_dir: impl Into<PathBuf>,
        use_cache: bool,
    ) -> Self {
        Self {
            reduction_percent,
            settings: config.plan_settings(),
            preset: config.export.preset,
            output_dir: output_dir.into(),
            suffix: config.export.suffix.clone(),
            use_cache,
        }
    }
}

/// Progress notifications sent while a batch runs.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    Started {
        source: PathBuf,
        canvas: Dimensions,
        predicted_bytes: u64,
    },
    /// Sent when a job crosses another tenth of its transcode.
    Progress { source: PathBuf, progress: f32 },
    Finished {
        source: PathBuf,
        output: PathBuf,
        bytes: u64,
        status: ExportStatus,
    },
    Failed { source: PathBuf, error: String },
}

/// Outcome of one job.
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub source: PathBuf,
    pub original_bytes: Option<u64>,
    pub predicted_bytes: Option<u64>,
    pub status: JobStatus,
}

/// Result of [`run_batch`].
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub reduction_percent: f64,
    pub items: Vec<ItemReport>,
    /// Sum of the predictions of every job that could be planned.
    pub predicted_total: u64,
    /// Sum of the sizes of the files actually produced.
    pub actual_total: u64,
    pub cache: CacheStats,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.status, JobStatus::Done { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }
}

/// Percentages print without a trailing `.0`: 50 → "50", 42.5 → "42.5".
pub fn format_percent(percent: f64) -> String {
    if percent.fract() == 0.0 {
        format!("{percent:.0}")
    } else {
        format!("{percent}")
    }
}

/// `<stem>-<percent><suffix>.mp4`
pub fn output_file_name(source: &Path, reduction_percent: f64, suffix: &str) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    format!("{stem}-{}{suffix}.mp4", format_percent(reduction_percent))
}

/// Output names for every job, unique within the batch.
fn assign_output_names(jobs: &[BatchJob], options: &BatchOptions) -> Vec<String> {
    let mut taken = HashSet::new();
    jobs.iter()
        .map(|job| {
            let base = output_file_name(&job.source, options.reduction_percent, &options.suffix);
            let mut name = base.clone();
            let mut n = 2;
            while !taken.insert(name.clone()) {
                let stem = base.trim_end_matches(".mp4");
                name = format!("{stem}-{n}.mp4");
                n += 1;
            }
            name
        })
        .collect()
}

/// Shrink every job, in parallel, writing into `options.output_dir`.
///
/// Each job's status cell is updated as it runs; `events`, when given,
/// receives the same information as [`BatchEvent`]s. Once `cancel` is set,
/// running transcodes stop and jobs that have not started fail as cancelled.
pub fn run_batch(
    backend: &impl VideoBackend,
    jobs: &[BatchJob],
    options: &BatchOptions,
    events: Option<Sender<BatchEvent>>,
    cancel: &CancelFlag,
) -> Result<BatchReport, BatchError> {
    std::fs::create_dir_all(&options.output_dir)?;

    let manifest = if options.use_cache {
        CacheManifest::load(&options.output_dir)
    } else {
        CacheManifest::empty()
    };
    if options.use_cache && !manifest.is_empty() {
        debug!(entries = manifest.len(), "loaded cache manifest");
    }
    let manifest = Mutex::new(manifest);
    let stats = Mutex::new(CacheStats::default());
    let names = assign_output_names(jobs, options);
    let assigned: HashSet<&str> = names.iter().map(String::as_str).collect();

    info!(
        jobs = jobs.len(),
        reduction = options.reduction_percent,
        output = %options.output_dir.display(),
        "starting batch"
    );

    let ctx = JobContext {
        backend,
        options,
        manifest: &manifest,
        stats: &stats,
        assigned: &assigned,
        events: events.as_ref(),
        cancel,
    };

    let items: Vec<ItemReport> = jobs
        .par_iter()
        .zip(names.par_iter())
        .map(|(job, name)| ctx.run(job, name))
        .collect();

    let manifest = manifest.into_inner().unwrap_or_else(|e| e.into_inner());
    if let Err(e) = manifest.save(&options.output_dir) {
        warn!(error = %e, "could not save cache manifest");
    }
    let cache = stats.into_inner().unwrap_or_else(|e| e.into_inner());

    let report = BatchReport {
        reduction_percent: options.reduction_percent,
        predicted_total: batch_total(items.iter().filter_map(|i| i.predicted_bytes)),
        actual_total: items
            .iter()
            .map(|i| match i.status {
                JobStatus::Done { bytes, .. } => bytes,
                _ => 0,
            })
            .sum(),
        items,
        cache,
    };

    info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        predicted = report.predicted_total,
        actual = report.actual_total,
        "batch finished"
    );
    Ok(report)
}

struct JobContext<'a, B> {
    backend: &'a B,
    options: &'a BatchOptions,
    manifest: &'a Mutex<CacheManifest>,
    stats: &'a Mutex<CacheStats>,
    /// Every output name this batch writes.
    assigned: &'a HashSet<&'a str>,
    events: Option<&'a Sender<BatchEvent>>,
    cancel: &'a CancelFlag,
}

impl<B: VideoBackend> JobContext<'_, B> {
    fn emit(&self, event: BatchEvent) {
        if let Some(tx) = self.events {
            // Receiver gone means nobody is listening; the batch still runs.
            let _ = tx.send(event);
        }
    }

    fn run(&self, job: &BatchJob, name: &str) -> ItemReport {
        let mut report = ItemReport {
            source: job.source.clone(),
            original_bytes: None,
            predicted_bytes: None,
            status: JobStatus::Pending,
        };

        let result = if self.cancel.is_cancelled() {
            Err(ItemError::Backend(BackendError::Cancelled))
        } else {
            self.shrink(job, name, &mut report)
        };

        let status = match result {
            Ok((output, bytes, export)) => {
                self.emit(BatchEvent::Finished {
                    source: job.source.clone(),
                    output: output.clone(),
                    bytes,
                    status: export,
                });
                JobStatus::Done {
                    output,
                    bytes,
                    export,
                }
            }
            Err(e) => {
                warn!(source = %job.source.display(), error = %e, "job failed");
                let error = e.to_string();
                self.emit(BatchEvent::Failed {
                    source: job.source.clone(),
                    error: error.clone(),
                });
                JobStatus::Failed { error }
            }
        };

        job.set_status(status.clone());
        report.status = status;
        report
    }

    fn shrink(
        &self,
        job: &BatchJob,
        name: &str,
        report: &mut ItemReport,
    ) -> Result<(PathBuf, u64, ExportStatus), ItemError> {
        let options = self.options;
        job.set_status(JobStatus::Processing { progress: 0.0 });

        let info = probe_video(self.backend, &job.source)?;
        report.original_bytes = Some(info.file_size);
        let plan = plan_video(&info, options.reduction_percent, &options.settings)?;
        report.predicted_bytes = Some(plan.predicted_bytes);

        self.emit(BatchEvent::Started {
            source: job.source.clone(),
            canvas: plan.canvas,
            predicted_bytes: plan.predicted_bytes,
        });

        let output = options.output_dir.join(name);
        let params = plan_transcode(
            &plan,
            &job.source,
            &output,
            options.preset,
            options.settings.alignment,
        );

        let source_hash = cache::hash_file(&job.source)?;
        let params_hash = cache::hash_transcode_params(&params);

        let export = match self.reuse_cached(&source_hash, &params_hash, name, &output)? {
            Some(export) => export,
            None => {
                self.transcode(job, &plan, &params)?;
                self.lock_stats().miss();
                ExportStatus::Transcoded
            }
        };

        self.manifest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), source_hash, params_hash);

        let bytes = std::fs::metadata(&output)?.len();
        Ok((output, bytes, export))
    }

    /// Reuse an earlier output for the same content, copying it when it was
    /// recorded under another name.
    ///
    /// A file recorded under a name that another job of this batch writes is
    /// not reused: that job may be replacing it while this one reads it.
    fn reuse_cached(
        &self,
        source_hash: &str,
        params_hash: &str,
        name: &str,
        output: &Path,
    ) -> Result<Option<ExportStatus>, ItemError> {
        if !self.options.use_cache {
            return Ok(None);
        }
        let stored = self
            .manifest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .find_cached(source_hash, params_hash, &self.options.output_dir);

        match stored {
            Some(stored) if stored == name => {
                debug!(output = name, "cache hit");
                self.lock_stats().hit();
                Ok(Some(ExportStatus::Cached))
            }
            Some(stored) if self.assigned.contains(stored.as_str()) => {
                debug!(stored = %stored, output = name, "cached output is rewritten by this batch");
                Ok(None)
            }
            Some(stored) => {
                debug!(from = %stored, to = name, "copying cached output");
                std::fs::copy(self.options.output_dir.join(&stored), output)?;
                self.lock_stats().copy();
                Ok(Some(ExportStatus::Copied))
            }
            None => Ok(None),
        }
    }

    fn transcode(
        &self,
        job: &BatchJob,
        plan: &VideoPlan,
        params: &TranscodeParams,
    ) -> Result<(), ItemError> {
        debug!(
            source = %job.source.display(),
            width = plan.canvas.width,
            height = plan.canvas.height,
            fps = params.frame_duration.frames_per_second(),
            "transcoding"
        );
        let last_decile = Cell::new(0u32);
        let on_progress = |p: f32| {
            let p = p.clamp(0.0, 1.0);
            job.set_status(JobStatus::Processing { progress: p });
            let decile = (p * 10.0).floor() as u32;
            if decile > last_decile.get() {
                last_decile.set(decile);
                self.emit(BatchEvent::Progress {
                    source: job.source.clone(),
                    progress: p,
                });
            }
        };
        transcode_video(self.backend, params, &on_progress, self.cancel)?;
        Ok(())
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, CacheStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// =============================================================================
// Preview (probe + plan only)
// =============================================================================

/// Plan of one source, or why it could not be planned.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewItem {
    pub source: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<VideoPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of [`preview_batch`].
#[derive(Debug, Clone, Serialize)]
pub struct BatchPreview {
    pub reduction_percent: f64,
    pub items: Vec<PreviewItem>,
    /// Exact sum of every successful prediction.
    pub predicted_total: u64,
    pub original_total: u64,
}

/// Probe and plan every source without transcoding anything.
pub fn preview_batch(
    backend: &impl VideoBackend,
    sources: &[PathBuf],
    reduction_percent: f64,
    settings: &PlanSettings,
) -> BatchPreview {
    let items: Vec<PreviewItem> = sources
        .par_iter()
        .map(|source| {
            let planned = probe_video(backend, source)
                .map_err(ItemError::from)
                .and_then(|info| Ok(plan_video(&info, reduction_percent, settings)?));
            match planned {
                Ok(plan) => PreviewItem {
                    source: source.clone(),
                    plan: Some(plan),
                    error: None,
                },
                Err(e) => {
                    warn!(source = %source.display(), error = %e, "cannot plan");
                    PreviewItem {
                        source: source.clone(),
                        plan: None,
                        error: Some(e.to_string()),
                    }
                }
            }
        })
        .collect();

    let plans = || items.iter().filter_map(|i| i.plan.as_ref());
    BatchPreview {
        reduction_percent,
        predicted_total: batch_total(plans().map(|p| p.predicted_bytes)),
        original_total: batch_total(plans().map(|p| p.original_bytes)),
        items,
    }
}
