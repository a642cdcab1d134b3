//! Video backend trait and shared types.
//!
//! The [`VideoBackend`] trait covers the two collaborators the planner sits
//! between: the media source (probe) and the transcoder. The planner never
//! calls either itself; [`operations`](super::operations) and the batch
//! runner do.
//!
//! The production implementation is
//! [`FfmpegBackend`](super::ffmpeg_backend::FfmpegBackend), which shells out
//! to `ffprobe` and `ffmpeg`.

use super::geometry::VideoGeometry;
use super::params::TranscodeParams;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot read media {}: {reason}", .path.display())]
    MediaRead { path: PathBuf, reason: String },
    #[error("Transcode failed: {0}")]
    TranscodeFailed(String),
    #[error("Transcode cancelled")]
    Cancelled,
}

impl BackendError {
    pub fn media_read(path: &Path, reason: impl Into<String>) -> Self {
        Self::MediaRead {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Everything the planner needs to know about one source video.
///
/// Every field is required: a probe that cannot fill one of them fails with
/// [`BackendError::MediaRead`] instead of returning a partial record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoInfo {
    pub geometry: VideoGeometry,
    pub duration_secs: f64,
    pub file_size: u64,
    pub frame_rate: f64,
}

/// Shared cancellation flag, polled by transcoders.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Trait for video backends.
///
/// `Sync` so one backend can serve a parallel batch.
pub trait VideoBackend: Sync {
    /// Read geometry, duration, size and frame rate of a video file.
    fn probe(&self, path: &Path) -> Result<VideoInfo, BackendError>;

    /// Produce `params.output`, calling `progress` with values in `[0.0, 1.0]`.
    ///
    /// Implementations poll `cancel` and return [`BackendError::Cancelled`]
    /// once it is set, leaving no partial output behind.
    fn transcode(
        &self,
        params: &TranscodeParams,
        progress: &dyn Fn(f32),
        cancel: &CancelFlag,
    ) -> Result<(), BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::planner::params::ExportPreset;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Mock backend that records operations and writes tiny placeholder outputs.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    /// Probe results are keyed by file name because batch order is not fixed.
    #[derive(Default)]
    pub struct MockBackend {
        pub videos: Mutex<HashMap<String, Result<VideoInfo, String>>>,
        pub failing_transcodes: Mutex<Vec<String>>,
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Probe(String),
        Transcode {
            source: String,
            output: String,
            width: u32,
            height: u32,
            preset: ExportPreset,
        },
    }

    fn file_name(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_videos(videos: Vec<(&str, VideoInfo)>) -> Self {
            let backend = Self::new();
            for (name, info) in videos {
                backend.add_video(name, info);
            }
            backend
        }

        pub fn add_video(&self, name: &str, info: VideoInfo) {
            self.videos
                .lock()
                .unwrap()
                .insert(name.to_string(), Ok(info));
        }

        pub fn add_unreadable(&self, name: &str, reason: &str) {
            self.videos
                .lock()
                .unwrap()
                .insert(name.to_string(), Err(reason.to_string()));
        }

        pub fn fail_transcode(&self, name: &str) {
            self.failing_transcodes
                .lock()
                .unwrap()
                .push(name.to_string());
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        pub fn transcode_count(&self) -> usize {
            self.get_operations()
                .iter()
                .filter(|op| matches!(op, RecordedOp::Transcode { .. }))
                .count()
        }
    }

    impl VideoBackend for MockBackend {
        fn probe(&self, path: &Path) -> Result<VideoInfo, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Probe(path.to_string_lossy().to_string()));

            match self.videos.lock().unwrap().get(&file_name(path)) {
                Some(Ok(info)) => Ok(info.clone()),
                Some(Err(reason)) => Err(BackendError::media_read(path, reason.clone())),
                None => Err(BackendError::media_read(path, "no mock video")),
            }
        }

        fn transcode(
            &self,
            params: &TranscodeParams,
            progress: &dyn Fn(f32),
            cancel: &CancelFlag,
        ) -> Result<(), BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Transcode {
                source: params.source.to_string_lossy().to_string(),
                output: params.output.to_string_lossy().to_string(),
                width: params.width,
                height: params.height,
                preset: params.preset,
            });

            let name = file_name(&params.source);
            if self.failing_transcodes.lock().unwrap().contains(&name) {
                return Err(BackendError::TranscodeFailed(format!("mock failure for {name}")));
            }

            for step in [0.25, 0.5, 0.75, 1.0] {
                if cancel.is_cancelled() {
                    return Err(BackendError::Cancelled);
                }
                progress(step);
            }

            if let Some(parent) = params.output.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&params.output, format!("{}x{}", params.width, params.height))?;
            Ok(())
        }
    }

    #[test]
    fn mock_records_probe() {
        let backend = MockBackend::with_videos(vec![(
            "clip.mov",
            crate::test_helpers::video_info(1920.0, 1080.0, 1_000_000),
        )]);

        let info = backend.probe(Path::new("/videos/clip.mov")).unwrap();
        assert_eq!(info.geometry.natural.width, 1920.0);

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], RecordedOp::Probe(p) if p == "/videos/clip.mov"));
    }

    #[test]
    fn mock_unknown_video_is_media_read_error() {
        let backend = MockBackend::new();
        let result = backend.probe(Path::new("/missing.mp4"));
        assert!(matches!(result, Err(BackendError::MediaRead { .. })));
    }

    #[test]
    fn mock_transcode_reports_progress_and_writes_output() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backend = MockBackend::new();
        let params = crate::test_helpers::transcode_params(tmp.path().join("out.mp4"));

        let seen = Mutex::new(Vec::new());
        backend
            .transcode(&params, &|p| seen.lock().unwrap().push(p), &CancelFlag::new())
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0.25, 0.5, 0.75, 1.0]);
        assert!(tmp.path().join("out.mp4").exists());
        assert_eq!(backend.transcode_count(), 1);
    }

    #[test]
    fn mock_transcode_honours_cancel() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backend = MockBackend::new();
        let params = crate::test_helpers::transcode_params(tmp.path().join("out.mp4"));
        let cancel = CancelFlag::new();
        cancel.cancel();

        let result = backend.transcode(&params, &|_| {}, &cancel);
        assert!(matches!(result, Err(BackendError::Cancelled)));
        assert!(!tmp.path().join("out.mp4").exists());
    }

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let observer = flag.clone();
        assert!(!observer.is_cancelled());
        flag.cancel();
        assert!(observer.is_cancelled());
    }
}
