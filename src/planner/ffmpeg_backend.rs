//! FFmpeg-based video backend.
//!
//! ## Tool mapping
//!
//! | Operation | Tool |
//! |---|---|
//! | Probe geometry, rotation, duration, frame rate | `ffprobe -print_format json` |
//! | File size | filesystem metadata (falls back to `format.size`) |
//! | Scale + letterbox | `ffmpeg -vf scale=…,pad=…` |
//! | Encode | `libx264` at the preset's speed/CRF, AAC audio, `+faststart` |
//! | Progress | `ffmpeg -progress pipe:1` (`out_time_us` against the export window) |
//!
//! FFmpeg applies the stored display matrix itself when decoding, so the
//! filter chain works in display orientation: it scales to the placement
//! computed by the planner and pads to the canvas.
//!
//! Output is written to a `.part` file next to the target and renamed on
//! success; failures and cancellation remove it.

use super::backend::{BackendError, CancelFlag, VideoBackend, VideoInfo};
use super::geometry::{AffineTransform, Size, VideoGeometry};
use super::params::TranscodeParams;
use serde::Deserialize;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

#[derive(Debug, Deserialize, Default)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize, Default)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    tags: Option<ProbeTags>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

#[derive(Debug, Deserialize, Default)]
struct ProbeTags {
    rotate: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ProbeSideData {
    rotation: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct ProbeFormat {
    duration: Option<String>,
    size: Option<String>,
}

/// Parse an ffprobe rational such as `30000/1001` (or a plain number).
pub fn parse_frame_rate(value: &str) -> Option<f64> {
    let rate = match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => value.trim().parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

/// Clockwise display rotation in degrees.
///
/// The display-matrix side data stores a counter-clockwise angle; the legacy
/// `rotate` tag stores a clockwise one.
fn stream_rotation(stream: &ProbeStream) -> f64 {
    if let Some(rotation) = stream.side_data_list.iter().find_map(|sd| sd.rotation) {
        return -rotation;
    }
    stream
        .tags
        .as_ref()
        .and_then(|t| t.rotate.as_deref())
        .and_then(|r| r.trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Turn ffprobe JSON into a [`VideoInfo`].
///
/// `file_size` is the size reported by the filesystem, when known. Any field
/// that cannot be determined is a [`BackendError::MediaRead`].
pub fn parse_probe_output(
    path: &Path,
    json: &str,
    file_size: Option<u64>,
) -> Result<VideoInfo, BackendError> {
    let parsed: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| BackendError::media_read(path, format!("invalid ffprobe output: {e}")))?;

    let stream = parsed
        .streams
        .first()
        .ok_or_else(|| BackendError::media_read(path, "no video track"))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w as f64, h as f64),
        _ => return Err(BackendError::media_read(path, "missing frame size")),
    };

    let duration_secs = stream
        .duration
        .as_deref()
        .or(parsed.format.as_ref().and_then(|f| f.duration.as_deref()))
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| BackendError::media_read(path, "missing duration"))?;

    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .ok_or_else(|| BackendError::media_read(path, "missing frame rate"))?;

    let file_size = file_size
        .or_else(|| {
            parsed
                .format
                .as_ref()
                .and_then(|f| f.size.as_deref())
                .and_then(|s| s.trim().parse().ok())
        })
        .ok_or_else(|| BackendError::media_read(path, "missing file size"))?;

    let natural = Size::new(width, height);
    let transform = AffineTransform::rotation_degrees(stream_rotation(stream)).anchored(natural);

    Ok(VideoInfo {
        geometry: VideoGeometry::new(natural, transform),
        duration_secs,
        file_size,
        frame_rate,
    })
}

/// Build the ffmpeg argument list for one transcode, writing to `output`.
pub fn ffmpeg_args(params: &TranscodeParams, output: &Path) -> Vec<String> {
    let p = &params.placement;
    let filter = format!(
        "scale={}:{},pad={}:{}:{}:{},setsar=1",
        p.width, p.height, params.width, params.height, p.x, p.y
    );
    let fd = params.frame_duration;

    vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-progress".into(),
        "pipe:1".into(),
        "-nostats".into(),
        "-i".into(),
        params.source.to_string_lossy().into_owned(),
        "-ss".into(),
        format!("{:.3}", params.time_range.start),
        "-t".into(),
        format!("{:.3}", params.time_range.duration()),
        "-vf".into(),
        filter,
        "-r".into(),
        format!("{}/{}", fd.timescale, fd.value),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        params.preset.encoder_preset().into(),
        "-crf".into(),
        params.preset.crf().to_string(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "128k".into(),
        "-movflags".into(),
        "+faststart".into(),
        "-f".into(),
        "mp4".into(),
        output.to_string_lossy().into_owned(),
    ]
}

/// One meaningful line of `-progress` output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressLine {
    /// Fraction of the export window encoded so far.
    Fraction(f32),
    End,
}

/// Interpret a `key=value` line from `ffmpeg -progress`.
pub fn parse_progress_line(line: &str, window_secs: f64) -> Option<ProgressLine> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        // Both keys carry microseconds
        "out_time_us" | "out_time_ms" => {
            let micros: f64 = value.parse().ok()?;
            if window_secs <= 0.0 || micros < 0.0 {
                return None;
            }
            let fraction = (micros / 1_000_000.0 / window_secs).clamp(0.0, 1.0);
            Some(ProgressLine::Fraction(fraction as f32))
        }
        "progress" if value == "end" => Some(ProgressLine::End),
        _ => None,
    }
}

/// Report `-progress` lines until the stream ends.
///
/// Stops with [`BackendError::Cancelled`] once `cancel` is set and with
/// [`BackendError::Io`] when the stream cannot be read; the caller owns the
/// child process and cleans up in both cases.
fn follow_progress(
    reader: impl BufRead,
    window_secs: f64,
    progress: &dyn Fn(f32),
    cancel: &CancelFlag,
) -> Result<(), BackendError> {
    for line in reader.lines() {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }
        match parse_progress_line(&line?, window_secs) {
            Some(ProgressLine::Fraction(f)) => progress(f),
            Some(ProgressLine::End) => progress(1.0),
            None => {}
        }
    }
    Ok(())
}

/// Path of the in-progress file for `output`.
fn part_path(output: &Path) -> PathBuf {
    let mut name = output.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    output.with_file_name(name)
}

/// Video backend driving the `ffmpeg` and `ffprobe` executables.
///
/// See the [module docs](self) for the operation-to-tool mapping.
pub struct FfmpegBackend {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegBackend {
    /// Use `ffmpeg` and `ffprobe` from `PATH`.
    pub fn new() -> Self {
        Self::with_binaries("ffmpeg", "ffprobe")
    }

    pub fn with_binaries(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoBackend for FfmpegBackend {
    fn probe(&self, path: &Path) -> Result<VideoInfo, BackendError> {
        let file_size = std::fs::metadata(path)
            .map_err(|e| BackendError::media_read(path, e.to_string()))?
            .len();

        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_streams",
                "-show_format",
                "-select_streams",
                "v:0",
            ])
            .arg(path)
            .output()
            .map_err(|e| BackendError::media_read(path, format!("cannot run ffprobe: {e}")))?;

        if !output.status.success() {
            return Err(BackendError::media_read(
                path,
                format!("ffprobe exited with {}", output.status),
            ));
        }

        let json = String::from_utf8_lossy(&output.stdout);
        let info = parse_probe_output(path, &json, Some(file_size))?;
        debug!(
            path = %path.display(),
            width = info.geometry.natural.width,
            height = info.geometry.natural.height,
            duration = info.duration_secs,
            "probed video"
        );
        Ok(info)
    }

    fn transcode(
        &self,
        params: &TranscodeParams,
        progress: &dyn Fn(f32),
        cancel: &CancelFlag,
    ) -> Result<(), BackendError> {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }

        let part = part_path(&params.output);
        let args = ffmpeg_args(params, &part);
        debug!(ffmpeg = %self.ffmpeg.display(), args = ?args, "starting transcode");

        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain stderr on its own thread so a chatty encoder cannot block stdout
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut text = String::new();
                stderr.read_to_string(&mut text).ok();
                text
            })
        });

        let window = params.time_range.duration();
        if let Some(stdout) = child.stdout.take()
            && let Err(e) = follow_progress(BufReader::new(stdout), window, progress, cancel)
        {
            child.kill().ok();
            child.wait().ok();
            std::fs::remove_file(&part).ok();
            return Err(e);
        }

        let status = child.wait()?;
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            std::fs::remove_file(&part).ok();
            warn!(source = %params.source.display(), %status, "ffmpeg failed");
            return Err(BackendError::TranscodeFailed(format!(
                "ffmpeg exited with {}: {}",
                status,
                stderr.trim()
            )));
        }

        std::fs::rename(&part, &params.output)?;
        progress(1.0);
        Ok(())
    }
}
