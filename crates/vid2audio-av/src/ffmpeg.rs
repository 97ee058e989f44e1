//! Audio extraction through the ffmpeg CLI.
//!
//! The source is optionally trimmed, video is dropped, and the audio track is
//! encoded with the configured codec and bitrate. Progress is read from
//! `-progress pipe:2` and scaled against the probed (or trimmed) duration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use vid2audio_core::config::TranscodeConfig;
use vid2audio_core::TrimWindow;

use crate::command::ToolCommand;
use crate::engine::{ProgressSender, TranscodeEngine, TranscodeRequest, TranscodeStream};
use crate::tools::ToolRegistry;

/// Upper bound for the ffprobe duration lookup.
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// [`TranscodeEngine`] backed by ffmpeg (and ffprobe for duration, when found).
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    ffmpeg: PathBuf,
    ffprobe: Option<PathBuf>,
    settings: TranscodeConfig,
}

impl FfmpegEngine {
    /// Build an engine from discovered tools.
    ///
    /// # Errors
    ///
    /// Fails if ffmpeg is not available. A missing ffprobe only disables
    /// progress reporting.
    pub fn new(tools: &ToolRegistry, settings: TranscodeConfig) -> vid2audio_core::Result<Self> {
        let ffmpeg = tools.require("ffmpeg")?.path.clone();
        let ffprobe = tools.get("ffprobe").map(|t| t.path.clone());
        if ffprobe.is_none() {
            tracing::warn!("ffprobe not found; conversions will not report progress unless trimmed");
        }
        Ok(Self {
            ffmpeg,
            ffprobe,
            settings,
        })
    }

    /// Extension of produced files.
    pub fn output_extension(&self) -> &str {
        &self.settings.output_extension
    }

    /// The ffmpeg invocation for one conversion, timeout included.
    pub fn build_command(
        &self,
        source: &Path,
        output: &Path,
        trim: Option<&TrimWindow>,
    ) -> ToolCommand {
        let mut cmd = ToolCommand::new(self.ffmpeg.clone());
        cmd.timeout(Duration::from_secs(self.settings.timeout_secs));
        cmd.args(["-y", "-progress", "pipe:2", "-nostats"]);

        let start = trim.and_then(|t| t.start);
        let end = trim.and_then(|t| t.end);

        if let Some(s) = start {
            cmd.args(["-ss".to_string(), format_secs(s)]);
        }
        cmd.arg("-i");
        cmd.arg(source.to_string_lossy().as_ref());

        match (start, end) {
            (Some(s), Some(e)) => {
                cmd.args(["-t".to_string(), format_secs(e - s)]);
            }
            (None, Some(e)) => {
                tracing::warn!("Only an end time was given; treating it as a duration from 0");
                cmd.args(["-t".to_string(), format_secs(e)]);
            }
            _ => {}
        }

        cmd.arg("-vn");
        cmd.args(["-c:a", self.settings.audio_codec.as_str()]);
        if !self.settings.audio_bitrate.trim().is_empty() {
            cmd.args(["-b:a", self.settings.audio_bitrate.as_str()]);
        }
        cmd.arg(output.to_string_lossy().as_ref());
        cmd
    }

    /// Source duration in seconds, if ffprobe is available and can read it.
    pub async fn probe_duration(&self, source: &Path) -> Option<f64> {
        let ffprobe = self.ffprobe.as_ref()?;
        let mut cmd = ToolCommand::new(ffprobe.clone());
        cmd.args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ]);
        cmd.arg(source.to_string_lossy().as_ref());
        cmd.timeout(PROBE_TIMEOUT);

        match cmd.execute().await {
            Ok(out) => parse_duration(&out.stdout),
            Err(e) => {
                tracing::warn!("Could not probe duration of {:?}: {e}", source);
                None
            }
        }
    }

    async fn run(self, request: TranscodeRequest, tx: ProgressSender) {
        let output = request.output_path(&self.settings.output_extension);
        let trim = request.trim.as_ref();

        let probed = if trim.and_then(TrimWindow::duration).is_some() {
            None
        } else {
            self.probe_duration(&request.source).await
        };
        let duration = effective_duration(trim, probed);

        tracing::info!(
            job_id = %request.job_id,
            "ffmpeg convert: {:?} -> {:?} (duration={:?})",
            request.source,
            output,
            duration,
        );

        let cmd = self.build_command(&request.source, &output, trim);
        let mut out_time_us: Option<i64> = None;
        let result = cmd
            .execute_with_stderr_lines(|line| {
                if let Some(val) = line.strip_prefix("out_time_us=") {
                    out_time_us = val.trim().parse::<i64>().ok();
                } else if line.starts_with("progress=") {
                    if let Some(pct) = progress_percent(out_time_us, duration) {
                        tx.try_progress(pct);
                    }
                }
            })
            .await;

        match result {
            Ok(_) if output.exists() => {
                tracing::info!(job_id = %request.job_id, "ffmpeg finished: {:?}", output);
                tx.complete(output).await;
            }
            Ok(_) => {
                tracing::error!(job_id = %request.job_id, "ffmpeg exited cleanly but wrote no output");
                tx.fail("ffmpeg produced no output file").await;
            }
            Err(e) => {
                tracing::error!(job_id = %request.job_id, "ffmpeg failed: {e}");
                remove_partial(&output).await;
                tx.fail(e.to_string()).await;
            }
        }
    }
}

impl TranscodeEngine for FfmpegEngine {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn transcode(&self, request: TranscodeRequest) -> TranscodeStream {
        let (tx, stream) = TranscodeStream::channel();
        tokio::spawn(self.clone().run(request, tx));
        stream
    }
}

/// Seconds formatted for ffmpeg's time arguments.
fn format_secs(secs: f64) -> String {
    format!("{secs:.3}")
}

fn parse_duration(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .find_map(|l| l.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}

/// Length of audio ffmpeg will actually produce, when known.
fn effective_duration(trim: Option<&TrimWindow>, probed: Option<f64>) -> Option<f64> {
    let start = trim.and_then(|t| t.start).unwrap_or(0.0);
    trim.and_then(TrimWindow::duration)
        .or_else(|| probed.map(|d| d - start))
        .filter(|d| *d > 0.0)
}

fn progress_percent(out_time_us: Option<i64>, duration: Option<f64>) -> Option<f32> {
    let out_us = out_time_us?;
    let dur = duration?;
    let elapsed_secs = out_us as f64 / 1_000_000.0;
    Some(((elapsed_secs / dur) * 100.0).clamp(0.0, 100.0) as f32)
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!("Removed partial output {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove partial output {:?}: {e}", path),
    }
}
