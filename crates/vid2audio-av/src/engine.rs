//! The contract between the job scheduler and a transcoding engine.
//!
//! An engine receives a [`TranscodeRequest`] and hands back a
//! [`TranscodeStream`]: a typed sequence of progress events that ends in
//! exactly one terminal event. The engine runs the work on its own task and
//! reports through a [`ProgressSender`].

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use vid2audio_core::{JobId, TrimWindow};

/// Buffer between an engine task and the stream consumer.
const EVENT_BUFFER: usize = 32;

/// Everything an engine needs to transcode one job.
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    pub job_id: JobId,
    /// Uploaded input file.
    pub source: PathBuf,
    /// Original file name as the client sent it.
    pub display_name: String,
    pub trim: Option<TrimWindow>,
    /// Directory the produced file must be written into.
    pub output_dir: PathBuf,
}

impl TranscodeRequest {
    /// Where the output for this request should be written.
    ///
    /// The job id prefix keeps two jobs with the same display name apart.
    pub fn output_path(&self, extension: &str) -> PathBuf {
        self.output_dir.join(format!(
            "{}-{}",
            self.job_id,
            output_file_name(&self.display_name, self.trim.as_ref(), extension)
        ))
    }
}

/// Presentation name of a transcoded file: `<stem>_<startTag>-<endTag>.<ext>`.
///
/// A tag is the bound with two decimals and `.` replaced by `_`, or
/// `start`/`end` when the bound is absent.
pub fn output_file_name(display_name: &str, trim: Option<&TrimWindow>, extension: &str) -> String {
    let sanitized = vid2audio_core::sanitize_file_name(display_name);
    let stem = Path::new(&sanitized)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or(sanitized.clone());

    let tag = |bound: Option<f64>, absent: &str| match bound {
        Some(v) => format!("{v:.2}").replace('.', "_"),
        None => absent.to_string(),
    };
    let start_tag = tag(trim.and_then(|t| t.start), "start");
    let end_tag = tag(trim.and_then(|t| t.end), "end");

    format!("{stem}_{start_tag}-{end_tag}.{extension}")
}

/// One event in a transcode's lifetime.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscodeEvent {
    /// Percentage complete, in `[0, 100]`.
    Progress(f32),
    /// The output was written to this path.
    Completed(PathBuf),
    /// The transcode failed with this message.
    Failed(String),
}

/// Receiving half of a transcode.
///
/// Yields progress events followed by exactly one terminal event, then `None`.
/// If the engine goes away without reporting an outcome the stream produces a
/// [`TranscodeEvent::Failed`] on its behalf.
#[derive(Debug)]
pub struct TranscodeStream {
    rx: mpsc::Receiver<TranscodeEvent>,
    finished: bool,
}

impl TranscodeStream {
    /// Create a connected sender/stream pair.
    pub fn channel() -> (ProgressSender, TranscodeStream) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        (
            ProgressSender { tx },
            TranscodeStream {
                rx,
                finished: false,
            },
        )
    }

    /// A stream that fails immediately without running anything.
    pub fn failed(message: impl Into<String>) -> Self {
        let (sender, stream) = Self::channel();
        // The buffer is empty, so this cannot be rejected.
        let _ = sender.tx.try_send(TranscodeEvent::Failed(message.into()));
        stream
    }

    /// Next event, or `None` once the terminal event has been delivered.
    pub async fn next(&mut self) -> Option<TranscodeEvent> {
        if self.finished {
            return None;
        }
        loop {
            match self.rx.recv().await {
                Some(TranscodeEvent::Progress(pct)) => {
                    if pct.is_nan() {
                        continue;
                    }
                    return Some(TranscodeEvent::Progress(pct.clamp(0.0, 100.0)));
                }
                Some(terminal) => {
                    self.finished = true;
                    self.rx.close();
                    return Some(terminal);
                }
                None => {
                    self.finished = true;
                    return Some(TranscodeEvent::Failed(
                        "engine exited without a result".to_string(),
                    ));
                }
            }
        }
    }
}

/// Sending half of a transcode, held by the engine's task.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::Sender<TranscodeEvent>,
}

impl ProgressSender {
    /// Report progress, waiting for buffer space.
    pub async fn progress(&self, pct: f32) {
        let _ = self.tx.send(TranscodeEvent::Progress(pct)).await;
    }

    /// Report progress from synchronous code. Dropped if the consumer is
    /// behind; a later value supersedes it anyway.
    pub fn try_progress(&self, pct: f32) {
        let _ = self.tx.try_send(TranscodeEvent::Progress(pct));
    }

    /// Report success. Consumes the sender.
    pub async fn complete(self, output: PathBuf) {
        let _ = self.tx.send(TranscodeEvent::Completed(output)).await;
    }

    /// Report failure. Consumes the sender.
    pub async fn fail(self, message: impl Into<String>) {
        let _ = self.tx.send(TranscodeEvent::Failed(message.into())).await;
    }
}

/// A transcoding capability.
///
/// Implementations must return promptly and do the work on their own task;
/// the scheduler never issues a second call before the previous stream has
/// delivered its terminal event.
pub trait TranscodeEngine: Send + Sync + 'static {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Start transcoding `request`.
    fn transcode(&self, request: TranscodeRequest) -> TranscodeStream;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(start: Option<f64>, end: Option<f64>) -> TrimWindow {
        TrimWindow::new(start, end).unwrap().unwrap()
    }

    #[test]
    fn output_name_without_trim() {
        assert_eq!(output_file_name("holiday.mp4", None, "mp3"), "holiday_start-end.mp3");
    }

    #[test]
    fn output_name_with_trim() {
        let w = window(Some(10.0), Some(25.5));
        assert_eq!(
            output_file_name("holiday.mp4", Some(&w), "mp3"),
            "holiday_10_00-25_50.mp3"
        );
    }

    #[test]
    fn output_name_with_end_only() {
        let w = window(None, Some(30.0));
        assert_eq!(
            output_file_name("clip.mov", Some(&w), "mp3"),
            "clip_start-30_00.mp3"
        );
    }

    #[test]
    fn output_name_is_sanitized() {
        assert_eq!(
            output_file_name("../my clip.final.mkv", None, "mp3"),
            "my_clip.final_start-end.mp3"
        );
    }

    #[test]
    fn output_path_is_prefixed_with_job_id() {
        let req = TranscodeRequest {
            job_id: JobId::new(),
            source: PathBuf::from("/tmp/in.mp4"),
            display_name: "in.mp4".into(),
            trim: None,
            output_dir: PathBuf::from("/tmp/out"),
        };
        let path = req.output_path("mp3");
        assert_eq!(
            path,
            PathBuf::from(format!("/tmp/out/{}-in_start-end.mp3", req.job_id))
        );
    }

    #[tokio::test]
    async fn stream_clamps_progress_and_ends_after_terminal() {
        let (tx, mut stream) = TranscodeStream::channel();
        tokio::spawn(async move {
            tx.progress(-5.0).await;
            tx.progress(f32::NAN).await;
            tx.progress(250.0).await;
            tx.complete(PathBuf::from("/tmp/out.mp3")).await;
        });

        assert_eq!(stream.next().await, Some(TranscodeEvent::Progress(0.0)));
        assert_eq!(stream.next().await, Some(TranscodeEvent::Progress(100.0)));
        assert_eq!(
            stream.next().await,
            Some(TranscodeEvent::Completed(PathBuf::from("/tmp/out.mp3")))
        );
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn dropped_sender_becomes_failure() {
        let (tx, mut stream) = TranscodeStream::channel();
        tx.progress(10.0).await;
        drop(tx);

        assert_eq!(stream.next().await, Some(TranscodeEvent::Progress(10.0)));
        match stream.next().await {
            Some(TranscodeEvent::Failed(msg)) => assert!(msg.contains("without a result")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn failed_stream_reports_once() {
        let mut stream = TranscodeStream::failed("ffmpeg not found");
        assert_eq!(
            stream.next().await,
            Some(TranscodeEvent::Failed("ffmpeg not found".into()))
        );
        assert_eq!(stream.next().await, None);
    }
}
