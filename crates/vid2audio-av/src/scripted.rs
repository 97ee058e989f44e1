//! An in-process engine that plays back scripted events.
//!
//! Used by tests and demos to exercise the scheduler deterministically
//! without ffmpeg installed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::engine::{ProgressSender, TranscodeEngine, TranscodeRequest, TranscodeStream};

/// One scripted action.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Emit a progress event.
    Progress(f32),
    /// Sleep before the next step.
    Sleep(Duration),
    /// Block until the gate is notified.
    WaitFor(Arc<Notify>),
    /// Write a small output file and report success.
    Succeed,
    /// Report failure.
    Fail(String),
    /// Stop without reporting an outcome.
    Abandon,
}

#[derive(Default)]
struct Counters {
    active: AtomicUsize,
    max_active: AtomicUsize,
}

/// Engine whose behaviour per call comes from a queue of scripts.
///
/// Each `transcode` call pops the next queued script, or plays the default
/// script when none are queued.
#[derive(Clone)]
pub struct ScriptedEngine {
    scripts: Arc<Mutex<VecDeque<Vec<ScriptStep>>>>,
    default_script: Arc<Vec<ScriptStep>>,
    requests: Arc<Mutex<Vec<TranscodeRequest>>>,
    counters: Arc<Counters>,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedEngine {
    /// Engine that reports 50%, 100% and then succeeds for every job.
    pub fn new() -> Self {
        Self::with_default(vec![
            ScriptStep::Progress(50.0),
            ScriptStep::Progress(100.0),
            ScriptStep::Succeed,
        ])
    }

    pub fn with_default(default_script: Vec<ScriptStep>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(VecDeque::new())),
            default_script: Arc::new(default_script),
            requests: Arc::new(Mutex::new(Vec::new())),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Queue a script for the next call that has none.
    pub fn push_script(&self, steps: Vec<ScriptStep>) {
        self.scripts.lock().push_back(steps);
    }

    /// Every request received so far, in call order.
    pub fn requests(&self) -> Vec<TranscodeRequest> {
        self.requests.lock().clone()
    }

    /// Highest number of transcodes that were running at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.counters.max_active.load(Ordering::SeqCst)
    }

    async fn play(
        steps: Vec<ScriptStep>,
        request: TranscodeRequest,
        tx: ProgressSender,
        counters: Arc<Counters>,
    ) {
        let now = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_active.fetch_max(now, Ordering::SeqCst);

        for step in steps {
            match step {
                ScriptStep::Progress(pct) => tx.progress(pct).await,
                ScriptStep::Sleep(d) => tokio::time::sleep(d).await,
                ScriptStep::WaitFor(gate) => gate.notified().await,
                ScriptStep::Succeed => {
                    let output = request.output_path("mp3");
                    // Decrement before the terminal event so the next job
                    // never observes this one as still active.
                    counters.active.fetch_sub(1, Ordering::SeqCst);
                    match tokio::fs::write(&output, b"ID3 scripted audio").await {
                        Ok(()) => tx.complete(output).await,
                        Err(e) => tx.fail(format!("failed to write output: {e}")).await,
                    }
                    return;
                }
                ScriptStep::Fail(message) => {
                    counters.active.fetch_sub(1, Ordering::SeqCst);
                    tx.fail(message).await;
                    return;
                }
                ScriptStep::Abandon => break,
            }
        }
        counters.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl TranscodeEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn transcode(&self, request: TranscodeRequest) -> TranscodeStream {
        let steps = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default_script.as_ref().clone());
        self.requests.lock().push(request.clone());

        let (tx, stream) = TranscodeStream::channel();
        tokio::spawn(Self::play(steps, request, tx, Arc::clone(&self.counters)));
        stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TranscodeEvent;
    use vid2audio_core::JobId;

    fn request(dir: &std::path::Path) -> TranscodeRequest {
        TranscodeRequest {
            job_id: JobId::new(),
            source: dir.join("in.mp4"),
            display_name: "in.mp4".into(),
            trim: None,
            output_dir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn default_script_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ScriptedEngine::new();
        let mut stream = engine.transcode(request(dir.path()));

        assert_eq!(stream.next().await, Some(TranscodeEvent::Progress(50.0)));
        assert_eq!(stream.next().await, Some(TranscodeEvent::Progress(100.0)));
        match stream.next().await {
            Some(TranscodeEvent::Completed(path)) => assert!(path.exists()),
            other => panic!("expected completion, got {other:?}"),
        }
        assert_eq!(engine.requests().len(), 1);
    }

    #[tokio::test]
    async fn queued_script_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ScriptedEngine::new();
        engine.push_script(vec![ScriptStep::Fail("bad codec".into())]);

        let mut first = engine.transcode(request(dir.path()));
        assert_eq!(first.next().await, Some(TranscodeEvent::Failed("bad codec".into())));

        let mut second = engine.transcode(request(dir.path()));
        assert_eq!(second.next().await, Some(TranscodeEvent::Progress(50.0)));
    }

    #[tokio::test]
    async fn abandon_surfaces_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ScriptedEngine::with_default(vec![ScriptStep::Abandon]);
        let mut stream = engine.transcode(request(dir.path()));
        assert!(matches!(stream.next().await, Some(TranscodeEvent::Failed(_))));
    }

    #[tokio::test]
    async fn gate_holds_the_script() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(Notify::new());
        let engine = ScriptedEngine::with_default(vec![
            ScriptStep::WaitFor(gate.clone()),
            ScriptStep::Succeed,
        ]);
        let mut stream = engine.transcode(request(dir.path()));

        let pending = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(pending.is_err());

        gate.notify_one();
        assert!(matches!(stream.next().await, Some(TranscodeEvent::Completed(_))));
        assert_eq!(engine.max_concurrent(), 1);
    }
}
