//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which wires a full [`AppContext`] around a
//! [`ScriptedEngine`] with temporary storage directories, and can serve the
//! router on a random port for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;

use vid2audio::config::Config;
use vid2audio::server::{self, AppContext};
use vid2audio_av::ScriptedEngine;

pub struct TestHarness {
    pub ctx: AppContext,
    pub engine: ScriptedEngine,
    pub dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_engine(ScriptedEngine::new(), Config::default())
    }

    /// Storage paths in `config` are replaced with fresh temp directories.
    pub fn with_engine(engine: ScriptedEngine, mut config: Config) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        config.storage.upload_dir = dir.path().join("uploads");
        config.storage.output_dir = dir.path().join("outputs");
        std::fs::create_dir_all(&config.storage.upload_dir).unwrap();
        std::fs::create_dir_all(&config.storage.output_dir).unwrap();

        let ctx = AppContext::new(config, Arc::new(engine.clone()), Vec::new());
        Self { ctx, engine, dir }
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.ctx.config.storage.upload_dir.clone()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.ctx.config.storage.output_dir.clone()
    }

    /// Serve the router (and the reaper) on a random port.
    pub async fn serve(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            server::serve(listener, ctx, std::future::pending()).await.ok();
        });

        addr
    }
}

pub fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}

/// Multipart form with an optional trim window and a small fake video.
pub fn upload_form(filename: &str, start: Option<&str>, end: Option<&str>) -> reqwest::multipart::Form {
    let mut form = reqwest::multipart::Form::new();
    if let Some(start) = start {
        form = form.text("startTime", start.to_string());
    }
    if let Some(end) = end {
        form = form.text("endTime", end.to_string());
    }
    let part = reqwest::multipart::Part::bytes(b"not really a video".to_vec())
        .file_name(filename.to_string())
        .mime_str("video/mp4")
        .unwrap();
    form.part("video", part)
}

/// Multipart form with the file part first and the trim fields after it,
/// the order browser form builders tend to use.
pub fn file_first_form(filename: &str, start: &str, end: &str) -> reqwest::multipart::Form {
    let part = reqwest::multipart::Part::bytes(b"not really a video".to_vec())
        .file_name(filename.to_string())
        .mime_str("video/mp4")
        .unwrap();
    reqwest::multipart::Form::new()
        .part("video", part)
        .text("startTime", start.to_string())
        .text("endTime", end.to_string())
}

/// Upload and return the new job id.
pub async fn upload(client: &reqwest::Client, addr: SocketAddr, filename: &str) -> String {
    let resp = client
        .post(url(addr, "/api/upload"))
        .multipart(upload_form(filename, None, None))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    let body: Value = resp.json().await.unwrap();
    body["jobId"].as_str().unwrap().to_string()
}

/// Poll the job detail until it reaches `complete` or `error`.
pub async fn wait_terminal(client: &reqwest::Client, addr: SocketAddr, id: &str) -> Value {
    for _ in 0..200 {
        let resp = client
            .get(url(addr, &format!("/api/jobs/{id}")))
            .send()
            .await
            .unwrap();
        if resp.status() == 200 {
            let job: Value = resp.json().await.unwrap();
            if job["status"] == "complete" || job["status"] == "error" {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {id} never finished");
}

/// Poll until `path` no longer exists.
pub async fn wait_removed(path: &std::path::Path) -> bool {
    for _ in 0..200 {
        if !path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
