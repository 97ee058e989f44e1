//! Application configuration types.
//!
//! The top-level [`Config`] struct carries all sub-configs for the server,
//! storage directories, the job queue, external tools and the transcode
//! settings. Every section defaults sensibly so an empty file is valid.
//! Environment variables are layered on top by [`Config::apply_env`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    pub tools: ToolsConfig,
    pub transcode: TranscodeConfig,
}

impl Config {
    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Unparseable values are ignored with a warning so that a typo in the
    /// environment never prevents startup.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let port = lookup("VID2AUDIO_PORT").or_else(|| lookup("PORT"));
        if let Some(port) = port {
            match port.trim().parse() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!("Ignoring invalid port override: {port:?}"),
            }
        }
        if let Some(host) = lookup("VID2AUDIO_HOST") {
            self.server.host = host;
        }
        if let Some(path) = lookup("VID2AUDIO_PUSH_PATH") {
            self.server.push_path = path;
        }
        if let Some(secs) = lookup("VID2AUDIO_RETENTION_SECS") {
            match secs.trim().parse() {
                Ok(s) => self.queue.retention_secs = s,
                Err(_) => tracing::warn!("Ignoring invalid retention override: {secs:?}"),
            }
        }
        if let Some(secs) = lookup("VID2AUDIO_POLL_INTERVAL_SECS") {
            match secs.trim().parse() {
                Ok(s) => self.queue.poll_interval_secs = s,
                Err(_) => tracing::warn!("Ignoring invalid poll interval override: {secs:?}"),
            }
        }
        if let Some(dir) = lookup("VID2AUDIO_UPLOAD_DIR") {
            self.storage.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("VID2AUDIO_OUTPUT_DIR") {
            self.storage.output_dir = PathBuf::from(dir);
        }
    }

    /// Reject configurations the server cannot run with.
    pub fn check(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::Validation("server.port cannot be 0".into()));
        }
        if !self.server.push_path.starts_with('/') {
            return Err(Error::Validation(format!(
                "server.push_path must start with '/', got {:?}",
                self.server.push_path
            )));
        }
        if is_reserved_path(&self.server.push_path) {
            return Err(Error::Validation(format!(
                "server.push_path {:?} collides with an HTTP route",
                self.server.push_path
            )));
        }
        if self.queue.retention_secs == 0 {
            return Err(Error::Validation(
                "queue.retention_secs must be greater than 0".into(),
            ));
        }
        if self.queue.observer_buffer == 0 {
            return Err(Error::Validation(
                "queue.observer_buffer must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.storage.upload_dir == self.storage.output_dir {
            warnings.push(
                "storage.upload_dir and storage.output_dir are the same directory".into(),
            );
        }

        if self.queue.poll_interval_secs == 0 {
            warnings.push("queue.poll_interval_secs is 0; polling clients will spin".into());
        }

        if self.queue.reap_interval_secs > self.queue.retention_secs {
            warnings.push(format!(
                "queue.reap_interval_secs ({}) exceeds retention_secs ({}); expired jobs may linger",
                self.queue.reap_interval_secs, self.queue.retention_secs
            ));
        }

        if self.transcode.audio_bitrate.trim().is_empty() {
            warnings.push("transcode.audio_bitrate is empty; ffmpeg default will be used".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Path of the WebSocket push channel.
    pub push_path: String,
    pub static_dir: Option<PathBuf>,
    pub max_upload_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3001,
            push_path: "/app-ws".into(),
            static_dir: None,
            max_upload_bytes: 2 * 1024 * 1024 * 1024,
        }
    }
}

/// Whether `path` is taken by one of the HTTP routes.
fn is_reserved_path(path: &str) -> bool {
    const EXACT: &[&str] = &["/", "/health", "/upload", "/queue-status", "/api"];
    const PREFIXES: &[&str] = &["/api/", "/api-docs/", "/download/"];
    EXACT.contains(&path) || PREFIXES.iter().any(|p| path.starts_with(p))
}

/// Where uploaded sources and produced outputs live on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("./uploads"),
            output_dir: PathBuf::from("./outputs"),
        }
    }
}

/// Job queue, retention and notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// How long a finished job stays retrievable.
    pub retention_secs: u64,
    /// How often the reaper sweeps the completed registry.
    pub reap_interval_secs: u64,
    /// Interval advertised to clients without a push connection.
    pub poll_interval_secs: u64,
    /// Per-observer buffer; an observer that falls this far behind is pruned.
    pub observer_buffer: usize,
}

impl QueueConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retention_secs: 600,
            reap_interval_secs: 60,
            poll_interval_secs: 2,
            observer_buffer: 64,
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// Audio transcode settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub output_extension: String,
    pub timeout_secs: u64,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            audio_codec: "libmp3lame".into(),
            audio_bitrate: "192k".into(),
            output_extension: "mp3".into(),
            timeout_secs: 6 * 60 * 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.server.port, 3001);
        assert_eq!(cfg.server.push_path, "/app-ws");
        assert_eq!(cfg.queue.retention_secs, 600);
        assert_eq!(cfg.queue.retention(), Duration::from_secs(600));
        assert_eq!(cfg.transcode.audio_codec, "libmp3lame");
        assert_eq!(cfg.transcode.audio_bitrate, "192k");
        assert!(cfg.check().is_ok());
    }

    #[test]
    fn default_config_no_warnings() {
        let warnings = Config::default().validate();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = Config::default();
        cfg.apply_env_from(lookup(&[
            ("PORT", "8081"),
            ("VID2AUDIO_RETENTION_SECS", "30"),
            ("VID2AUDIO_PUSH_PATH", "/push"),
            ("VID2AUDIO_OUTPUT_DIR", "/tmp/out"),
        ]));
        assert_eq!(cfg.server.port, 8081);
        assert_eq!(cfg.queue.retention_secs, 30);
        assert_eq!(cfg.server.push_path, "/push");
        assert_eq!(cfg.storage.output_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn prefixed_port_wins_over_plain_port() {
        let mut cfg = Config::default();
        cfg.apply_env_from(lookup(&[("PORT", "1000"), ("VID2AUDIO_PORT", "2000")]));
        assert_eq!(cfg.server.port, 2000);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut cfg = Config::default();
        cfg.apply_env_from(lookup(&[("PORT", "eighty"), ("VID2AUDIO_RETENTION_SECS", "-5")]));
        assert_eq!(cfg.server.port, 3001);
        assert_eq!(cfg.queue.retention_secs, 600);
    }

    #[test]
    fn push_path_must_be_absolute() {
        let mut cfg = Config::default();
        cfg.server.push_path = "ws".into();
        assert!(cfg.check().is_err());
    }

    #[test]
    fn push_path_cannot_shadow_http_routes() {
        for path in ["/upload", "/queue-status", "/api", "/api/events", "/download/x"] {
            let mut cfg = Config::default();
            cfg.server.push_path = path.into();
            assert!(cfg.check().is_err(), "{path} accepted");
        }
        let mut cfg = Config::default();
        cfg.server.push_path = "/ws".into();
        assert!(cfg.check().is_ok());
    }

    #[test]
    fn zero_retention_is_rejected() {
        let mut cfg = Config::default();
        cfg.queue.retention_secs = 0;
        assert!(cfg.check().is_err());
    }

    #[test]
    fn shared_directories_warn() {
        let mut cfg = Config::default();
        cfg.storage.output_dir = cfg.storage.upload_dir.clone();
        assert!(cfg.validate().iter().any(|w| w.contains("same directory")));
    }

    #[test]
    fn parse_partial_json() {
        let cfg: Config = serde_json::from_str(r#"{"queue": {"retention_secs": 5}}"#).unwrap();
        assert_eq!(cfg.queue.retention_secs, 5);
        assert_eq!(cfg.queue.poll_interval_secs, 2);
        assert_eq!(cfg.server.port, 3001);
    }
}
