//! # vid2audio-av
//!
//! External tool management and the transcoding engine for vid2audio.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support and line-by-line stderr streaming.
//! - **Engine contract** ([`TranscodeEngine`], [`TranscodeStream`]) -- the typed
//!   progress stream the job scheduler consumes.
//! - **Engines** ([`FfmpegEngine`], [`ScriptedEngine`]) -- the real ffmpeg
//!   binding and a deterministic in-process engine for tests.

pub mod command;
pub mod engine;
pub mod ffmpeg;
pub mod scripted;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use engine::{
    output_file_name, ProgressSender, TranscodeEngine, TranscodeEvent, TranscodeRequest,
    TranscodeStream,
};
pub use ffmpeg::FfmpegEngine;
pub use scripted::{ScriptStep, ScriptedEngine};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
