//! Vid2audio - media-to-audio transcoding server
//!
//! This library crate exposes the job core and the HTTP surfaces for
//! integration testing.

pub mod config;
pub mod jobs;
pub mod notifier;
pub mod server;
