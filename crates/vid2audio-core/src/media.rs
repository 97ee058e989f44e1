//! Media-domain value types shared by the job core and the engine.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Optional trim window, in seconds, applied to the source before transcoding.
///
/// A window is only constructed through [`TrimWindow::new`], so any value in
/// circulation has already been validated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrimWindow {
    /// Start offset in seconds.
    pub start: Option<f64>,
    /// End offset in seconds. Without a start it is a duration from zero.
    pub end: Option<f64>,
}

impl TrimWindow {
    /// Validate a pair of optional bounds.
    ///
    /// Returns `Ok(None)` when neither bound is given.
    pub fn new(start: Option<f64>, end: Option<f64>) -> Result<Option<Self>> {
        if let Some(s) = start {
            if !s.is_finite() || s < 0.0 {
                return Err(Error::Validation(format!(
                    "start must be a non-negative number of seconds, got {s}"
                )));
            }
        }
        if let Some(e) = end {
            if !e.is_finite() || e <= 0.0 {
                return Err(Error::Validation(format!(
                    "end must be a positive number of seconds, got {e}"
                )));
            }
        }
        if let (Some(s), Some(e)) = (start, end) {
            if e <= s {
                return Err(Error::Validation(format!(
                    "end ({e}) must be greater than start ({s})"
                )));
            }
        }

        if start.is_none() && end.is_none() {
            return Ok(None);
        }
        Ok(Some(Self { start, end }))
    }

    /// Parse bounds from optional strings as they arrive from forms and query
    /// strings. Blank strings count as absent.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Option<Self>> {
        Self::new(parse_seconds("start", start)?, parse_seconds("end", end)?)
    }

    /// Length of the window when it is fully determined.
    ///
    /// With only an end bound the window runs from zero.
    pub fn duration(&self) -> Option<f64> {
        match (self.start, self.end) {
            (Some(s), Some(e)) => Some(e - s),
            (None, Some(e)) => Some(e),
            _ => None,
        }
    }
}

/// Reduce a client-supplied file name to a safe single path component.
///
/// Directory parts are stripped and anything outside `[A-Za-z0-9._-]` becomes
/// `_`. An empty or dot-only result falls back to `"upload"`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

fn parse_seconds(field: &str, raw: Option<&str>) -> Result<Option<f64>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| Error::Validation(format!("{field} is not a number: {raw:?}")))
}
