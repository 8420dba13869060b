//! JSON configuration: which strips exist and how areas map onto them.
//!
//! ```json
//! {
//!   "strips": [{ "id": "desk", "count": 60, "gpio": 18 }],
//!   "areas": [{ "name": "default", "strips": [[0, 60, "desk"], [0, 20]] }]
//! }
//! ```
//!
//! A segment is `[start, end]` (placeholder, nothing wired) or
//! `[start, end, strip_id]`. Hardware fields such as `gpio` are carried
//! for status reporting only; unknown fields are ignored.
//!
//! ## Rust concepts
//! - `#[serde(untagged)]` to accept two array shapes for one type
//! - `thiserror` `#[from]` to fold I/O and parse errors into one enum

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("strip {0} is defined twice")]
    DuplicateStrip(String),
    #[error("area {0} is defined twice")]
    DuplicateArea(String),
    #[error("area {area} references unknown strip {strip}")]
    UnknownStrip { area: String, strip: String },
    #[error("area {area}: {source}")]
    Segment {
        area: String,
        source: crate::area::AreaError,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub strips: Vec<StripConfig>,
    #[serde(default)]
    pub areas: Vec<AreaConfig>,
}

/// One physical strip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct StripConfig {
    #[schema(example = "desk")]
    pub id: String,
    /// Number of LEDs on the strip
    #[schema(example = 60)]
    pub count: usize,
    /// Data pin of the strip, informational
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpio: Option<u8>,
    /// Pin of the power relay feeding the strip, informational
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_gpio: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaConfig {
    pub name: String,
    #[serde(default)]
    pub strips: Vec<SegmentConfig>,
}

/// `[start, end]` or `[start, end, strip_id]`.
///
/// Bounds are signed so that bad values reach `Area::add_segment` and are
/// rejected there with a proper error instead of a parse failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SegmentConfig {
    Wired(i64, i64, String),
    Placeholder(i64, i64),
}

impl SegmentConfig {
    pub fn bounds(&self) -> (i64, i64) {
        match self {
            SegmentConfig::Wired(start, end, _) | SegmentConfig::Placeholder(start, end) => {
                (*start, *end)
            }
        }
    }

    pub fn strip_id(&self) -> Option<&str> {
        match self {
            SegmentConfig::Wired(_, _, id) => Some(id),
            SegmentConfig::Placeholder(..) => None,
        }
    }
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        tracing::info!(
            "Loaded {} strips and {} areas from {}",
            config.strips.len(),
            config.areas.len(),
            path.display()
        );
        Ok(config)
    }
}
