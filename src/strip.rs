//! Strip sinks and the segments that map area pixels onto them.
//!
//! A sink is whatever accepts "pixel `i` is this color" followed by a
//! "flush". Real drivers live outside this crate; `MockStrip` keeps the
//! pixels in memory so the server and the tests can run anywhere.
//!
//! ## Rust concepts
//! - Trait objects (`Arc<dyn StripSink>`) shared between areas
//! - Interior mutability (`Mutex`) so writes only need `&self`

use crate::Color;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

// ── Sink ─────────────────────────────────────────────────────────────

/// A physical (or mocked) LED strip.
///
/// Rust concept: `Send + Sync` SUPERTRAITS
/// Several segments, possibly in different areas, can point at the same
/// strip from different tokio tasks. Implementations must therefore
/// serialize their own writes; both methods take `&self`.
pub trait StripSink: Send + Sync {
    /// Stage the packed `0xWWRRGGBB` color for pixel `index`.
    fn set_pixel(&self, index: usize, packed: u32);
    /// Push staged pixels to the LEDs.
    fn flush(&self);
    /// Number of pixels the strip has.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
struct MockPixels {
    staged: Vec<u32>,
    shown: Vec<u32>,
    flushes: u64,
}

/// In-memory strip: keeps a staged buffer and the last flushed one.
#[derive(Debug)]
pub struct MockStrip {
    pixels: Mutex<MockPixels>,
}

impl MockStrip {
    pub fn new(count: usize) -> Self {
        Self {
            pixels: Mutex::new(MockPixels {
                staged: vec![0; count],
                shown: vec![0; count],
                flushes: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockPixels> {
        self.pixels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// What the LEDs currently show, as of the last flush.
    pub fn shown(&self) -> Vec<Color> {
        self.lock().shown.iter().copied().map(Color::from_packed).collect()
    }

    pub fn flush_count(&self) -> u64 {
        self.lock().flushes
    }
}

impl StripSink for MockStrip {
    fn set_pixel(&self, index: usize, packed: u32) {
        let mut pixels = self.lock();
        match pixels.staged.get_mut(index) {
            Some(slot) => *slot = packed,
            None => tracing::debug!("mock strip: pixel {} out of range", index),
        }
    }

    fn flush(&self) {
        let mut pixels = self.lock();
        let MockPixels {
            staged,
            shown,
            flushes,
        } = &mut *pixels;
        shown.clone_from(staged);
        *flushes += 1;
    }

    fn len(&self) -> usize {
        self.lock().staged.len()
    }
}

// ── Segment ──────────────────────────────────────────────────────────

/// A run of physical pixels on one strip, walked from `start` toward `end`.
///
/// `end` is exclusive. When `start > end` the run is walked backwards, so
/// `Segment(9, 0)` covers physical pixels 9, 8, ..., 1.
#[derive(Clone)]
pub struct Segment {
    start: usize,
    end: usize,
    strip_id: Option<String>,
    sink: Option<Arc<dyn StripSink>>,
}

impl Segment {
    /// Callers validate `start != end`; see `Area::add_segment`.
    pub(crate) fn new(
        start: usize,
        end: usize,
        strip_id: Option<String>,
        sink: Option<Arc<dyn StripSink>>,
    ) -> Self {
        Self {
            start,
            end,
            strip_id,
            sink,
        }
    }

    fn is_forward(&self) -> bool {
        self.start < self.end
    }

    /// Never zero for a validated segment.
    pub(crate) fn len(&self) -> usize {
        self.start.abs_diff(self.end)
    }

    /// Physical indices in traversal order.
    pub fn indices(&self) -> impl Iterator<Item = usize> + use<> {
        let (start, forward) = (self.start, self.is_forward());
        (0..self.len()).map(move |k| if forward { start + k } else { start - k })
    }

    pub fn status(&self) -> SegmentStatus {
        SegmentStatus {
            start: self.start,
            end: self.end,
            strip: self.strip_id.clone(),
        }
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("strip_id", &self.strip_id)
            .field("wired", &self.sink.is_some())
            .finish()
    }
}

/// Segment as reported over the API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct SegmentStatus {
    #[schema(example = 0)]
    pub start: usize,
    #[schema(example = 60)]
    pub end: usize,
    /// Strip id, or null for a placeholder segment
    #[schema(example = "desk")]
    pub strip: Option<String>,
}

/// Write one frame across `segments` in declaration order.
///
/// Placeholder segments (no sink) write nothing but still consume their
/// share of the frame, so the pixels after them stay aligned. Every
/// segment that has a sink is flushed once its pixels are written.
pub fn write_frame(segments: &[Segment], frame: &[Color]) {
    let mut offset = 0;
    for segment in segments {
        if let Some(sink) = &segment.sink {
            let colors = frame.iter().skip(offset);
            for (index, color) in segment.indices().zip(colors) {
                sink.set_pixel(index, color.packed());
            }
            sink.flush();
        }
        offset += segment.len();
    }
}

// ── Tests ────────────────────────────────────────────────────────────
