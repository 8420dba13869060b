//! Area: a named group of strip segments animated as one.
//!
//! An area holds at most one calculator and runs at most one render loop.
//! A mode change stops the old calculator completely before the new one is
//! started, so two calculators never feed the same strips.
//!
//! ## Rust concepts
//! - `async fn` methods taking `&mut self` to serialize transitions
//! - `thiserror` for caller-facing error enums
//! - `FromStr` / `Display` for the mode name round trip

use crate::Color;
use crate::animation::Variant;
use crate::calculator::{Calculator, CalculatorReport, CalculatorView, FrameBuffer};
use crate::strip::{Segment, SegmentStatus, StripSink, write_frame};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Cadence of the render loop.
pub const RENDER_PERIOD: Duration = Duration::from_millis(200);

/// Used for the first color when a mode needs one and none was given.
pub const DEFAULT_COLOR1: Color = Color::rgbw(255, 0, 0, 0);
/// Used for the second color when a mode needs two and none was given.
pub const DEFAULT_COLOR2: Color = Color::rgbw(0, 0, 255, 0);

// ── Errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AreaError {
    #[error("invalid segment {start}..{end}: bounds must be >= 0 and differ")]
    InvalidSegment { start: i64, end: i64 },
    #[error("unknown mode: {0}")]
    UnknownMode(String),
}

// ── Mode ─────────────────────────────────────────────────────────────

/// What an area is doing: off, or running one animation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Black,
    Animation(Variant),
}

impl Mode {
    pub const BLACK: &'static str = "black";

    pub fn is_black(self) -> bool {
        self == Mode::Black
    }
}

impl FromStr for Mode {
    type Err = AreaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == Mode::BLACK {
            return Ok(Mode::Black);
        }
        Variant::from_name(s)
            .map(Mode::Animation)
            .ok_or_else(|| AreaError::UnknownMode(s.to_string()))
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Black => f.write_str(Mode::BLACK),
            Mode::Animation(v) => f.write_str(v.name()),
        }
    }
}

// ── Status ───────────────────────────────────────────────────────────

/// Read-only view of an area for status reporting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct AreaStatus {
    #[schema(example = "living_room")]
    pub name: String,
    /// "black" when off, otherwise the running mode name
    #[schema(example = "fire")]
    pub mode: String,
    #[schema(example = 120)]
    pub total_pixel_count: usize,
    pub segments: Vec<SegmentStatus>,
}

// ── Render loop ──────────────────────────────────────────────────────

/// What the render loop draws: the current frame source and the segments
/// it maps onto. `frame: None` means "nothing to show" and ends the loop.
#[derive(Default)]
struct Feed {
    frame: Option<FrameBuffer>,
    segments: Arc<[Segment]>,
}

type Source = Arc<Mutex<Feed>>;

struct RenderLoop {
    active: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl RenderLoop {
    fn spawn(name: String, source: Source) -> Self {
        let active = Arc::new(AtomicBool::new(true));
        let flag = active.clone();
        let task = tokio::spawn(async move {
            tracing::debug!("{}: render loop started", name);
            let mut ticker = tokio::time::interval(RENDER_PERIOD);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if !flag.load(Ordering::Acquire) {
                    break;
                }
                let (frame, segments) = {
                    let feed = source.lock().unwrap_or_else(PoisonError::into_inner);
                    match &feed.frame {
                        Some(buffer) => (buffer.snapshot(), feed.segments.clone()),
                        None => break,
                    }
                };
                write_frame(&segments, &frame);
            }
            tracing::debug!("{}: render loop stopped", name);
        });
        Self { active, task }
    }

    fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the loop and wait for its current tick to finish.
    async fn stop(self) {
        self.active.store(false, Ordering::Release);
        if let Err(e) = self.task.await {
            tracing::error!("render loop failed: {}", e);
        }
    }
}

// ── Published status ─────────────────────────────────────────────────

#[derive(Clone, Debug)]
struct Published {
    status: AreaStatus,
    calculator: Option<CalculatorView>,
}

/// Read side of an area, refreshed at every transition boundary.
///
/// Rust concept: SHARED STATUS
/// The area's own lock is held for a whole mode change. Readers go through
/// this handle instead, whose lock is only ever held for a copy.
#[derive(Clone, Debug)]
pub struct AreaWatch {
    shared: Arc<Mutex<Published>>,
}

impl AreaWatch {
    fn lock(&self) -> std::sync::MutexGuard<'_, Published> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> AreaStatus {
        self.lock().status.clone()
    }

    pub fn is_black(&self) -> bool {
        self.lock().status.mode == Mode::BLACK
    }

    /// The running calculator, or `None` while the area is off.
    pub fn calculator(&self) -> Option<CalculatorReport> {
        let view = self.lock().calculator.clone();
        view.map(|v| v.report())
    }
}

// ── Area ─────────────────────────────────────────────────────────────

pub struct Area {
    name: String,
    mode: Mode,
    segments: Vec<Segment>,
    calculator: Option<Calculator>,
    source: Source,
    render: Option<RenderLoop>,
    watch: AreaWatch,
}

impl Area {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let status = AreaStatus {
            name: name.clone(),
            mode: Mode::BLACK.to_string(),
            total_pixel_count: 0,
            segments: Vec::new(),
        };
        Self {
            name,
            mode: Mode::Black,
            segments: Vec::new(),
            calculator: None,
            source: Arc::new(Mutex::new(Feed::default())),
            render: None,
            watch: AreaWatch {
                shared: Arc::new(Mutex::new(Published {
                    status,
                    calculator: None,
                })),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn calculator(&self) -> Option<&Calculator> {
        self.calculator.as_ref()
    }

    pub fn is_rendering(&self) -> bool {
        self.render.as_ref().is_some_and(|r| !r.is_finished())
    }

    /// Handle for reading this area's status without taking its lock.
    pub fn watch(&self) -> AreaWatch {
        self.watch.clone()
    }

    /// Append a segment covering `start` toward `end` (exclusive).
    ///
    /// A segment without a sink is a placeholder: it counts toward the pixel
    /// total and shifts later segments, but nothing is written for it.
    /// A running render loop picks the segment up on its next tick; the
    /// calculator is sized for it at the next mode change.
    pub fn add_segment(
        &mut self,
        start: i64,
        end: i64,
        sink: Option<(String, Arc<dyn StripSink>)>,
    ) -> Result<(), AreaError> {
        let invalid = AreaError::InvalidSegment { start, end };
        if start == end {
            return Err(invalid);
        }
        let (Ok(first), Ok(last)) = (usize::try_from(start), usize::try_from(end)) else {
            return Err(invalid);
        };

        let (strip_id, sink) = match sink {
            Some((id, sink)) => (Some(id), Some(sink)),
            None => (None, None),
        };
        self.segments.push(Segment::new(first, last, strip_id, sink));
        self.lock_feed().segments = self.segments.clone().into();
        self.publish();
        Ok(())
    }

    pub fn total_pixel_count(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }

    pub fn status(&self) -> AreaStatus {
        AreaStatus {
            name: self.name.clone(),
            mode: self.mode.to_string(),
            total_pixel_count: self.total_pixel_count(),
            segments: self.segments.iter().map(Segment::status).collect(),
        }
    }

    /// Switch to the mode called `mode`.
    ///
    /// Unknown names leave the area untouched and return `UnknownMode`.
    /// Otherwise the running calculator is stopped (and awaited) first.
    /// `"black"` turns the area off and blanks its strips; any other mode
    /// starts the matching calculator with the colors it asks for.
    ///
    /// If the returned future is dropped part way, the area is left off:
    /// mode black, no calculator, and any running render loop drawing black.
    pub async fn set_mode(
        &mut self,
        mode: &str,
        color1: Option<Color>,
        color2: Option<Color>,
    ) -> Result<(), AreaError> {
        let mode = mode.parse::<Mode>().inspect_err(|e| {
            tracing::warn!("{}: {}", self.name, e);
        })?;

        let previous = self.begin_transition();
        if let Some(mut calculator) = previous {
            calculator.stop().await;
        }

        match mode {
            Mode::Black => {
                self.shut_off().await;
            }
            Mode::Animation(variant) => {
                let colors = [
                    color1.unwrap_or(DEFAULT_COLOR1),
                    color2.unwrap_or(DEFAULT_COLOR2),
                ];
                let colors = &colors[..variant.required_color_count().min(colors.len())];

                let mut calculator = Calculator::new(variant, self.total_pixel_count(), colors);
                calculator.start();
                self.lock_feed().frame = Some(calculator.buffer());
                self.calculator = Some(calculator);
                self.mode = mode;
                self.ensure_render_loop();
                self.publish();
            }
        }

        tracing::info!("{}: mode set to {}", self.name, self.mode);
        Ok(())
    }

    /// Turn the area off and blank its strips.
    ///
    /// Returns at once when nothing is running.
    pub async fn stop(&mut self) {
        if self.calculator.is_none() && self.render.is_none() {
            return;
        }
        if let Some(mut calculator) = self.begin_transition() {
            calculator.stop().await;
        }
        self.shut_off().await;
        tracing::info!("{}: stopped", self.name);
    }

    /// Take the calculator out and mark the area off, before any await.
    ///
    /// A running render loop is pointed at a black frame, so it never keeps
    /// showing the old animation while nothing computes it.
    fn begin_transition(&mut self) -> Option<Calculator> {
        let previous = self.calculator.take();
        self.mode = Mode::Black;
        if self.render.is_some() {
            self.lock_feed().frame = Some(FrameBuffer::black(self.total_pixel_count()));
        }
        self.publish();
        previous
    }

    /// Detach the frame source, end the render loop and paint black.
    async fn shut_off(&mut self) {
        self.lock_feed().frame = None;
        self.mode = Mode::Black;
        if let Some(render) = self.render.take() {
            render.stop().await;
        }
        self.blank();
        self.publish();
    }

    fn blank(&self) {
        write_frame(&self.segments, &vec![Color::BLACK; self.total_pixel_count()]);
    }

    fn ensure_render_loop(&mut self) {
        if self.is_rendering() {
            return;
        }
        self.render = Some(RenderLoop::spawn(self.name.clone(), self.source.clone()));
    }

    fn publish(&self) {
        let next = Published {
            status: self.status(),
            calculator: self.calculator.as_ref().map(Calculator::view),
        };
        *self.watch.lock() = next;
    }

    fn lock_feed(&self) -> std::sync::MutexGuard<'_, Feed> {
        self.source.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Area")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("segments", &self.segments)
            .field("rendering", &self.is_rendering())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────────
