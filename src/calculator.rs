//! Calculator: runs one animation on a background tokio task.
//!
//! The task owns the animation state and publishes whole frames into a
//! `FrameBuffer`. Readers (the area render loop) only ever see complete
//! frames because a tick builds its frame first and then swaps the `Arc`.
//!
//! ## Rust concepts
//! - `tokio::spawn` + `JoinHandle` for a stoppable background task
//! - `AtomicBool` flags shared through `Arc`
//! - `Arc<[T]>` as a cheap, immutable snapshot

use crate::Color;
use crate::animation::{Animation, Step, Variant};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Pause after a stop so the last black frame reaches the strips.
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);
/// Upper bound on waiting for the compute task in `stop()`.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// One complete frame, shared read-only.
pub type Frame = Arc<[Color]>;

// ── Frame buffer ─────────────────────────────────────────────────────

/// Shared slot holding the most recent frame.
///
/// Rust concept: SWAP, DON'T MUTATE
/// The mutex guards only the pointer swap, never the pixels. A reader
/// clones the `Arc` and releases the lock right away, so a slow strip
/// write never holds up the compute task.
#[derive(Clone, Debug)]
pub struct FrameBuffer {
    frame: Arc<Mutex<Frame>>,
}

impl FrameBuffer {
    pub fn black(length: usize) -> Self {
        Self::from_frame(vec![Color::BLACK; length])
    }

    fn from_frame(pixels: Vec<Color>) -> Self {
        Self {
            frame: Arc::new(Mutex::new(pixels.into())),
        }
    }

    pub fn snapshot(&self) -> Frame {
        self.frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace(&self, pixels: Vec<Color>) {
        let next: Frame = pixels.into();
        *self.frame.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

// ── Calculator ───────────────────────────────────────────────────────

/// An animation plus the task that drives it.
pub struct Calculator {
    variant: Variant,
    length: usize,
    buffer: FrameBuffer,
    active: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    animation: Option<Animation>,
    task: Option<JoinHandle<()>>,
}

impl Calculator {
    /// Build `variant` for `length` pixels. Nothing runs until `start()`.
    pub fn new(variant: Variant, length: usize, colors: &[Color]) -> Self {
        Self::with_animation(variant, length, variant.build(length, colors))
    }

    pub(crate) fn with_animation(variant: Variant, length: usize, animation: Animation) -> Self {
        Self {
            variant,
            length,
            buffer: FrameBuffer::from_frame(animation.initial_frame(length)),
            active: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            animation: Some(animation),
            task: None,
        }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// True while the compute task is still ticking.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Handle to the frame slot, for readers outside the calculator.
    pub fn buffer(&self) -> FrameBuffer {
        self.buffer.clone()
    }

    pub fn current_frame(&self) -> Frame {
        self.buffer.snapshot()
    }

    /// Read-only handle that outlives borrows of the calculator.
    pub fn view(&self) -> CalculatorView {
        CalculatorView {
            variant: self.variant,
            length: self.length,
            buffer: self.buffer.clone(),
            running: self.running.clone(),
        }
    }

    /// Mark active and spawn the compute task.
    ///
    /// Must be called from within a tokio runtime. A calculator can only be
    /// started once; later calls are logged and ignored.
    pub fn start(&mut self) {
        let Some(animation) = self.animation.take() else {
            tracing::warn!("{} calculator already started", self.variant);
            return;
        };

        self.active.store(true, Ordering::Release);
        self.running.store(true, Ordering::Release);

        let buffer = self.buffer.clone();
        let active = self.active.clone();
        let running = self.running.clone();
        self.task = Some(tokio::spawn(async move {
            compute(animation, buffer, active).await;
            running.store(false, Ordering::Release);
        }));

        tracing::debug!("{} calculator started ({} pixels)", self.variant, self.length);
    }

    /// Stop the compute task, blank the buffer, then settle.
    ///
    /// The wait for the task is bounded by [`STOP_TIMEOUT`]; a task that
    /// overruns it is aborted and reported.
    pub async fn stop(&mut self) {
        self.active.store(false, Ordering::Release);

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(STOP_TIMEOUT, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("{} calculator task failed: {}", self.variant, e),
                Err(_) => {
                    tracing::error!(
                        "{} calculator did not stop within {:?}, aborting it",
                        self.variant,
                        STOP_TIMEOUT
                    );
                    task.abort();
                }
            }
        }
        self.running.store(false, Ordering::Release);

        self.buffer.replace(vec![Color::BLACK; self.length]);
        tokio::time::sleep(SETTLE_DELAY).await;

        tracing::debug!("{} calculator stopped", self.variant);
    }
}

impl Drop for Calculator {
    fn drop(&mut self) {
        // Dropped without stop(): don't leave an orphan task ticking
        if let Some(task) = self.task.take() {
            self.active.store(false, Ordering::Release);
            task.abort();
        }
    }
}

// ── Introspection ────────────────────────────────────────────────────

/// Read side of a calculator: its frame slot and running flag.
#[derive(Clone, Debug)]
pub struct CalculatorView {
    variant: Variant,
    length: usize,
    buffer: FrameBuffer,
    running: Arc<AtomicBool>,
}

impl CalculatorView {
    pub fn report(&self) -> CalculatorReport {
        CalculatorReport {
            variant: self.variant.name().to_string(),
            length: self.length,
            running: self.running.load(Ordering::Acquire),
            frame: self.buffer.snapshot().iter().map(Color::hex_string).collect(),
        }
    }
}

/// Calculator as reported over the API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct CalculatorReport {
    #[schema(example = "fire")]
    pub variant: String,
    #[schema(example = 120)]
    pub length: usize,
    /// False once the animation finished or was stopped
    pub running: bool,
    /// Current frame as `#RRGGBB` strings
    pub frame: Vec<String>,
}

/// Compute loop: tick, publish, sleep, until told to stop or finished.
///
/// The `active` flag is checked before every tick, so a stop request is
/// honoured at the next wake-up at the latest.
async fn compute(mut animation: Animation, buffer: FrameBuffer, active: Arc<AtomicBool>) {
    let period = animation.period();

    while active.load(Ordering::Acquire) {
        match animation.step() {
            Step::Frame(frame) => buffer.replace(frame),
            Step::Last(frame) => {
                buffer.replace(frame);
                break;
            }
            Step::Done => break,
        }
        tokio::time::sleep(period).await;
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{Fire, Variant};
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const WIPE: Color = Color::rgbw(10, 20, 30, 40);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn new_calculator_is_black_and_idle() {
        let calc = Calculator::new(Variant::ColorWipe, 10, &[WIPE]);
        assert_eq!(&*calc.current_frame(), &[Color::BLACK; 10]);
        assert!(!calc.is_active());
        assert!(!calc.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn color_wipe_fills_over_time_then_exits() {
        let n = 20;
        let mut calc = Calculator::new(Variant::ColorWipe, n, &[WIPE]);
        calc.start();
        assert!(calc.is_active());
        assert!(calc.current_frame().iter().all(|c| *c == Color::BLACK));

        // ceil(n / 5) ticks: the head is lit, the tail is not
        tokio::time::sleep(ms(200 * 4 + 50)).await;
        let frame = calc.current_frame();
        assert_eq!(frame[0], WIPE);
        assert_eq!(frame[n - 1], Color::BLACK);
        assert!(calc.is_running());

        // n ticks: fully lit and the task has exited on its own
        tokio::time::sleep(ms(200 * 16)).await;
        assert!(calc.current_frame().iter().all(|c| *c == WIPE));
        assert!(!calc.is_running());

        calc.stop().await;
        assert!(calc.current_frame().iter().all(|c| *c == Color::BLACK));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_mid_animation_resets_to_black() {
        let mut calc = Calculator::new(Variant::TestCounter, 50, &[]);
        calc.start();
        tokio::time::sleep(ms(1500)).await;
        assert_eq!(calc.current_frame()[0], Color::RED);

        calc.stop().await;
        assert!(!calc.is_active());
        assert!(!calc.is_running());
        assert_eq!(&*calc.current_frame(), &[Color::BLACK; 50]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_waits_for_settle_delay() {
        let mut calc = Calculator::new(Variant::OneColor, 3, &[WIPE]);
        calc.start();
        let before = tokio::time::Instant::now();
        calc.stop().await;
        assert!(before.elapsed() >= SETTLE_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn one_color_is_static() {
        let mut calc = Calculator::new(Variant::OneColor, 4, &[WIPE]);
        calc.start();
        tokio::time::sleep(ms(10)).await;
        assert!(!calc.is_running());
        assert_eq!(&*calc.current_frame(), &[WIPE; 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_ignored() {
        let mut calc = Calculator::new(Variant::TestCounter, 10, &[]);
        calc.start();
        calc.start();
        assert!(calc.is_running());
        calc.stop().await;
        assert!(!calc.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn fire_frames_stay_in_range_and_decay_without_sparks() {
        let mut pixels = vec![Color::BLACK; 40];
        pixels[3] = Color::rgbw(255, 200, 0, 0);
        let fire = Fire::without_seeding(pixels, StdRng::seed_from_u64(5));
        let mut calc = Calculator::with_animation(Variant::Fire, 40, Animation::Fire(fire));
        calc.start();

        let mut previous = u32::MAX;
        for _ in 0..200 {
            tokio::time::sleep(Fire::PERIOD).await;
            let peak = calc
                .current_frame()
                .iter()
                .map(|c| u32::from(c.red.max(c.green)))
                .max()
                .unwrap_or(0);
            assert!(peak <= previous);
            previous = peak;
        }
        assert_eq!(previous, 0);
        calc.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn view_reports_frame_after_stop() {
        let mut calc = Calculator::new(Variant::OneColor, 2, &[Color::new(1, 2, 3)]);
        let view = calc.view();
        calc.start();
        tokio::time::sleep(ms(10)).await;

        let report = view.report();
        assert_eq!(report.variant, "color");
        assert_eq!(report.length, 2);
        assert!(!report.running);
        assert_eq!(report.frame, vec!["#010203".to_string(); 2]);

        calc.stop().await;
        assert_eq!(view.report().frame, vec!["#000000".to_string(); 2]);
    }

    #[test]
    fn snapshot_survives_replace() {
        let buffer = FrameBuffer::black(2);
        let before = buffer.snapshot();
        buffer.replace(vec![WIPE, WIPE]);
        assert_eq!(&*before, &[Color::BLACK; 2]);
        assert_eq!(&*buffer.snapshot(), &[WIPE; 2]);
    }
}
