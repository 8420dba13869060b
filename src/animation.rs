//! Animation variants: the per-mode frame algorithms and their registry.
//!
//! Each variant is a small state machine that produces the next full frame
//! from the current one. The calculator task in `calculator.rs` drives them
//! on their own period and swaps the result into the shared buffer.
//!
//! ## Rust concepts
//! - A closed `enum` as a registry instead of runtime reflection
//! - `const` tables (`Variant::ALL`) for name lookup
//! - Enum dispatch (`match self`) instead of trait objects

use crate::Color;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Ember boost applied to a seeded fire pixel.
const FIRE_SPARK: Color = Color::rgbw(200, 80, 0, 0);
/// Per channel loss on every fire tick.
const FIRE_DECAY: u16 = 2;

// ── Registry ─────────────────────────────────────────────────────────

/// Every animation an area can run, keyed by a stable name.
///
/// Rust concept: CLOSED REGISTRY
/// Adding a mode means adding a variant here plus an arm in
/// [`Variant::build`]. The compiler then points at every `match` that
/// needs to learn about it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Variant {
    NoColor,
    OneColor,
    ColorWipe,
    Fire,
    TestCounter,
}

impl Variant {
    pub const ALL: [Variant; 5] = [
        Variant::NoColor,
        Variant::OneColor,
        Variant::ColorWipe,
        Variant::Fire,
        Variant::TestCounter,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Variant::NoColor => "no_color",
            Variant::OneColor => "color",
            Variant::ColorWipe => "color_wipe",
            Variant::Fire => "fire",
            Variant::TestCounter => "test",
        }
    }

    /// How many caller colors the constructor consumes.
    pub const fn required_color_count(self) -> usize {
        match self {
            Variant::OneColor | Variant::ColorWipe => 1,
            Variant::NoColor | Variant::Fire | Variant::TestCounter => 0,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.name() == name)
    }

    /// Instantiate the animation for a buffer of `length` pixels.
    ///
    /// `colors` must hold at least `required_color_count()` entries; missing
    /// ones fall back to red.
    pub fn build(self, length: usize, colors: &[Color]) -> Animation {
        let first = colors.first().copied().unwrap_or(Color::RED);
        match self {
            Variant::NoColor => Animation::NoColor,
            Variant::OneColor => Animation::OneColor(first),
            Variant::ColorWipe => Animation::ColorWipe(ColorWipe::new(length, first)),
            Variant::Fire => Animation::Fire(Fire::new(length, StdRng::from_entropy())),
            Variant::TestCounter => Animation::TestCounter(TestCounter::new(length)),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Registry entry as reported over the API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct VariantInfo {
    #[schema(example = "color_wipe")]
    pub name: String,
    #[schema(example = 1)]
    pub required_color_count: usize,
}

impl From<Variant> for VariantInfo {
    fn from(v: Variant) -> Self {
        Self {
            name: v.name().to_string(),
            required_color_count: v.required_color_count(),
        }
    }
}

// ── Animations ───────────────────────────────────────────────────────

/// What a single tick produced.
#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    /// Publish this frame and tick again after the period.
    Frame(Vec<Color>),
    /// Publish this frame, then the compute task exits.
    Last(Vec<Color>),
    /// Nothing more to do; the current frame stays.
    Done,
}

/// A running animation with its private state.
#[derive(Debug)]
pub enum Animation {
    NoColor,
    OneColor(Color),
    ColorWipe(ColorWipe),
    Fire(Fire),
    TestCounter(TestCounter),
}

impl Animation {
    /// Delay between two ticks of the compute task.
    pub fn period(&self) -> Duration {
        match self {
            Animation::NoColor | Animation::OneColor(_) => Duration::ZERO,
            Animation::ColorWipe(_) => ColorWipe::PERIOD,
            Animation::Fire(_) => Fire::PERIOD,
            Animation::TestCounter(_) => TestCounter::PERIOD,
        }
    }

    /// Frame published before the first tick.
    pub fn initial_frame(&self, length: usize) -> Vec<Color> {
        match self {
            Animation::OneColor(color) => vec![*color; length],
            Animation::Fire(fire) => fire.pixels.clone(),
            Animation::NoColor | Animation::ColorWipe(_) | Animation::TestCounter(_) => {
                vec![Color::BLACK; length]
            }
        }
    }

    pub fn step(&mut self) -> Step {
        match self {
            Animation::NoColor | Animation::OneColor(_) => Step::Done,
            Animation::ColorWipe(wipe) => wipe.step(),
            Animation::Fire(fire) => Step::Frame(fire.step()),
            Animation::TestCounter(counter) => Step::Frame(counter.step()),
        }
    }
}

/// Fills the strip one pixel per tick, then stops.
#[derive(Debug)]
pub struct ColorWipe {
    color: Color,
    length: usize,
    position: usize,
}

impl ColorWipe {
    pub const PERIOD: Duration = Duration::from_millis(200);

    pub fn new(length: usize, color: Color) -> Self {
        Self {
            color,
            length,
            position: 0,
        }
    }

    fn step(&mut self) -> Step {
        let p = self.position.min(self.length);
        let mut frame = vec![self.color; p];
        frame.resize(self.length, Color::BLACK);

        if p >= self.length {
            Step::Last(frame)
        } else {
            self.position += 1;
            Step::Frame(frame)
        }
    }
}

/// Wiring check pattern: decade markers plus a green dot walking through
/// each decade.
#[derive(Debug)]
pub struct TestCounter {
    length: usize,
    phase: usize,
}

impl TestCounter {
    pub const PERIOD: Duration = Duration::from_secs(1);

    pub fn new(length: usize) -> Self {
        Self { length, phase: 0 }
    }

    fn step(&mut self) -> Vec<Color> {
        let mut frame = vec![Color::BLACK; self.length];

        for (i, pixel) in frame.iter_mut().enumerate() {
            if i % 100 == 0 {
                *pixel = Color::RED;
            } else if i % 10 == self.phase {
                *pixel = Color::GREEN;
            } else if i % 10 == 0 {
                *pixel = Color::BLUE;
            }
        }

        self.phase = (self.phase + 1) % 10;
        frame
    }
}

/// Ember cascade: random sparks that bleed into their ring neighbours and
/// fade out.
#[derive(Debug)]
pub struct Fire {
    pixels: Vec<Color>,
    rng: StdRng,
    seeding: bool,
}

impl Fire {
    pub const PERIOD: Duration = Duration::from_millis(500);

    pub fn new(length: usize, rng: StdRng) -> Self {
        let mut fire = Self {
            pixels: vec![Color::BLACK; length],
            rng,
            seeding: true,
        };
        fire.seed(2 * (length / 20));
        fire
    }

    /// Starts from `pixels` and never adds sparks, so it only decays.
    pub fn without_seeding(pixels: Vec<Color>, rng: StdRng) -> Self {
        Self {
            pixels,
            rng,
            seeding: false,
        }
    }

    fn seed(&mut self, count: usize) {
        let length = self.pixels.len();
        if length == 0 {
            return;
        }
        for _ in 0..count {
            let i = self.rng.gen_range(0..length);
            self.pixels[i] = self.pixels[i].saturating_add(FIRE_SPARK);
        }
    }

    fn step(&mut self) -> Vec<Color> {
        if self.seeding {
            self.seed(self.pixels.len() / 20);
        }

        let length = self.pixels.len();
        let next: Vec<Color> = (0..length)
            .map(|i| {
                let left = self.pixels[(i + length - 1) % length];
                let right = self.pixels[(i + 1) % length];
                blend(left, self.pixels[i], right)
            })
            .collect();

        self.pixels.clone_from(&next);
        next
    }
}

fn blend(left: Color, center: Color, right: Color) -> Color {
    let channel = |l: u8, c: u8, r: u8| {
        let mixed = (u16::from(l) + u16::from(r) + 4 * u16::from(c)) / 6;
        // mixed <= 255 because it is a weighted mean of u8 values
        mixed.saturating_sub(FIRE_DECAY) as u8
    };
    Color::rgbw(
        channel(left.red, center.red, right.red),
        channel(left.green, center.green, right.green),
        channel(left.blue, center.blue, right.blue),
        channel(left.white, center.white, right.white),
    )
}

// ── Tests ────────────────────────────────────────────────────────────
