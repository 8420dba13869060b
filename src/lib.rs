//! Animation engine for addressable LED strips grouped into named areas.
//!
//! This crate provides:
//! - The RGBW `Color` value shared by every layer
//! - Frame calculators (the per-mode animation algorithms)
//! - Areas that map calculator output onto physical strip segments
//! - A controller registry, JSON config loading and the HTTP API used by
//!   the main binary
//!
//! Hardware is reached only through the `StripSink` trait, so everything
//! here runs (and is tested) on any host.

pub mod animation;
pub mod area;
pub mod calculator;
pub mod config;
pub mod controller;
pub mod server;
pub mod strip;

use serde::{Deserialize, Serialize};

// ── Color ──────────────────────────────────────────────────────────

/// A four channel (red, green, blue, white) pixel color.
///
/// # Rust concept: derive macros
/// `Clone, Copy` make this cheaply copyable (it's just four bytes).
/// `PartialEq, Eq` give structural equality, which is exactly what
/// comparing two frames needs. `Default` is black, and `#[serde(default)]`
/// lets a JSON body name any subset of the channels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct Color {
    #[schema(example = 255)]
    pub red: u8,
    #[schema(example = 0)]
    pub green: u8,
    #[schema(example = 0)]
    pub blue: u8,
    #[schema(example = 0)]
    pub white: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgbw(0, 0, 0, 0);
    pub const RED: Color = Color::rgbw(255, 0, 0, 0);
    pub const GREEN: Color = Color::rgbw(0, 255, 0, 0);
    pub const BLUE: Color = Color::rgbw(0, 0, 255, 0);

    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self::rgbw(red, green, blue, 0)
    }

    pub const fn rgbw(red: u8, green: u8, blue: u8, white: u8) -> Self {
        Self {
            red,
            green,
            blue,
            white,
        }
    }

    /// Pure white-channel color, RGB off.
    pub const fn with_white(white: u8) -> Self {
        Self::rgbw(0, 0, 0, white)
    }

    /// `#RRGGBB` in uppercase hex. The white channel is not represented.
    pub fn hex_string(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.red, self.green, self.blue)
    }

    /// Packed `0xWWRRGGBB` value, the format strip sinks consume.
    pub const fn packed(&self) -> u32 {
        ((self.white as u32) << 24)
            | ((self.red as u32) << 16)
            | ((self.green as u32) << 8)
            | self.blue as u32
    }

    /// Inverse of [`Color::packed`].
    pub const fn from_packed(value: u32) -> Self {
        Self::rgbw(
            (value >> 16) as u8,
            (value >> 8) as u8,
            value as u8,
            (value >> 24) as u8,
        )
    }

    /// White channel as a fraction in `0.0..=1.0`.
    pub fn white_fraction(&self) -> f32 {
        f32::from(self.white) / 255.0
    }

    /// Channel-wise addition, clamped at 255.
    pub const fn saturating_add(self, other: Color) -> Self {
        Self::rgbw(
            self.red.saturating_add(other.red),
            self.green.saturating_add(other.green),
            self.blue.saturating_add(other.blue),
            self.white.saturating_add(other.white),
        )
    }

    pub const fn is_black(&self) -> bool {
        self.packed() == 0
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} w{}", self.hex_string(), self.white)
    }
}

// ── Tests ──────────────────────────────────────────────────────────
