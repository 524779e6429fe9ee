//! Target and live visual parameters.
//!
//! `VisualConfig` is the declarative target (set by the user or by the
//! current emotion). `LiveParameters` is what actually gets drawn; the
//! animator relaxes it toward the target every frame.

use serde::{Deserialize, Serialize};

use crate::color::Color;

/// Frequency is a divisor in the wave equation and may never reach zero.
pub const MIN_FREQUENCY: f32 = 1.0;
pub const MIN_WAVE_COUNT: u32 = 1;
pub const MAX_WAVE_COUNT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    pub wave_count: u32,
    pub amplitude: f32,
    pub frequency: f32,
    pub speed: f32,
    pub color1: Color,
    pub color2: Color,
    pub background: Color,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            wave_count: 3,
            amplitude: 60.0,
            frequency: 30.0,
            speed: 0.15,
            color1: Color::from_rgb8(0x63, 0x66, 0xf1),
            color2: Color::from_rgb8(0xec, 0x48, 0x99),
            background: Color::from_rgb8(0x11, 0x18, 0x27),
        }
    }
}

impl VisualConfig {
    /// Apply the edit-time guards: wave count within the panel range,
    /// non-negative amplitude, frequency floored above zero.
    pub fn sanitized(mut self) -> Self {
        self.wave_count = clamp_wave_count(self.wave_count);
        self.amplitude = if self.amplitude.is_finite() {
            self.amplitude.max(0.0)
        } else {
            0.0
        };
        self.frequency = clamp_frequency(self.frequency);
        if !self.speed.is_finite() {
            self.speed = 0.0;
        }
        self
    }

    pub fn with_wave_count(self, wave_count: u32) -> Self {
        Self {
            wave_count: clamp_wave_count(wave_count),
            ..self
        }
    }
}

pub fn clamp_wave_count(n: u32) -> u32 {
    n.clamp(MIN_WAVE_COUNT, MAX_WAVE_COUNT)
}

pub fn clamp_frequency(f: f32) -> f32 {
    if f.is_finite() {
        f.max(MIN_FREQUENCY)
    } else {
        MIN_FREQUENCY
    }
}

/// Per-frame animated values. `wave_count` is kept fractional so count
/// changes ease like everything else; it is rounded only when geometry is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveParameters {
    pub wave_count: f32,
    pub amplitude: f32,
    pub frequency: f32,
    pub speed: f32,
    pub color1: Color,
    pub color2: Color,
    pub background: Color,
}

impl From<&VisualConfig> for LiveParameters {
    fn from(config: &VisualConfig) -> Self {
        Self {
            wave_count: config.wave_count as f32,
            amplitude: config.amplitude,
            frequency: config.frequency,
            speed: config.speed,
            color1: config.color1,
            color2: config.color2,
            background: config.background,
        }
    }
}

/// Amplitude and speed after activity-state modulation. Frequency and
/// wave count are never modulated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstantTarget {
    pub amplitude: f32,
    pub speed: f32,
}
