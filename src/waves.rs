//! Wave geometry. Stateless: the same live parameters and time always
//! produce the same polylines.

use crate::color::Color;
use crate::visual::{LiveParameters, MIN_FREQUENCY};

/// Horizontal distance between samples, in pixels.
pub const SAMPLE_STEP: f32 = 10.0;
/// Samples extend this far past both edges so the smoothed curve is not clipped.
pub const EDGE_OVERSCAN: f32 = 10.0;

const OPACITY_BASE: f32 = 0.6;
const OPACITY_RAMP: f32 = 1.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Wave {
    pub points: Vec<Point>,
    pub stroke: Color,
    /// Always within [0, 1].
    pub opacity: f32,
}

/// Number of waves drawn for a (possibly fractional) live wave count.
/// Rounds to nearest, never below one.
pub fn visible_wave_count(wave_count: f32) -> usize {
    if !wave_count.is_finite() {
        return 1;
    }
    wave_count.round().max(1.0) as usize
}

/// Samples per wave for a viewport width: `ceil((width + 20) / 10) + 1`.
pub fn sample_count(width: f32) -> usize {
    let span = width.max(0.0) + 2.0 * EDGE_OVERSCAN;
    (span / SAMPLE_STEP).ceil() as usize + 1
}

pub fn synthesize(live: &LiveParameters, width: f32, height: f32, elapsed: f32) -> Vec<Wave> {
    let count = visible_wave_count(live.wave_count);
    // Divisors below stay positive even if the live count lags under 1.
    let wc = if live.wave_count.is_finite() {
        live.wave_count.max(1.0)
    } else {
        1.0
    };
    let amplitude = live.amplitude;
    let frequency = if live.frequency.is_finite() {
        live.frequency.max(MIN_FREQUENCY)
    } else {
        MIN_FREQUENCY
    };
    let samples = sample_count(width);
    let spacing = amplitude / wc * 0.5;

    (0..count)
        .map(|i| {
            let fi = i as f32;
            let y_offset = height / 2.0 + (fi - (wc - 1.0) / 2.0) * spacing;
            let freq_mult = (fi + 1.0) * 0.5;
            let speed_mult = (fi + 1.0) * 0.2;
            let depth = ((wc - fi) / wc).max(0.0);
            let phase = elapsed * live.speed * speed_mult;
            let wavelength = frequency * freq_mult;

            let points = (0..samples)
                .map(|j| {
                    let x = -EDGE_OVERSCAN + j as f32 * SAMPLE_STEP;
                    let y = y_offset + (x / wavelength + phase).sin() * amplitude * depth;
                    Point::new(x, y)
                })
                .collect();

            Wave {
                points,
                stroke: live.color1.lerp(live.color2, gradient_fraction(fi, wc)),
                opacity: (OPACITY_BASE + (fi / wc) * OPACITY_RAMP).clamp(0.0, 1.0),
            }
        })
        .collect()
}

/// Position of wave `i` along the color1 -> color2 gradient.
/// A single wave (denominator zero) sits at color1.
fn gradient_fraction(i: f32, wave_count: f32) -> f32 {
    let denom = wave_count - 1.0;
    if denom <= f32::EPSILON {
        0.0
    } else {
        (i / denom).clamp(0.0, 1.0)
    }
}
