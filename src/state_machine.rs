use crate::visual::{clamp_frequency, InstantTarget, LiveParameters, VisualConfig};

/// What the AI is doing right now. Drives amplitude and speed modulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivityState {
    #[default]
    Idle,
    Thinking,
    Speaking,
}

const THINKING_AMPLITUDE: f32 = 1.8;
const THINKING_SPEED: f32 = 2.5;
const SPEAKING_SPEED: f32 = 1.4;
// Speaking pulse: two superposed sines (rate in rad/s, depth as fraction of base amplitude)
const PULSE_FAST_RATE: f32 = 18.0;
const PULSE_FAST_DEPTH: f32 = 0.12;
const PULSE_SLOW_RATE: f32 = 4.0;
const PULSE_SLOW_DEPTH: f32 = 0.20;

/// Instantaneous amplitude/speed target for the given activity state.
/// Only computes the target; smoothing is the animator's job.
pub fn modulate(base: &VisualConfig, state: ActivityState, elapsed: f32) -> InstantTarget {
    match state {
        ActivityState::Idle => InstantTarget {
            amplitude: base.amplitude,
            speed: base.speed,
        },
        ActivityState::Thinking => InstantTarget {
            amplitude: base.amplitude * THINKING_AMPLITUDE,
            speed: base.speed * THINKING_SPEED,
        },
        ActivityState::Speaking => {
            let fast = (elapsed * PULSE_FAST_RATE).sin() * (base.amplitude * PULSE_FAST_DEPTH);
            let slow = (elapsed * PULSE_SLOW_RATE).sin() * (base.amplitude * PULSE_SLOW_DEPTH);
            InstantTarget {
                amplitude: base.amplitude + fast + slow,
                speed: base.speed * SPEAKING_SPEED,
            }
        }
    }
}

/// First-order exponential approach: never overshoots for `k` in [0, 1].
pub fn ease(current: f32, target: f32, k: f32) -> f32 {
    current + (target - current) * k
}

/// Easing coefficient policy.
///
/// By default `factor` is applied once per frame regardless of how long the
/// frame took, so convergence speed follows the display refresh rate.
/// `frame_rate_independent` rescales it against a 60 Hz reference instead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Easing {
    pub factor: f32,
    pub frame_rate_independent: bool,
}

const REFERENCE_FPS: f32 = 60.0;

impl Default for Easing {
    fn default() -> Self {
        Self {
            factor: 0.08,
            frame_rate_independent: false,
        }
    }
}

impl Easing {
    pub fn new(factor: f32, frame_rate_independent: bool) -> Self {
        let factor = if factor.is_finite() {
            factor.clamp(0.0, 1.0)
        } else {
            Self::default().factor
        };
        Self {
            factor,
            frame_rate_independent,
        }
    }

    /// Effective k for a frame that lasted `dt` seconds.
    pub fn factor_for(&self, dt: f32) -> f32 {
        if !self.frame_rate_independent || !(dt > 0.0) {
            return self.factor;
        }
        let frames = dt * REFERENCE_FPS;
        (1.0 - (1.0 - self.factor).powf(frames)).clamp(0.0, 1.0)
    }
}

/// Owns the live parameters and relaxes them toward the current target
/// once per frame. The only writer of `LiveParameters`.
pub struct Animator {
    live: LiveParameters,
    easing: Easing,
}

impl Animator {
    /// Live values start equal to the initial target (no easing at mount).
    pub fn new(initial: &VisualConfig, easing: Easing) -> Self {
        Self {
            live: LiveParameters::from(initial),
            easing,
        }
    }

    /// Advance one frame. `elapsed` drives the speaking pulse, `dt` is only
    /// consulted when easing is frame-rate independent.
    pub fn step(
        &mut self,
        config: &VisualConfig,
        state: ActivityState,
        elapsed: f32,
        dt: f32,
    ) -> &LiveParameters {
        let k = self.easing.factor_for(dt);
        let target = modulate(config, state, elapsed);
        let live = &mut self.live;

        live.amplitude = ease(live.amplitude, target.amplitude, k);
        live.speed = ease(live.speed, target.speed, k);
        live.frequency = clamp_frequency(ease(live.frequency, config.frequency, k));
        live.wave_count = ease(live.wave_count, config.wave_count as f32, k);
        live.color1 = live.color1.lerp(config.color1, k);
        live.color2 = live.color2.lerp(config.color2, k);
        live.background = live.background.lerp(config.background, k);

        &self.live
    }
}

#[cfg(test)]
impl Animator {
    fn live(&self) -> &LiveParameters {
        &self.live
    }
}
