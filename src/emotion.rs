use std::fmt;
use std::str::FromStr;

use crate::color::Color;
use crate::visual::VisualConfig;

/// Conversational tone reported by the sentiment classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Emotion {
    #[default]
    Neutral,
    Calm,
    Happy,
    Excited,
    Angry,
    Sad,
    Curious,
    Contemplative,
    Playful,
}

impl Emotion {
    pub const ALL: [Emotion; 9] = [
        Emotion::Neutral,
        Emotion::Calm,
        Emotion::Happy,
        Emotion::Excited,
        Emotion::Angry,
        Emotion::Sad,
        Emotion::Curious,
        Emotion::Contemplative,
        Emotion::Playful,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Calm => "calm",
            Emotion::Happy => "happy",
            Emotion::Excited => "excited",
            Emotion::Angry => "angry",
            Emotion::Sad => "sad",
            Emotion::Curious => "curious",
            Emotion::Contemplative => "contemplative",
            Emotion::Playful => "playful",
        }
    }

    /// Classifier output to emotion. Anything unrecognised is neutral.
    pub fn from_label(label: &str) -> Emotion {
        label.trim().to_lowercase().parse().unwrap_or(Emotion::Neutral)
    }

    /// Visual preset for this emotion. Tones without their own preset
    /// share the neutral one.
    pub fn style(self) -> EmotionStyle {
        match self {
            Emotion::Neutral | Emotion::Curious | Emotion::Contemplative | Emotion::Playful => {
                style_neutral()
            }
            Emotion::Calm => style_calm(),
            Emotion::Happy => style_happy(),
            Emotion::Excited => style_excited(),
            Emotion::Angry => style_angry(),
            Emotion::Sad => style_sad(),
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown emotion {0:?}")]
pub struct UnknownEmotion(pub String);

impl FromStr for Emotion {
    type Err = UnknownEmotion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Emotion::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| UnknownEmotion(s.to_string()))
    }
}

/// Everything an emotion overrides. Wave count is a user preference and
/// is deliberately absent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmotionStyle {
    pub amplitude: f32,
    pub frequency: f32,
    pub speed: f32,
    pub color1: Color,
    pub color2: Color,
    pub background: Color,
}

fn hex(rgb: u32) -> Color {
    Color::from_rgb8((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8)
}

fn style_neutral() -> EmotionStyle {
    EmotionStyle {
        amplitude: 60.0,
        frequency: 30.0,
        speed: 0.15,
        color1: hex(0x6366f1),
        color2: hex(0xec4899),
        background: hex(0x111827),
    }
}

fn style_calm() -> EmotionStyle {
    EmotionStyle {
        amplitude: 40.0,
        frequency: 20.0,
        speed: 0.1,
        color1: hex(0x2dd4bf),
        color2: hex(0x38bdf8),
        background: hex(0x0f172a),
    }
}

fn style_happy() -> EmotionStyle {
    EmotionStyle {
        amplitude: 80.0,
        frequency: 40.0,
        speed: 0.25,
        color1: hex(0xfacc15),
        color2: hex(0xfb923c),
        background: hex(0x1c1917),
    }
}

fn style_excited() -> EmotionStyle {
    EmotionStyle {
        amplitude: 100.0,
        frequency: 50.0,
        speed: 0.35,
        color1: hex(0xf472b6),
        color2: hex(0xc084fc),
        background: hex(0x1e1b4b),
    }
}

fn style_angry() -> EmotionStyle {
    EmotionStyle {
        amplitude: 120.0,
        frequency: 70.0,
        speed: 0.4,
        color1: hex(0xef4444),
        color2: hex(0xf97316),
        background: hex(0x18181b),
    }
}

fn style_sad() -> EmotionStyle {
    EmotionStyle {
        amplitude: 30.0,
        frequency: 15.0,
        speed: 0.08,
        color1: hex(0x6b7280),
        color2: hex(0x3b82f6),
        background: hex(0x111827),
    }
}

/// Target config for an emotion at the default wave count.
pub fn map_emotion(emotion: Emotion) -> VisualConfig {
    let style = emotion.style();
    VisualConfig {
        amplitude: style.amplitude,
        frequency: style.frequency,
        speed: style.speed,
        color1: style.color1,
        color2: style.color2,
        background: style.background,
        ..VisualConfig::default()
    }
    .sanitized()
}
