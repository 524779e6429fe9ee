use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ColorError {
    #[error("color must start with '#': {0:?}")]
    MissingHash(String),
    #[error("expected 3 or 6 hex digits: {0:?}")]
    BadLength(String),
    #[error("invalid hex digit in {0:?}")]
    BadDigit(String),
}

/// sRGB color with channels in 0.0..=1.0.
///
/// Hex strings are only the external form (config file, panel commands).
/// Interpolation always works on the numeric channels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::rgb(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
    }

    /// Parse `#RRGGBB` or the `#RGB` shorthand.
    pub fn from_hex(hex: &str) -> Result<Self, ColorError> {
        let trimmed = hex.trim();
        let digits = trimmed
            .strip_prefix('#')
            .ok_or_else(|| ColorError::MissingHash(hex.to_string()))?;

        let expanded: String = match digits.len() {
            3 => digits.chars().flat_map(|c| [c, c]).collect(),
            6 => digits.to_string(),
            _ => return Err(ColorError::BadLength(hex.to_string())),
        };
        if !expanded.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ColorError::BadDigit(hex.to_string()));
        }

        let channel = |i: usize| {
            u8::from_str_radix(&expanded[i..i + 2], 16)
                .map_err(|_| ColorError::BadDigit(hex.to_string()))
        };
        Ok(Self::from_rgb8(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_rgb8(self) -> [u8; 3] {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b)]
    }

    pub fn to_hex(self) -> String {
        let [r, g, b] = self.to_rgb8();
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }

    /// Channel-wise blend. `t == 0` yields `self`, `t == 1` yields `target` exactly.
    pub fn lerp(self, target: Color, t: f32) -> Color {
        let mix = |a: f32, b: f32| a * (1.0 - t) + b * t;
        Color {
            r: mix(self.r, target.r),
            g: mix(self.g, target.g),
            b: mix(self.b, target.b),
        }
    }

    /// Straight-alpha RGBA for vertex data.
    pub fn with_alpha(self, alpha: f32) -> [f32; 4] {
        [self.r, self.g, self.b, alpha]
    }

    pub fn to_wgpu(self) -> wgpu::Color {
        wgpu::Color {
            r: self.r as f64,
            g: self.g as f64,
            b: self.b as f64,
            a: 1.0,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Color {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for Color {
    type Error = ColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_long_and_short_hex() {
        let indigo = Color::from_hex("#6366F1").unwrap();
        assert_eq!(indigo.to_rgb8(), [0x63, 0x66, 0xf1]);
        let white = Color::from_hex("#fff").unwrap();
        assert_eq!(white.to_rgb8(), [255, 255, 255]);
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(matches!(Color::from_hex("6366F1"), Err(ColorError::MissingHash(_))));
        assert!(matches!(Color::from_hex("#12345"), Err(ColorError::BadLength(_))));
        assert!(matches!(Color::from_hex("#zz0000"), Err(ColorError::BadDigit(_))));
    }

    #[test]
    fn hex_formatting_round_trips_through_display() {
        let c: Color = "#ec4899".parse().unwrap();
        assert_eq!(c.to_string(), "#ec4899");
    }

    #[test]
    fn lerp_endpoints_are_exact() {
        let a = Color::from_hex("#6366F1").unwrap();
        let b = Color::from_hex("#2dd4bf").unwrap();
        assert_eq!(a.lerp(b, 0.0), a);
        assert_eq!(a.lerp(b, 1.0), b);
    }

    #[test]
    fn lerp_midpoint_is_channelwise() {
        let mid = Color::BLACK.lerp(Color::rgb(1.0, 0.5, 0.0), 0.5);
        assert!((mid.r - 0.5).abs() < 1e-6);
        assert!((mid.g - 0.25).abs() < 1e-6);
        assert_eq!(mid.b, 0.0);
    }

    #[test]
    fn serde_uses_hex_strings() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            color: Color,
        }
        let parsed: Wrapper = toml::from_str("color = \"#111827\"").unwrap();
        assert_eq!(parsed.color.to_hex(), "#111827");
        let out = toml::to_string(&parsed).unwrap();
        assert!(out.contains("#111827"));
    }
}
