use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::state_machine::Easing;
use crate::visual::VisualConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: String,
    pub model: String,
    pub classifier_model: String,
    pub system_instruction: String,
    pub greeting: String,
    pub speech_command: String,
    pub preferred_voices: Vec<String>,
    /// Explicit voice id; empty picks automatically.
    pub voice: String,
    pub easing_factor: f32,
    pub frame_rate_independent: bool,
    pub stroke_width: f32,
    pub waves: VisualConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.5-flash".to_string(),
            classifier_model: "gemini-2.5-flash".to_string(),
            system_instruction: "You are Aura, a visual AI. Keep your responses concise, friendly, and helpful. You are represented by waves of light and energy.".to_string(),
            greeting: "I am Aura, a visual AI. How can I help you today? My form and motion will change based on the tone of our conversation.".to_string(),
            speech_command: "espeak-ng".to_string(),
            preferred_voices: vec![
                "English (America)".to_string(),
                "English (Great Britain)".to_string(),
                "English (Received Pronunciation)".to_string(),
            ],
            voice: String::new(),
            easing_factor: 0.08,
            frame_rate_independent: false,
            stroke_width: 5.0,
            waves: VisualConfig::default(),
        }
    }
}

impl Config {
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("aura");
        config_dir.join("config.toml")
    }

    pub fn load() -> Self {
        let path = Self::config_path();

        if path.exists() {
            match Self::read(&path) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    return config.with_env_fallback();
                }
                Err(e) => {
                    log::warn!("Failed to load config: {}. Using defaults.", e);
                    return Config::default().with_env_fallback();
                }
            }
        }

        let config = Config::default();
        // Save defaults on first run
        if let Err(e) = config.save() {
            log::warn!("Failed to write default config: {}", e);
        }
        config.with_env_fallback()
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str::<Config>(contents)?.sanitized())
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;
        log::info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Same guards as panel edits.
    fn sanitized(mut self) -> Self {
        self.waves = self.waves.sanitized();
        self.easing_factor = Easing::new(self.easing_factor, self.frame_rate_independent).factor;
        if !(self.stroke_width.is_finite() && self.stroke_width > 0.0) {
            self.stroke_width = Config::default().stroke_width;
        }
        self
    }

    /// Use env vars as fallback if the API key is empty
    fn with_env_fallback(self) -> Self {
        self.with_env(|name| std::env::var(name).ok())
    }

    fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if self.api_key.trim().is_empty() {
            if let Some(key) = ["GEMINI_API_KEY", "API_KEY"]
                .into_iter()
                .filter_map(|name| lookup(name))
                .find(|key| !key.trim().is_empty())
            {
                self.api_key = key;
            }
        }
        self
    }

    pub fn easing(&self) -> Easing {
        Easing::new(self.easing_factor, self.frame_rate_independent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = Config::parse(
            r##"
api_key = "abc"

[waves]
wave_count = 5
color1 = "#ff0000"
"##,
        )
        .unwrap();
        assert_eq!(config.api_key, "abc");
        assert_eq!(config.model, "gemini-2.5-flash");
        assert_eq!(config.waves.wave_count, 5);
        assert_eq!(config.waves.color1, Color::rgb(1.0, 0.0, 0.0));
        assert_eq!(config.waves.amplitude, 60.0);
        assert_eq!(config.stroke_width, 5.0);
    }

    #[test]
    fn values_are_guarded() {
        let config = Config::parse(
            r#"
easing_factor = 4.0
stroke_width = -2.0

[waves]
wave_count = 40
frequency = 0.0
amplitude = -10.0
"#,
        )
        .unwrap();
        assert_eq!(config.waves.wave_count, 10);
        assert_eq!(config.waves.frequency, 1.0);
        assert_eq!(config.waves.amplitude, 0.0);
        assert_eq!(config.easing_factor, 1.0);
        assert_eq!(config.stroke_width, 5.0);
    }

    #[test]
    fn bad_color_is_a_parse_error() {
        let err = Config::parse("[waves]\ncolor2 = \"pink\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn defaults_round_trip_through_toml() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let back = Config::parse(&text).unwrap();
        assert_eq!(back.waves, VisualConfig::default());
        assert_eq!(back.preferred_voices, Config::default().preferred_voices);
    }

    #[test]
    fn env_fills_missing_key_in_order() {
        let env = |name: &str| match name {
            "GEMINI_API_KEY" => Some(String::new()),
            "API_KEY" => Some("from-env".to_string()),
            _ => None,
        };
        assert_eq!(Config::default().with_env(env).api_key, "from-env");

        let configured = Config {
            api_key: "from-file".into(),
            ..Config::default()
        };
        assert_eq!(configured.with_env(env).api_key, "from-file");
    }
}
