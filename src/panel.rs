//! The customization panel: slash commands typed into the input line.

use std::str::FromStr;

use crate::color::{Color, ColorError};
use crate::conversation::Conversation;
use crate::speech::voices::VoiceBook;
use crate::visual::{VisualConfig, MAX_WAVE_COUNT, MIN_WAVE_COUNT};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PanelError {
    #[error("unknown command {0:?} (try /panel)")]
    UnknownCommand(String),
    #[error("{0} needs an argument")]
    MissingArgument(&'static str),
    #[error("wave count must be a number from 1 to 10: {0:?}")]
    BadWaveCount(String),
    #[error(transparent)]
    Color(#[from] ColorError),
    #[error("no voice matches {0:?} (try /voices)")]
    UnknownVoice(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PanelCommand {
    Waves(u32),
    Color1(Color),
    Color2(Color),
    Background(Color),
    Voice(String),
    Voices,
    Panel,
}

impl FromStr for PanelCommand {
    type Err = PanelError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (name, arg) = match line.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (line, ""),
        };
        let required = |what: &'static str| {
            if arg.is_empty() {
                Err(PanelError::MissingArgument(what))
            } else {
                Ok(arg)
            }
        };

        match name {
            "/waves" => {
                let n = required("/waves")?;
                let n = n
                    .parse::<u32>()
                    .ok()
                    .filter(|n| (MIN_WAVE_COUNT..=MAX_WAVE_COUNT).contains(n))
                    .ok_or_else(|| PanelError::BadWaveCount(n.to_string()))?;
                Ok(PanelCommand::Waves(n))
            }
            "/color1" => Ok(PanelCommand::Color1(required("/color1")?.parse()?)),
            "/color2" => Ok(PanelCommand::Color2(required("/color2")?.parse()?)),
            "/background" => Ok(PanelCommand::Background(required("/background")?.parse()?)),
            "/voice" => Ok(PanelCommand::Voice(required("/voice")?.to_string())),
            "/voices" => Ok(PanelCommand::Voices),
            "/panel" => Ok(PanelCommand::Panel),
            other => Err(PanelError::UnknownCommand(other.to_string())),
        }
    }
}

/// What the app should do after a successful command.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelReply {
    Note(String),
    RefreshVoices,
}

pub fn apply(command: PanelCommand, conversation: &mut Conversation) -> Result<PanelReply, PanelError> {
    let options = *conversation.options();
    let edited = match command {
        PanelCommand::Waves(n) => options.with_wave_count(n),
        PanelCommand::Color1(c) => VisualConfig { color1: c, ..options },
        PanelCommand::Color2(c) => VisualConfig { color2: c, ..options },
        PanelCommand::Background(c) => VisualConfig {
            background: c,
            ..options
        },
        PanelCommand::Voice(query) => {
            let voice = conversation
                .voices_mut()
                .select(&query)
                .ok_or(PanelError::UnknownVoice(query))?;
            return Ok(PanelReply::Note(format!("voice: {} ({})", voice.name, voice.id)));
        }
        PanelCommand::Voices => return Ok(PanelReply::RefreshVoices),
        PanelCommand::Panel => {
            return Ok(PanelReply::Note(describe(conversation.options(), conversation.voices())))
        }
    };
    log::debug!("[Panel] {:?}", edited);
    conversation.set_options(edited);
    Ok(PanelReply::Note(describe(conversation.options(), conversation.voices())))
}

/// One-line summary of the current settings.
pub fn describe(options: &VisualConfig, voices: &VoiceBook) -> String {
    let voice = voices
        .selected()
        .map(|v| v.name.as_str())
        .unwrap_or("none");
    format!(
        "waves {} | amplitude {:.0} | frequency {:.0} | speed {:.2} | color1 {} | color2 {} | background {} | voice {}",
        options.wave_count,
        options.amplitude,
        options.frequency,
        options.speed,
        options.color1,
        options.color2,
        options.background,
        voice,
    )
}

/// List the offered voices, marking the selected one.
pub fn describe_voices(voices: &VoiceBook) -> String {
    if voices.is_empty() {
        return "no voices available".to_string();
    }
    let selected = voices.selected().map(|v| v.id.as_str());
    voices
        .voices()
        .iter()
        .map(|v| {
            let mark = if Some(v.id.as_str()) == selected { "*" } else { " " };
            format!("{} {} [{}] {}", mark, v.name, v.lang, v.id)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Arrow-key wave count step, kept within range.
pub fn step_wave_count(options: &VisualConfig, delta: i32) -> VisualConfig {
    let n = (options.wave_count as i64 + delta as i64).clamp(MIN_WAVE_COUNT as i64, MAX_WAVE_COUNT as i64);
    options.with_wave_count(n as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Event;
    use crate::speech::voices::Voice;
    use crate::speech::SpeechEvent;

    fn conversation() -> Conversation {
        let mut conv = Conversation::new(VisualConfig::default(), "hi", true);
        conv.handle(Event::Speech(SpeechEvent::VoicesChanged(vec![
            Voice {
                name: "English (America)".into(),
                lang: "en-us".into(),
                id: "gmw/en-US".into(),
            },
            Voice {
                name: "English (Great Britain)".into(),
                lang: "en-gb".into(),
                id: "gmw/en".into(),
            },
        ])));
        conv
    }

    #[test]
    fn commands_parse() {
        assert_eq!("/waves 4".parse::<PanelCommand>(), Ok(PanelCommand::Waves(4)));
        assert_eq!(
            "/color1 #fff".parse::<PanelCommand>(),
            Ok(PanelCommand::Color1(Color::rgb(1.0, 1.0, 1.0)))
        );
        assert_eq!(
            "/voice  English (America) ".parse::<PanelCommand>(),
            Ok(PanelCommand::Voice("English (America)".into()))
        );
        assert_eq!("/panel".parse::<PanelCommand>(), Ok(PanelCommand::Panel));
    }

    #[test]
    fn bad_commands_are_rejected() {
        assert_eq!(
            "/waves 11".parse::<PanelCommand>(),
            Err(PanelError::BadWaveCount("11".into()))
        );
        assert_eq!(
            "/waves".parse::<PanelCommand>(),
            Err(PanelError::MissingArgument("/waves"))
        );
        assert!(matches!(
            "/background blue".parse::<PanelCommand>(),
            Err(PanelError::Color(ColorError::MissingHash(_)))
        ));
        assert_eq!(
            "/shrug".parse::<PanelCommand>(),
            Err(PanelError::UnknownCommand("/shrug".into()))
        );
    }

    #[test]
    fn edits_reach_the_target_config() {
        let mut conv = conversation();
        apply(PanelCommand::Waves(6), &mut conv).unwrap();
        apply(PanelCommand::Background(Color::BLACK), &mut conv).unwrap();
        assert_eq!(conv.options().wave_count, 6);
        assert_eq!(conv.options().background, Color::BLACK);
        assert_eq!(conv.options().amplitude, 60.0);
    }

    #[test]
    fn voice_selection_by_name_or_id() {
        let mut conv = conversation();
        let reply = apply(PanelCommand::Voice("gmw/en".into()), &mut conv).unwrap();
        assert_eq!(reply, PanelReply::Note("voice: English (Great Britain) (gmw/en)".into()));
        assert_eq!(
            apply(PanelCommand::Voice("Zira".into()), &mut conv),
            Err(PanelError::UnknownVoice("Zira".into()))
        );
        assert_eq!(conv.voices().selected().unwrap().id, "gmw/en");
    }

    #[test]
    fn voices_command_asks_for_refresh() {
        let mut conv = conversation();
        assert_eq!(apply(PanelCommand::Voices, &mut conv), Ok(PanelReply::RefreshVoices));
    }

    #[test]
    fn description_mentions_everything() {
        let conv = conversation();
        let text = describe(conv.options(), conv.voices());
        assert!(text.starts_with("waves 3 | amplitude 60 | frequency 30 | speed 0.15"));
        assert!(text.contains("color1 #6366f1"));
        assert!(text.ends_with("voice English (America)"));
        let list = describe_voices(conv.voices());
        assert!(list.starts_with("* English (America) [en-us] gmw/en-US"));
    }

    #[test]
    fn arrow_steps_stay_in_range() {
        let one = VisualConfig::default().with_wave_count(1);
        assert_eq!(step_wave_count(&one, -1).wave_count, 1);
        assert_eq!(step_wave_count(&one, 1).wave_count, 2);
        let ten = VisualConfig::default().with_wave_count(10);
        assert_eq!(step_wave_count(&ten, 1).wave_count, 10);
    }
}
