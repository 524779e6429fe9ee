//! Conversation state owned by the UI thread.
//!
//! `Conversation` never performs I/O. Collaborator results come in as
//! [`Event`]s, and the work it wants done goes out as [`Effect`]s which
//! the app runs on the tokio runtime. Every event arrives through the one
//! winit inbox, so handling is strictly ordered.

use crate::api::ChatEvent;
use crate::emotion::{map_emotion, Emotion};
use crate::speech::voices::VoiceBook;
use crate::speech::SpeechEvent;
use crate::state_machine::ActivityState;
use crate::visual::VisualConfig;

pub const CONNECT_ERROR: &str = "Error: Could not connect to the AI. Please check the API key.";
pub const REPLY_ERROR: &str = "Sorry, I encountered an error. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Ai,
    System,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
}

impl ChatMessage {
    fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
        }
    }
}

/// Inbox: everything the collaborators report back.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Chat(ChatEvent),
    /// Classifier answer (or failure) for the reply of `turn`.
    Sentiment {
        turn: u64,
        label: Result<String, String>,
    },
    Speech(SpeechEvent),
}

/// Outbox: work for the async side.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StreamChat { turn: u64, text: String },
    Classify { turn: u64, text: String },
    Speak { utterance: u64, text: String, voice: String },
    CancelSpeech,
}

#[derive(Debug)]
struct Turn {
    id: u64,
    /// Index of the AI envelope in the log.
    entry: usize,
    reply: String,
}

pub struct Conversation {
    log: Vec<ChatMessage>,
    activity: ActivityState,
    emotion: Emotion,
    options: VisualConfig,
    voices: VoiceBook,
    preferred_voices: Vec<String>,
    configured_voice: String,
    chat_ready: bool,
    last_turn: u64,
    turn: Option<Turn>,
    last_utterance: u64,
    utterance: Option<u64>,
}

impl Conversation {
    pub fn new(options: VisualConfig, greeting: &str, chat_ready: bool) -> Self {
        let mut log = vec![ChatMessage::new(Sender::Ai, greeting)];
        if !chat_ready {
            log.push(ChatMessage::new(Sender::System, CONNECT_ERROR));
        }
        Self {
            log,
            activity: ActivityState::Idle,
            emotion: Emotion::Neutral,
            options: options.sanitized(),
            voices: VoiceBook::new(),
            preferred_voices: Vec::new(),
            configured_voice: String::new(),
            chat_ready,
            last_turn: 0,
            turn: None,
            last_utterance: 0,
            utterance: None,
        }
    }

    pub fn with_voice_preferences(mut self, preferred: Vec<String>, configured: String) -> Self {
        self.preferred_voices = preferred;
        self.configured_voice = configured;
        self
    }

    pub fn log(&self) -> &[ChatMessage] {
        &self.log
    }

    pub fn activity(&self) -> ActivityState {
        self.activity
    }

    pub fn emotion(&self) -> Emotion {
        self.emotion
    }

    pub fn options(&self) -> &VisualConfig {
        &self.options
    }

    /// Direct user edit of the target parameters.
    pub fn set_options(&mut self, options: VisualConfig) {
        self.options = options.sanitized();
    }

    pub fn voices(&self) -> &VoiceBook {
        &self.voices
    }

    pub fn voices_mut(&mut self) -> &mut VoiceBook {
        &mut self.voices
    }

    /// Input is disabled while a reply is being generated.
    pub fn can_submit(&self) -> bool {
        self.activity != ActivityState::Thinking
    }

    /// Add a system line to the log (panel feedback and the like).
    pub fn note(&mut self, text: impl Into<String>) {
        self.log.push(ChatMessage::new(Sender::System, text));
    }

    pub fn submit(&mut self, text: &str) -> Vec<Effect> {
        if !self.chat_ready || text.trim().is_empty() || !self.can_submit() {
            return Vec::new();
        }

        let mut effects = Vec::new();
        if self.utterance.take().is_some() {
            effects.push(Effect::CancelSpeech);
        }

        self.set_activity(ActivityState::Thinking);
        self.set_emotion(Emotion::Neutral);
        self.log.push(ChatMessage::new(Sender::User, text));
        self.log.push(ChatMessage::new(Sender::Ai, ""));

        self.last_turn += 1;
        self.turn = Some(Turn {
            id: self.last_turn,
            entry: self.log.len() - 1,
            reply: String::new(),
        });
        effects.push(Effect::StreamChat {
            turn: self.last_turn,
            text: text.to_string(),
        });
        effects
    }

    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Chat(chat) => self.handle_chat(chat),
            Event::Sentiment { turn, label } => {
                if turn != self.last_turn {
                    log::debug!("[Sentiment] Ignoring result for stale turn {}", turn);
                    return Vec::new();
                }
                let emotion = match label {
                    Ok(label) => Emotion::from_label(&label),
                    Err(e) => {
                        log::warn!("[Sentiment] Classification failed: {}", e);
                        Emotion::Neutral
                    }
                };
                self.set_emotion(emotion);
                Vec::new()
            }
            Event::Speech(speech) => {
                self.handle_speech(speech);
                Vec::new()
            }
        }
    }

    fn handle_chat(&mut self, event: ChatEvent) -> Vec<Effect> {
        match event {
            ChatEvent::Fragment { turn, text } => {
                if let Some(current) = self.turn.as_mut().filter(|t| t.id == turn) {
                    current.reply.push_str(&text);
                    self.log[current.entry].text.clone_from(&current.reply);
                }
                Vec::new()
            }
            ChatEvent::Finished { turn } => {
                let Some(finished) = self.take_turn(turn) else {
                    return Vec::new();
                };
                let reply = finished.reply;
                let mut effects = self.speak(&reply);
                if !reply.trim().is_empty() {
                    effects.push(Effect::Classify { turn, text: reply });
                }
                effects
            }
            ChatEvent::Failed { turn, error } => {
                let Some(failed) = self.take_turn(turn) else {
                    return Vec::new();
                };
                log::error!("[Chat] Reply failed: {}", error);
                self.log[failed.entry].text = REPLY_ERROR.to_string();
                self.set_activity(ActivityState::Idle);
                self.set_emotion(Emotion::Sad);
                Vec::new()
            }
        }
    }

    fn take_turn(&mut self, id: u64) -> Option<Turn> {
        if self.turn.as_ref().is_some_and(|t| t.id == id) {
            self.turn.take()
        } else {
            None
        }
    }

    fn handle_speech(&mut self, event: SpeechEvent) {
        match event {
            SpeechEvent::VoicesChanged(all) => {
                self.voices
                    .update(&all, &self.preferred_voices, &self.configured_voice);
                match self.voices.selected() {
                    Some(v) => log::info!("[Speech] Voice: {} ({})", v.name, v.id),
                    None => log::warn!("[Speech] No voices available; replies will not be spoken"),
                }
            }
            SpeechEvent::Started { utterance } if self.utterance == Some(utterance) => {
                self.set_activity(ActivityState::Speaking);
            }
            SpeechEvent::Ended { utterance } if self.utterance == Some(utterance) => {
                self.utterance = None;
                self.set_activity(ActivityState::Idle);
            }
            SpeechEvent::Failed { utterance, error } if self.utterance == Some(utterance) => {
                log::warn!("[Speech] {}", error);
                self.utterance = None;
                self.set_activity(ActivityState::Idle);
            }
            SpeechEvent::Started { utterance }
            | SpeechEvent::Ended { utterance }
            | SpeechEvent::Failed { utterance, .. } => {
                log::debug!("[Speech] Ignoring event for stale utterance {}", utterance);
            }
        }
    }

    /// Voice a reply. Without text, voices or a selection this just
    /// returns to idle.
    pub fn speak(&mut self, text: &str) -> Vec<Effect> {
        let voice = match self.voices.selected() {
            Some(voice) if !text.trim().is_empty() => voice.id.clone(),
            _ => {
                self.set_activity(ActivityState::Idle);
                return Vec::new();
            }
        };
        self.last_utterance += 1;
        self.utterance = Some(self.last_utterance);
        vec![Effect::Speak {
            utterance: self.last_utterance,
            text: text.to_string(),
            voice,
        }]
    }

    fn set_activity(&mut self, activity: ActivityState) {
        if self.activity != activity {
            log::debug!("Activity: {:?} -> {:?}", self.activity, activity);
            self.activity = activity;
        }
    }

    fn set_emotion(&mut self, emotion: Emotion) {
        if self.emotion != emotion {
            log::info!("Emotion: {} -> {}", self.emotion, emotion);
            self.emotion = emotion;
            self.options = map_emotion(emotion).with_wave_count(self.options.wave_count);
        }
    }
}
