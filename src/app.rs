use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoopProxy};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

use crate::api::gemini::GeminiClient;
use crate::api::ChatEvent;
use crate::config::Config;
use crate::conversation::{Conversation, Effect, Event};
use crate::panel::{self, PanelCommand, PanelReply};
use crate::renderer::{GpuContext, RenderError, Renderer};
use crate::scheduler::{FrameClock, FrameScheduler};
use crate::speech::{SpeechClient, SpeechEvent};
use crate::state_machine::{ActivityState, Animator};
use crate::tessellate::tessellate_waves;
use crate::transcript::Transcript;
use crate::waves::synthesize;

const TITLE: &str = "Aura";

pub struct App {
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    gpu: Option<GpuContext>,
    config: Config,
    conversation: Conversation,
    animator: Animator,
    scheduler: FrameScheduler,
    clock: FrameClock,
    transcript: Transcript,
    input: String,
    title: String,
    /// Print the voice list when the next listing arrives.
    show_voices: bool,
    chat: Option<GeminiClient>,
    chat_tx: mpsc::UnboundedSender<ChatEvent>,
    speech: SpeechClient,
    tokio_rt: Arc<tokio::runtime::Runtime>,
    event_proxy: EventLoopProxy<Event>,
    fatal: Option<RenderError>,
}

/// Forward everything a collaborator reports into the winit inbox.
fn bridge<T: Send + 'static>(
    tokio_rt: &tokio::runtime::Runtime,
    mut rx: mpsc::UnboundedReceiver<T>,
    proxy: EventLoopProxy<Event>,
    wrap: fn(T) -> Event,
) {
    tokio_rt.spawn(async move {
        while let Some(event) = rx.recv().await {
            if proxy.send_event(wrap(event)).is_err() {
                break;
            }
        }
    });
}

impl App {
    pub fn new(tokio_rt: Arc<tokio::runtime::Runtime>, event_proxy: EventLoopProxy<Event>) -> Self {
        let config = Config::load();

        let chat = match GeminiClient::new(&config) {
            Ok(client) => Some(client),
            Err(e) => {
                log::error!(
                    "[Chat] {} (edit {})",
                    e,
                    Config::config_path().display()
                );
                None
            }
        };

        let (chat_tx, chat_rx) = mpsc::unbounded_channel();
        bridge(&tokio_rt, chat_rx, event_proxy.clone(), Event::Chat);

        let (speech_tx, speech_rx) = mpsc::unbounded_channel();
        bridge(&tokio_rt, speech_rx, event_proxy.clone(), Event::Speech);
        let speech = SpeechClient::start(tokio_rt.handle(), config.speech_command.clone(), speech_tx);

        let conversation = Conversation::new(config.waves, &config.greeting, chat.is_some())
            .with_voice_preferences(config.preferred_voices.clone(), config.voice.clone());
        let animator = Animator::new(conversation.options(), config.easing());

        Self {
            window: None,
            renderer: None,
            gpu: None,
            config,
            conversation,
            animator,
            scheduler: FrameScheduler::new(),
            clock: FrameClock::new(),
            transcript: Transcript::new(),
            input: String::new(),
            title: String::new(),
            show_voices: false,
            chat,
            chat_tx,
            speech,
            tokio_rt,
            event_proxy,
            fatal: None,
        }
    }

    /// Startup error that ended the event loop, if any.
    pub fn take_fatal(&mut self) -> Option<RenderError> {
        self.fatal.take()
    }

    fn init_graphics(&mut self, event_loop: &ActiveEventLoop) -> Result<(), Box<dyn std::error::Error>> {
        let attrs = Window::default_attributes()
            .with_title(TITLE)
            .with_inner_size(LogicalSize::new(960.0, 540.0));
        let window = Arc::new(event_loop.create_window(attrs)?);

        let gpu = self.tokio_rt.block_on(GpuContext::new()).map_err(|e| self.fail(e))?;
        let renderer = Renderer::new(&gpu, window.clone()).map_err(|e| self.fail(e))?;

        log::info!("[Render] Window {}x{}", renderer.width, renderer.height);
        self.gpu = Some(gpu);
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn fail(&mut self, e: RenderError) -> Box<dyn std::error::Error> {
        let message = e.to_string();
        self.fatal = Some(e);
        message.into()
    }

    fn run_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StreamChat { turn, text } => {
                    let Some(chat) = self.chat.clone() else {
                        continue;
                    };
                    let events = self.chat_tx.clone();
                    log::info!("[Chat] Turn {} sent", turn);
                    self.tokio_rt.spawn(async move {
                        chat.stream_turn(turn, text, events).await;
                    });
                }
                Effect::Classify { turn, text } => {
                    let Some(chat) = self.chat.clone() else {
                        continue;
                    };
                    let proxy = self.event_proxy.clone();
                    self.tokio_rt.spawn(async move {
                        let label = chat.classify(&text).await.map_err(|e| e.to_string());
                        let _ = proxy.send_event(Event::Sentiment { turn, label });
                    });
                }
                Effect::Speak {
                    utterance,
                    text,
                    voice,
                } => self.speech.speak(utterance, text, Some(voice)),
                Effect::CancelSpeech => self.speech.cancel_all(),
            }
        }
    }

    fn submit_input(&mut self) {
        let line = std::mem::take(&mut self.input);
        let line = line.trim();
        if line.starts_with('/') {
            self.run_panel(line);
        } else {
            let effects = self.conversation.submit(line);
            self.run_effects(effects);
        }
    }

    fn run_panel(&mut self, line: &str) {
        let result = line
            .parse::<PanelCommand>()
            .and_then(|command| panel::apply(command, &mut self.conversation));
        match result {
            Ok(PanelReply::Note(text)) => self.conversation.note(text),
            Ok(PanelReply::RefreshVoices) => {
                self.show_voices = true;
                self.speech.list_voices();
            }
            Err(e) => {
                log::warn!("[Panel] {}", e);
                self.conversation.note(e.to_string());
            }
        }
    }

    fn handle_key(&mut self, key: &Key, text: Option<&str>) {
        match key {
            Key::Named(NamedKey::ArrowUp) => self.step_waves(1),
            Key::Named(NamedKey::ArrowDown) => self.step_waves(-1),
            Key::Named(NamedKey::Tab) => {
                if let Some(voice) = self.conversation.voices_mut().cycle() {
                    let note = format!("voice: {} ({})", voice.name, voice.id);
                    self.conversation.note(note);
                }
            }
            Key::Named(NamedKey::Escape) => self.input.clear(),
            // The input line is locked while a reply is generated
            _ if !self.conversation.can_submit() => {}
            Key::Named(NamedKey::Enter) => self.submit_input(),
            Key::Named(NamedKey::Backspace) => {
                self.input.pop();
            }
            _ => {
                if let Some(text) = text {
                    self.input.extend(text.chars().filter(|c| !c.is_control()));
                }
            }
        }
    }

    fn step_waves(&mut self, delta: i32) {
        let options = panel::step_wave_count(self.conversation.options(), delta);
        log::info!("[Panel] waves {}", options.wave_count);
        self.conversation.set_options(options);
    }

    /// Bring the terminal transcript and the window title up to date.
    fn refresh_ui(&mut self) {
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = self.transcript.sync(self.conversation.log(), &mut stdout) {
            log::warn!("Transcript write failed: {}", e);
        }

        let mood = self.conversation.emotion();
        let title = if self.conversation.activity() == ActivityState::Thinking {
            format!("{} ({}) | thinking...", TITLE, mood)
        } else {
            format!("{} ({}) | > {}_", TITLE, mood, self.input)
        };
        if title != self.title {
            if let Some(window) = &self.window {
                window.set_title(&title);
            }
            self.title = title;
        }
    }

    fn draw_frame(&mut self) {
        if !self.scheduler.begin_frame() {
            return;
        }
        let (Some(window), Some(renderer)) = (&self.window, &mut self.renderer) else {
            return;
        };

        let (elapsed, dt) = self.clock.tick();
        let options = self.conversation.options();
        let live = self
            .animator
            .step(options, self.conversation.activity(), elapsed, dt);

        let waves = synthesize(live, renderer.width as f32, renderer.height as f32, elapsed);
        let vertices = tessellate_waves(&waves, self.config.stroke_width);
        if let Err(e) = renderer.render(&vertices, live.background) {
            log::error!("[Render] {}", e);
        }

        self.scheduler.end_frame(window.as_ref());
    }

    fn set_visible(&mut self, visible: bool) {
        if let Some(window) = &self.window {
            if visible && !self.scheduler.is_visible() {
                self.clock.reset_delta();
            }
            self.scheduler.set_visible(visible, window.as_ref());
        }
    }
}

impl ApplicationHandler<Event> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        if let Err(e) = self.init_graphics(event_loop) {
            log::error!("[Render] Startup failed: {}", e);
            event_loop.exit();
            return;
        }

        if let Some(window) = &self.window {
            self.scheduler.start(window.as_ref());
        }
        self.speech.list_voices();
        self.refresh_ui();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                if let Some(r) = &mut self.renderer {
                    r.resize(size.width, size.height);
                }
                self.set_visible(size.width > 0 && size.height > 0);
            }

            WindowEvent::Occluded(occluded) => self.set_visible(!occluded),

            WindowEvent::RedrawRequested => self.draw_frame(),

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed {
                    return;
                }
                self.handle_key(&event.logical_key, event.text.as_deref());
                self.refresh_ui();
            }

            _ => {}
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: Event) {
        let voices_changed = matches!(event, Event::Speech(SpeechEvent::VoicesChanged(_)));

        let effects = self.conversation.handle(event);
        self.run_effects(effects);

        if voices_changed && self.show_voices {
            self.show_voices = false;
            let list = panel::describe_voices(self.conversation.voices());
            self.conversation.note(list);
        }
        self.refresh_ui();
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        log::info!("Shutting down after {} frames", self.scheduler.frames());
        self.scheduler.stop();
        self.speech.cancel_all();
        let mut stdout = std::io::stdout().lock();
        let _ = self.transcript.close(&mut stdout);
        let _ = stdout.flush();
    }
}
