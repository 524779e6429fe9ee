pub mod voices;

use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

use voices::{parse_voice_list, Voice};

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{command} exited with {status}")]
    Exit { command: String, status: ExitStatus },
    #[error("speech I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Commands sent from the UI thread to the speech task.
enum SpeechCommand {
    Speak {
        utterance: u64,
        text: String,
        voice: Option<String>,
    },
    CancelAll,
    ListVoices,
}

/// Events sent from the speech task back to the winit event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechEvent {
    VoicesChanged(Vec<Voice>),
    Started { utterance: u64 },
    Ended { utterance: u64 },
    Failed { utterance: u64, error: String },
}

/// Text-to-speech through an external synthesizer (espeak-ng by default).
///
/// One utterance plays at a time: speaking again cancels the previous one
/// by killing its process. Cancelled utterances report nothing.
pub struct SpeechClient {
    cmd_tx: mpsc::UnboundedSender<SpeechCommand>,
}

impl SpeechClient {
    pub fn start(
        runtime: &tokio::runtime::Handle,
        command: String,
        events: mpsc::UnboundedSender<SpeechEvent>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        runtime.spawn(run(command, cmd_rx, events));
        Self { cmd_tx }
    }

    pub fn speak(&self, utterance: u64, text: String, voice: Option<String>) {
        let _ = self.cmd_tx.send(SpeechCommand::Speak {
            utterance,
            text,
            voice,
        });
    }

    pub fn cancel_all(&self) {
        let _ = self.cmd_tx.send(SpeechCommand::CancelAll);
    }

    /// Ask for a fresh voice listing; answered with `VoicesChanged`.
    pub fn list_voices(&self) {
        let _ = self.cmd_tx.send(SpeechCommand::ListVoices);
    }
}

async fn run(
    command: String,
    mut cmd_rx: mpsc::UnboundedReceiver<SpeechCommand>,
    events: mpsc::UnboundedSender<SpeechEvent>,
) {
    log::info!("[Speech] Task started ({})", command);
    // Dropping the sender cancels the utterance it belongs to.
    let mut active: Option<oneshot::Sender<()>> = None;

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            SpeechCommand::Speak {
                utterance,
                text,
                voice,
            } => {
                if let Some(cancel) = active.take() {
                    let _ = cancel.send(());
                }
                let (cancel_tx, cancel_rx) = oneshot::channel();
                active = Some(cancel_tx);
                tokio::spawn(utter(
                    command.clone(),
                    utterance,
                    text,
                    voice,
                    cancel_rx,
                    events.clone(),
                ));
            }
            SpeechCommand::CancelAll => {
                if let Some(cancel) = active.take() {
                    log::debug!("[Speech] Cancelling active utterance");
                    let _ = cancel.send(());
                }
            }
            SpeechCommand::ListVoices => {
                let command = command.clone();
                let events = events.clone();
                tokio::spawn(async move {
                    let voices = match list_voices(&command).await {
                        Ok(voices) => voices,
                        Err(e) => {
                            log::warn!("[Speech] Voice listing failed: {}", e);
                            Vec::new()
                        }
                    };
                    log::info!("[Speech] {} voices available", voices.len());
                    let _ = events.send(SpeechEvent::VoicesChanged(voices));
                });
            }
        }
    }

    log::info!("[Speech] Task exiting");
}

async fn utter(
    command: String,
    utterance: u64,
    text: String,
    voice: Option<String>,
    cancel: oneshot::Receiver<()>,
    events: mpsc::UnboundedSender<SpeechEvent>,
) {
    let mut cmd = Command::new(&command);
    if let Some(voice) = &voice {
        cmd.arg("-v").arg(voice);
    }
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(source) => {
            let error = SpeechError::Spawn { command, source };
            log::warn!("[Speech] Utterance {} failed: {}", utterance, error);
            let _ = events.send(SpeechEvent::Failed {
                utterance,
                error: error.to_string(),
            });
            return;
        }
    };

    log::debug!("[Speech] Utterance {} started ({} chars)", utterance, text.chars().count());
    let _ = events.send(SpeechEvent::Started { utterance });

    let outcome = tokio::select! {
        _ = cancel => None,
        result = play(&mut child, &command, &text) => Some(result),
    };

    match outcome {
        // kill_on_drop reaps the process
        None => log::debug!("[Speech] Utterance {} cancelled", utterance),
        Some(Ok(())) => {
            log::debug!("[Speech] Utterance {} ended", utterance);
            let _ = events.send(SpeechEvent::Ended { utterance });
        }
        Some(Err(e)) => {
            log::warn!("[Speech] Utterance {} failed: {}", utterance, e);
            let _ = events.send(SpeechEvent::Failed {
                utterance,
                error: e.to_string(),
            });
        }
    }
}

async fn play(child: &mut Child, command: &str, text: &str) -> Result<(), SpeechError> {
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(text.as_bytes()).await?;
        stdin.shutdown().await?;
    }
    let status = child.wait().await?;
    if !status.success() {
        return Err(SpeechError::Exit {
            command: command.to_string(),
            status,
        });
    }
    Ok(())
}

pub async fn list_voices(command: &str) -> Result<Vec<Voice>, SpeechError> {
    let output = Command::new(command)
        .arg("--voices")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| SpeechError::Spawn {
            command: command.to_string(),
            source,
        })?;
    if !output.status.success() {
        return Err(SpeechError::Exit {
            command: command.to_string(),
            status: output.status,
        });
    }
    Ok(parse_voice_list(&String::from_utf8_lossy(&output.stdout)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn client(command: &str) -> (SpeechClient, mpsc::UnboundedReceiver<SpeechEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = SpeechClient::start(&tokio::runtime::Handle::current(), command.into(), tx);
        (client, rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<SpeechEvent>) -> Option<SpeechEvent> {
        timeout(Duration::from_secs(5), rx.recv()).await.ok().flatten()
    }

    #[tokio::test]
    async fn utterance_reports_start_then_end() {
        // `cat` consumes stdin and exits cleanly, standing in for a synthesizer.
        let (speech, mut rx) = client("cat");
        speech.speak(1, "hello".into(), None);
        assert_eq!(next(&mut rx).await, Some(SpeechEvent::Started { utterance: 1 }));
        assert_eq!(next(&mut rx).await, Some(SpeechEvent::Ended { utterance: 1 }));
    }

    #[tokio::test]
    async fn missing_command_fails_without_starting() {
        let (speech, mut rx) = client("aura-no-such-synthesizer");
        speech.speak(4, "hello".into(), None);
        match next(&mut rx).await {
            Some(SpeechEvent::Failed { utterance: 4, error }) => {
                assert!(error.contains("aura-no-such-synthesizer"))
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn cancelled_utterance_reports_nothing_more() {
        // `yes` never exits on its own.
        let (speech, mut rx) = client("yes");
        speech.speak(1, "first".into(), None);
        assert_eq!(next(&mut rx).await, Some(SpeechEvent::Started { utterance: 1 }));
        speech.cancel_all();
        let quiet = timeout(Duration::from_millis(300), rx.recv()).await;
        assert!(quiet.is_err(), "got {:?}", quiet);
    }

    #[tokio::test]
    async fn failed_listing_reports_no_voices() {
        let (speech, mut rx) = client("aura-no-such-synthesizer");
        speech.list_voices();
        assert_eq!(next(&mut rx).await, Some(SpeechEvent::VoicesChanged(Vec::new())));
    }
}
