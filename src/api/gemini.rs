use futures_util::stream::{self, BoxStream, Stream};
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::sse::SseDecoder;
use super::{ChatError, ChatEvent};
use crate::config::Config;
use crate::emotion::Emotion;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// One turn of chat history, in the wire shape the API expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Content {
    fn text(role: &str, text: &str) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

impl GenerateResponse {
    /// Text of the first candidate, parts concatenated.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

/// Gemini REST client for the chat session and the sentiment classifier.
///
/// Clones share one chat history, so a clone moved into a spawned task
/// records into the same session.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    classifier_model: String,
    system_instruction: String,
    history: Arc<Mutex<Vec<Content>>>,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self, ChatError> {
        if config.api_key.trim().is_empty() {
            return Err(ChatError::MissingApiKey);
        }
        Ok(Self {
            client: Client::new(),
            api_key: config.api_key.trim().to_string(),
            base_url: API_BASE.to_string(),
            model: config.model.clone(),
            classifier_model: config.classifier_model.clone(),
            system_instruction: config.system_instruction.clone(),
            history: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// The key travels in a header so it never shows up in a request URL.
    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.post(url).header(API_KEY_HEADER, &self.api_key)
    }

    fn history(&self) -> Vec<Content> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Append a completed exchange so the next turn has context.
    pub fn record_exchange(&self, user: &str, reply: &str) {
        let mut history = self
            .history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        history.push(Content::text("user", user));
        history.push(Content::text("model", reply));
    }

    /// Start a streamed reply. The returned stream yields text fragments in
    /// arrival order; the history is not updated (see `record_exchange`).
    pub async fn send_message_stream(
        &self,
        text: &str,
    ) -> Result<BoxStream<'static, Result<String, ChatError>>, ChatError> {
        let mut contents = self.history();
        contents.push(Content::text("user", text));

        let body = json!({
            "contents": contents,
            "systemInstruction": {
                "parts": [{ "text": self.system_instruction }]
            }
        });

        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );
        log::debug!("[Chat] Streaming from {} ({} turns of history)", self.model, contents.len() - 1);

        let resp = self.post(&url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ChatError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        Ok(fragments(resp.bytes_stream()))
    }

    /// Run one chat turn to completion, reporting progress on `events`.
    pub async fn stream_turn(&self, turn: u64, text: String, events: mpsc::UnboundedSender<ChatEvent>) {
        let result = match self.send_message_stream(&text).await {
            Ok(stream) => forward_fragments(turn, stream, &events).await,
            Err(e) => Err(e),
        };

        let event = match result {
            Ok(reply) => {
                log::info!("[Chat] Turn {} complete ({} chars)", turn, reply.chars().count());
                self.record_exchange(&text, &reply);
                ChatEvent::Finished { turn }
            }
            Err(e) => {
                log::error!("[Chat] Turn {} failed: {}", turn, e);
                ChatEvent::Failed {
                    turn,
                    error: e.to_string(),
                }
            }
        };
        let _ = events.send(event);
    }

    /// One-word sentiment label for `text`, as returned by the model.
    pub async fn classify(&self, text: &str) -> Result<String, ChatError> {
        let body = json!({
            "contents": [Content::text("user", &classification_prompt(text))],
            "generationConfig": { "temperature": 0 }
        });
        let url = format!("{}/models/{}:generateContent", self.base_url, self.classifier_model);

        let resp = self.post(&url).json(&body).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ChatError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)?;
        let label = parsed.text().trim().to_string();
        log::debug!("[Sentiment] Classified as {:?}", label);
        Ok(label)
    }
}

fn classification_prompt(text: &str) -> String {
    let categories = Emotion::ALL
        .iter()
        .map(|e| format!("\"{}\"", e))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Analyze the sentiment of the following text and classify it into one of these \
         categories: {}. Respond with only the category name in lowercase and nothing \
         else. Text: \"{}\"",
        categories, text
    )
}

/// Prefer the API's own error message over the raw body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

/// Send every fragment to the UI as it arrives. Returns the full reply.
async fn forward_fragments(
    turn: u64,
    mut stream: BoxStream<'static, Result<String, ChatError>>,
    events: &mpsc::UnboundedSender<ChatEvent>,
) -> Result<String, ChatError> {
    let mut reply = String::new();
    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        reply.push_str(&fragment);
        let _ = events.send(ChatEvent::Fragment {
            turn,
            text: fragment,
        });
    }
    Ok(reply)
}

struct FragmentState<S> {
    bytes: Pin<Box<S>>,
    decoder: SseDecoder,
    ready: VecDeque<Result<String, ChatError>>,
    done: bool,
}

impl<S> FragmentState<S> {
    fn enqueue(&mut self, payloads: Vec<String>) {
        for payload in payloads {
            match serde_json::from_str::<GenerateResponse>(&payload) {
                Ok(GenerateResponse {
                    error: Some(err), ..
                }) => {
                    self.ready.push_back(Err(ChatError::Api {
                        status: err.code,
                        message: err.message,
                    }));
                    self.done = true;
                    return;
                }
                Ok(resp) => {
                    let text = resp.text();
                    if !text.is_empty() {
                        self.ready.push_back(Ok(text));
                    }
                }
                Err(e) => {
                    self.ready.push_back(Err(e.into()));
                    self.done = true;
                    return;
                }
            }
        }
    }
}

/// Decode an SSE byte stream of GenerateContent responses into text
/// fragments. Stops at the first error.
pub fn fragments<S, B, E>(bytes: S) -> BoxStream<'static, Result<String, ChatError>>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ChatError> + Send + 'static,
{
    let state = FragmentState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        ready: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.ready.pop_front() {
                return Some((item, st));
            }
            if st.done {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    let payloads = st.decoder.push(chunk.as_ref());
                    st.enqueue(payloads);
                }
                Some(Err(e)) => {
                    st.ready.push_back(Err(e.into()));
                    st.done = true;
                }
                None => {
                    let payloads = st.decoder.finish();
                    st.enqueue(payloads);
                    st.done = true;
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> String {
        format!(
            "data: {{\"candidates\":[{{\"content\":{{\"role\":\"model\",\"parts\":[{{\"text\":{}}}]}}}}]}}\r\n\r\n",
            serde_json::to_string(text).unwrap()
        )
    }

    #[tokio::test]
    async fn transport_errors_do_not_reveal_the_key() {
        let config = Config {
            api_key: "SECRET-KEY-123".into(),
            ..Config::default()
        };
        let mut client = GeminiClient::new(&config).unwrap();
        client.base_url = "http://127.0.0.1:9".into();

        let err = match client.send_message_stream("hi").await {
            Err(e) => e,
            Ok(_) => panic!("nothing listens on port 9"),
        };
        assert!(matches!(err, ChatError::Http(_)));
        assert!(!err.to_string().contains("SECRET-KEY-123"), "{err}");

        let err = client.classify("hi").await.unwrap_err();
        assert!(!err.to_string().contains("SECRET-KEY-123"), "{err}");
    }

    fn byte_stream(chunks: Vec<Vec<u8>>) -> impl Stream<Item = Result<Vec<u8>, ChatError>> + Send {
        stream::iter(chunks.into_iter().map(Ok))
    }

    #[tokio::test]
    async fn fragments_arrive_in_order() {
        let chunks = ["Hel", "lo wor", "ld."]
            .iter()
            .map(|t| chunk(t).into_bytes())
            .collect();
        let out: Vec<String> = fragments(byte_stream(chunks))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(out, vec!["Hel", "lo wor", "ld."]);
    }

    #[tokio::test]
    async fn events_split_mid_utf8_are_reassembled() {
        let body = chunk("caf\u{e9}").into_bytes();
        let split = body.iter().position(|&b| b == 0xc3).unwrap() + 1;
        let chunks = vec![body[..split].to_vec(), body[split..].to_vec()];
        let out: Vec<String> = fragments(byte_stream(chunks))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(out, vec!["caf\u{e9}"]);
    }

    #[tokio::test]
    async fn malformed_payload_ends_stream_with_error() {
        let chunks = vec![chunk("ok").into_bytes(), b"data: {not json\n\n".to_vec()];
        let out: Vec<Result<String, ChatError>> = fragments(byte_stream(chunks)).collect().await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_deref().unwrap(), "ok");
        assert!(matches!(out[1], Err(ChatError::Decode(_))));
    }

    #[tokio::test]
    async fn in_band_api_error_is_reported() {
        let chunks = vec![b"data: {\"error\":{\"code\":429,\"message\":\"quota\"}}\n\n".to_vec()];
        let out: Vec<Result<String, ChatError>> = fragments(byte_stream(chunks)).collect().await;
        assert!(matches!(
            &out[..],
            [Err(ChatError::Api { status: 429, message })] if message == "quota"
        ));
    }

    #[tokio::test]
    async fn forwarding_reports_each_fragment_and_returns_reply() {
        let chunks = ["Hel", "lo"].iter().map(|t| chunk(t).into_bytes()).collect();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reply = forward_fragments(3, fragments(byte_stream(chunks)), &tx)
            .await
            .unwrap();
        assert_eq!(reply, "Hello");
        assert_eq!(
            rx.recv().await,
            Some(ChatEvent::Fragment {
                turn: 3,
                text: "Hel".into()
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(ChatEvent::Fragment {
                turn: 3,
                text: "lo".into()
            })
        );
    }

    #[test]
    fn prompt_lists_every_emotion() {
        let prompt = classification_prompt("I love this");
        for e in Emotion::ALL {
            assert!(prompt.contains(&format!("\"{}\"", e)));
        }
        assert!(prompt.ends_with("Text: \"I love this\""));
    }

    #[test]
    fn api_errors_prefer_structured_message() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(api_error_message(body), "API key not valid");
        assert_eq!(api_error_message("Bad Gateway\n"), "Bad Gateway");
    }

    #[test]
    fn missing_key_is_rejected() {
        let config = Config {
            api_key: "  ".into(),
            ..Config::default()
        };
        assert!(matches!(GeminiClient::new(&config), Err(ChatError::MissingApiKey)));
    }

    #[test]
    fn clones_share_history() {
        let config = Config {
            api_key: "test".into(),
            ..Config::default()
        };
        let client = GeminiClient::new(&config).unwrap();
        let clone = client.clone();
        clone.record_exchange("hi", "hello");
        let history = client.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[1].parts[0].text.as_deref(), Some("hello"));
    }
}
