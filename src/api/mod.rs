pub mod gemini;
pub mod sse;

/// Everything that can go wrong talking to the chat service.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("no API key configured (set api_key in config.toml or GEMINI_API_KEY)")]
    MissingApiKey,
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ChatError {
    // Request URLs are dropped from transport errors before they reach a log.
    fn from(e: reqwest::Error) -> Self {
        ChatError::Http(e.without_url())
    }
}

/// Progress of one streamed chat turn, delivered to the UI thread in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Fragment { turn: u64, text: String },
    Finished { turn: u64 },
    Failed { turn: u64, error: String },
}
