use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::sse::{ensure_success, fragment_stream};
use super::{ChatTransport, FragmentStream, WireMessage};
use crate::error::TransportError;
use crate::state::Message;

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAIChunk {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    /// Set instead of `choices` when the provider fails mid-stream
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    #[serde(default)]
    delta: Option<OpenAIDelta>,
}

#[derive(Deserialize)]
struct OpenAIDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Streams chat completions from an OpenAI-compatible endpoint, using the
/// credential as the bearer token.
#[derive(Clone)]
pub struct OpenAiTransport {
    client: Client,
    api_base: String,
    model: String,
}

impl OpenAiTransport {
    pub fn new(api_base: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatTransport for OpenAiTransport {
    async fn stream(
        &self,
        history: &[Message],
        credential: &str,
    ) -> Result<FragmentStream, TransportError> {
        let url = format!("{}/chat/completions", self.api_base);

        let request = OpenAIRequest {
            model: self.model.clone(),
            messages: history.iter().map(WireMessage::from).collect(),
            stream: true,
        };

        info!(model = %self.model, messages = history.len(), "starting completion stream");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", credential))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let response = ensure_success(response, "OpenAI API").await?;
        Ok(fragment_stream(response, parse_chunk))
    }
}

fn parse_chunk(data: &str) -> Option<Result<String, TransportError>> {
    let chunk: OpenAIChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            debug!(error = %e, data, "skipping unparseable completion chunk");
            return None;
        }
    };

    if let Some(error) = chunk.error {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .or_else(|| error.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Some(Err(TransportError::Stream(message)));
    }

    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .filter(|text| !text.is_empty())
        .map(Ok)
}
