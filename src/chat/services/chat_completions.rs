use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::provider::{
    BoxFuture, ChatProvider, ProviderError, ResponseStream, StreamChunk, TurnMessage,
};

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_MODEL: &str = "deepseek-chat";

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENAI_MODEL: &str = "gpt-4";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [TurnMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

enum SseLine {
    Delta(String),
    Done,
}

/// Decode one server-sent-events line. `None` for keep-alives, empty deltas
/// and anything unparseable.
fn parse_sse_line(line: &str) -> Option<SseLine> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.is_empty() || line.starts_with(':') {
        return None;
    }

    let data = line
        .strip_prefix("data: ")
        .or_else(|| line.strip_prefix("data:"))?
        .trim();
    if data == "[DONE]" {
        return Some(SseLine::Done);
    }

    let event: StreamEvent = serde_json::from_str(data).ok()?;
    let content = event.choices.into_iter().next().and_then(|c| c.delta.content)?;
    if content.is_empty() {
        return None;
    }

    Some(SseLine::Delta(content))
}

/// Open a streaming chat completion against an OpenAI-compatible endpoint and
/// decode the SSE body into text deltas.
async fn open_stream(
    client: &Client,
    base_url: &str,
    api_key: &str,
    model: &str,
    messages: &[TurnMessage],
) -> Result<ResponseStream, ProviderError> {
    let request = ChatRequest {
        model,
        messages,
        stream: true,
    };

    debug!(model, message_count = messages.len(), "opening chat completion stream");

    let response = client
        .post(format!("{base_url}/chat/completions"))
        .bearer_auth(api_key)
        .json(&request)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ProviderError::Api {
            status: status.as_u16(),
            message,
        });
    }

    let mut bytes = response.bytes_stream();

    let stream = async_stream::stream! {
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    yield StreamChunk::Error(err.to_string());
                    return;
                }
            };

            buffer.extend_from_slice(&chunk);
            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line[..line.len() - 1]);
                match parse_sse_line(&line) {
                    Some(SseLine::Delta(text)) => yield StreamChunk::Text(text),
                    Some(SseLine::Done) => {
                        yield StreamChunk::Done;
                        return;
                    }
                    None => {}
                }
            }
        }

        yield StreamChunk::Done;
    };

    Ok(Box::pin(stream))
}

/// DeepSeek chat-completions backend.
pub struct DeepSeekProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl DeepSeekProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEEPSEEK_BASE_URL.to_string())
    }

    /// Point at a different endpoint (self-hosted DeepSeek-compatible servers).
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
            model: DEEPSEEK_MODEL.to_string(),
        }
    }
}

impl ChatProvider for DeepSeekProvider {
    fn name(&self) -> &str {
        "DeepSeek"
    }

    fn stream_reply(
        &self,
        messages: Vec<TurnMessage>,
    ) -> BoxFuture<'static, Result<ResponseStream, ProviderError>> {
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let base_url = self.base_url.clone();
        let model = self.model.clone();

        Box::pin(
            async move { open_stream(&client, &base_url, &api_key, &model, &messages).await },
        )
    }
}

/// OpenAI chat-completions backend (the alternate provider).
pub struct ChatGptProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl ChatGptProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: OPENAI_BASE_URL.to_string(),
            model: OPENAI_MODEL.to_string(),
        }
    }
}

impl ChatProvider for ChatGptProvider {
    fn name(&self) -> &str {
        "ChatGPT"
    }

    fn stream_reply(
        &self,
        messages: Vec<TurnMessage>,
    ) -> BoxFuture<'static, Result<ResponseStream, ProviderError>> {
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let base_url = self.base_url.clone();
        let model = self.model.clone();

        Box::pin(
            async move { open_stream(&client, &base_url, &api_key, &model, &messages).await },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta_of(line: &str) -> Option<String> {
        match parse_sse_line(line) {
            Some(SseLine::Delta(text)) => Some(text),
            _ => None,
        }
    }

    #[test]
    fn test_parse_delta_line() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hola"}}]}"#;
        assert_eq!(delta_of(line).as_deref(), Some("Hola"));
    }

    #[test]
    fn test_parse_done_marker() {
        assert!(matches!(parse_sse_line("data: [DONE]"), Some(SseLine::Done)));
        assert!(matches!(
            parse_sse_line("data: [DONE]\r"),
            Some(SseLine::Done)
        ));
    }

    #[test]
    fn test_keep_alive_and_blank_lines_are_skipped() {
        assert!(parse_sse_line("").is_none());
        assert!(parse_sse_line(": keep-alive").is_none());
    }

    #[test]
    fn test_role_announcement_without_content_is_skipped() {
        let line = r#"data: {"choices":[{"delta":{"role":"assistant","content":""}}]}"#;
        assert!(parse_sse_line(line).is_none());
        let line = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert!(parse_sse_line(line).is_none());
    }

    #[test]
    fn test_malformed_payloads_are_skipped() {
        assert!(parse_sse_line("data: {not json").is_none());
        assert!(parse_sse_line(r#"data: {"choices":[]}"#).is_none());
        assert!(parse_sse_line("event: ping").is_none());
    }

    #[test]
    fn test_request_body_shape() {
        let messages = vec![TurnMessage::system("s"), TurnMessage::user("u")];
        let request = ChatRequest {
            model: DEEPSEEK_MODEL,
            messages: &messages,
            stream: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "deepseek-chat");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "u");
    }
}
