use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::models::{ChatMessage, ChatOptions};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const TRANSLATE_TEMPERATURE: f32 = 0.3;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], options: ChatOptions) -> Result<String, LlmError>;

    /// Translates `text` into the language named by `target_lang`, keeping
    /// technical terminology intact.
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, LlmError> {
        let messages = translation_messages(text, target_lang);
        self.chat(&messages, ChatOptions::with_temperature(TRANSLATE_TEMPERATURE))
            .await
    }
}

#[async_trait]
impl<T> LlmClient for Arc<T>
where
    T: LlmClient + ?Sized,
{
    async fn chat(&self, messages: &[ChatMessage], options: ChatOptions) -> Result<String, LlmError> {
        (**self).chat(messages, options).await
    }

    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, LlmError> {
        (**self).translate(text, target_lang).await
    }
}

pub fn language_name(tag: &str) -> &str {
    match tag {
        "zh-CN" => "Chinese (Simplified)",
        "en" => "English",
        other => other,
    }
}

pub fn translation_messages(text: &str, target_lang: &str) -> Vec<ChatMessage> {
    let target = language_name(target_lang);
    vec![
        ChatMessage::system(format!(
            "You are a professional academic translator. Translate the following text to {target}. \
             Preserve technical terms, mathematical notation, and academic writing style. \
             Keep proper nouns in their original form when appropriate."
        )),
        ChatMessage::user(text),
    ]
}

/// Chat-completions client for DeepSeek, Zhipu, SiliconFlow, OpenAI and other
/// endpoints speaking the same protocol. Requests are not retried.
#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatibleClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        info!(provider = %config.provider, model = %config.model_name, "language model client ready");
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.trim().to_string(),
            model: config.model_name.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn chat(&self, messages: &[ChatMessage], options: ChatOptions) -> Result<String, LlmError> {
        let payload = CompletionRequest {
            model: &self.model,
            messages,
            max_tokens: options.max_tokens.unwrap_or(self.max_tokens),
            temperature: options.temperature.unwrap_or(self.temperature),
            stream: false,
        };

        debug!(endpoint = %self.endpoint, messages = messages.len(), "sending chat completion");
        let mut request = self.client.post(&self.endpoint).json(&payload);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::Malformed("response has no message content".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn client(server: &MockServer) -> OpenAiCompatibleClient {
        let config = LlmConfig {
            api_key: "sk-test".to_string(),
            base_url: server.base_url(),
            model_name: "deepseek-chat".to_string(),
            ..LlmConfig::default()
        };
        OpenAiCompatibleClient::new(&config).expect("client")
    }

    #[tokio::test]
    async fn chat_returns_first_choice_content() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("authorization", "Bearer sk-test")
                    .body_contains("\"stream\":false")
                    .body_contains("\"temperature\":0.5");
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "role": "assistant", "content": "Passage 1 says so." } }]
                }));
            })
            .await;

        let reply = client(&server)
            .chat(&[ChatMessage::user("why?")], ChatOptions::with_temperature(0.5))
            .await
            .expect("reply");

        mock.assert();
        assert_eq!(reply, "Passage 1 says so.");
    }

    #[tokio::test]
    async fn error_status_is_reported_once() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(503).body("overloaded");
            })
            .await;

        let error = client(&server)
            .chat(&[ChatMessage::user("hello")], ChatOptions::default())
            .await
            .expect_err("error status");

        mock.assert_hits(1);
        assert_eq!(error.to_reply(), "[Error] API returned status 503");
    }

    #[tokio::test]
    async fn missing_choices_is_malformed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({ "choices": [] }));
            })
            .await;

        let error = client(&server)
            .chat(&[ChatMessage::user("hello")], ChatOptions::default())
            .await
            .expect_err("malformed");

        assert!(matches!(error, LlmError::Malformed(_)));
    }

    #[tokio::test]
    async fn translate_uses_language_name_and_low_temperature() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .body_contains("Chinese (Simplified)")
                    .body_contains("\"temperature\":0.3");
                then.status(200)
                    .json_body(json!({ "choices": [{ "message": { "content": "注意力" } }] }));
            })
            .await;

        let reply = client(&server).translate("attention", "zh-CN").await.expect("reply");

        mock.assert();
        assert_eq!(reply, "注意力");
    }

    #[test]
    fn unknown_language_tags_pass_through() {
        assert_eq!(language_name("en"), "English");
        assert_eq!(language_name("de"), "de");
    }
}
