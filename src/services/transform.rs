//! AI text transform.
//!
//! [`ChatTransform`] sends dictated text with a mode-specific instruction
//! to an OpenAI-compatible chat-completion endpoint and returns the
//! model's answer. Connection settings are read from the
//! [`SettingsStore`] on every call.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SettingsStore;
use crate::error::{Error, Result};
use crate::protocol::Mode;

// ============================================================================
// Constants
// ============================================================================

/// Deadline for one transform call.
pub const TRANSFORM_TIMEOUT: Duration = Duration::from_secs(30);

/// Sampling temperature.
const TEMPERATURE: f64 = 0.3;

/// Completion length cap.
const MAX_TOKENS: u32 = 2048;

/// Path appended to the configured base URL.
const COMPLETIONS_PATH: &str = "/v1/chat/completions";

// ============================================================================
// TextTransform
// ============================================================================

/// Rewrites text according to a [`Mode`].
#[async_trait]
pub trait TextTransform: Send + Sync {
    /// Returns `true` if the service is configured.
    fn is_available(&self) -> bool;

    /// Transforms `text`.
    ///
    /// # Errors
    ///
    /// - [`Error::TransformUnavailable`] if not configured
    /// - [`Error::Transform`] on network, status or decode failure
    async fn transform(&self, text: &str, mode: Mode) -> Result<String>;
}

// ============================================================================
// Prompts
// ============================================================================

/// Builds the instruction sent for `mode`. Raw mode sends the text itself.
#[must_use]
pub fn build_prompt(text: &str, mode: Mode) -> String {
    match mode {
        Mode::Tidy => format!(
            "You tidy up speech-to-text transcripts. Clean up the raw transcript below.\n\
             \n\
             Rules:\n\
             1. Remove words that were repeated by accident.\n\
             2. Remove filler words and verbal tics (such as \"um\", \"uh\", \"那个\", \"就是\", \"嗯\").\n\
             3. Add correct punctuation.\n\
             4. Keep the original meaning and language; do not add or drop content.\n\
             5. Output only the cleaned text, with no explanation.\n\
             \n\
             Transcript: {text}"
        ),
        Mode::Formal => format!(
            "You are a writing assistant for speech-to-text transcripts. Rewrite the \
             colloquial transcript below as formal written text.\n\
             \n\
             Rules:\n\
             1. Remove all repeated words and filler words.\n\
             2. Turn spoken phrasing into written phrasing.\n\
             3. Improve word order so the text reads clearly.\n\
             4. Add correct punctuation.\n\
             5. Keep the original meaning and language; add nothing new.\n\
             6. Output only the rewritten text, with no explanation.\n\
             \n\
             Transcript: {text}"
        ),
        Mode::Translate => format!(
            "You are a translator. Detect the language of the text below:\n\
             - Chinese: translate it into English.\n\
             - English: translate it into Chinese.\n\
             - Any other language: translate it into Chinese.\n\
             \n\
             Rules:\n\
             1. Drop filler words and repetitions before translating.\n\
             2. The translation must read naturally.\n\
             3. Output only the translation, with no explanation.\n\
             \n\
             Text: {text}"
        ),
        Mode::Raw => text.to_string(),
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

// ============================================================================
// ChatTransform
// ============================================================================

/// [`TextTransform`] backed by a chat-completion API.
#[derive(Debug, Clone)]
pub struct ChatTransform {
    /// HTTP client with the call deadline applied.
    client: reqwest::Client,
    /// Source of key, base URL and model.
    settings: Arc<SettingsStore>,
}

impl ChatTransform {
    /// Creates a transform reading its settings from `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transform`] if the HTTP client cannot be built.
    pub fn new(settings: Arc<SettingsStore>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(TRANSFORM_TIMEOUT)
            .build()
            .map_err(|e| Error::transform(format!("create client: {e}")))?;

        Ok(Self { client, settings })
    }

    async fn complete(&self, prompt: String) -> Result<String> {
        let settings = self.settings.snapshot();
        let url = format!("{}{COMPLETIONS_PATH}", settings.base_url.trim_end_matches('/'));

        let request = ChatRequest {
            model: &settings.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        debug!(url = %url, model = %settings.model, "Calling chat completion API");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&settings.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::transform(format!("API call failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::transform(format!("read response: {e}")))?;

        if status != StatusCode::OK {
            return Err(Error::transform(format!(
                "API error (status {}): {body}",
                status.as_u16()
            )));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| Error::transform(format!("parse response: {e}")))?;

        if let Some(error) = parsed.error {
            return Err(Error::transform(format!("API error: {}", error.message)));
        }

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| Error::transform("no response from AI"))
    }
}

#[async_trait]
impl TextTransform for ChatTransform {
    fn is_available(&self) -> bool {
        self.settings.is_transform_available()
    }

    async fn transform(&self, text: &str, mode: Mode) -> Result<String> {
        if !self.is_available() {
            return Err(Error::TransformUnavailable);
        }
        if mode.is_raw() || text.trim().is_empty() {
            return Ok(text.to_string());
        }

        self.complete(build_prompt(text, mode)).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::{SETTINGS_FILE, Settings};

    fn transform_for(base_url: &str, api_key: &str, dir: &TempDir) -> ChatTransform {
        let store = SettingsStore::from_parts(
            dir.path().join(SETTINGS_FILE),
            Settings {
                api_key: api_key.to_string(),
                base_url: base_url.to_string(),
                model: "test-model".to_string(),
                lan_ip: String::new(),
            },
        );
        ChatTransform::new(Arc::new(store)).expect("client")
    }

    fn completion(content: &str) -> serde_json::Value {
        json!({ "choices": [ { "message": { "role": "assistant", "content": content } } ] })
    }

    #[tokio::test]
    async fn test_transform_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({ "model": "test-model", "max_tokens": 2048 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("  Hello.\n")))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().expect("tempdir");
        let transform = transform_for(&server.uri(), "sk-test", &dir);

        let result = transform.transform("hello", Mode::Tidy).await.expect("transform");
        assert_eq!(result, "Hello.");
    }

    #[tokio::test]
    async fn test_transform_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let dir = TempDir::new().expect("tempdir");
        let transform = transform_for(&server.uri(), "sk-test", &dir);

        let err = transform
            .transform("hello", Mode::Formal)
            .await
            .expect_err("status error");
        assert_eq!(err.to_string(), "API error (status 401): bad key");
    }

    #[tokio::test]
    async fn test_transform_error_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "error": { "message": "quota exceeded" } })),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().expect("tempdir");
        let transform = transform_for(&server.uri(), "sk-test", &dir);

        let err = transform
            .transform("hello", Mode::Translate)
            .await
            .expect_err("error object");
        assert_eq!(err.to_string(), "API error: quota exceeded");
    }

    #[tokio::test]
    async fn test_transform_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let dir = TempDir::new().expect("tempdir");
        let transform = transform_for(&server.uri(), "sk-test", &dir);

        let err = transform
            .transform("hello", Mode::Tidy)
            .await
            .expect_err("no choices");
        assert_eq!(err.to_string(), "no response from AI");
    }

    #[tokio::test]
    async fn test_transform_unparseable_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let dir = TempDir::new().expect("tempdir");
        let transform = transform_for(&server.uri(), "sk-test", &dir);

        let err = transform
            .transform("hello", Mode::Tidy)
            .await
            .expect_err("parse error");
        assert!(err.to_string().starts_with("parse response:"));
    }

    #[tokio::test]
    async fn test_unavailable_without_key() {
        let dir = TempDir::new().expect("tempdir");
        let transform = transform_for("http://127.0.0.1:9", "", &dir);

        assert!(!transform.is_available());
        assert!(matches!(
            transform.transform("hello", Mode::Tidy).await,
            Err(Error::TransformUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_raw_and_blank_pass_through() {
        let dir = TempDir::new().expect("tempdir");
        let transform = transform_for("http://127.0.0.1:9", "sk-test", &dir);

        assert_eq!(
            transform.transform("as is", Mode::Raw).await.expect("raw"),
            "as is"
        );
        assert_eq!(transform.transform("  ", Mode::Tidy).await.expect("blank"), "  ");
    }

    #[test]
    fn test_prompts_embed_text() {
        for mode in [Mode::Tidy, Mode::Formal, Mode::Translate] {
            let prompt = build_prompt("我们那个明天开会", mode);
            assert!(prompt.ends_with("我们那个明天开会"));
        }
        assert_eq!(build_prompt("plain", Mode::Raw), "plain");
    }
}
