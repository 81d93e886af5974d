use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::error;

use crate::config::Config;
use crate::labels::LabelSet;

pub const SYSTEM_PROMPT: &str = "You are an intelligent medical assistant.";

#[derive(Error, Debug)]
pub enum AdviceError {
    #[error("OPENAI_API_KEY must be set to use the openai advice backend")]
    MissingApiKey,
    #[error("advice request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("advice service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("advice service returned no message")]
    EmptyResponse,
}

/// Turns symptoms, and the disease predicted from the images if any,
/// into advice text for the patient.
#[async_trait]
pub trait AdviceGenerator {
    async fn advise(&self, symptoms: &str, disease: Option<&str>) -> Result<String, AdviceError>;
}

pub fn build_prompt(symptoms: &str, disease: Option<&str>) -> String {
    match disease {
        Some(disease) => format!(
            "The patient has the following symptoms: {symptoms}. The predicted disease based on the image is {disease}. Please provide advice and a prescription."
        ),
        None => format!(
            "The patient has the following symptoms: {symptoms}. Please provide advice and a prescription."
        ),
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Asks an OpenAI-compatible chat completions endpoint for advice.
pub struct OpenAiAdvice {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiAdvice {
    pub fn new(
        api_key: String,
        base_url: &str,
        model: String,
        timeout: Option<Duration>,
    ) -> Result<Self, AdviceError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AdviceError> {
        let api_key = config
            .openai_api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or(AdviceError::MissingApiKey)?;

        Self::new(
            api_key,
            &config.openai_base_url,
            config.openai_model.clone(),
            config.advice_timeout(),
        )
    }
}

#[async_trait]
impl AdviceGenerator for OpenAiAdvice {
    async fn advise(&self, symptoms: &str, disease: Option<&str>) -> Result<String, AdviceError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: build_prompt(symptoms, disease),
                },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                status = status.as_u16(),
                "advice service returned non-2xx: {}", body
            );
            return Err(AdviceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response.json().await?;
        let reply = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(AdviceError::EmptyResponse)?;

        let reply = reply.trim().to_string();
        tracing::debug!(reply = %reply, "received advice");

        Ok(reply)
    }
}

/// Answers from the advice/prescription table instead of calling out.
pub struct LookupAdvice {
    labels: Arc<LabelSet>,
}

impl LookupAdvice {
    pub fn new(labels: Arc<LabelSet>) -> Self {
        Self { labels }
    }
}

#[async_trait]
impl AdviceGenerator for LookupAdvice {
    async fn advise(&self, symptoms: &str, disease: Option<&str>) -> Result<String, AdviceError> {
        let entry = disease.and_then(|d| self.labels.reference(d).map(|entry| (d, entry)));

        Ok(match entry {
            Some((disease, entry)) => format!("{disease}\n{}", render(entry)),
            None => format!(
                "No reference advice available for the reported symptoms: {symptoms}. Please consult a doctor."
            ),
        })
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Object(fields) => fields
            .iter()
            .map(|(key, value)| format!("{key}: {}", render(value)))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Array(items) => items.iter().map(render).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn prompt_mentions_disease_when_known() {
        assert_eq!(
            build_prompt("itchy elbows", Some("Psoriasis")),
            "The patient has the following symptoms: itchy elbows. The predicted disease based on the image is Psoriasis. Please provide advice and a prescription."
        );
        assert_eq!(
            build_prompt("itchy elbows", None),
            "The patient has the following symptoms: itchy elbows. Please provide advice and a prescription."
        );
    }

    #[test]
    fn requires_an_api_key() {
        let config = Config::default_test_config();
        assert!(matches!(
            OpenAiAdvice::from_config(&config),
            Err(AdviceError::MissingApiKey)
        ));

        let mut config = Config::default_test_config();
        config.openai_api_key = Some(String::new());
        assert!(matches!(
            OpenAiAdvice::from_config(&config),
            Err(AdviceError::MissingApiKey)
        ));
    }

    #[tokio::test]
    async fn sends_chat_completion_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer test-key")
                    .json_body(json!({
                        "model": "gpt-4",
                        "messages": [
                            {"role": "system", "content": SYSTEM_PROMPT},
                            {"role": "user", "content": build_prompt("dry patches", Some("Eczema"))}
                        ]
                    }));
                then.status(200).json_body(json!({
                    "choices": [
                        {"index": 0, "message": {"role": "assistant", "content": "  Use an emollient.\n"}}
                    ]
                }));
            })
            .await;

        let advice = OpenAiAdvice::new(
            "test-key".to_string(),
            &server.url("/v1/"),
            "gpt-4".to_string(),
            Some(Duration::from_secs(5)),
        )
        .unwrap();

        let reply = advice.advise("dry patches", Some("Eczema")).await.unwrap();

        mock.assert_async().await;
        assert_eq!(reply, "Use an emollient.");
    }

    #[tokio::test]
    async fn surfaces_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(401).body("invalid api key");
            })
            .await;

        let advice =
            OpenAiAdvice::new("bad-key".to_string(), &server.base_url(), "gpt-4".to_string(), None)
                .unwrap();

        let err = advice.advise("rash", None).await.unwrap_err();
        match err {
            AdviceError::Status { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid api key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn empty_choices_are_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(json!({"choices": []}));
            })
            .await;

        let advice =
            OpenAiAdvice::new("key".to_string(), &server.base_url(), "gpt-4".to_string(), None)
                .unwrap();

        assert!(matches!(
            advice.advise("rash", None).await,
            Err(AdviceError::EmptyResponse)
        ));
    }

    #[tokio::test]
    async fn lookup_answers_from_reference_table() {
        let labels = LabelSet::from_json(
            r#"{
                "Acne": {"advice": "Wash gently", "prescription": ["benzoyl peroxide", "adapalene"]},
                "Eczema": "Moisturize often"
            }"#,
        )
        .unwrap();
        let advice = LookupAdvice::new(Arc::new(labels));

        assert_eq!(
            advice.advise("spots", Some("Acne")).await.unwrap(),
            "Acne\nadvice: Wash gently\nprescription: benzoyl peroxide, adapalene"
        );
        assert_eq!(
            advice.advise("dry skin", Some("Eczema")).await.unwrap(),
            "Eczema\nMoisturize often"
        );

        let fallback = advice.advise("sore throat", None).await.unwrap();
        assert!(fallback.contains("sore throat"));
        let unknown = advice.advise("sore throat", Some("Flu")).await.unwrap();
        assert_eq!(unknown, fallback);
    }
}
