use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use super::provider::LanguageModel;
use super::types::ChatRequest;
use crate::core::config::LlmSettings;
use crate::core::errors::{ModelFailureKind, PipelineError};

/// Chat model behind an OpenAI-compatible `/v1/chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAiChatModel {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: Client,
}

impl OpenAiChatModel {
    pub fn new(settings: &LlmSettings) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|err| PipelineError::model_call(ModelFailureKind::Provider, err.to_string()))?;

        if settings.api_key.is_none() {
            tracing::warn!("No LLM API key configured; requests to {} may be rejected", settings.base_url);
        }

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, PipelineError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "stream": false,
        });
        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.max_tokens {
                obj.insert("max_tokens".to_string(), json!(t));
            }
        }

        let mut call = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }

        let res = call.send().await.map_err(classify_transport_error)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(PipelineError::model_call(
                classify_status(status),
                format!("{} returned {}: {}", self.model, status, text),
            ));
        }

        let payload: Value = res.json().await.map_err(|err| {
            PipelineError::model_call(ModelFailureKind::Provider, err.to_string())
        })?;

        extract_content(&payload)
    }
}

fn classify_status(status: StatusCode) -> ModelFailureKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ModelFailureKind::Authentication,
        StatusCode::TOO_MANY_REQUESTS => ModelFailureKind::Quota,
        _ => ModelFailureKind::Provider,
    }
}

fn classify_transport_error(err: reqwest::Error) -> PipelineError {
    let kind = if err.is_connect() || err.is_timeout() {
        ModelFailureKind::Network
    } else {
        ModelFailureKind::Provider
    };
    PipelineError::model_call(kind, err.to_string())
}

fn extract_content(payload: &Value) -> Result<String, PipelineError> {
    payload["choices"][0]["message"]["content"]
        .as_str()
        .map(|content| content.trim().to_string())
        .ok_or_else(|| {
            PipelineError::model_call(
                ModelFailureKind::Provider,
                "response contained no message content",
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ChatMessage;

    #[test]
    fn status_codes_map_to_failure_kinds() {
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), ModelFailureKind::Authentication);
        assert_eq!(classify_status(StatusCode::FORBIDDEN), ModelFailureKind::Authentication);
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), ModelFailureKind::Quota);
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY), ModelFailureKind::Provider);
    }

    #[test]
    fn content_is_read_from_first_choice() {
        let payload = json!({
            "choices": [{"message": {"role": "assistant", "content": "  Paris.\n"}}]
        });
        assert_eq!(extract_content(&payload).unwrap(), "Paris.");

        let err = extract_content(&json!({"choices": []})).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ModelCall {
                kind: ModelFailureKind::Provider,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_network_failure() {
        let settings = LlmSettings {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            ..LlmSettings::default()
        };
        let model = OpenAiChatModel::new(&settings).unwrap();

        let err = model
            .complete(ChatRequest::new(vec![ChatMessage::user("hello")]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ModelCall {
                kind: ModelFailureKind::Network,
                ..
            }
        ));
    }
}
