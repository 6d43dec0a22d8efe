//! Response stage: turns retrieved context into a `FINAL_RESPONSE`.

use std::sync::Arc;

use crate::core::config::LlmSettings;
use crate::envelope::{
    agents, AnswerPayload, Envelope, MessageKind, Payload, TransportMessage,
};
use crate::llm::{ChatMessage, ChatRequest, LanguageModel};

const SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

pub struct ResponseStage {
    llm: Arc<dyn LanguageModel>,
    settings: LlmSettings,
}

impl ResponseStage {
    pub fn new(llm: Arc<dyn LanguageModel>, settings: LlmSettings) -> Self {
        Self { llm, settings }
    }

    /// Answer a retrieval message. Never fails: faults are reported as an
    /// `ERROR` envelope to the UI whose `answer` describes the problem.
    pub async fn generate_response(&self, message: &TransportMessage) -> Envelope {
        let trace_id = message.trace();
        let kind = MessageKind::parse(&message.kind);

        let retrieval = match Payload::from_value(&kind, message.payload.clone()) {
            Ok(Payload::RetrievalResult(result)) => result,
            Ok(Payload::RetrievalError(upstream)) => {
                tracing::warn!("Forwarding upstream {}: {}", upstream.error_type, upstream.error);
                return failure(format!("Error retrieving context: {}", upstream.error), trace_id);
            }
            Ok(Payload::Error(upstream)) => {
                return failure(format!("Error retrieving context: {}", upstream.error), trace_id);
            }
            Ok(other) => {
                return failure(
                    format!("Error generating response: unexpected {} message", other.kind()),
                    trace_id,
                );
            }
            Err(err) => {
                tracing::warn!("Rejected retrieval message: {}", err);
                return failure(format!("Error generating response: {}", err), trace_id);
            }
        };

        let context = retrieval.retrieved_context.join("\n\n");
        let request = ChatRequest::new(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_prompt(&context, &retrieval.query)),
        ])
        .with_settings(&self.settings);

        tracing::info!("Sending prompt to {} ({} context chunks)", self.llm.name(), retrieval.num_results);
        match self.llm.complete(request).await {
            Ok(answer) => {
                tracing::info!("Response received from {}", self.llm.name());
                Envelope::create(
                    agents::RESPONSE,
                    agents::UI,
                    Payload::FinalResponse(AnswerPayload {
                        answer,
                        source_context: context,
                    }),
                    trace_id,
                )
            }
            Err(err) => {
                tracing::error!("Response generation failed: {}", err);
                failure(format!("Error generating response: {}", err), trace_id)
            }
        }
    }
}

pub fn build_prompt(context: &str, query: &str) -> String {
    format!(
        "You are a helpful assistant. Answer the user's question based on the context below.\n\
         Context:\n{}\n\
         Question:\n{}\n\
         Answer:",
        context, query
    )
}

fn failure(answer: String, trace_id: Option<&str>) -> Envelope {
    Envelope::create(
        agents::RESPONSE,
        agents::UI,
        Payload::ResponseError(AnswerPayload {
            answer,
            source_context: String::new(),
        }),
        trace_id,
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::core::errors::{ModelFailureKind, PipelineError};

    struct RecordingModel {
        reply: Result<String, ModelFailureKind>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl RecordingModel {
        fn answering(answer: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(answer.to_string()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn failing(kind: ModelFailureKind) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(kind),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LanguageModel for RecordingModel {
        fn name(&self) -> &str {
            "recording"
        }

        async fn complete(&self, request: ChatRequest) -> Result<String, PipelineError> {
            self.requests.lock().unwrap().push(request);
            match &self.reply {
                Ok(answer) => Ok(answer.clone()),
                Err(kind) => Err(PipelineError::model_call(*kind, "invalid api key")),
            }
        }
    }

    fn message(kind: &str, payload: serde_json::Value) -> TransportMessage {
        TransportMessage {
            sender: agents::RETRIEVAL.to_string(),
            receiver: agents::RESPONSE.to_string(),
            kind: kind.to_string(),
            trace_id: "trace-9".to_string(),
            payload,
            timestamp: crate::envelope::now_timestamp(),
        }
    }

    #[tokio::test]
    async fn answer_carries_joined_context() {
        let model = RecordingModel::answering("Cats and dogs.");
        let stage = ResponseStage::new(model.clone(), LlmSettings::default());

        let reply = stage
            .generate_response(&message(
                "RETRIEVAL_RESULT",
                json!({
                    "retrieved_context": ["cats are mammals", "dogs are mammals"],
                    "query": "which pets are mammals?",
                    "num_results": 2
                }),
            ))
            .await;

        assert_eq!(reply.kind(), MessageKind::FinalResponse);
        assert_eq!(reply.sender(), "LLMResponseAgent");
        assert_eq!(reply.receiver(), "UI");
        assert_eq!(reply.trace_id(), "trace-9");
        let Payload::FinalResponse(answer) = reply.payload() else {
            panic!("expected final response");
        };
        assert_eq!(answer.answer, "Cats and dogs.");
        assert_eq!(answer.source_context, "cats are mammals\n\ndogs are mammals");

        let requests = model.requests.lock().unwrap();
        let prompt = &requests[0].messages[1].content;
        assert!(prompt.contains("cats are mammals\n\ndogs are mammals"));
        assert!(prompt.contains("Question:\nwhich pets are mammals?"));
        assert_eq!(requests[0].messages[0].role, "system");
    }

    #[tokio::test]
    async fn model_failure_becomes_error_answer() {
        let model = RecordingModel::failing(ModelFailureKind::Authentication);
        let stage = ResponseStage::new(model, LlmSettings::default());

        let reply = stage
            .generate_response(&message(
                "RETRIEVAL_RESULT",
                json!({"retrieved_context": ["x"], "query": "q", "num_results": 1}),
            ))
            .await;

        assert!(reply.is_error());
        let Payload::ResponseError(answer) = reply.payload() else {
            panic!("expected response error");
        };
        assert!(answer.answer.starts_with("Error generating response:"));
        assert!(answer.answer.contains("authentication"));
        assert_eq!(answer.source_context, "");
    }

    #[tokio::test]
    async fn upstream_error_is_forwarded_without_calling_model() {
        let model = RecordingModel::answering("unused");
        let stage = ResponseStage::new(model.clone(), LlmSettings::default());

        let reply = stage
            .generate_response(&message(
                "ERROR",
                json!({
                    "retrieved_context": [],
                    "query": "",
                    "error": "missing field `query`",
                    "error_type": "MissingField"
                }),
            ))
            .await;

        assert!(reply.is_error());
        let Payload::ResponseError(answer) = reply.payload() else {
            panic!("expected response error");
        };
        assert!(answer.answer.contains("missing field `query`"));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn malformed_result_is_rejected() {
        let model = RecordingModel::answering("unused");
        let stage = ResponseStage::new(model.clone(), LlmSettings::default());

        let reply = stage
            .generate_response(&message("RETRIEVAL_RESULT", json!({"retrieved_context": []})))
            .await;

        assert!(reply.is_error());
        assert_eq!(reply.trace_id(), "trace-9");
        assert_eq!(model.calls(), 0);
    }

    #[test]
    fn prompt_places_context_before_question() {
        let prompt = build_prompt("ctx", "why?");
        let context_at = prompt.find("Context:\nctx").unwrap();
        let question_at = prompt.find("Question:\nwhy?").unwrap();
        assert!(context_at < question_at);
        assert!(prompt.ends_with("Answer:"));
    }
}
