use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use telar_core::config::LlmConfig;
use telar_core::domain::conversation::{Conversation, HandoffKind};
use telar_core::domain::decision::{Decision, ExtractedFields};

use crate::fallback;
use crate::llm::{LlmClient, LlmRequest};
use crate::prompt::PromptBuilder;

/// Resilient decision executor.
///
/// `decide` always resolves to a usable [`Decision`]: primary model under the
/// primary deadline, one degraded retry with a cheaper model and a strictly
/// shorter deadline, then the deterministic local fallback. Nothing here
/// mutates the conversation.
pub struct DecisionEngine {
    client: Arc<dyn LlmClient>,
    prompt: PromptBuilder,
    primary_model: String,
    fallback_model: String,
    primary_deadline: Duration,
    retry_deadline: Duration,
    retry_backoff: Duration,
}

impl DecisionEngine {
    pub fn new(client: Arc<dyn LlmClient>, prompt: PromptBuilder, llm: &LlmConfig) -> Self {
        Self {
            client,
            prompt,
            primary_model: llm.model.clone(),
            fallback_model: llm.fallback_model.clone(),
            primary_deadline: Duration::from_secs(llm.timeout_secs),
            retry_deadline: Duration::from_secs(llm.retry_timeout_secs),
            retry_backoff: Duration::from_millis(llm.retry_backoff_ms),
        }
    }

    pub async fn decide(&self, conversation: &Conversation, inbound: &str) -> Decision {
        match self
            .attempt(conversation, inbound, &self.primary_model, self.primary_deadline)
            .await
        {
            Ok(decision) => return decision,
            Err(reason) => {
                warn!(
                    event_name = "agent.decide.retry",
                    sender_id = %conversation.sender_id,
                    model = %self.primary_model,
                    reason = %reason,
                    "primary inference attempt soft-failed, retrying degraded"
                );
            }
        }

        tokio::time::sleep(self.retry_backoff).await;

        match self
            .attempt(conversation, inbound, &self.fallback_model, self.retry_deadline)
            .await
        {
            Ok(decision) => decision,
            Err(reason) => {
                warn!(
                    event_name = "agent.decide.local_fallback",
                    sender_id = %conversation.sender_id,
                    model = %self.fallback_model,
                    reason = %reason,
                    "retry soft-failed, synthesizing local decision"
                );
                fallback::fallback_decision(conversation, inbound)
            }
        }
    }

    async fn attempt(
        &self,
        conversation: &Conversation,
        inbound: &str,
        model: &str,
        deadline: Duration,
    ) -> Result<Decision, String> {
        let prompt = self.prompt.build(conversation, inbound);
        let request = LlmRequest {
            model: model.to_string(),
            instructions: prompt.instructions,
            input: prompt.input,
            deadline,
        };

        let raw = self.client.complete(&request).await.map_err(|err| err.to_string())?;
        debug!(
            event_name = "agent.decide.raw_output",
            sender_id = %conversation.sender_id,
            model = %model,
            raw_len = raw.len(),
            "received raw inference output"
        );
        parse_decision(&raw).ok_or_else(|| "response was not a usable decision object".to_string())
    }
}

/// Extracts the decision from raw provider text.
///
/// Takes the substring between the first `{` and the last `}` and parses it
/// as JSON. Fields that are absent or not strings count as empty; an unknown
/// `handoff_intent` means no intent. A missing or empty `reply` is a parse
/// failure, which feeds the retry/fallback path.
pub fn parse_decision(raw: &str) -> Option<Decision> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }

    let value: Value = serde_json::from_str(&raw[start..=end]).ok()?;
    let object = value.as_object()?;

    let reply = object.get("reply").and_then(Value::as_str).map(str::trim)?;
    if reply.is_empty() {
        return None;
    }

    let string_field = |key: &str| -> Option<String> {
        object
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    };

    let intent = match object.get("handoff_intent").and_then(Value::as_str) {
        Some("price") => Some(HandoffKind::Price),
        Some("visit") => Some(HandoffKind::Visit),
        _ => None,
    };

    Some(Decision {
        reply: reply.to_string(),
        fields: ExtractedFields {
            name: string_field("name"),
            zone: string_field("zone"),
            intent_summary: string_field("intentSummary"),
            availability: string_field("availability"),
        },
        intent,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use telar_core::config::AppConfig;
    use telar_core::domain::conversation::{Conversation, HandoffKind, QualField};

    use super::{parse_decision, DecisionEngine};
    use crate::llm::{LlmError, ScriptedLlmClient};
    use crate::prompt::PromptBuilder;

    fn engine_with(script: Vec<Result<String, LlmError>>) -> (DecisionEngine, Arc<ScriptedLlmClient>) {
        let mut config = AppConfig::default();
        config.llm.retry_backoff_ms = 0;
        let client = Arc::new(ScriptedLlmClient::new(script));
        let prompt = PromptBuilder::new(&config.business, &config.llm);
        (DecisionEngine::new(client.clone(), prompt, &config.llm), client)
    }

    #[test]
    fn parses_json_wrapped_in_prose() {
        let raw = r#"Claro, acá va:
            {"reply": "¡Hola!", "name": "Ana", "handoff_intent": "price"} espero que sirva"#;
        let decision = parse_decision(raw).expect("should parse");
        assert_eq!(decision.reply, "¡Hola!");
        assert_eq!(decision.fields.name.as_deref(), Some("Ana"));
        assert_eq!(decision.intent, Some(HandoffKind::Price));
    }

    #[test]
    fn non_string_fields_count_as_empty() {
        let raw = r#"{"reply": "ok", "name": 42, "zone": null, "intentSummary": ["roller"]}"#;
        let decision = parse_decision(raw).expect("should parse");
        assert!(decision.fields.is_empty());
    }

    #[test]
    fn unknown_handoff_intent_defaults_to_none() {
        let raw = r#"{"reply": "ok", "handoff_intent": "maybe"}"#;
        assert_eq!(parse_decision(raw).expect("should parse").intent, None);
        let raw = r#"{"reply": "ok"}"#;
        assert_eq!(parse_decision(raw).expect("should parse").intent, None);
    }

    #[test]
    fn missing_or_empty_reply_is_a_parse_failure() {
        assert!(parse_decision(r#"{"name": "Ana"}"#).is_none());
        assert!(parse_decision(r#"{"reply": "   "}"#).is_none());
        assert!(parse_decision("no json at all").is_none());
        assert!(parse_decision("}{").is_none());
    }

    #[tokio::test]
    async fn primary_success_needs_one_call() {
        let (engine, client) =
            engine_with(vec![Ok(r#"{"reply": "¡Hola!", "handoff_intent": "none"}"#.to_string())]);
        let decision = engine.decide(&Conversation::new("123"), "hola").await;

        assert_eq!(decision.reply, "¡Hola!");
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn soft_failure_retries_once_with_the_degraded_model() {
        let (engine, client) = engine_with(vec![
            Err(LlmError::Timeout),
            Ok(r#"{"reply": "desde el retry"}"#.to_string()),
        ]);
        let decision = engine.decide(&Conversation::new("123"), "hola").await;

        assert_eq!(decision.reply, "desde el retry");
        let config = AppConfig::default();
        assert_eq!(
            client.requested_models(),
            vec![config.llm.model.clone(), config.llm.fallback_model.clone()]
        );
    }

    #[tokio::test]
    async fn unparseable_output_counts_as_soft_failure() {
        let (engine, client) = engine_with(vec![
            Ok("pure prose, no object".to_string()),
            Ok(r#"{"reply": "segunda"}"#.to_string()),
        ]);
        let decision = engine.decide(&Conversation::new("123"), "hola").await;

        assert_eq!(decision.reply, "segunda");
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn double_failure_synthesizes_the_local_fallback() {
        let (engine, client) = engine_with(vec![Err(LlmError::Timeout), Err(LlmError::Timeout)]);
        let decision = engine.decide(&Conversation::new("123"), "necesito presupuesto").await;

        assert_eq!(client.call_count(), 2);
        assert_eq!(decision.intent, Some(HandoffKind::Price));
        assert_eq!(decision.reply, QualField::IntentSummary.question());
    }
}
