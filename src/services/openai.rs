// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! OpenAI responder adapter.
//!
//! Two operations against `/v1/chat/completions`, both non-streaming:
//!
//! - [`Responder::reply`] — a short conversational reply in the helpdesk
//!   persona, used for the REASON stage's closing sentence.
//! - [`Responder::classify`] — a one-shot classification of the captured
//!   reason into the closed category/urgency vocabulary. The raw model text
//!   is returned; [`parse_classification`] extracts the JSON object from
//!   whatever prose or code fencing surrounds it and validates the enum
//!   fields, substituting defaults on mismatch.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::services::{AdapterError, Responder, ResponderContext};
use crate::ticket::{Category, Urgency};

/// Request timeout for both operations.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

// ---------------------------------------------------------------------------
// OpenAI API request / response types (subset needed here)
// ---------------------------------------------------------------------------

/// Body sent to `/v1/chat/completions`.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Classification payload
// ---------------------------------------------------------------------------

/// Validated classification of a captured reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Classification {
    pub category: Category,
    pub urgency: Urgency,
}

/// Raw shape the classifier is asked to emit.
#[derive(Debug, Deserialize)]
struct RawClassification {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    urgency: Option<String>,
}

/// Extract and validate a classification from raw model output.
///
/// Tolerates surrounding prose and Markdown code fences: the first balanced
/// `{...}` object in the text is parsed. Out-of-vocabulary or missing enum
/// fields fall back to the defaults (`other` / `normal`) instead of failing
/// the turn.
pub fn parse_classification(raw: &str) -> Classification {
    let object = match extract_json_object(raw) {
        Some(obj) => obj,
        None => {
            warn!("classifier output carried no JSON object, using defaults");
            return Classification::default();
        }
    };

    let parsed: RawClassification = match serde_json::from_str(object) {
        Ok(p) => p,
        Err(e) => {
            warn!("classifier output unparsable ({e}), using defaults");
            return Classification::default();
        }
    };

    let category = parsed
        .category
        .as_deref()
        .and_then(Category::parse)
        .unwrap_or_else(|| {
            warn!(label = ?parsed.category, "category out of vocabulary, using default");
            Category::default()
        });
    let urgency = parsed
        .urgency
        .as_deref()
        .and_then(Urgency::parse)
        .unwrap_or_else(|| {
            warn!(label = ?parsed.urgency, "urgency out of vocabulary, using default");
            Urgency::default()
        });

    Classification { category, urgency }
}

/// Find the first balanced `{...}` object in `text`.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

// ---------------------------------------------------------------------------
// OpenAIResponder
// ---------------------------------------------------------------------------

/// Responder backed by the OpenAI chat-completions API.
pub struct OpenAIResponder {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl fmt::Debug for OpenAIResponder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAIResponder")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl OpenAIResponder {
    /// Create a responder for the given model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Builder method: set a custom API base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Run one non-streaming completion and return the first choice's text.
    async fn complete(
        &self,
        system: String,
        user: String,
        temperature: f64,
    ) -> Result<String, AdapterError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            temperature: Some(temperature),
            max_tokens: Some(200),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Responder(format!(
                "completion returned {status}: {body}"
            )));
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AdapterError::Responder("completion had no content".to_string()))?;

        debug!(chars = content.len(), "responder completion received");
        Ok(content)
    }
}

/// Persona for the conversational reply.
const REPLY_SYSTEM_PROMPT: &str = "Eres la recepcionista telefónica del \
servicio de soporte interno de una empresa. Hablas en español, con frases \
cortas y naturales: estás en una llamada de voz. Responde en una o dos \
frases como máximo, confirmando que has entendido el motivo y que el equipo \
se pondrá en contacto.";

#[async_trait]
impl Responder for OpenAIResponder {
    async fn reply(
        &self,
        utterance: &str,
        context: &ResponderContext,
    ) -> Result<String, AdapterError> {
        let mut user = String::new();
        if let Some(name) = &context.caller_identity {
            user.push_str(&format!("La persona que llama se llama {name}. "));
        }
        user.push_str(&format!("Ha dicho: \"{utterance}\""));

        self.complete(REPLY_SYSTEM_PROMPT.to_string(), user, 0.7).await
    }

    async fn classify(
        &self,
        reason: &str,
        _context: &ResponderContext,
    ) -> Result<String, AdapterError> {
        let categories: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
        let urgencies: Vec<&str> = Urgency::ALL.iter().map(|u| u.as_str()).collect();

        let system = format!(
            "Clasifica el motivo de una llamada de soporte. Responde SOLO con \
             un objeto JSON {{\"category\": ..., \"urgency\": ...}}. category \
             debe ser uno de: {}. urgency debe ser uno de: {}.",
            categories.join(", "),
            urgencies.join(", "),
        );

        self.complete(system, format!("Motivo: \"{reason}\""), 0.0).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_classification_plain_json() {
        let parsed = parse_classification(r#"{"category": "portal_access", "urgency": "high"}"#);
        assert_eq!(parsed.category, Category::PortalAccess);
        assert_eq!(parsed.urgency, Urgency::High);
    }

    #[test]
    fn test_parse_classification_code_fenced() {
        let raw = "```json\n{\"category\": \"it_support\", \"urgency\": \"normal\"}\n```";
        let parsed = parse_classification(raw);
        assert_eq!(parsed.category, Category::ItSupport);
        assert_eq!(parsed.urgency, Urgency::Normal);
    }

    #[test]
    fn test_parse_classification_surrounded_by_prose() {
        let raw = "Claro, aquí tienes la clasificación:\n\
                   {\"category\": \"payroll\", \"urgency\": \"urgent\"}\n\
                   Espero que sirva.";
        let parsed = parse_classification(raw);
        assert_eq!(parsed.category, Category::Payroll);
        assert_eq!(parsed.urgency, Urgency::Urgent);
    }

    #[test]
    fn test_parse_classification_out_of_vocabulary_falls_back() {
        let parsed = parse_classification(r#"{"category": "contraseñas", "urgency": "ya mismo"}"#);
        assert_eq!(parsed.category, Category::Other);
        assert_eq!(parsed.urgency, Urgency::Normal);
    }

    #[test]
    fn test_parse_classification_missing_fields() {
        let parsed = parse_classification(r#"{"category": "billing"}"#);
        assert_eq!(parsed.category, Category::Billing);
        assert_eq!(parsed.urgency, Urgency::Normal);
    }

    #[test]
    fn test_parse_classification_no_json_at_all() {
        let parsed = parse_classification("lo siento, no puedo clasificar eso");
        assert_eq!(parsed, Classification::default());
    }

    #[test]
    fn test_parse_classification_malformed_json() {
        let parsed = parse_classification(r#"{"category": "#);
        assert_eq!(parsed, Classification::default());
    }

    #[test]
    fn test_extract_json_object_nested() {
        let text = r#"prefix {"a": {"b": 1}, "c": "}"} suffix"#;
        let object = extract_json_object(text).unwrap();
        assert_eq!(object, r#"{"a": {"b": 1}, "c": "}"}"#);
    }

    #[test]
    fn test_extract_json_object_absent() {
        assert!(extract_json_object("no braces here").is_none());
    }
}
