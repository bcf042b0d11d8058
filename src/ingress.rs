//! Parse-and-validate step for inbound chat requests.
//!
//! The raw body never travels past this module; everything downstream works
//! with [`IncomingRequest`].

use serde_json::{Map, Value};

use crate::error::{GatewayError, Result};

/// Validated, immutable view of one inbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingRequest {
    pub question: String,
    pub topic: String,
    pub include_disclaimer: bool,
}

impl IncomingRequest {
    /// Parse raw body bytes. Bodies that are not a JSON object are treated
    /// as empty, which fails validation for the missing question.
    pub fn from_bytes(body: &[u8], default_topic: &str) -> Result<Self> {
        let value = serde_json::from_slice::<Value>(body).unwrap_or(Value::Null);
        Self::from_value(&value, default_topic)
    }

    pub fn from_value(body: &Value, default_topic: &str) -> Result<Self> {
        let empty = Map::new();
        let fields = body.as_object().unwrap_or(&empty);

        let question = fields
            .get("question")
            .map(coerce_text)
            .unwrap_or_default()
            .trim()
            .to_string();
        if question.is_empty() {
            return Err(GatewayError::missing_question());
        }

        let topic = fields
            .get("topic")
            .map(coerce_text)
            .unwrap_or_else(|| default_topic.to_string());

        let include_disclaimer = fields.get("disclaimer").is_none_or(is_truthy);

        Ok(Self {
            question,
            topic,
            include_disclaimer,
        })
    }
}

/// Loose text coercion for fields that clients send with the wrong type
fn coerce_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => coerce_text(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
