//! Best-effort PII masking applied before any text leaves the gateway.
//!
//! Rules run in order over the same buffer, so later rules see earlier
//! placeholders. Placeholders are checked at construction to be inert under
//! every rule, which makes redaction idempotent.

use std::fmt;

use regex::{NoExpand, Regex};

use crate::config::RedactionConfig;
use crate::error::{GatewayError, Result};

/// Question text after masking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactedText(String);

impl RedactedText {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for RedactedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RedactedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Number of spans masked per rule, in rule order. Never carries matched text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedactionReport {
    pub counts: Vec<(String, usize)>,
}

impl RedactionReport {
    pub fn total(&self) -> usize {
        self.counts.iter().map(|(_, n)| n).sum()
    }

    pub fn count(&self, rule: &str) -> usize {
        self.counts
            .iter()
            .find(|(name, _)| name == rule)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

#[derive(Debug)]
struct CompiledRule {
    name: String,
    regex: Regex,
    placeholder: String,
}

#[derive(Debug)]
pub struct Redactor {
    rules: Vec<CompiledRule>,
}

impl Redactor {
    pub fn new(config: &RedactionConfig) -> Result<Self> {
        let rules = config
            .rules
            .iter()
            .map(|rule| -> Result<CompiledRule> {
                Ok(CompiledRule {
                    name: rule.name.clone(),
                    regex: Regex::new(&rule.pattern)?,
                    placeholder: rule.placeholder.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        for rule in &rules {
            for other in &rules {
                if rule.regex.is_match(&other.placeholder) {
                    return Err(GatewayError::Config {
                        message: format!(
                            "redaction rule '{}' matches placeholder '{}'",
                            rule.name, other.placeholder
                        ),
                    });
                }
            }
        }

        Ok(Self { rules })
    }

    pub fn redact(&self, text: &str) -> (RedactedText, RedactionReport) {
        let mut buffer = text.to_string();
        let mut report = RedactionReport::default();
        for rule in &self.rules {
            let hits = rule.regex.find_iter(&buffer).count();
            if hits > 0 {
                buffer = rule
                    .regex
                    .replace_all(&buffer, NoExpand(&rule.placeholder))
                    .into_owned();
            }
            report.counts.push((rule.name.clone(), hits));
        }
        (RedactedText(buffer), report)
    }
}
