use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TOPIC: &str = "partner_visa_nz";

pub const DEFAULT_SYSTEM_POLICY: &str = concat!(
    "You are VisaPlex AI. Scope: ONLY New Zealand Partner visas ",
    "(Partnership Work & Partner of a New Zealander Residence). ",
    "If the question is out of scope, use the refusal message. ",
    "When in scope, answer in plain language with concise bullet points. ",
    "Avoid legal advice; provide general guidance and note that details vary by case. ",
    "Prefer INZ terminology (genuine and stable, living together, health, character, ",
    "police certificates, medicals). ",
    "If the user shares personal identifiers, acknowledge but do not repeat them. ",
    "Keep answers under ~120 words."
);

pub const DEFAULT_OUT_OF_SCOPE_HINT: &str = "If out of scope, reply ONLY with the refusal.";

pub const DEFAULT_REFUSAL: &str = concat!(
    "I can help with general information about ",
    "**New Zealand Partner (Work/Residence) visas** only. ",
    "For other visa categories or personal legal advice, please book a consultation."
);

pub const DEFAULT_DISCLAIMER: &str = "\n\n_(General information only — not legal advice.)_";

pub const DEFAULT_NO_ANSWER: &str = "No answer.";

pub const DEFAULT_SCOPE_PHRASES: &[&str] = &[
    "partner",
    "partnership",
    "spouse",
    "de facto",
    "living together",
    "work visa",
    "residence",
    "relationship evidence",
    "genuine.*stable",
    "medical|police certificate",
    "timeline|processing",
    "INZ|immigration nz",
];

/// Placeholders must be a bracketed phrase without digits or `@`, so no
/// redaction pattern can match them again.
static PLACEHOLDER_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[[^\[\]0-9@]+\]$").unwrap());

/// Main configuration loaded from visaplex.toml and environment variables
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub redaction: RedactionConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Runtime configuration loaded from environment variables
    #[serde(skip)]
    pub runtime: RuntimeConfig,
}

/// Versioned policy text and the scope phrase set
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub version: String,
    pub default_topic: String,
    pub system_policy: String,
    pub out_of_scope_hint: String,
    pub refusal: String,
    pub disclaimer: String,
    pub no_answer: String,
    /// Case-insensitive regular expressions; any match puts a question in scope
    pub scope_phrases: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            version: "partner-visa-nz-1".to_string(),
            default_topic: DEFAULT_TOPIC.to_string(),
            system_policy: DEFAULT_SYSTEM_POLICY.to_string(),
            out_of_scope_hint: DEFAULT_OUT_OF_SCOPE_HINT.to_string(),
            refusal: DEFAULT_REFUSAL.to_string(),
            disclaimer: DEFAULT_DISCLAIMER.to_string(),
            no_answer: DEFAULT_NO_ANSWER.to_string(),
            scope_phrases: DEFAULT_SCOPE_PHRASES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

/// One masking rule; rules run in declaration order over the same buffer
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RedactionRule {
    pub name: String,
    pub pattern: String,
    pub placeholder: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RedactionConfig {
    pub rules: Vec<RedactionRule>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            rules: vec![
                RedactionRule {
                    name: "email".to_string(),
                    pattern: r"(?i)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}".to_string(),
                    placeholder: "[redacted email]".to_string(),
                },
                RedactionRule {
                    name: "phone".to_string(),
                    pattern: r"\+?[0-9][0-9\s\-()]{7,}[0-9]".to_string(),
                    placeholder: "[redacted phone]".to_string(),
                },
                RedactionRule {
                    name: "id".to_string(),
                    pattern: r"(?-u:\b)([A-Z]{2}[0-9]{6,9}|[0-9]{8,10})(?-u:\b)".to_string(),
                    placeholder: "[redacted id]".to_string(),
                },
            ],
        }
    }
}

/// Upstream chat-completion service parameters
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Upper bound on the error-body excerpt surfaced to callers, in characters
    pub detail_limit: usize,
    /// Client-side timeout; unset means the host layer is the only bound
    pub timeout_ms: Option<u64>,
    /// Name of the environment variable holding the bearer credential
    pub credential_env: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_tokens: 220,
            detail_limit: 300,
            timeout_ms: None,
            credential_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

impl UpstreamConfig {
    /// Chat-completions endpoint derived from the configured base URL
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub http_bind: std::net::SocketAddr,
    pub chat_path: String,
    pub request_timeout_ms: Option<u64>,
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            http_bind: std::net::SocketAddr::from(([127, 0, 0, 1], 8787)),
            chat_path: "/api/partner-visa-chat".to_string(),
            request_timeout_ms: None,
            log_level: "visaplex_gateway=info,tower_http=info".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Load runtime configuration from environment variables
    pub fn load_from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(v) = lookup("VISAPLEX_HTTP_BIND") {
            match v.parse::<std::net::SocketAddr>() {
                Ok(bind) => cfg.http_bind = bind,
                Err(_) => tracing::warn!("Ignoring unparseable VISAPLEX_HTTP_BIND '{}'", v),
            }
        }
        if let Some(path) = lookup("VISAPLEX_HTTP_PATH").filter(|p| p.starts_with('/')) {
            cfg.chat_path = path;
        }
        cfg.request_timeout_ms = lookup("VISAPLEX_REQUEST_TIMEOUT_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|&ms| ms > 0);
        if let Some(level) = lookup("RUST_LOG") {
            cfg.log_level = level;
        }
        cfg
    }
}

impl Config {
    /// Load configuration from TOML file and environment variables.
    /// Uses VISAPLEX_CONFIG or defaults to "visaplex.toml".
    pub fn load() -> anyhow::Result<Self> {
        Self::load_env_file();

        let config_path =
            std::env::var("VISAPLEX_CONFIG").unwrap_or_else(|_| "visaplex.toml".to_string());

        let mut config: Config = if let Ok(content) = std::fs::read_to_string(&config_path) {
            Self::from_toml(&content)?
        } else {
            tracing::warn!("Config file {} not found, using defaults", config_path);
            Self::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        tracing::debug!(
            "Loaded policy version {} ({} scope phrases, {} redaction rules)",
            config.policy.version,
            config.policy.scope_phrases.len(),
            config.redaction.rules.len()
        );

        Ok(config)
    }

    /// Load `.env` (or VISAPLEX_ENV_FILE) into the process environment.
    /// Existing variables win; calling this more than once is harmless.
    pub fn load_env_file() {
        if let Ok(env_path) = std::env::var("VISAPLEX_ENV_FILE") {
            let _ = dotenvy::from_path(env_path);
        } else {
            let _ = dotenvy::dotenv();
        }
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Env-first overrides for the values operators change per deployment
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("VISAPLEX_UPSTREAM_URL") {
            self.upstream.base_url = url;
            tracing::debug!("VISAPLEX_UPSTREAM_URL env override applied");
        }
        if let Some(model) = lookup("VISAPLEX_UPSTREAM_MODEL").filter(|m| !m.trim().is_empty()) {
            self.upstream.model = model;
        }
        if let Some(ms) = lookup("VISAPLEX_UPSTREAM_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok())
        {
            self.upstream.timeout_ms = Some(ms).filter(|&ms| ms > 0);
        }
        if let Some(name) = lookup("VISAPLEX_CREDENTIAL_ENV").filter(|n| !n.trim().is_empty()) {
            self.upstream.credential_env = name;
        }
        if let Some(topic) = lookup("VISAPLEX_DEFAULT_TOPIC").filter(|t| !t.trim().is_empty()) {
            self.policy.default_topic = topic;
        }
        self.runtime = RuntimeConfig::from_lookup(lookup);
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let policy = &self.policy;
        if policy.system_policy.trim().is_empty() {
            anyhow::bail!("policy.system_policy must not be empty");
        }
        if policy.refusal.trim().is_empty() {
            anyhow::bail!("policy.refusal must not be empty");
        }
        if policy.scope_phrases.is_empty() {
            anyhow::bail!("policy.scope_phrases must contain at least one phrase");
        }
        for rule in &self.redaction.rules {
            if !PLACEHOLDER_SHAPE.is_match(&rule.placeholder) {
                anyhow::bail!(
                    "redaction rule '{}' placeholder '{}' must be a bracketed phrase without digits or '@'",
                    rule.name,
                    rule.placeholder
                );
            }
        }
        let upstream = &self.upstream;
        if !(0.0..=2.0).contains(&upstream.temperature) {
            anyhow::bail!("upstream.temperature must be between 0.0 and 2.0");
        }
        if upstream.max_tokens == 0 {
            anyhow::bail!("upstream.max_tokens must be > 0");
        }
        if upstream.detail_limit == 0 {
            anyhow::bail!("upstream.detail_limit must be > 0");
        }
        if !upstream.base_url.starts_with("http://") && !upstream.base_url.starts_with("https://")
        {
            anyhow::bail!(
                "upstream.base_url '{}' must start with http:// or https://",
                upstream.base_url
            );
        }
        if upstream.base_url.starts_with("http://") {
            tracing::warn!("Upstream base URL is not TLS; the credential will travel in clear text");
        }
        Ok(())
    }
}
