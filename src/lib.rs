//! Domain-scoped gateway in front of an LLM chat-completion service.
//!
//! Questions are PII-masked, checked against a declared topic, wrapped in a
//! fixed policy prompt, sent upstream once, and returned with a scope tag and
//! an optional disclaimer.

pub mod config;
pub mod error;
pub mod finalize;
pub mod http;
pub mod ingress;
pub mod pipeline;
pub mod prompt;
pub mod redact;
pub mod scope;
pub mod upstream;

pub use config::Config;
pub use error::{GatewayError, Result};
pub use finalize::FinalAnswer;
pub use pipeline::Gateway;
pub use scope::ScopeVerdict;

/// Install the global tracing subscriber. `default_filter` applies when
/// RUST_LOG is unset.
pub fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
