//! Operator utility for the VisaPlex gateway.
//!
//! Usage:
//!   cargo run --bin gatewayctl -- redact "call me on 021 555 0199"
//!   cargo run --bin gatewayctl -- classify "partner visa timeline"
//!   cargo run --bin gatewayctl -- prompt "tourist visa?" --topic partner_visa_nz
//!   cargo run --bin gatewayctl -- ask "What evidence do I need?" --no-disclaimer

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use visaplex_gateway::config::RuntimeConfig;
use visaplex_gateway::ingress::IncomingRequest;
use visaplex_gateway::upstream::StaticCompletion;
use visaplex_gateway::{Config, Gateway, init_tracing};

#[derive(Parser)]
#[command(name = "gatewayctl")]
#[command(about = "VisaPlex gateway utilities", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the redacted text and per-rule counts
    Redact { text: String },
    /// Print the scope verdict and the phrases that matched
    Classify { text: String },
    /// Print the prompt bundle that would be sent upstream (no network)
    Prompt {
        text: String,
        #[arg(long)]
        topic: Option<String>,
    },
    /// Run the full pipeline against the configured upstream
    Ask {
        text: String,
        #[arg(long)]
        topic: Option<String>,
        #[arg(long)]
        no_disclaimer: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    Config::load_env_file();
    init_tracing(&RuntimeConfig::load_from_env().log_level);
    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Redact { text } => redact(&config, &text),
        Commands::Classify { text } => classify(&config, &text),
        Commands::Prompt { text, topic } => prompt(&config, &text, topic),
        Commands::Ask {
            text,
            topic,
            no_disclaimer,
        } => ask(&config, &text, topic, !no_disclaimer).await,
    }
}

/// Gateway for the offline subcommands; the fake upstream is never called
fn offline_gateway(config: &Config) -> Result<Gateway> {
    Ok(Gateway::new(config, Arc::new(StaticCompletion::silent()))?)
}

fn request(
    config: &Config,
    text: &str,
    topic: Option<String>,
    disclaimer: bool,
) -> Result<IncomingRequest> {
    let mut body = json!({
        "question": text,
        "disclaimer": disclaimer,
    });
    if let Some(topic) = topic {
        body["topic"] = json!(topic);
    }
    Ok(IncomingRequest::from_value(&body, &config.policy.default_topic)?)
}

fn redact(config: &Config, text: &str) -> Result<()> {
    let gateway = offline_gateway(config)?;
    let (redacted, report) = gateway.redactor().redact(text);
    let counts: serde_json::Map<String, serde_json::Value> = report
        .counts
        .iter()
        .map(|(name, n)| (name.clone(), json!(n)))
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "redacted": redacted.as_str(),
            "counts": counts,
        }))?
    );
    Ok(())
}

fn classify(config: &Config, text: &str) -> Result<()> {
    let gateway = offline_gateway(config)?;
    let (redacted, _) = gateway.redactor().redact(text);
    let verdict = gateway.classifier().classify(&redacted);
    let matched = gateway.classifier().matched_phrases(&redacted);
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "scope": verdict,
            "matched": matched,
        }))?
    );
    Ok(())
}

fn prompt(config: &Config, text: &str, topic: Option<String>) -> Result<()> {
    let gateway = offline_gateway(config)?;
    let prepared = gateway.prepare(&request(config, text, topic, true)?);
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "scope": prepared.verdict,
            "messages": prepared.bundle,
        }))?
    );
    Ok(())
}

async fn ask(config: &Config, text: &str, topic: Option<String>, disclaimer: bool) -> Result<()> {
    let gateway = Gateway::from_config(config)?;
    match gateway.handle(request(config, text, topic, disclaimer)?).await {
        Ok(answer) => println!("{}", serde_json::to_string_pretty(&answer)?),
        Err(err) => {
            eprintln!("{}", serde_json::to_string_pretty(&err.body())?);
            std::process::exit(1);
        }
    }
    Ok(())
}
