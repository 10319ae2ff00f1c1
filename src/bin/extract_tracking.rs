use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use tracking_extract::{
    InferenceExtractor, RateLimiter, SecurityValidator, Settings, TrackingExtractor, html_to_text,
    parse_email,
};

#[derive(Parser, Debug)]
#[command(
    name = "extract-tracking",
    about = "Extract shipment tracking numbers from a .eml file"
)]
struct Cli {
    /// Path to a .eml file
    #[arg(value_name = "EML_PATH")]
    eml_path: PathBuf,

    /// TOML settings file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the minimum confidence threshold
    #[arg(long, value_name = "X")]
    min_confidence: Option<f64>,

    /// Enable the language-model fallback
    #[arg(long)]
    llm: bool,

    /// Print the security report instead of extracting
    #[arg(long, requires = "tracking_number")]
    security_report: bool,

    /// Tracking number checked alongside the email by --security-report
    #[arg(long, value_name = "NUMBER")]
    tracking_number: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => {
            let mut settings = Settings::default();
            settings.apply_env();
            settings
        }
    };
    if let Some(min_confidence) = cli.min_confidence {
        settings.extractor.min_confidence = min_confidence;
    }
    if cli.llm {
        settings.extractor.enable_llm = true;
        settings.llm.enabled = true;
    }
    settings.validate().context("Invalid settings")?;

    let raw = std::fs::read(&cli.eml_path)
        .with_context(|| format!("Failed to read {}", cli.eml_path.display()))?;
    let email = parse_email(&raw).context("Failed to parse email")?;

    if cli.security_report {
        let body = if email.plain_text.trim().is_empty() {
            html_to_text(&email.html_text)
        } else {
            email.plain_text.clone()
        };
        let report = SecurityValidator::new().validate_system_security(
            Some(&settings.llm),
            &body,
            cli.tracking_number.as_deref().unwrap_or_default(),
        );
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let inference =
        InferenceExtractor::from_config(&settings.llm).context("Failed to set up inference")?;
    let limiter = Arc::new(RateLimiter::from_config(&settings.rate_limit));
    let extractor = TrackingExtractor::new(settings.extractor)
        .with_inference(inference)
        .with_rate_limiter(limiter);

    let results = extractor
        .extract(&email)
        .await
        .context("Extraction failed")?;
    tracing::info!(count = results.len(), "Extracted tracking numbers");
    println!("{}", serde_json::to_string_pretty(&results)?);

    Ok(())
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}
