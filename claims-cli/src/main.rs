mod render;

use anyhow::Context as _;
use claim_flow::{
    ClaimField, ClaimWorkflow, ClientConfig, HttpBackend, ImageBlob, MetadataFields, RenderState,
};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Submit a vehicle-damage photo for AI assessment and print the report.
#[derive(Debug, Parser)]
#[command(name = "claims-cli", version)]
struct Args {
    #[arg(long, env = "CLAIMS_USERNAME")]
    username: String,

    #[arg(long, env = "CLAIMS_PASSWORD", hide_env_values = true)]
    password: String,

    /// Photo of the damage.
    #[arg(long)]
    image: PathBuf,

    #[arg(long)]
    location: Option<String>,

    #[arg(long)]
    accident_type: Option<String>,

    /// Impact speed in km/h.
    #[arg(long)]
    impact_speed: Option<String>,

    #[arg(long)]
    braking_info: Option<String>,

    /// YAML client configuration; environment variables still override it.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

/// Initialize structured JSON tracing based on environment variables
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "claims_cli=info,claim_flow=info".into());

    match log_format.as_str() {
        "pretty" => {
            // Human-readable logging for development
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            // Structured JSON logging; stdout stays reserved for the report
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::from_env(),
    };
    info!(base_url = %config.base_url, "Using claims backend");

    let backend = HttpBackend::new(config.clone()).context("failed to build HTTP client")?;
    let workflow = ClaimWorkflow::builder(Arc::new(backend))
        .request_timeout(config.request_timeout)
        .defaults(MetadataFields::sample())
        .build();

    let principal = workflow.login(&args.username, &args.password).await?;
    info!(username = %principal.username, role = %principal.role, "Authenticated");

    let bytes = tokio::fs::read(&args.image)
        .await
        .with_context(|| format!("failed to read {}", args.image.display()))?;
    let file_name = args
        .image
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    workflow.set_image(ImageBlob::from_bytes(file_name, bytes)?)?;

    for (field, value) in [
        (ClaimField::Location, &args.location),
        (ClaimField::AccidentType, &args.accident_type),
        (ClaimField::ImpactSpeed, &args.impact_speed),
        (ClaimField::BrakingInfo, &args.braking_info),
    ] {
        if let Some(value) = value {
            workflow.set_field(field, value.clone())?;
        }
    }

    let description = workflow.generate_description().await?;
    info!(%description, "Description generated");

    if let Err(e) = workflow.submit().await {
        error!(error = %e, "Assessment failed");
    }

    let rendered = workflow.render()?;
    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rendered)?),
        OutputFormat::Text => print!("{}", render::to_text(&workflow.draft(), &rendered)),
    }

    workflow.logout().await;

    if let RenderState::Error { message } = rendered {
        anyhow::bail!("assessment failed: {message}");
    }
    Ok(())
}
