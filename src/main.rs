mod cli;
mod ui;

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};
use vestir::garment::GarmentAnalyzer;
use vestir::gate::RequestGate;
use vestir::preprocess::background::BackgroundClient;
use vestir::preprocess::to_data_url;
use vestir::provider::ProviderClient;
use vestir::scoring::ScoringClient;
use vestir::{Orchestrator, TryOnOptions, VestirConfig, VestirError};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "vestir=debug" } else { "vestir=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &cli.config {
        Some(path) => VestirConfig::load_from(path)?,
        None => VestirConfig::load()?,
    };

    match cli.command {
        Command::TryOn {
            avatar,
            garment,
            description,
            timeout_ms,
            samples,
            seed,
            json,
        } => {
            let options = TryOnOptions {
                garment_description: description,
                timeout_ms,
                sample_count: samples,
                seed,
            };
            try_on(config, &avatar, &garment, &options, json).await?;
        }
        Command::Classify { hint } => {
            let profile = GarmentAnalyzer::default().classify(&hint);
            ui::print_profile(&hint, &profile);
        }
        Command::Config => {
            println!("{}", toml::to_string_pretty(&config.redacted())?);
        }
    }

    Ok(())
}

async fn try_on(
    config: VestirConfig,
    avatar: &str,
    garment: &str,
    options: &TryOnOptions,
    json: bool,
) -> Result<(), VestirError> {
    if config.provider.api_key.is_empty() {
        tracing::warn!("No provider API key configured; set VESTIR_API_KEY");
    }
    let provider = ProviderClient::new(&config.provider)?;
    let scorer = if config.scoring.enabled {
        if config.scoring.url.is_empty() {
            return Err(VestirError::Config("scoring.enabled requires scoring.url".into()));
        }
        Some(ScoringClient::new(&config.scoring)?)
    } else {
        None
    };
    let remover = if config.background.enabled {
        if config.background.url.is_empty() {
            return Err(VestirError::Config(
                "background.enabled requires background.url".into(),
            ));
        }
        Some(BackgroundClient::new(&config.background)?)
    } else {
        None
    };

    let avatar = resolve_image(avatar)?;
    let garment_image = resolve_image(garment)?;
    let gate = RequestGate::new(config.gate.clone());
    let orchestrator = Orchestrator::new(config, gate, provider, scorer, remover);

    let label = options.garment_description.as_deref().unwrap_or(garment);
    let progress = ui::TryOnProgress::start(label);
    let result = orchestrator.try_on(&avatar, &garment_image, options).await;
    progress.finish();

    let result = result?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        progress.report(&result);
    }
    Ok(())
}

/// Local files become data URLs; anything else is passed through as given.
fn resolve_image(arg: &str) -> Result<String, VestirError> {
    let path = Path::new(arg);
    if arg.starts_with("http://")
        || arg.starts_with("https://")
        || arg.starts_with("data:")
        || !path.is_file()
    {
        return Ok(arg.to_string());
    }

    let bytes = std::fs::read(path)?;
    let token = image::guess_format(&bytes)
        .map(|format| format.to_mime_type().trim_start_matches("image/"))
        .unwrap_or("png");
    Ok(to_data_url(&bytes, token))
}
