use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;

use mofa_radio::config::{TtsProviderKind, UnattributedLines};
use mofa_radio::{RadioConfig, RadioPipeline, SynthesisProgress};

/// MoFA Radio - two-host Hinglish radio segments from a topic
#[derive(Parser, Debug)]
#[command(name = "mofa-radio")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Topic to talk about (a Wikipedia article title)
    topic: Option<String>,

    /// Path to configuration file (TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output audio file (.mp3 or .wav)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,

    /// Render an existing script instead of generating one
    #[arg(long = "script-file", value_name = "FILE")]
    script_file: Option<PathBuf>,

    /// Write the generated script to this file
    #[arg(long = "save-script", value_name = "FILE")]
    save_script: Option<PathBuf>,

    /// Drop lines without a speaker tag instead of assigning them
    #[arg(long)]
    strict: bool,

    /// Print the script to stdout before synthesis
    #[arg(long)]
    print_script: bool,

    /// Use the offline tone generator instead of the speech provider
    #[arg(long)]
    mock_tts: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = RadioConfig::resolve_path(cli.config.as_deref());
    let mut config = RadioConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str()))
        .format_timestamp_millis()
        .init();

    match &config_path {
        Some(path) => log::info!("Loaded configuration from {}", path.display()),
        None => log::info!("No configuration file found, using defaults"),
    }

    if cli.strict {
        config.speakers.unattributed = UnattributedLines::Drop;
    }
    if cli.mock_tts {
        config.tts.provider = TtsProviderKind::Mock;
    }

    let topic = cli.topic.as_deref().map(str::trim).unwrap_or_default().to_string();
    if topic.is_empty() && cli.script_file.is_none() {
        bail!("Provide a topic or --script-file");
    }

    let output = cli.output.clone().unwrap_or_else(|| config.output_path.clone());
    let generate = cli.script_file.is_none();
    let pipeline = RadioPipeline::from_config(config, generate)
        .context("Failed to set up pipeline")?
        .with_progress(Arc::new(|p: SynthesisProgress| {
            log::info!(
                "[{}/{}] {:.0}% turn {} ({}): {}",
                p.completed,
                p.total,
                p.percentage,
                p.index + 1,
                p.speaker,
                p.text_preview
            );
        }));

    pipeline
        .check_output(&output)
        .with_context(|| format!("Cannot write audio to {}", output.display()))?;

    let raw_script = match &cli.script_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?,
        None => {
            let script = pipeline
                .write_script(&topic)
                .await
                .with_context(|| format!("Failed to write a script for '{}'", topic))?;
            if let Some(path) = &cli.save_script {
                std::fs::write(path, &script)
                    .with_context(|| format!("Failed to save script to {}", path.display()))?;
                log::info!("Saved script to {}", path.display());
            }
            script
        }
    };

    if cli.print_script {
        println!("{}\n", raw_script.trim());
    }

    let title = if topic.is_empty() {
        cli.script_file
            .as_ref()
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        topic
    };

    let report = pipeline
        .run_script(&raw_script, &output, &title)
        .await
        .context("Failed to produce audio")?;

    println!(
        "Wrote {} ({} turns, {:.1}s, {:.2} MB) in {:.1}s",
        report.export.output_file.display(),
        report.script.len(),
        report.export.total_duration_secs,
        report.export.file_size_bytes as f64 / (1024.0 * 1024.0),
        report.elapsed_ms as f64 / 1000.0
    );

    Ok(())
}
