//! CLI commands implementation.

use std::path::PathBuf;

use anyhow::bail;
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::config::DataFogConfig;
use crate::datafog::DataFog;
use crate::models::{
    AnnotationResult, BatchResult, Input, OperationSet, ScanStatus, KNOWN_ENTITY_TYPES,
};
use crate::ner::{create_recognizer, RECOGNIZER_IDS};
use crate::ocr::{create_extractor, EXTRACTOR_IDS};
use crate::services::ScanEvent;

#[derive(Parser)]
#[command(name = "datafog")]
#[command(about = "PII detection and annotation for text and images")]
#[command(version)]
pub struct Cli {
    /// Config file path (defaults to datafog.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Annotate PII in one or more texts
    ScanText {
        /// Texts to annotate
        texts: Vec<String>,
        /// Operations to run (comma-separated: annotate_pii, extract_text)
        #[arg(short, long, default_value = "annotate_pii")]
        operations: String,
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Extract text from images and annotate PII
    ScanImage {
        /// Image references (file paths or http(s) URLs)
        refs: Vec<String>,
        /// Operations to run (comma-separated: annotate_pii, extract_text)
        #[arg(short, long, default_value = "extract_text,annotate_pii")]
        operations: String,
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// List entity types the shipped recognizers can report
    ListEntities,

    /// Show the effective configuration
    ShowConfig,

    /// Download OCR models for the ocrs backend
    DownloadModels,

    /// Check that configured backends are available
    Health,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = DataFogConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::ScanText {
            texts,
            operations,
            format,
        } => {
            if texts.is_empty() {
                bail!("no texts provided");
            }
            let operations = OperationSet::parse(&operations)
                .map_err(|tok| anyhow::anyhow!("unknown operation '{tok}'"))?;
            let inputs = texts.into_iter().map(Input::Text).collect();
            let batch = scan(config, inputs, operations).await?;
            print_batch(&batch, &format)
        }
        Commands::ScanImage {
            refs,
            operations,
            format,
        } => {
            if refs.is_empty() {
                bail!("no image references provided");
            }
            let operations = OperationSet::parse(&operations)
                .map_err(|tok| anyhow::anyhow!("unknown operation '{tok}'"))?;
            let inputs = refs.into_iter().map(Input::Image).collect();
            let batch = scan(config, inputs, operations).await?;
            print_batch(&batch, &format)
        }
        Commands::ListEntities => cmd_list_entities(),
        Commands::ShowConfig => cmd_show_config(&config),
        Commands::DownloadModels => cmd_download_models(),
        Commands::Health => cmd_health(&config),
    }
}

/// Run a batch with a progress bar fed by pipeline events.
async fn scan(
    config: DataFogConfig,
    inputs: Vec<Input>,
    operations: OperationSet,
) -> anyhow::Result<BatchResult> {
    let total = inputs.len();
    let (tx, mut rx) = mpsc::channel::<ScanEvent>(64);

    let fog = DataFog::new(config)?.with_event_channel(tx);

    let progress = tokio::spawn(async move {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
                .unwrap()
                .progress_chars("█▓░"),
        );
        while let Some(event) = rx.recv().await {
            match event {
                ScanEvent::ItemStarted { description, .. } => pb.set_message(description),
                ScanEvent::ItemCompleted { .. } | ScanEvent::ItemFailed { .. } => pb.inc(1),
                ScanEvent::BatchStarted { .. } | ScanEvent::BatchComplete { .. } => {}
            }
        }
        pb.finish_and_clear();
    });

    let batch = fog.run(inputs, operations).await;
    drop(fog);
    let _ = progress.await;
    Ok(batch)
}

fn print_batch(batch: &BatchResult, format: &str) -> anyhow::Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(batch)?),
        "table" => {
            for result in batch.iter() {
                print_result_table(result);
            }
            println!(
                "\n{} succeeded, {} failed",
                style(batch.success_count()).green(),
                if batch.failure_count() > 0 {
                    style(batch.failure_count()).red()
                } else {
                    style(batch.failure_count()).dim()
                }
            );
        }
        other => bail!("unknown format '{other}' (expected table or json)"),
    }

    if batch.failure_count() > 0 {
        bail!("{} of {} items failed", batch.failure_count(), batch.len());
    }
    Ok(())
}

fn print_result_table(result: &AnnotationResult) {
    let heading = match &result.reference {
        Some(reference) => format!("[{}] {}", result.index, reference),
        None => format!("[{}] text", result.index),
    };
    println!("\n{}", style(heading).bold());

    match result.status {
        ScanStatus::Failure => {
            if let Some(error) = &result.error {
                println!("  {} {}", style("error:").red(), error);
            }
        }
        ScanStatus::Success => {
            if let Some(text) = &result.extracted_text {
                let preview: String = text.chars().take(120).collect();
                println!("  {} {}", style("text:").cyan(), preview);
            }
            if result.entities.is_empty() {
                println!("  {}", style("no entities detected").dim());
            }
            for entity in &result.entities {
                println!(
                    "  {:<14} {:>5}..{:<5} {:.2}  {}",
                    style(entity.label.label()).cyan(),
                    entity.start,
                    entity.end,
                    entity.score,
                    entity.text
                );
            }
        }
    }
}

fn cmd_list_entities() -> anyhow::Result<()> {
    println!("\n{}", style("Known Entity Types").bold());
    println!("{}", "-".repeat(30));
    for label in KNOWN_ENTITY_TYPES {
        println!("  {label}");
    }
    Ok(())
}

fn cmd_show_config(config: &DataFogConfig) -> anyhow::Result<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

fn cmd_download_models() -> anyhow::Result<()> {
    #[cfg(feature = "ocr-ocrs")]
    {
        use crate::ocr::OcrsExtractor;

        let extractor = OcrsExtractor::new();
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap(),
        );
        pb.set_message("Downloading OCR models...");
        let dir = extractor.ensure_models()?;
        pb.finish_and_clear();
        println!("{} models ready in {}", style("✓").green(), dir.display());
        Ok(())
    }
    #[cfg(not(feature = "ocr-ocrs"))]
    {
        bail!("built without the ocr-ocrs feature; no models to download")
    }
}

fn cmd_health(config: &DataFogConfig) -> anyhow::Result<()> {
    println!("\n{}", style("Backend Status").bold());
    println!("{}", "-".repeat(50));

    let mut all_ok = true;

    println!("\n{}", style("Recognizers:").cyan());
    for id in RECOGNIZER_IDS {
        if let Some(recognizer) = create_recognizer(id) {
            let marker = if *id == config.recognizer_backend {
                " (configured)"
            } else {
                ""
            };
            let status = if recognizer.is_available() {
                style("✓ available").green()
            } else {
                all_ok = false;
                style("✗ not available").red()
            };
            println!("  {:<15} {}{}", recognizer.name(), status, marker);
            if !recognizer.is_available() {
                println!("                  {}", style(recognizer.availability_hint()).dim());
            }
        }
    }

    println!("\n{}", style("Extractors:").cyan());
    for id in EXTRACTOR_IDS {
        if let Some(extractor) = create_extractor(id) {
            let marker = if *id == config.extractor_backend {
                " (configured)"
            } else {
                ""
            };
            let status = if extractor.is_available() {
                style("✓ available").green()
            } else {
                if *id == config.extractor_backend {
                    all_ok = false;
                }
                style("✗ not available").red()
            };
            println!("  {:<15} {}{}", extractor.name(), status, marker);
            if !extractor.is_available() {
                println!("                  {}", style(extractor.availability_hint()).dim());
            }
        }
    }

    println!();
    if all_ok {
        println!("{}", style("All configured backends available").green());
        Ok(())
    } else {
        bail!("one or more backends unavailable")
    }
}
