//! Blockflow command-line front end.

mod cli;

use anyhow::{Context as _, Result};
use blockflow::prelude::*;
use clap::Parser;
use cli::{Cli, LogFormat};
use serde_json::json;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let text = tokio::fs::read_to_string(&cli.input_file)
        .await
        .with_context(|| format!("cannot read {}", cli.input_file.display()))?;

    if cli.parse_only {
        let blocks = parse_blocks(&text).map_err(BlockflowError::from)?;
        print_blocks(&blocks, cli.json)?;
        return Ok(());
    }

    let mut settings = Settings::load(cli.config.as_deref())?;
    cli.apply(&mut settings);
    settings.validate()?;
    info!(
        model = %settings.generation.model,
        output_dir = %settings.output_dir.display(),
        max_attempts = settings.retry.max_attempts,
        "settings loaded"
    );

    let service = Arc::new(OpenAiService::new(settings.generation.clone()).map_err(BlockflowError::from)?);
    let token = CancellationToken::new();
    spawn_interrupt_handler(token.clone());

    let flow = Flow::from_settings(&settings, service)?
        .with_event_sink(Arc::new(LoggingEventSink::debug()))
        .with_cancellation(token);

    let report = if cli.skip_generation {
        flow.run_existing(&text).await?
    } else {
        flow.run_text_with_report(&text).await?
    };

    if let Some(build) = &report.build {
        let stubs = build.stub_count();
        if stubs > 0 {
            warn!(stubs, "some blocks were saved as stubs");
            eprintln!(
                "note: {stubs} block(s) in {} need manual completion",
                settings.output_dir.display()
            );
        }
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report.to_json())?);
    }
    let context = report.run.into_result()?;
    if !cli.json {
        println!("{}", serde_json::to_string_pretty(&context.to_value())?);
    }
    Ok(())
}

fn print_blocks(blocks: &[BlockDefinition], as_json: bool) -> Result<()> {
    if as_json {
        let listing: Vec<_> = blocks
            .iter()
            .map(|b| {
                json!({
                    "name": b.name(),
                    "title": b.title(),
                    "description": b.description(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listing)?);
    } else {
        for block in blocks {
            println!("{}\t{}", block.name(), block.title());
        }
    }
    Ok(())
}

fn spawn_interrupt_handler(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupt received, stopping before the next block");
            token.cancel("interrupted by user");
        }
    });
}

fn init_tracing(log_level: &str, format: LogFormat) {
    let fallback_level = match log_level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "error" => "error",
        _ => "warn",
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
}

/// Maps a failure to the process exit code.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|e| e.downcast_ref::<BlockflowError>())
        .map_or(1, |e| match e {
            BlockflowError::Parse(_) => 2,
            BlockflowError::Generation(_) => 3,
            BlockflowError::NotFound(_) => 4,
            BlockflowError::Execution(_) => 5,
            BlockflowError::Cancelled(_) => 130,
            _ => 1,
        })
}
