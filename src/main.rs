use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use s3uplink::config;
use s3uplink::workflow::{StartRequest, StylePreference, WorkflowEngine, WorkflowState};

#[derive(Parser)]
#[command(name = "s3uplink")]
#[command(version, about = "Upload to S3 and wait for the backend-stylized object", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(long, global = true)]
    config: Option<String>,

    /// Profile to use from config
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file and poll for the derived object
    Upload {
        /// File to upload
        file: PathBuf,

        /// Source bucket (overrides the profile)
        #[arg(long)]
        input_bucket: Option<String>,

        /// Destination bucket (overrides the profile)
        #[arg(long)]
        output_bucket: Option<String>,

        /// Stylize preference: cartoon or colorize
        #[arg(long, default_value = "cartoon")]
        style: String,

        /// Where to copy the derived object once downloaded
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List configured profiles
    Profiles,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // One workflow at a time; sequential I/O needs no worker threads.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let cfg = config::load_config(cli.config.as_deref(), cli.profile.as_deref())?;

    match cli.command {
        Commands::Profiles => {
            let mut names: Vec<&String> = cfg.profiles.keys().collect();
            names.sort();
            for name in names {
                let profile = &cfg.profiles[name];
                println!(
                    "{}  region={} input={} output={}",
                    name, profile.region, profile.input_bucket, profile.output_bucket
                );
            }
            Ok(())
        }
        Commands::Upload {
            file,
            input_bucket,
            output_bucket,
            style,
            output,
        } => cmd_upload(cfg, file, input_bucket, output_bucket, style, output).await,
    }
}

async fn cmd_upload(
    cfg: config::Config,
    file: PathBuf,
    input_bucket: Option<String>,
    output_bucket: Option<String>,
    style: String,
    output: Option<PathBuf>,
) -> Result<()> {
    let profile = cfg
        .get_profile(None)
        .context("no profile configured; set AWS credentials or pass --config")?;

    let preference: StylePreference = style.parse().map_err(anyhow::Error::msg)?;

    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .context("file has no usable name")?
        .to_string();
    let bytes = tokio::fs::read(&file)
        .await
        .context(format!("Failed to read {:?}", file))?;

    let request = StartRequest {
        filename,
        bytes: bytes.into(),
        credentials: profile.credentials(),
        input_bucket: input_bucket.unwrap_or_else(|| profile.input_bucket.clone()),
        output_bucket: output_bucket.unwrap_or_else(|| profile.output_bucket.clone()),
        preference,
    };

    let engine = WorkflowEngine::new(cfg.workflow.clone());
    let log = engine.log().clone();
    let mut states = engine.subscribe();
    engine.start(request);

    // Render log entries as transitions land, until the run settles.
    let mut printed = 0;
    loop {
        for entry in log.snapshot().iter().skip(printed) {
            println!("[{}] {}", entry.timestamp, entry.message);
            printed += 1;
        }
        let state = *states.borrow_and_update();
        if matches!(state, WorkflowState::Complete | WorkflowState::Error) {
            break;
        }
        if states.changed().await.is_err() {
            break;
        }
    }
    engine.join().await;
    for entry in log.snapshot().iter().skip(printed) {
        println!("[{}] {}", entry.timestamp, entry.message);
    }

    match engine.state() {
        WorkflowState::Complete => {
            let result = engine
                .take_result()
                .context("run completed but no result was materialized")?;
            println!(
                "Derived object ready: {} bytes, {}",
                result.len(),
                result.content_type()
            );
            if let Some(dest) = output {
                result
                    .persist_to(&dest)
                    .context(format!("Failed to write {:?}", dest))?;
                println!("Saved to {:?}", dest);
            }
            Ok(())
        }
        WorkflowState::Error => anyhow::bail!("workflow failed; see log above"),
        other => anyhow::bail!("workflow ended in unexpected state: {}", other),
    }
}
