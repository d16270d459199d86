use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use uploadium::config::{default_config_path, load_config};
use uploadium::{
    Dropzone, HttpClient, Labels, LogEvents, SourceFile, UploadEncoding, UploadStatus,
};

#[derive(Parser, Debug)]
#[command(name = "uploadium", version, about = "Validate and upload files over HTTP")]
struct Cli {
    /// Config file (defaults to <config dir>/uploadium/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Destination URL, overrides uploadUrl
    #[arg(long)]
    url: Option<String>,

    /// multipart, base64 or raw; overrides uploadEncoding
    #[arg(long)]
    encoding: Option<UploadEncoding>,

    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();
    let ok = run(cli).await?;

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

/// Upload every file given on the command line. Returns false if anything failed.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let mut config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    if let Some(url) = cli.url {
        config = config.with_upload_url(url);
    }
    if let Some(encoding) = cli.encoding {
        config.upload_encoding = encoding;
    }
    if config.upload_url.as_deref().map_or(true, |u| u.trim().is_empty()) {
        bail!(
            "No upload URL configured; pass --url or set uploadUrl in {}",
            config_path.display()
        );
    }

    let labels = Labels::load(&config.lang, config.locales_dir.as_deref());
    let dropzone = Dropzone::new(
        config,
        Arc::new(HttpClient::new()),
        Arc::new(labels),
        Arc::new(LogEvents),
    )?;

    let mut ok = true;
    let mut candidates = Vec::new();
    for path in &cli.files {
        match SourceFile::from_path(path).await {
            Ok(file) => candidates.push(file),
            Err(e) => {
                log::error!("Skipping {}: {}", path.display(), e);
                println!("{}: unreadable ({})", path.display(), e);
                ok = false;
            }
        }
    }

    log::info!("Uploading {} file(s)", candidates.len());
    let outcome = dropzone.add_files(candidates);

    if let Some(task) = outcome.upload {
        task.await.context("Upload task panicked")?;
    }

    for invalid in &outcome.rejected {
        println!("{}: rejected ({})", invalid.file.name(), invalid.reason);
        ok = false;
    }

    let snapshot = dropzone.snapshot();
    for managed in snapshot.files.iter() {
        let status = snapshot.status(&managed.id);
        let label = match status {
            UploadStatus::Success => "uploaded",
            UploadStatus::Error => "failed",
            UploadStatus::Uploading => "still uploading",
            UploadStatus::Idle => "not sent",
        };
        println!("{}: {}", managed.file.name(), label);
        if status != UploadStatus::Success {
            ok = false;
        }
    }

    Ok(ok)
}
