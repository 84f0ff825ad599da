mod cli;

use cloudframe::{
    host,
    remote::DropboxClient,
    session::{Session, SessionOptions},
};
use cf_core::config::{self, Config};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use std::sync::Arc;

async fn run_session(config: Config, folder: Option<String>, wait: bool) -> Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config: {}", warning);
    }

    let remote = DropboxClient::new(&config.dropbox).context("creating Dropbox client")?;
    let session = Session::spawn(Arc::new(remote), SessionOptions::from_config(&config));

    if !wait {
        let mut settings = config.pipeline.session_settings();
        if folder.is_some() {
            settings.folder = folder;
        }
        let handle = session.handle();
        handle.init(settings).await?;
        handle.get().await?;
    }

    tracing::info!("Relaying host protocol over stdio");
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    host::relay(session, stdin, tokio::io::stdout()).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "cloudframe=trace,cf_core=debug,reqwest=debug".to_string()
        } else {
            "cloudframe=info,cf_core=info".to_string()
        }
    });

    // stdout carries protocol lines only
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run { folder, wait } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_session(config, folder, wait))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("cloudframe {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            config::load_config(p)?
        }
        None => {
            println!("No config file specified, searching default locations");
            config::load_config_or_default(None)?
        }
    };

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✓ Configuration is valid");
    } else {
        println!("Configuration has {} warning(s):", warnings.len());
        for warning in &warnings {
            println!("  - {}", warning);
        }
    }

    println!("  Folder: {}", config.pipeline.session_settings().search_root());
    println!("  Extensions: {}", config.pipeline.extensions.join(", "));
    println!("  Scan interval: {} ms", config.pipeline.data_update_interval_ms);
    println!("  Save interval: {} ms", config.pipeline.update_interval_ms);
    println!("  Cache dir: {}", config.cache.resolved_dir().display());
    println!(
        "  Credentials: {}",
        if config.dropbox.access_token.is_some() || config.dropbox.refresh_token.is_some() {
            "configured"
        } else {
            "missing"
        }
    );

    Ok(())
}
