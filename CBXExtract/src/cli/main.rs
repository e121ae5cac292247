//! cbxextract - command line front end for the comic extraction engine

mod args;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use args::{Cli, Commands};
use cbxextract::config::{self, CbxConfig};
use cbxextract::{CbxError, ComicFileHandler};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = CbxConfig::from_env();
    if let Some(root) = &cli.media_root {
        config = config.with_media_root(root);
    }
    if let Some(url) = &cli.media_url {
        config = config.with_media_url(url);
    }
    let config = config::init_global(config)
        .map_err(|_| anyhow!("configuration was already initialized"))?;
    tracing::debug!(media_root = %config.media_root.display(), media_url = %config.media_url, "configuration resolved");

    let handler = ComicFileHandler::new(config.clone());

    match &cli.command {
        Commands::Extract { file, id } => {
            let Some(comic) = skip_invalid(handler.extract_comic(file, id))
                .with_context(|| format!("Failed to extract '{}'", file.display()))?
            else {
                return Ok(());
            };
            for page in &comic.pages {
                println!("{}{}", comic.media_url, page);
            }
        }
        Commands::Cover { file } => {
            let cover = skip_invalid(handler.extract_cover(file))
                .with_context(|| format!("Failed to extract cover of '{}'", file.display()))?;
            if let Some(cover) = cover.flatten() {
                println!("{}", cover.url);
            }
        }
        Commands::Count { file } => {
            let count = skip_invalid(handler.page_count(file))
                .with_context(|| format!("Failed to count pages of '{}'", file.display()))?;
            println!("{}", count.unwrap_or(0));
        }
    }

    Ok(())
}

/// Non-comic inputs produce an empty result rather than a failure
fn skip_invalid<T>(result: cbxextract::Result<T>) -> cbxextract::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(CbxError::InvalidSourceType(name)) => {
            tracing::info!(file = %name, "not a comic archive, skipping");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "cbxextract=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}
