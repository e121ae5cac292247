//! Command line arguments

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cbxextract")]
#[command(author, version, about = "Extract pages and covers from comic book archives", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Media root holding `temp/` and `images/` (overrides CBX_MEDIA_ROOT)
    #[arg(long, global = true, value_name = "DIR")]
    pub media_root: Option<PathBuf>,

    /// URL prefix the media root is served under (overrides CBX_MEDIA_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub media_url: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract every page into `<root>/temp/<ID>/` and print the page URLs
    Extract {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Identifier namespacing the output directory
        #[arg(long)]
        id: String,
    },
    /// Extract the cover into `<root>/images/` and print its URL
    Cover {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print the number of page images
    Count {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}
