//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Fetch files over HTTP the way a browser download manager does.
///
/// Downloads run concurrently into one directory, are tracked in a SQLite
/// download list, and can be listed, removed or cleared afterwards.
#[derive(Parser, Debug)]
#[command(name = "web-downloads")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// JSON engine configuration file; command-line flags override its values
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory downloaded files are written to
    #[arg(short = 'd', long, global = true, value_name = "DIR")]
    pub downloads_dir: Option<PathBuf>,

    /// Download list database (default: ./web-downloads.db)
    #[arg(long, global = true, value_name = "FILE")]
    pub db: Option<PathBuf>,

    /// Maximum concurrent transfers (1-16)
    #[arg(short = 'c', long, global = true, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub concurrency: Option<u8>,

    /// Minimum milliseconds between progress updates (0 reports every chunk)
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub progress_interval_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download one or more URLs and wait for them to finish
    Get {
        /// URLs to download (http or https)
        #[arg(required = true, value_name = "URL")]
        urls: Vec<String>,

        /// User-Agent header sent with every request
        #[arg(long)]
        user_agent: Option<String>,

        /// Content-Disposition value used to name the file
        #[arg(long)]
        content_disposition: Option<String>,

        /// MIME type used to pick an extension and recorded with the download
        #[arg(long)]
        mime_type: Option<String>,
    },

    /// Show the download list, newest first
    List {
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove one download from the list
    Remove {
        /// Download id as shown by `list`
        id: i64,

        /// Also delete the downloaded file (completed downloads only)
        #[arg(long)]
        delete_file: bool,
    },

    /// Remove every download from the list (files stay on disk)
    Clear,
}
