//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use blogcrawl_core::EnqueueMode;
use blogcrawl_core::config::{MAX_PARALLEL_BLOGS, MAX_PARALLEL_IMAGES};
use clap::{Parser, Subcommand, ValueEnum};

/// Crawl blogs and keep local copies of their posts.
///
/// Blogcrawl tracks a set of blogs, downloads their photos, videos, audio and
/// text posts, and only fetches what is new on every later crawl.
#[derive(Parser, Debug)]
#[command(name = "blogcrawl")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/blogcrawl/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory blogs are downloaded into
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Blogs crawled at the same time
    #[arg(short = 'b', long, global = true, value_parser = clap::value_parser!(u16).range(1..=MAX_PARALLEL_BLOGS as i64))]
    pub parallel_blogs: Option<u16>,

    /// Item transfers shared by all blogs being crawled
    #[arg(short = 'i', long, global = true, value_parser = clap::value_parser!(u16).range(1..=MAX_PARALLEL_IMAGES as i64))]
    pub parallel_images: Option<u16>,

    /// Bandwidth cap in KiB/s (0 disables throttling)
    #[arg(long, global = true)]
    pub bandwidth: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start tracking one or more blogs
    Add {
        /// Blog URLs, e.g. https://staff.tumblr.com/
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Show tracked blogs
    List,

    /// Stop tracking a blog and delete its downloads
    Remove {
        name: String,

        /// Leave downloaded files on disk
        #[arg(long)]
        keep_files: bool,
    },

    /// Crawl blogs until the queue is empty (Ctrl+C stops gracefully)
    Crawl {
        /// Blog names to crawl
        names: Vec<String>,

        /// Crawl every tracked blog
        #[arg(long, conflicts_with = "auto")]
        all: bool,

        /// Select blogs by crawl history
        #[arg(long, value_enum)]
        auto: Option<AutoArg>,
    },
}

/// Blog selection for `crawl --auto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AutoArg {
    All,
    Completed,
    NeverCompleted,
}

impl From<AutoArg> for EnqueueMode {
    fn from(arg: AutoArg) -> Self {
        match arg {
            AutoArg::All => Self::All,
            AutoArg::Completed => Self::CompletedOnly,
            AutoArg::NeverCompleted => Self::NeverCompleted,
        }
    }
}
