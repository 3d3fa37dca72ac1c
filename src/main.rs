//! fzseries-downloader: search and batch-download TV series from
//! fztvseries.live.
//!
//! Code structure (reading entry points):
//! - `base_system`: config, logging and the interrupt flag
//! - `site`: HTTP client, page parsers, resolution hops and pagination
//! - `download`: the transfer engine and the batch orchestrator

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use clap::{Parser, Subcommand};
use tracing::info;

mod base_system;
mod download;
mod site;

use base_system::config::{self, Config};
use base_system::interrupt;
use base_system::logging::{LogOptions, LogSystem};
use download::batch::{Auto, AutoOptions, Quality};
use site::{CatalogueFilter, Category, Query, SiteClient};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "fzseries")]
#[command(about = "Search and download TV series from fztvseries.live", version = VERSION)]
struct Cli {
    /// Enable debug logging
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// Directory holding config.yml and logs
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download episodes matching a query or catalogue filter
    Download(DownloadArgs),
}

#[derive(Debug, clap::Args)]
struct DownloadArgs {
    /// Free-text search query
    query: Option<String>,

    /// Catalogue filter instead of a query, e.g. trending, genre:Drama,
    /// alpha:AtoC
    #[arg(long, conflicts_with = "query")]
    filter: Option<String>,

    /// Search category for free-text queries
    #[arg(long, value_enum, default_value_t = CategoryArg::Series)]
    by: CategoryArg,

    /// Season to start from (1-based)
    #[arg(short = 's', long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    season_offset: u64,

    /// Episode to start from in the first season (1-based)
    #[arg(short = 'e', long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    episode_offset: u64,

    /// Stop after downloading this many episodes
    #[arg(short = 'l', long, default_value_t = 1_000_000)]
    limit: usize,

    /// Attempts per episode before giving up
    #[arg(short = 't', long)]
    trials: Option<u32>,

    /// Transfer timeout in seconds
    #[arg(short = 'r', long)]
    transfer_timeout: Option<u64>,

    /// Preferred file quality
    #[arg(short = 'f', long, value_enum, default_value_t = Quality::HighMp4)]
    format: Quality,

    /// Parent directory for downloaded series
    #[arg(short = 'd', long, default_value = ".")]
    directory: PathBuf,

    /// Do not draw transfer progress bars
    #[arg(long, default_value_t = false)]
    disable_progressbar: bool,

    /// Suppress console output apart from errors
    #[arg(short = 'q', long, default_value_t = false)]
    quiet: bool,

    /// Keep the site's metadata-laden filenames
    #[arg(long, default_value_t = false)]
    include_metadata: bool,

    /// Stop after the starting season
    #[arg(long, default_value_t = false)]
    one_season_only: bool,

    /// Skip episodes that keep failing instead of aborting the batch
    #[arg(long, default_value_t = false)]
    ignore_errors: bool,

    /// Ask before each episode
    #[arg(long, default_value_t = false)]
    confirm: bool,

    /// Transfer chunk size in kilobytes
    #[arg(long)]
    chunk_size: Option<usize>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CategoryArg {
    Series,
    Episodes,
}

impl std::fmt::Display for CategoryArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CategoryArg::Series => "series",
            CategoryArg::Episodes => "episodes",
        })
    }
}

impl From<CategoryArg> for Category {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Series => Category::Series,
            CategoryArg::Episodes => Category::Episodes,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let Command::Download(args) = cli.command;

    let _log = LogSystem::init(LogOptions {
        debug: cli.debug,
        use_color: true,
        console: !args.quiet,
    })
    .map_err(|e| anyhow!(e))?;
    interrupt::install()?;

    let config = config::load_or_create(cli.data_dir.as_deref())?;
    run_download(config, args)
}

fn run_download(config: Config, args: DownloadArgs) -> Result<()> {
    let query = build_query(&args)?;

    let options = AutoOptions {
        season_offset: args.season_offset as usize,
        episode_offset: args.episode_offset as usize,
        limit: args.limit,
        trials: args.trials.unwrap_or(config.download_trials),
        transfer_timeout: args
            .transfer_timeout
            .map(Duration::from_secs)
            .unwrap_or_else(|| config.transfer_timeout()),
        format: args.format,
        directory: args.directory.clone(),
        progress_bar: !args.disable_progressbar,
        quiet: args.quiet,
        include_metadata: args.include_metadata,
        one_season_only: args.one_season_only,
        ignore_errors: args.ignore_errors,
        confirm: args.confirm,
        chunk_size: args
            .chunk_size
            .map(|kb| kb.max(1) * 1024)
            .unwrap_or_else(|| config.chunk_size()),
    };

    let client = SiteClient::new(config)?;
    let downloaded = Auto::new(&client, query, options).run()?;

    info!(count = downloaded.len(), "batch finished");
    for path in &downloaded {
        println!("{}", path.display());
    }
    Ok(())
}

fn build_query(args: &DownloadArgs) -> Result<Query> {
    match (&args.query, &args.filter) {
        (Some(text), None) => Ok(Query::text(text, args.by.into())),
        (None, Some(spec)) => Ok(Query::Filter(CatalogueFilter::parse_spec(spec)?)),
        (None, None) => bail!("either a search query or --filter is required"),
        (Some(_), Some(_)) => bail!("a search query and --filter are mutually exclusive"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn offsets_are_one_based() {
        assert!(Cli::try_parse_from(["fzseries", "download", "chuck", "-s", "0"]).is_err());
        assert!(Cli::try_parse_from(["fzseries", "download", "chuck", "-e", "0"]).is_err());

        let cli =
            Cli::try_parse_from(["fzseries", "download", "chuck", "-s", "2", "-e", "3"]).unwrap();
        let Command::Download(args) = cli.command;
        assert_eq!((args.season_offset, args.episode_offset), (2, 3));
    }

    #[test]
    fn query_and_filter_are_mutually_exclusive() {
        assert!(
            Cli::try_parse_from(["fzseries", "download", "chuck", "--filter", "trending"]).is_err()
        );
        let cli = Cli::try_parse_from(["fzseries", "download", "--filter", "genre:Drama"]).unwrap();
        let Command::Download(args) = cli.command;
        assert!(matches!(build_query(&args), Ok(Query::Filter(_))));
    }
}
