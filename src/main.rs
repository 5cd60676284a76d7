use std::{path::PathBuf, time::Duration};

use clap::{
    CommandFactory, Parser, Subcommand,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use clap_complete::{Shell, generate};
use tokio_util::sync::CancellationToken;

use msrcli::{
    cli,
    config::{self, Config},
    error,
    logging::ConsoleLogger,
    warning,
};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::White.on_default() | Effects::BOLD)
        .usage(AnsiColor::White.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightGreen.on_default())
}

#[derive(Parser, Debug, Clone)]
#[clap(
  version = env!("CARGO_PKG_VERSION"),
  name=env!("CARGO_PKG_NAME"),
  bin_name=env!("CARGO_PKG_NAME"),
  about=env!("CARGO_PKG_DESCRIPTION"),
  styles=styles(),
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Download albums into the output directory
    Download(DownloadOptions),

    /// List the album catalog
    Albums(AlbumsOptions),

    /// Get shell completions
    Completions(CompletionsOption),
}

#[derive(Parser, Debug, Clone)]
pub struct CatalogOptions {
    /// Output directory for albums and state files
    #[clap(long, short)]
    pub output: Option<PathBuf>,

    /// Album cache file (defaults to <output>/albums_cache.json)
    #[clap(long)]
    pub album_cache: Option<PathBuf>,

    /// Album cache TTL in hours, 0 disables expiry
    #[clap(long)]
    pub cache_ttl: Option<i64>,

    /// Ignore a fresh cache and fetch the catalog again
    #[clap(long)]
    pub refresh_albums: bool,

    /// HTTP timeout in seconds
    #[clap(long)]
    pub http_timeout: Option<u64>,
}

#[derive(Parser, Debug, Clone)]
pub struct DownloadOptions {
    #[clap(flatten)]
    pub catalog: CatalogOptions,

    /// Number of albums processed concurrently
    #[clap(long, short)]
    pub workers: Option<usize>,

    /// Attempts per network operation
    #[clap(long)]
    pub retries: Option<u32>,

    /// Comma-separated album names or CIDs, or `all`
    #[clap(long)]
    pub albums: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct AlbumsOptions {
    #[clap(flatten)]
    pub catalog: CatalogOptions,

    /// Only show albums whose name or CID contains this term
    #[clap(long)]
    pub search: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct CompletionsOption {
    shell: Shell,
}

fn apply_catalog_options(config: &mut Config, opt: CatalogOptions) {
    if let Some(output) = opt.output {
        config.output_dir = output;
    }
    if let Some(path) = opt.album_cache {
        config.album_cache_path = Some(path);
    }
    if let Some(hours) = opt.cache_ttl {
        config.cache_ttl_hours = hours;
    }
    if let Some(secs) = opt.http_timeout {
        config.http_timeout = Duration::from_secs(secs);
    }
    config.refresh_albums |= opt.refresh_albums;
}

#[tokio::main]
async fn main() {
    if let Err(e) = config::load_env().await {
        error!("Cannot load environment. Err: {}", e);
    }

    let cli = Cli::parse();
    let mut config = Config::from_env();
    let logger = ConsoleLogger::shared();

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warning!("Ctrl+C received, stopping...");
                cancel.cancel();
            }
        }
    });

    let result = match cli.command {
        Command::Download(opt) => {
            apply_catalog_options(&mut config, opt.catalog);
            if let Some(workers) = opt.workers {
                config.workers = workers;
            }
            if let Some(retries) = opt.retries {
                config.retry_attempts = retries;
            }
            config.albums = opt.albums;
            cli::download(&config.normalized(), logger, cancel).await
        }
        Command::Albums(opt) => {
            apply_catalog_options(&mut config, opt.catalog);
            cli::albums(&config.normalized(), logger, cancel, opt.search).await
        }
        Command::Completions(opt) => {
            let mut cmd = Cli::command_for_update();
            let name = cmd.get_name().to_string();
            generate(opt.shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("{}", e);
    }
}
