use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use rss_digest::parser::{extract_articles, UNTITLED_FEED};
use rss_digest::rss_utils::{text, url};
use rss_digest::{
    collect_all_feeds, Config, DigestAccumulator, EntryExtractor, FeedFetchScheduler,
    FeedListProvider, FeedSource, FeedTransport, Fetcher, LocalFeedList, RunSummary,
    StateStore, StaticFeedList,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "rss-digest",
    about = "Fetch RSS/Atom feeds and keep a deduplicated daily digest"
)]
struct Cli {
    /// Storage root (overrides RSS_DATA_DIR and ~/data/rss)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Debug logging unless RUST_LOG says otherwise
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch new articles and merge them into today's digest
    Fetch {
        /// Extra feed URL, fetched before the local feed list (repeatable)
        #[arg(long = "feed", short = 'f')]
        feeds: Vec<String>,

        /// Max articles taken from the head of each feed
        #[arg(long, short)]
        limit: Option<usize>,

        /// Concurrent fetch workers
        #[arg(long, short)]
        workers: Option<usize>,
    },
    /// Show today's digest
    Today,
    /// Show the digest for a given date
    History {
        /// Date in YYYY-MM-DD format
        date: String,
    },
    /// List the feeds a fetch run would use
    List {
        #[arg(long = "feed", short = 'f')]
        feeds: Vec<String>,
    },
    /// Preview a single feed without touching state
    Read {
        url: String,

        #[arg(long, short, default_value_t = 10)]
        limit: usize,
    },
    /// Create an empty feeds.json in the storage root
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli.data_dir.as_deref()).context("failed to load configuration")?;
    debug!("Storage root: {}", config.data_dir.display());

    match cli.command {
        Command::Fetch {
            feeds,
            limit,
            workers,
        } => cmd_fetch(&config, feeds, limit, workers).await,
        Command::Today => cmd_show(&config, Local::now().date_naive()),
        Command::History { date } => {
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .with_context(|| format!("invalid date '{}', expected YYYY-MM-DD", date))?;
            cmd_show(&config, date)
        }
        Command::List { feeds } => cmd_list(&config, feeds).await,
        Command::Read { url, limit } => cmd_read(&config, &url, limit).await,
        Command::Init => cmd_init(&config),
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn collect_sources(config: &Config, cli_feeds: Vec<String>) -> Result<Vec<FeedSource>> {
    for feed in &cli_feeds {
        if !url::is_valid_rss_url(feed) {
            bail!("not an http(s) feed URL: {}", feed);
        }
    }
    let command_line = StaticFeedList::from_urls("command line", cli_feeds);
    let local = LocalFeedList::new(&config.data_dir);
    let providers: [&dyn FeedListProvider; 2] = [&command_line, &local];
    Ok(collect_all_feeds(&providers).await)
}

async fn cmd_fetch(
    config: &Config,
    cli_feeds: Vec<String>,
    limit: Option<usize>,
    workers: Option<usize>,
) -> Result<()> {
    let sources = collect_sources(config, cli_feeds).await?;
    if sources.is_empty() {
        println!(
            "No feeds found. Add some to {} or pass --feed URL.",
            LocalFeedList::new(&config.data_dir).path().display()
        );
        return Ok(());
    }

    let limit = limit.unwrap_or(config.scheduler.limit);
    let workers = workers.unwrap_or(config.scheduler.workers);
    println!("Fetching {} feeds (workers={})...", sources.len(), workers);

    let fetcher = Fetcher::new(config.fetch.clone())?;
    let scheduler = FeedFetchScheduler::new(
        Arc::new(fetcher),
        StateStore::new(&config.data_dir),
        DigestAccumulator::new(&config.data_dir),
    )
    .with_config(config.scheduler.clone())
    .with_fetch_timeout(Duration::from_secs(config.fetch.timeout_seconds));

    let summary = scheduler.run(&sources, limit, workers).await?;
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    if summary.has_errors() {
        println!("{} feeds failed:", summary.errors.len());
        for error in &summary.errors {
            println!("  {} ... {}", error.feed_title, error.message);
        }
    }

    if summary.new_count > 0 {
        if let Some(path) = &summary.digest_path {
            println!("Digest saved: {}", path.display());
        }
        println!(
            "  new: {} | skipped: {} | feeds: {}/{}",
            summary.new_count, summary.skipped_count, summary.feeds_processed, summary.feeds_total
        );
    } else if summary.feeds_processed == 0 {
        println!("All {} feeds failed; nothing fetched.", summary.feeds_total);
    } else {
        println!(
            "No new articles today (skipped {} already seen).",
            summary.skipped_count
        );
    }
}

fn cmd_show(config: &Config, date: NaiveDate) -> Result<()> {
    let digest = DigestAccumulator::new(&config.data_dir);
    match digest.read_rendered(date)? {
        Some(content) => println!("{}", content),
        None => println!("No digest for {}. Run `rss-digest fetch` first.", date),
    }
    Ok(())
}

async fn cmd_list(config: &Config, cli_feeds: Vec<String>) -> Result<()> {
    let sources = collect_sources(config, cli_feeds).await?;
    if sources.is_empty() {
        println!("No feeds found.");
        return Ok(());
    }

    println!("Found {} feeds:\n", sources.len());
    for (i, feed) in sources.iter().enumerate() {
        println!("{}. {}", i + 1, feed.title);
        println!("   {}", feed.url);
        if !feed.html_url.is_empty() {
            println!("   {}", feed.html_url);
        }
    }
    Ok(())
}

async fn cmd_read(config: &Config, feed_url: &str, limit: usize) -> Result<()> {
    if !url::is_valid_rss_url(feed_url) {
        bail!("not an http(s) feed URL: {}", feed_url);
    }

    let fetcher = Fetcher::new(config.fetch.clone())?;
    let feed = fetcher
        .fetch(feed_url)
        .await
        .with_context(|| format!("failed to read {}", feed_url))?;
    let articles = extract_articles(&EntryExtractor, &feed.entries, limit);
    info!("Previewing {} of {} entries", articles.len(), feed.entries.len());

    println!("# {}", feed.title.as_deref().unwrap_or(UNTITLED_FEED));
    if let Some(link) = &feed.link {
        println!("{}", link);
    }
    println!();

    if articles.is_empty() {
        println!("No articles found.");
        return Ok(());
    }
    for (i, article) in articles.iter().enumerate() {
        println!("{}. {}", i + 1, article.title);
        if !article.link.is_empty() {
            println!("   {}", article.link);
        }
        if !article.published.is_empty() {
            println!("   {}", text::prefix_chars(&article.published, 10));
        }
    }
    Ok(())
}

fn cmd_init(config: &Config) -> Result<()> {
    let list = LocalFeedList::new(&config.data_dir);
    if list.init()? {
        println!("Created {}", list.path().display());
    } else {
        println!("{} already exists", list.path().display());
    }
    Ok(())
}
