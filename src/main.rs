use anyhow::Result;
use clap::{Parser, Subcommand};
use database::{merge_stores, Store};
use harvest_core::time::parse_cli_date;
use harvest_core::{AppConfig, CoreError, ErrorExt, ErrorReporter};
use harvest_engine::{CommentExtractor, HarvestController, HarvestPipeline, HarvestRange};
use reddit_client::{RedditApiClient, RetryExecutor, TimeFilter};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use watch_service::{DeliveryChannel, DesktopNotifier, MarkerStore, WatchController, WatchOutcome};

const DEFAULT_LOG_FILTER: &str = "subreddit_harvester=info,harvest_engine=info,watch_service=info,database=info,reddit_client=warn";

#[derive(Parser)]
#[command(name = "subreddit-harvester")]
#[command(about = "Harvest subreddit posts and comments into SQLite, or watch an account for new comments")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect posts and comments between two dates
    Harvest {
        /// Start date (yymmddHHMMSS, YYYYMMDDHHMMSS, YYYY-MM-DDTHH:MM:SS or YYYY-MM-DD, UTC)
        start: String,
        /// End date, same formats as the start
        end: String,
        /// Store name; `.db` is appended
        db_name: String,
        /// Width of each search window in hours
        fine_scale_hours: u64,
        /// Subreddit to harvest (repeatable); popular subreddits when omitted
        #[arg(long = "channel")]
        channels: Vec<String>,
        /// Comments kept per post
        #[arg(long)]
        comments: Option<usize>,
        /// Posts fetched per window
        #[arg(long)]
        posts_per_window: Option<u32>,
        /// Number of popular subreddits harvested when none are named
        #[arg(long)]
        popular_limit: Option<u32>,
    },

    /// Collect the posts the source lists for a named period, no date windows
    Recent {
        /// Store name; `.db` is appended
        db_name: String,
        /// hour, day, week, month, year or all
        #[arg(long, default_value = "week")]
        period: TimeFilter,
        /// Subreddit to harvest (repeatable); popular subreddits when omitted
        #[arg(long = "channel")]
        channels: Vec<String>,
        /// Comments kept per post
        #[arg(long)]
        comments: Option<usize>,
    },

    /// Check an account for a new comment and notify when one appears
    Watch {
        /// Account to watch
        account: String,
        /// Account receiving the message
        target: Option<String>,
        /// Notify on the first poll too
        #[arg(long)]
        notify_on_first: bool,
        /// Show a desktop notification instead of sending a message
        #[arg(long)]
        desktop: bool,
    },

    /// Concatenate every store in a directory into one
    Merge {
        dir: PathBuf,
        destination: PathBuf,
        /// Overwrite the destination without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// List the subreddits of a store, most posts first
    Channels { db_name: String },

    /// Print every comment collected for one subreddit
    Corpus { db_name: String, channel: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    // Every await is sequential; nothing is spawned.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    if let Err(error) = runtime.block_on(run(cli)) {
        ErrorReporter::new().report_error(&error);
        eprintln!("Error [{}]: {}", error.error_code(), error.user_friendly_message());
        return Err(error.into());
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), CoreError> {
    let mut config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Harvest {
            start,
            end,
            db_name,
            fine_scale_hours,
            channels,
            comments,
            posts_per_window,
            popular_limit,
        } => {
            config.harvest.fine_scale_hours = fine_scale_hours;
            if let Some(comments) = comments {
                config.harvest.comments_per_post = comments;
            }
            if let Some(posts) = posts_per_window {
                config.harvest.posts_per_window = posts;
            }
            if let Some(limit) = popular_limit {
                config.harvest.popular_limit = limit;
            }
            config.validate()?;

            let start = parse_cli_date(&start)?;
            let end = parse_cli_date(&end)?;
            harvest(&config, start, end, &db_name, channels).await
        }
        Commands::Recent {
            db_name,
            period,
            channels,
            comments,
        } => {
            if let Some(comments) = comments {
                config.harvest.comments_per_post = comments;
            }
            config.validate()?;
            recent(&config, period, &db_name, channels).await
        }
        Commands::Watch {
            account,
            target,
            notify_on_first,
            desktop,
        } => {
            config.watch.notify_on_first_observation |= notify_on_first;
            config.watch.desktop |= desktop;
            watch(&config, &account, target.as_deref()).await
        }
        Commands::Merge {
            dir,
            destination,
            yes,
        } => merge(&dir, &destination, yes).await,
        Commands::Channels { db_name } => {
            let store = open_store(&config, &db_name).await?;
            for channel in store.distinct_channels().await? {
                println!("{}", channel);
            }
            store.close().await;
            Ok(())
        }
        Commands::Corpus { db_name, channel } => {
            let store = open_store(&config, &db_name).await?;
            for body in store.comment_text_by_channel(&channel).await? {
                println!("{}", body);
            }
            store.close().await;
            Ok(())
        }
    }
}

async fn open_store(config: &AppConfig, db_name: &str) -> Result<Store, CoreError> {
    let base_path = config.database.resolved_base_path()?;
    Store::init(db_name, &base_path).await
}

async fn harvest(
    config: &AppConfig,
    start: chrono::DateTime<chrono::Utc>,
    end: chrono::DateTime<chrono::Utc>,
    db_name: &str,
    channels: Vec<String>,
) -> Result<(), CoreError> {
    let range = HarvestRange::from_config(start, end, &config.harvest)?;
    let client = RedditApiClient::new(&config.reddit)?;
    let controller = HarvestController::new(client, RetryExecutor::new(config.retry.clone()));
    let channels = controller
        .resolve_channels(channels, config.harvest.popular_limit)
        .await?;

    let store = open_store(config, db_name).await?;
    let pipeline = HarvestPipeline::new(
        &controller,
        CommentExtractor::from_config(&config.harvest),
        &store,
    );
    let result = pipeline.run(&channels, &range).await;
    let counts = store.counts().await;
    let path = store.path().to_path_buf();
    store.close().await;

    let report = result?;
    let counts = counts?;
    let retries = controller.retry().get_metrics();
    println!(
        "Harvested {} posts and {} comments from {} subreddits into {} ({} submissions, {} comments total; {} retries)",
        report.posts,
        report.comments,
        report.channels,
        path.display(),
        counts.submissions,
        counts.comments,
        retries.total_retries
    );
    Ok(())
}

async fn recent(
    config: &AppConfig,
    period: TimeFilter,
    db_name: &str,
    channels: Vec<String>,
) -> Result<(), CoreError> {
    let client = RedditApiClient::new(&config.reddit)?;
    let controller = HarvestController::new(client, RetryExecutor::new(config.retry.clone()));
    let channels = controller
        .resolve_channels(channels, config.harvest.popular_limit)
        .await?;

    let store = open_store(config, db_name).await?;
    let pipeline = HarvestPipeline::new(
        &controller,
        CommentExtractor::from_config(&config.harvest),
        &store,
    );
    let result = pipeline
        .run_recent(&channels, period, config.harvest.comments_per_post)
        .await;
    let path = store.path().to_path_buf();
    store.close().await;

    let report = result?;
    println!(
        "Harvested {} posts and {} comments from the past {} of {} subreddits into {}",
        report.posts,
        report.comments,
        period.as_str(),
        report.channels,
        path.display()
    );
    Ok(())
}

async fn watch(config: &AppConfig, account: &str, target: Option<&str>) -> Result<(), CoreError> {
    let client = RedditApiClient::new(&config.reddit)?;
    let delivery = if config.watch.desktop {
        DeliveryChannel::Desktop(DesktopNotifier)
    } else {
        if target.is_none() {
            return Err(CoreError::invalid_input(
                "A target account is required unless --desktop is set",
            ));
        }
        DeliveryChannel::Message(client.clone())
    };
    let target = target.unwrap_or(account);

    let controller = WatchController::new(
        client,
        delivery,
        MarkerStore::from_config(&config.watch)?,
        RetryExecutor::new(config.retry.clone()),
        &config.watch,
    );

    match controller.poll(account, target).await? {
        WatchOutcome::Initialized { marker, notified } => println!(
            "Now watching {} (latest comment at {}{})",
            account,
            marker,
            if notified { ", notification sent" } else { "" }
        ),
        WatchOutcome::Migrated { previous, current } => println!(
            "Replaced the old marker of {} ({} -> {}); new comments are reported from now on",
            account, previous, current
        ),
        WatchOutcome::Unchanged => println!("No new comment from {}", account),
        WatchOutcome::Notified { previous, current } => println!(
            "New comment from {} ({} -> {}), notified {}",
            account, previous, current, target
        ),
        WatchOutcome::NoComments => println!("{} has no comments", account),
    }
    Ok(())
}

async fn merge(dir: &Path, destination: &Path, yes: bool) -> Result<(), CoreError> {
    let overwrite = if yes || !destination.exists() {
        yes
    } else {
        confirm(&format!(
            "{} already exists. Overwrite? [y/N] ",
            destination.display()
        ))?
    };
    if destination.exists() && !overwrite {
        println!("Merge cancelled");
        return Ok(());
    }

    let report = merge_stores(dir, destination, overwrite).await?;
    println!(
        "Merged {} stores into {} ({} submissions, {} comments)",
        report.sources.len(),
        report.destination.display(),
        report.counts.submissions,
        report.counts.comments
    );
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool, CoreError> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
