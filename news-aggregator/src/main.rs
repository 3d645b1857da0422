use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use insta_publisher::InstaClient;
use interfaces::Publisher;
use news_aggregator::{
    enabled_sources, AppConfig, Curator, Fetcher, GeminiCurator, NewsAggregator, PostRunner,
    Scheduler, Store, SystemStatus,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// How often the daemon re-reads the config file to pick up operator edits.
const CONFIG_RELOAD_SECS: u64 = 60;

#[derive(Parser)]
#[command(
    name = "news-aggregator",
    about = "Scheduled news-to-Instagram posting pipeline"
)]
struct Cli {
    /// Path to the JSON config file.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Path to the SQLite database file.
    #[arg(long, default_value = "poster.db")]
    db: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon: fetch and publish loops plus config reloading.
    Run,
    /// Run one fetch cycle and exit.
    Fetch,
    /// Publish the next queued item, or a specific one.
    Post {
        /// Queue item id to publish instead of the head.
        #[arg(long)]
        item: Option<String>,
    },
    /// Reject a queued item by id.
    Reject { id: String },
    /// List the post queue in posting order.
    Queue,
    /// Clear the post queue.
    Clear,
    /// Print the system status snapshot as JSON.
    Status,
    /// Show recent history rows (dispositions).
    History {
        /// How many rows to show.
        #[arg(long, default_value_t = 30)]
        limit: i64,
    },
}

struct App {
    config_path: PathBuf,
    config: Arc<RwLock<AppConfig>>,
    store: Store,
    curator: Arc<dyn Curator>,
    publisher: Arc<InstaClient>,
    aggregator: Arc<NewsAggregator>,
    runner: Arc<PostRunner>,
}

impl App {
    async fn build(cli: &Cli) -> anyhow::Result<Self> {
        let config = AppConfig::load(&cli.config);
        config
            .validate()
            .context("refusing to start with an invalid config")?;

        let store = Store::open(&cli.db)
            .await
            .with_context(|| format!("failed to open database at {}", cli.db))?;

        let fetcher = Arc::new(Fetcher::new(Default::default()));
        let curator: Arc<dyn Curator> = Arc::new(GeminiCurator::new(
            AppConfig::optional(&config.gemini_api_key).map(str::to_string),
            fetcher.client().clone(),
        ));
        let publisher = Arc::new(InstaClient::new(
            AppConfig::optional(&config.instagram_access_token).map(str::to_string),
            config.session_file.clone(),
        ));

        let sources = enabled_sources(&config, fetcher.clone());
        let shared_config = Arc::new(RwLock::new(config));

        let aggregator = Arc::new(NewsAggregator::new(
            sources,
            curator.clone(),
            store.clone(),
            fetcher,
            shared_config.clone(),
        ));
        let runner = Arc::new(PostRunner::new(
            store.clone(),
            curator.clone(),
            publisher.clone(),
            shared_config.clone(),
        ));

        Ok(Self {
            config_path: cli.config.clone(),
            config: shared_config,
            store,
            curator,
            publisher,
            aggregator,
            runner,
        })
    }

    /// Daemon mode: connect the posting target, start the loops, reload the
    /// config periodically, stop on ctrl-c.
    async fn run(self) -> anyhow::Result<()> {
        self.publisher
            .connect()
            .await
            .map_err(|e| anyhow!("posting target login failed, not starting: {e}"))?;
        info!(target = self.publisher.target_name(), "posting target connected");

        let (fetch_minutes, post_minutes) = {
            let config = self.config.read().await;
            (config.fetch_interval_minutes, config.post_interval_minutes)
        };
        let mut scheduler = Scheduler::start(
            self.aggregator.clone(),
            self.runner.clone(),
            fetch_minutes,
            post_minutes,
        );

        let mut reload = tokio::time::interval(Duration::from_secs(CONFIG_RELOAD_SECS));
        reload.tick().await; // the immediate first tick

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown requested");
                    break;
                }
                _ = reload.tick() => {
                    if let Err(e) = self.reload_config(&mut scheduler).await {
                        error!(error = %e, "config reload failed");
                    }
                }
            }
        }

        scheduler.shutdown().await;
        Ok(())
    }

    async fn reload_config(&self, scheduler: &mut Scheduler) -> anyhow::Result<()> {
        let fresh = AppConfig::load(&self.config_path);
        if let Err(e) = fresh.validate() {
            warn!(error = %e, "ignoring invalid config on reload");
            return Ok(());
        }

        let current = self.config.read().await.clone();
        if fresh == current {
            return Ok(());
        }

        let intervals_changed = fresh.fetch_interval_minutes != current.fetch_interval_minutes
            || fresh.post_interval_minutes != current.post_interval_minutes;
        let (fetch_minutes, post_minutes) =
            (fresh.fetch_interval_minutes, fresh.post_interval_minutes);

        *self.config.write().await = fresh;
        self.store
            .log_event(
                news_aggregator::LogLevel::Info,
                "Configuration reloaded",
            )
            .await?;

        if intervals_changed {
            scheduler.reschedule(fetch_minutes, post_minutes).await;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let app = App::build(&cli).await?;

    match &cli.command {
        Command::Run => app.run().await?,

        Command::Fetch => {
            let outcome = app.aggregator.run_cycle().await?;
            println!(
                "fetched {}, queued {}, rejected {}, skipped {}",
                outcome.fetched, outcome.enqueued, outcome.rejected, outcome.skipped
            );
        }

        Command::Post { item } => {
            app.publisher
                .connect()
                .await
                .map_err(|e| anyhow!("posting target login failed: {e}"))?;
            match item {
                Some(id) => {
                    let receipt = app.runner.post_item(id).await?;
                    println!("posted media {}", receipt.media_id);
                }
                None => match app.runner.post_next().await? {
                    Some(receipt) => println!("posted media {}", receipt.media_id),
                    None => println!("nothing posted (queue empty or daily cap reached)"),
                },
            }
        }

        Command::Reject { id } => {
            app.runner.reject_item(id).await?;
            println!("rejected {id}");
        }

        Command::Queue => {
            let queue = app.store.list_queue().await?;
            if queue.is_empty() {
                println!("queue is empty");
            }
            for (position, item) in queue.iter().enumerate() {
                println!(
                    "{:>3}. [{}] {} ({}, via {})",
                    position + 1,
                    item.id,
                    item.title,
                    item.category,
                    item.source_api
                );
            }
        }

        Command::Clear => {
            let removed = app.runner.clear_queue().await?;
            println!("cleared {removed} items");
        }

        Command::History { limit } => {
            let history = app.store.recent_history(*limit).await?;
            if history.is_empty() {
                println!("history is empty");
            }
            for record in &history {
                println!(
                    "{} [{}] {}{}",
                    record.processed_at.format("%Y-%m-%d %H:%M"),
                    record.status.as_str(),
                    record.refined_title,
                    record
                        .reason
                        .as_deref()
                        .map(|r| format!(" ({r})"))
                        .unwrap_or_default()
                );
            }
        }

        Command::Status => {
            let status = SystemStatus::collect(
                &app.store,
                app.publisher.as_ref(),
                app.curator.as_ref(),
                None,
                None,
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}
