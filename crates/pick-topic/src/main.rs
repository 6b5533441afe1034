use anyhow::{Context, Result};
use clap::Parser;
use shared::topics::{HttpFeedProvider, TopicSource};
use shared::{select_topic, BloggerClient, Config, HistoryProvider, SourceOutcome, TopicSettings};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pick-topic")]
#[command(about = "Show which topic the next run would write about, without generating or publishing")]
struct Args {
    /// Seed for topic shuffling (overrides TOPIC_SEED)
    #[arg(long)]
    seed: Option<u64>,

    /// Do not read recent posts from Blogger
    #[arg(long)]
    no_history: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    // Secrets are only needed for the history lookup
    let settings = TopicSettings::from_env()?;
    let seed = args.seed.or(settings.topic_seed);

    let history = if args.no_history {
        println!("⏭  Skipping post history");
        Vec::new()
    } else {
        println!("📚 Reading recent posts...");
        let outcome = SourceOutcome::from_result(
            read_history(settings.history_limit)
                .await
                .map_err(|e| format!("{:#}", e)),
        );
        match &outcome {
            SourceOutcome::Loaded(titles) => {
                println!("✓ {} recent titles", titles.len());
                for title in titles {
                    println!("    {}", title);
                }
            }
            SourceOutcome::Unavailable { reason } => println!("⚠ History unavailable: {}", reason),
        }
        outcome.into_loaded_or_default()
    };

    println!("\n📰 Collecting trend candidates...");
    let mut source = TopicSource::seeded(
        HttpFeedProvider::new()?,
        settings.trend_feeds.clone(),
        settings.feed_take,
        seed,
    );
    let batch = source.collect_candidates().await;

    for feed in &batch.feed_reports {
        match &feed.outcome {
            SourceOutcome::Loaded(count) => println!("✓ {} ({} topics)", feed.url, count),
            SourceOutcome::Unavailable { reason } => println!("✗ {} ({})", feed.url, reason),
        }
    }

    println!("\nCandidates in scan order:");
    for (i, candidate) in batch.candidates.iter().enumerate() {
        let marker = if shared::is_duplicate(&candidate.text, &history) {
            "dup"
        } else {
            "   "
        };
        println!("  {:>2}) [{}] {}", i + 1, marker, candidate.text);
    }

    let pool = source.pool().to_vec();
    let topic = select_topic(&batch.candidates, &history, &pool, source.rng_mut())
        .context("Nothing to choose from")?;

    println!("\n✅ Next topic: {}", topic.text);
    if let Some(link) = topic.link {
        println!("   Source: {}", link);
    }

    Ok(())
}

async fn read_history(limit: usize) -> Result<Vec<String>> {
    let config = Config::from_env()?;
    let blogger = BloggerClient::connect(&config).await?;
    blogger.recent_titles(limit).await
}
