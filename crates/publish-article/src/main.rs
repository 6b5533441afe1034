use anyhow::{Context, Result};
use clap::Parser;
use shared::{BloggerClient, Config, Pipeline, RunOptions, RunReport, SourceOutcome};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "publish-article")]
#[command(about = "Pick a fresh topic, generate an Arabic article with Gemini and publish it to Blogger")]
struct Args {
    /// Publish as a draft even if PUBLISH_MODE is live
    #[arg(long)]
    draft: bool,

    /// Generate and print the article without publishing it
    #[arg(long)]
    dry_run: bool,

    /// Seed for topic shuffling (overrides TOPIC_SEED)
    #[arg(long)]
    seed: Option<u64>,

    /// Print the run report as JSON instead of progress lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        eprintln!("\n❌ Run failed, nothing was published: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::from_env()?;
    if args.seed.is_some() {
        config.topic_seed = args.seed;
    }

    // Keep stdout clean for the JSON document
    let progress = !args.json;

    if progress {
        println!("🚀 Blog autopilot started");
        println!("\n🔐 Connecting to Blogger...");
    }
    let blogger = BloggerClient::connect(&config)
        .await
        .context("Failed to connect to Blogger")?;
    if progress {
        let blog = blogger.blog();
        if blog.name.is_empty() {
            println!("✓ Using blog {}", blog.id);
        } else {
            println!("✓ Connected to blog: {}", blog.name);
        }
        println!("\n✍  Selecting a topic and writing the article...");
    }
    let mut pipeline = Pipeline::from_config(&config, &blogger, &blogger)?;
    let report = pipeline
        .run(RunOptions {
            dry_run: args.dry_run,
            force_draft: args.draft,
        })
        .await?;

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize run report")?;
        println!("{}", json);
    } else {
        print_report(&report, args.dry_run);
    }
    Ok(())
}

fn print_report(report: &RunReport, dry_run: bool) {
    match &report.history {
        SourceOutcome::Loaded(count) => println!("✓ Checked {} recent posts for repeats", count),
        SourceOutcome::Unavailable { reason } => {
            println!("⚠ Post history unavailable ({}), duplicates not checked", reason)
        }
    }

    for feed in &report.feeds {
        if let Some(reason) = feed.outcome.reason() {
            println!("⚠ Trend feed skipped: {} ({})", feed.url, reason);
        }
    }

    println!("📝 Topic: {}", report.topic.text);
    if let Some(link) = &report.topic.link {
        println!("   Source: {}", link);
    }
    println!(
        "🤖 Written by {} (sweep {})",
        report.model, report.sweeps
    );
    println!("📰 Title: {}", report.post.title);

    if dry_run {
        println!("\n--- dry run, post content follows ---\n");
        println!("{}", report.post.content);
        return;
    }

    let kind = if report.is_draft { "Draft saved" } else { "Published successfully" };
    match report.published.as_ref().and_then(|p| p.url.as_deref()) {
        Some(url) => println!("\n🎉 {}: {}", kind, url),
        None => println!("\n🎉 {}", kind),
    }

    let elapsed = report.finished_at - report.started_at;
    println!("   Took {}s", elapsed.num_seconds());
}
