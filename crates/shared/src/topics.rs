use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::{Rng, SeedableRng};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::dedup::is_duplicate;
use crate::models::{Candidate, FeedReport, SourceOutcome};

/// Curated topics that are always available, even offline.
pub const FALLBACK_TOPICS: &[&str] = &[
    "مستقبل الذكاء الاصطناعي في التعليم 2025",
    "أفضل طرق حماية الخصوصية على الإنترنت",
    "كيف تبدأ العمل الحر خطوة بخطوة",
    "تطبيقات لا غنى عنها لزيادة الإنتاجية",
    "شرح تقنية البلوك تشين للمبتدئين",
];

pub fn fallback_pool() -> Vec<String> {
    FALLBACK_TOPICS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub link: Option<String>,
}

#[async_trait]
pub trait FeedProvider: Send + Sync {
    async fn entries(&self, url: &str) -> Result<Vec<FeedEntry>>;
}

/// Fetches RSS/Atom documents and parses them with feed-rs.
pub struct HttpFeedProvider {
    client: Client,
}

impl HttpFeedProvider {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (compatible; BlogAutopilot/1.0)")
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

/// Parses a feed body into titled entries, skipping entries without a title.
pub fn parse_feed(body: &[u8]) -> Result<Vec<FeedEntry>> {
    let feed = feed_rs::parser::parse(body).context("Failed to parse feed")?;

    Ok(feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let title = entry.title.map(|t| t.content.trim().to_string())?;
            if title.is_empty() {
                return None;
            }
            let link = entry.links.first().map(|l| l.href.clone());
            Some(FeedEntry { title, link })
        })
        .collect())
}

#[async_trait]
impl FeedProvider for HttpFeedProvider {
    async fn entries(&self, url: &str) -> Result<Vec<FeedEntry>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch feed {}", url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Feed {} returned HTTP {}", url, status);
        }

        let body = response
            .bytes()
            .await
            .context("Failed to read feed body")?;
        parse_feed(&body)
    }
}

/// Candidates of one collection run, shuffled, plus per-feed accounting.
#[derive(Debug, Clone)]
pub struct CandidateBatch {
    pub candidates: Vec<Candidate>,
    pub feed_reports: Vec<FeedReport>,
}

/// Aggregates trend feeds and the fallback pool into one shuffled list.
pub struct TopicSource<P> {
    provider: P,
    feeds: Vec<String>,
    take: usize,
    pool: Vec<String>,
    rng: StdRng,
}

impl<P: FeedProvider> TopicSource<P> {
    pub fn new(provider: P, feeds: Vec<String>, take: usize, pool: Vec<String>, rng: StdRng) -> Self {
        Self {
            provider,
            feeds,
            take,
            pool,
            rng,
        }
    }

    /// A seeded source produces the same order for the same feed content.
    pub fn seeded(provider: P, feeds: Vec<String>, take: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::new(provider, feeds, take, fallback_pool(), rng)
    }

    pub fn pool(&self) -> &[String] {
        &self.pool
    }

    /// Shared RNG so selection and image seeds follow the same seed.
    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub async fn collect_candidates(&mut self) -> CandidateBatch {
        let mut candidates = Vec::new();
        let mut feed_reports = Vec::with_capacity(self.feeds.len());

        for url in &self.feeds {
            let outcome = match self.provider.entries(url).await {
                Ok(entries) => {
                    let before = candidates.len();
                    candidates.extend(
                        entries
                            .into_iter()
                            .take(self.take)
                            .map(|e| Candidate {
                                text: e.title,
                                link: e.link,
                            }),
                    );
                    let added = candidates.len() - before;
                    debug!(url = %url, added, "Feed contributed candidates");
                    SourceOutcome::Loaded(added)
                }
                Err(e) => {
                    warn!(url = %url, error = %format!("{:#}", e), "Trend feed unavailable");
                    SourceOutcome::Unavailable {
                        reason: format!("{:#}", e),
                    }
                }
            };
            feed_reports.push(FeedReport {
                url: url.clone(),
                outcome,
            });
        }

        candidates.extend(self.pool.iter().map(Candidate::new));
        candidates.shuffle(&mut self.rng);

        info!(
            candidates = candidates.len(),
            feeds_ok = feed_reports.iter().filter(|r| r.outcome.is_loaded()).count(),
            feeds = feed_reports.len(),
            "Collected topic candidates"
        );

        CandidateBatch {
            candidates,
            feed_reports,
        }
    }
}

/// First candidate that is not a duplicate of history; otherwise a random pool entry.
///
/// With an empty pool the first candidate is used, and `None` is returned only
/// when there is nothing to choose from at all.
pub fn select_topic<S, R>(
    candidates: &[Candidate],
    history: &[S],
    fallback_pool: &[String],
    rng: &mut R,
) -> Option<Candidate>
where
    S: AsRef<str>,
    R: Rng + ?Sized,
{
    if let Some(fresh) = candidates.iter().find(|c| !is_duplicate(&c.text, history)) {
        return Some(fresh.clone());
    }

    if let Some(text) = fallback_pool.choose(rng) {
        info!("Every candidate repeats recent history, using a random fallback topic");
        return Some(Candidate::new(text.clone()));
    }

    candidates.first().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct StaticFeeds(HashMap<String, Vec<FeedEntry>>);

    #[async_trait]
    impl FeedProvider for StaticFeeds {
        async fn entries(&self, url: &str) -> Result<Vec<FeedEntry>> {
            self.0
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("connection refused"))
        }
    }

    fn entry(title: &str) -> FeedEntry {
        FeedEntry {
            title: title.to_string(),
            link: Some(format!("https://news.test/{}", title.len())),
        }
    }

    fn source(seed: u64) -> TopicSource<StaticFeeds> {
        let mut feeds = HashMap::new();
        feeds.insert(
            "https://feed.test/sa".to_string(),
            vec![entry("one"), entry("two"), entry("three")],
        );
        TopicSource::seeded(
            StaticFeeds(feeds),
            vec![
                "https://feed.test/sa".to_string(),
                "https://feed.test/down".to_string(),
            ],
            2,
            Some(seed),
        )
    }

    #[tokio::test]
    async fn takes_prefix_of_each_feed_and_whole_pool() {
        let batch = source(7).collect_candidates().await;

        assert_eq!(batch.candidates.len(), 2 + FALLBACK_TOPICS.len());
        let texts: Vec<&str> = batch.candidates.iter().map(|c| c.text.as_str()).collect();
        assert!(texts.contains(&"one"));
        assert!(texts.contains(&"two"));
        assert!(!texts.contains(&"three"));
        for topic in FALLBACK_TOPICS {
            assert!(texts.contains(topic));
        }
    }

    #[tokio::test]
    async fn failed_feed_is_reported_not_fatal() {
        let batch = source(7).collect_candidates().await;

        assert_eq!(batch.feed_reports.len(), 2);
        assert_eq!(batch.feed_reports[0].outcome, SourceOutcome::Loaded(2));
        assert_eq!(
            batch.feed_reports[1].outcome.reason(),
            Some("connection refused")
        );
    }

    #[tokio::test]
    async fn same_seed_same_order() {
        let a = source(99).collect_candidates().await.candidates;
        let b = source(99).collect_candidates().await.candidates;
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn no_feeds_still_yields_pool() {
        let mut source = TopicSource::seeded(StaticFeeds(HashMap::new()), Vec::new(), 2, Some(1));
        let batch = source.collect_candidates().await;

        assert_eq!(batch.candidates.len(), FALLBACK_TOPICS.len());
        assert!(batch.feed_reports.is_empty());
    }

    #[test]
    fn selects_first_fresh_candidate_in_order() {
        let candidates = vec![
            Candidate::new("rust async runtime"),
            Candidate::new("gardening tips"),
            Candidate::new("cooking pasta"),
        ];
        let history = ["Rust async runtime deep dive"];
        let mut rng = StdRng::seed_from_u64(0);

        let chosen = select_topic(&candidates, &history, &fallback_pool(), &mut rng).unwrap();
        assert_eq!(chosen.text, "gardening tips");
    }

    #[test]
    fn all_duplicates_fall_back_to_pool() {
        let candidates = vec![Candidate::new("rust async"), Candidate::new("rust runtime")];
        let history = ["rust async runtime"];
        let pool = fallback_pool();
        let mut rng = StdRng::seed_from_u64(3);

        let chosen = select_topic(&candidates, &history, &pool, &mut rng).unwrap();
        assert!(!chosen.text.is_empty());
        assert!(pool.contains(&chosen.text));
        assert!(chosen.link.is_none());
    }

    #[test]
    fn empty_pool_keeps_first_candidate() {
        let candidates = vec![Candidate::new("rust async")];
        let history = ["rust async"];
        let mut rng = StdRng::seed_from_u64(3);

        let chosen = select_topic(&candidates, &history, &[], &mut rng).unwrap();
        assert_eq!(chosen.text, "rust async");
    }

    #[test]
    fn nothing_to_choose_from() {
        let history: [&str; 0] = [];
        let mut rng = StdRng::seed_from_u64(3);
        assert!(select_topic(&[], &history, &[], &mut rng).is_none());
    }

    #[test]
    fn parses_rss_titles_and_links() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Trends</title>
<item><title>الذكاء الاصطناعي</title><link>https://example.com/a</link></item>
<item><title>  </title><link>https://example.com/blank</link></item>
<item><title>Second</title><link>https://example.com/b</link></item>
</channel></rss>"#;

        let entries = parse_feed(rss.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "الذكاء الاصطناعي");
        assert_eq!(entries[0].link.as_deref(), Some("https://example.com/a"));
        assert_eq!(entries[1].title, "Second");
    }

    #[test]
    fn malformed_feed_is_an_error() {
        assert!(parse_feed(b"this is not xml").is_err());
    }
}
