use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::article::{compose_post, cover_image_url, render_markdown, split_title};
use crate::blogger::{HistoryProvider, Publisher};
use crate::config::{Config, PublishMode};
use crate::generation::{GeminiBackend, GenerationBackend, GenerationClient, PromptTemplate};
use crate::models::{Candidate, FeedReport, PostDraft, PublishedPost, SourceOutcome};
use crate::topics::{select_topic, FeedProvider, HttpFeedProvider, TopicSource};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Stop before the publish call.
    pub dry_run: bool,
    /// Publish as draft regardless of the configured mode.
    pub force_draft: bool,
}

/// What one invocation did, for the operator.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Number of history titles read, or why they could not be read.
    pub history: SourceOutcome<usize>,
    pub feeds: Vec<FeedReport>,
    pub topic: Candidate,
    pub model: String,
    pub sweeps: u32,
    pub post: PostDraft,
    pub is_draft: bool,
    pub published: Option<PublishedPost>,
}

/// History → topics → generation → post-processing → publish, strictly in sequence.
pub struct Pipeline<'a, P, B> {
    history: &'a dyn HistoryProvider,
    publisher: &'a dyn Publisher,
    topics: TopicSource<P>,
    generator: GenerationClient<B>,
    template: PromptTemplate,
    history_limit: usize,
    publish_mode: PublishMode,
}

impl<'a> Pipeline<'a, HttpFeedProvider, GeminiBackend> {
    pub fn from_config(
        config: &Config,
        history: &'a dyn HistoryProvider,
        publisher: &'a dyn Publisher,
    ) -> Result<Self> {
        let topics = TopicSource::seeded(
            HttpFeedProvider::new()?,
            config.trend_feeds.clone(),
            config.feed_take,
            config.topic_seed,
        );
        let generator = GenerationClient::new(
            GeminiBackend::from_config(config)?,
            config.models.clone(),
            config.retry,
        )
        .with_pacing(config.pacing);

        Ok(Self::new(
            history,
            publisher,
            topics,
            generator,
            config.history_limit,
            config.publish_mode,
        ))
    }
}

impl<'a, P: FeedProvider, B: GenerationBackend> Pipeline<'a, P, B> {
    pub fn new(
        history: &'a dyn HistoryProvider,
        publisher: &'a dyn Publisher,
        topics: TopicSource<P>,
        generator: GenerationClient<B>,
        history_limit: usize,
        publish_mode: PublishMode,
    ) -> Self {
        Self {
            history,
            publisher,
            topics,
            generator,
            template: PromptTemplate::default(),
            history_limit,
            publish_mode,
        }
    }

    pub async fn run(&mut self, options: RunOptions) -> Result<RunReport> {
        let started_at = Utc::now();

        let (history, history_outcome) = self.read_history().await;

        let batch = self.topics.collect_candidates().await;
        let pool = self.topics.pool().to_vec();
        let topic = select_topic(&batch.candidates, &history, &pool, self.topics.rng_mut())
            .context("No topic candidates and an empty fallback pool")?;
        info!(topic = %topic.text, link = ?topic.link, "Selected topic");

        let generated = match self.generator.generate(&topic.text, &self.template).await {
            Ok(generated) => generated,
            Err(e) => {
                error!(error = %e, "Generation exhausted, nothing will be published");
                return Err(anyhow::Error::new(e).context("Article generation failed"));
            }
        };

        let (title, body_markdown) = split_title(&generated.text, &topic.text);
        let article_html = render_markdown(&body_markdown);
        let image_url = cover_image_url(self.topics.rng_mut());
        let post = PostDraft::new(title, compose_post(&article_html, &image_url));

        let is_draft = options.force_draft || self.publish_mode.is_draft();
        let published = if options.dry_run {
            info!(title = %post.title, "Dry run, skipping publish");
            None
        } else {
            let published = self
                .publisher
                .insert_post(&post, is_draft)
                .await
                .context("Publishing failed")?;
            info!(title = %post.title, url = ?published.url, is_draft, "Post published");
            Some(published)
        };

        Ok(RunReport {
            started_at,
            finished_at: Utc::now(),
            history: history_outcome,
            feeds: batch.feed_reports,
            topic,
            model: generated.route.to_string(),
            sweeps: generated.sweeps,
            post,
            is_draft,
            published,
        })
    }

    /// Failure here only costs deduplication, so it degrades to an empty history.
    async fn read_history(&self) -> (Vec<String>, SourceOutcome<usize>) {
        match self.history.recent_titles(self.history_limit).await {
            Ok(titles) => {
                let count = titles.len();
                info!(count, "Loaded recent post titles");
                (titles, SourceOutcome::Loaded(count))
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                warn!(error = %reason, "Could not read post history, continuing without it");
                (Vec::new(), SourceOutcome::Unavailable { reason })
            }
        }
    }
}
