// Public modules
pub mod article;
pub mod blogger;
pub mod config;
pub mod dedup;
pub mod generation;
pub mod models;
pub mod pipeline;
pub mod retry;
pub mod topics;

// Re-export commonly used types
pub use article::{compose_post, render_markdown, split_title};
pub use blogger::{BloggerClient, HistoryProvider, Publisher};
pub use config::{Config, Credentials, PublishMode, TopicSettings};
pub use dedup::is_duplicate;
pub use generation::{
    AttemptError, GeminiBackend, GenerationBackend, GenerationClient, GenerationError, ModelRoute,
    PromptTemplate,
};
pub use models::{Candidate, FeedReport, PostDraft, PublishedPost, SourceOutcome};
pub use pipeline::{Pipeline, RunOptions, RunReport};
pub use retry::RetryPolicy;
pub use topics::{select_topic, FeedProvider, HttpFeedProvider, TopicSource, FALLBACK_TOPICS};
