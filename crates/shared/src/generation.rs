use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::retry::RetryPolicy;

/// One (endpoint-version, model) pair of the fallback list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRoute {
    pub version: String,
    pub model: String,
}

impl ModelRoute {
    pub fn new(version: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            model: model.into(),
        }
    }

    /// Newest and fastest first, the most stable legacy model last.
    pub fn default_routes() -> Vec<Self> {
        vec![
            Self::new("v1beta", "gemini-2.0-flash"),
            Self::new("v1beta", "gemini-1.5-flash"),
            Self::new("v1", "gemini-1.5-flash"),
            Self::new("v1", "gemini-1.0-pro"),
        ]
    }
}

impl fmt::Display for ModelRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.version, self.model)
    }
}

/// Why a single pair attempt did not produce text.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("response carried no candidate text")]
    Empty,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("all {routes} model routes failed in each of {tries} sweeps; last error: {last}")]
    Exhausted {
        tries: u32,
        routes: usize,
        last: String,
    },

    #[error("no model routes configured")]
    NoRoutes,
}

/// Article prompt with a `{topic}` placeholder.
#[derive(Debug, Clone)]
pub struct PromptTemplate(String);

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn render(&self, topic: &str) -> String {
        self.0.replace("{topic}", topic)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(
            r#"اكتب مقالًا تقنيًا عربيًا احترافيًا بعنوان: "{topic}"

الشروط:
- تنسيق Markdown
- ابدأ بسطر عنوان يبدأ بالعلامة #
- لغة عربية فصحى جذابة
- لا يقل عن 500 كلمة
- بدون مقدمات زائدة"#,
        )
    }
}

/// Something that can turn a prompt into text using one model route.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn complete(&self, route: &ModelRoute, prompt: &str) -> Result<String, AttemptError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// `generateContent` over HTTP.
pub struct GeminiBackend {
    client: Client,
    api_root: String,
    api_key: String,
}

impl GeminiBackend {
    pub fn new(api_root: impl Into<String>, api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_root: api_root.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.gemini_api_root.clone(),
            config.gemini_api_key.clone(),
            config.request_timeout,
        )
    }

    fn endpoint(&self, route: &ModelRoute) -> String {
        format!(
            "{}/{}/models/{}:generateContent?key={}",
            self.api_root,
            route.version,
            route.model,
            urlencoding::encode(&self.api_key)
        )
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    async fn complete(&self, route: &ModelRoute, prompt: &str) -> Result<String, AttemptError> {
        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.7,
                top_p: 0.95,
                max_output_tokens: 8192,
            },
        };

        let response = self
            .client
            .post(self.endpoint(route))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            return Err(AttemptError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let parsed: GenerateResponse =
            serde_json::from_str(&body).map_err(|e| AttemptError::Malformed(e.to_string()))?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AttemptError::Empty);
        }
        Ok(text)
    }
}

/// Successful generation and where it came from.
#[derive(Debug, Clone)]
pub struct Generated {
    pub text: String,
    pub route: ModelRoute,
    pub sweeps: u32,
}

/// Fallback breadth (model routes) times retry depth (sweeps).
pub struct GenerationClient<B> {
    backend: B,
    routes: Vec<ModelRoute>,
    retry: RetryPolicy,
    pacing: Duration,
}

impl<B: GenerationBackend> GenerationClient<B> {
    pub fn new(backend: B, routes: Vec<ModelRoute>, retry: RetryPolicy) -> Self {
        Self {
            backend,
            routes,
            retry,
            pacing: Duration::ZERO,
        }
    }

    /// Pause between pair attempts inside one sweep.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub async fn generate(
        &self,
        topic: &str,
        template: &PromptTemplate,
    ) -> Result<Generated, GenerationError> {
        if self.routes.is_empty() {
            return Err(GenerationError::NoRoutes);
        }

        info!(topic, routes = self.routes.len(), "Generating article");
        let prompt = template.render(topic);

        let outcome = self
            .retry
            .run(|sweep| {
                let prompt = prompt.as_str();
                async move { self.sweep(sweep, prompt).await }
            })
            .await;

        match outcome {
            Ok(((text, route), sweeps)) => {
                info!(route = %route, sweeps, chars = text.len(), "Article generated");
                Ok(Generated {
                    text,
                    route,
                    sweeps,
                })
            }
            Err(exhausted) => Err(GenerationError::Exhausted {
                tries: exhausted.tries,
                routes: self.routes.len(),
                last: exhausted.last_error.to_string(),
            }),
        }
    }

    /// One pass over every route; the first non-empty text wins.
    async fn sweep(&self, sweep: u32, prompt: &str) -> Result<(String, ModelRoute), SweepFailed> {
        let mut last = None;

        for (idx, route) in self.routes.iter().enumerate() {
            if idx > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }

            debug!(sweep, route = %route, "Trying model route");
            match self.backend.complete(route, prompt).await {
                Ok(text) => return Ok((text, route.clone())),
                Err(e) => {
                    warn!(sweep, route = %route, error = %e, "Model route failed");
                    last = Some(format!("{}: {}", route, e));
                }
            }
        }

        Err(SweepFailed(last.unwrap_or_default()))
    }
}

#[derive(Debug)]
struct SweepFailed(String);

impl fmt::Display for SweepFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
