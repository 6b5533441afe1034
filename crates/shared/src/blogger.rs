use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use url::form_urlencoded;

use crate::config::{Config, Credentials};
use crate::models::{PostDraft, PublishedPost};

pub const BLOGGER_API_BASE: &str = "https://www.googleapis.com/blogger/v3";

/// Titles of the most recent posts on the destination blog.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    async fn recent_titles(&self, limit: usize) -> Result<Vec<String>>;
}

/// The side-effecting publish call.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn insert_post(&self, post: &PostDraft, is_draft: bool) -> Result<PublishedPost>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlogInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct BlogList {
    #[serde(default)]
    items: Vec<BlogInfo>,
}

#[derive(Deserialize)]
struct PostList {
    #[serde(default)]
    items: Vec<PostItem>,
}

#[derive(Deserialize)]
struct PostItem {
    #[serde(default)]
    title: String,
}

#[derive(Serialize)]
struct InsertPost<'a> {
    title: &'a str,
    content: &'a str,
    labels: &'a [String],
}

#[derive(Deserialize)]
struct InsertedPost {
    url: Option<String>,
}

/// Blogger v3 client bound to one blog.
pub struct BloggerClient {
    client: Client,
    api_base: String,
    access_token: String,
    blog: BlogInfo,
}

impl BloggerClient {
    /// Exchanges credentials and resolves the destination blog.
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::connect_with_base(
            BLOGGER_API_BASE,
            &config.credentials,
            config.blog_id.as_deref(),
            config.blog_url.as_deref(),
        )
        .await
    }

    pub async fn connect_with_base(
        api_base: &str,
        credentials: &Credentials,
        blog_id: Option<&str>,
        blog_url: Option<&str>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        let access_token = Self::access_token(&client, credentials).await?;
        let api_base = api_base.trim_end_matches('/').to_string();

        let blog = match blog_id {
            Some(id) => BlogInfo {
                id: id.to_string(),
                name: String::new(),
                url: blog_url.map(String::from),
            },
            None => Self::discover_blog(&client, &api_base, &access_token, blog_url).await?,
        };

        info!(blog_id = %blog.id, blog_name = %blog.name, "Connected to blog");

        Ok(Self {
            client,
            api_base,
            access_token,
            blog,
        })
    }

    pub fn blog(&self) -> &BlogInfo {
        &self.blog
    }

    async fn access_token(client: &Client, credentials: &Credentials) -> Result<String> {
        match credentials {
            Credentials::AccessToken(token) => Ok(token.clone()),
            Credentials::Refresh {
                client_id,
                client_secret,
                refresh_token,
                token_uri,
            } => {
                let form = form_urlencoded::Serializer::new(String::new())
                    .append_pair("grant_type", "refresh_token")
                    .append_pair("client_id", client_id)
                    .append_pair("client_secret", client_secret)
                    .append_pair("refresh_token", refresh_token)
                    .finish();

                let response = client
                    .post(token_uri)
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(form)
                    .send()
                    .await
                    .context("Failed to reach OAuth token endpoint")?;

                let token = check(response, "OAuth token exchange")
                    .await?
                    .json::<TokenResponse>()
                    .await
                    .context("Failed to parse OAuth token response")?;

                debug!("Exchanged refresh token for access token");
                Ok(token.access_token)
            }
        }
    }

    /// First blog of the authorized user, else the blog at `blog_url`.
    async fn discover_blog(
        client: &Client,
        api_base: &str,
        access_token: &str,
        blog_url: Option<&str>,
    ) -> Result<BlogInfo> {
        let response = client
            .get(format!("{}/users/self/blogs", api_base))
            .bearer_auth(access_token)
            .send()
            .await
            .context("Failed to list blogs")?;

        let blogs = check(response, "Blogger listByUser")
            .await?
            .json::<BlogList>()
            .await
            .context("Failed to parse blog list")?;

        if let Some(blog) = blogs.items.into_iter().next() {
            return Ok(blog);
        }

        let Some(blog_url) = blog_url else {
            anyhow::bail!("No blog found for this account and BLOG_URL is not set");
        };

        let response = client
            .get(format!(
                "{}/blogs/byurl?url={}",
                api_base,
                urlencoding::encode(blog_url)
            ))
            .bearer_auth(access_token)
            .send()
            .await
            .context("Failed to look up blog by URL")?;

        check(response, "Blogger getByUrl")
            .await?
            .json::<BlogInfo>()
            .await
            .context("Failed to parse blog")
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.access_token)
    }
}

#[async_trait]
impl HistoryProvider for BloggerClient {
    async fn recent_titles(&self, limit: usize) -> Result<Vec<String>> {
        let url = format!(
            "{}/blogs/{}/posts?fetchBodies=false&maxResults={}",
            self.api_base,
            urlencoding::encode(&self.blog.id),
            limit
        );

        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .context("Failed to list recent posts")?;

        let posts = check(response, "Blogger posts.list")
            .await?
            .json::<PostList>()
            .await
            .context("Failed to parse post list")?;

        Ok(posts
            .items
            .into_iter()
            .map(|p| p.title)
            .filter(|t| !t.trim().is_empty())
            .collect())
    }
}

#[async_trait]
impl Publisher for BloggerClient {
    async fn insert_post(&self, post: &PostDraft, is_draft: bool) -> Result<PublishedPost> {
        let url = format!(
            "{}/blogs/{}/posts?isDraft={}",
            self.api_base,
            urlencoding::encode(&self.blog.id),
            is_draft
        );

        let body = InsertPost {
            title: &post.title,
            content: &post.content,
            labels: &post.labels,
        };

        let response = self
            .authorized(self.client.post(url))
            .json(&body)
            .send()
            .await
            .context("Failed to send post to Blogger")?;

        let inserted = check(response, "Blogger posts.insert")
            .await?
            .json::<InsertedPost>()
            .await
            .context("Failed to parse inserted post")?;

        Ok(PublishedPost { url: inserted.url })
    }
}

async fn check(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("unknown error"));
    anyhow::bail!("{} returned error: {} - {}", what, status, error_text);
}
