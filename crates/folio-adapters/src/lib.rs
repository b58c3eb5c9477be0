//! Hosting-API adapters for Folio.
//!
//! The pipeline talks to the hosting platform through two narrow traits so
//! the orchestrator can be exercised with in-memory substitutes:
//! [`RepositoryDirectory`] (identity + repository listing, stage 1) and
//! [`ReadmeSource`] (per-repository README text, stage 2). [`GitHubApi`]
//! implements both against the GitHub REST v3 API.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use folio_core::ProjectRecord;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "folio-adapters";

/// GitHub caps repository listings at 100 entries per page.
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no API token configured; set GITHUB_TOKEN")]
    MissingToken,
    #[error("identity request rejected with http status {status}")]
    Rejected { status: u16 },
    #[error("identity request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("identity payload malformed: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("repository payload malformed: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Identity resolution and bounded repository listing (stage 1).
#[async_trait]
pub trait RepositoryDirectory: Send + Sync {
    /// Login of the authenticated user. Failure is fatal to a harvest run.
    async fn viewer_login(&self) -> Result<String, AuthError>;

    /// Up to `limit` repositories owned by the authenticated user, private
    /// included, normalized into public-safe records.
    async fn list_repositories(&self, limit: usize) -> Result<Vec<ProjectRecord>, FetchError>;
}

/// Per-repository README retrieval (stage 2).
///
/// Always returns decoded text; a missing README, a failed request, or a
/// decode failure all yield the empty string so one bad repository never
/// aborts enrichment of the rest of the catalog.
#[async_trait]
pub trait ReadmeSource: Send + Sync {
    async fn readme_text(&self, owner: &str, repo: &str) -> String;
}

/// Owner and repository name derived from a record's canonical URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRepo {
    pub owner: String,
    pub repo: String,
}

/// Parse `https://github.com/{owner}/{repo}` into its two path segments.
///
/// Requires an absolute http(s) URL whose path holds exactly two non-empty
/// segments; anything else (bare words, missing segments, deep links) is
/// `None` and the caller passes the record through unchanged.
pub fn parse_owner_repo(url: &str) -> Option<OwnerRepo> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let (host, path) = rest.split_once('/')?;
    if host.is_empty() {
        return None;
    }
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let repo = segments.next()?;
    if segments.next().is_some() {
        return None;
    }
    Some(OwnerRepo {
        owner: owner.to_string(),
        repo: repo.to_string(),
    })
}

/// Wire shape of one repository in a GitHub listing response. Only the
/// fields the catalog projects are deserialized; everything else is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoPayload {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub topics: Vec<JsonValue>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub private: bool,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Normalize a wire payload into the public-safe record shape. Topic entries
/// are flattened to their name strings; malformed or nameless entries are
/// dropped rather than failing the listing.
pub fn record_from_payload(payload: RepoPayload) -> ProjectRecord {
    let topics = payload
        .topics
        .iter()
        .filter_map(topic_name)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();

    ProjectRecord {
        name: payload.name,
        description: payload.description.unwrap_or_default(),
        blurb: None,
        homepage: non_empty(payload.homepage),
        url: non_empty(payload.html_url),
        updated_at: non_empty(payload.updated_at),
        visibility: non_empty(payload.visibility),
        stars: payload.stargazers_count,
        topics,
        archived: payload.archived,
        is_private: payload.private,
    }
}

// Topics arrive either as plain strings (REST) or as `{"topic":{"name":..}}`
// objects (GraphQL-shaped mirrors).
fn topic_name(value: &JsonValue) -> Option<&str> {
    value
        .as_str()
        .or_else(|| value.pointer("/topic/name").and_then(JsonValue::as_str))
        .or_else(|| value.pointer("/name").and_then(JsonValue::as_str))
}

/// Page size for the next listing request, or `None` once `limit` is met.
fn next_page_size(limit: usize, fetched: usize) -> Option<usize> {
    if fetched >= limit {
        None
    } else {
        Some((limit - fetched).min(MAX_PAGE_SIZE))
    }
}

/// Decode a base64 transport payload into text, tolerating the newlines
/// GitHub inserts into `content` and arbitrary non-UTF-8 byte sequences.
pub fn decode_transport_content(content: &str) -> Option<String> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(compact).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub api_base: String,
    pub token: Option<String>,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            token: None,
            user_agent: "folio-pipeline/0.1".to_string(),
            timeout: Duration::from_secs(20),
        }
    }
}

/// GitHub REST v3 client backing both provider traits.
#[derive(Debug)]
pub struct GitHubApi {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ViewerPayload {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ReadmePayload {
    content: String,
}

impl GitHubApi {
    pub fn new(config: GitHubConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()
            .context("building reqwest client")?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token,
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .get(format!("{}{}", self.api_base, path))
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }
}

#[async_trait]
impl RepositoryDirectory for GitHubApi {
    async fn viewer_login(&self) -> Result<String, AuthError> {
        if self.token.is_none() {
            return Err(AuthError::MissingToken);
        }

        let response = self.get("/user").send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
            });
        }

        let viewer: ViewerPayload = response
            .json()
            .await
            .map_err(|err| AuthError::Malformed(err.to_string()))?;
        if viewer.login.is_empty() {
            return Err(AuthError::Malformed("empty login".to_string()));
        }
        Ok(viewer.login)
    }

    async fn list_repositories(&self, limit: usize) -> Result<Vec<ProjectRecord>, FetchError> {
        let mut records = Vec::new();
        let mut page = 1usize;

        while let Some(per_page) = next_page_size(limit, records.len()) {
            let path = format!(
                "/user/repos?affiliation=owner&sort=updated&per_page={per_page}&page={page}"
            );
            let response = self.get(&path).send().await?;
            let status = response.status();
            let url = response.url().to_string();
            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url,
                });
            }

            let text = response.text().await?;
            let payloads: Vec<RepoPayload> = serde_json::from_str(&text)?;
            let batch_len = payloads.len();
            records.extend(payloads.into_iter().map(record_from_payload));

            // A short page means the listing is exhausted.
            if batch_len < per_page {
                break;
            }
            page += 1;
        }

        records.truncate(limit);
        debug!(records = records.len(), limit, "repository listing complete");
        Ok(records)
    }
}

#[async_trait]
impl ReadmeSource for GitHubApi {
    async fn readme_text(&self, owner: &str, repo: &str) -> String {
        let path = format!("/repos/{owner}/{repo}/readme");
        let response = match self.get(&path).send().await {
            Ok(response) => response,
            Err(err) => {
                debug!(owner, repo, error = %err, "readme request failed");
                return String::new();
            }
        };
        if !response.status().is_success() {
            debug!(owner, repo, status = response.status().as_u16(), "no readme");
            return String::new();
        }
        let payload: ReadmePayload = match response.json().await {
            Ok(payload) => payload,
            Err(err) => {
                debug!(owner, repo, error = %err, "readme payload malformed");
                return String::new();
            }
        };
        decode_transport_content(&payload.content).unwrap_or_default()
    }
}
