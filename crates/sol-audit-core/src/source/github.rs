use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{
    ContentFetcher, ListingError, RepositoryReference, SourceFile, SourceFileWithContent,
    SourceLister, SOURCE_EXTENSION,
};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_RAW_BASE: &str = "https://raw.githubusercontent.com";

/// Connection settings for the GitHub REST API and raw content host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubSettings {
    pub api_base: String,
    pub raw_base: String,
    /// Optional token; raises the anonymous rate limit.
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            raw_base: DEFAULT_RAW_BASE.to_string(),
            token: None,
            timeout_secs: 30,
        }
    }
}

/// Lists and fetches Solidity sources from public GitHub repositories.
#[derive(Debug, Clone)]
pub struct GithubClient {
    http: Client,
    api_base: String,
    raw_base: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(settings: &GithubSettings) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("sol-audit/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("failed to build GitHub HTTP client")?;
        Ok(Self {
            http,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            raw_base: settings.raw_base.trim_end_matches('/').to_string(),
            token: settings
                .token
                .clone()
                .filter(|token| !token.trim().is_empty()),
        })
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self
            .http
            .get(url)
            .header("accept", "application/vnd.github+json");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn resolve_branch(&self, reference: &RepositoryReference) -> Result<String, ListingError> {
        if let Some(branch) = &reference.branch {
            return Ok(branch.clone());
        }
        let failure = |reason: String| ListingError::BranchResolution {
            owner: reference.owner.clone(),
            repo: reference.repo.clone(),
            reason,
        };

        let url = format!(
            "{}/repos/{}/{}",
            self.api_base, reference.owner, reference.repo
        );
        let response = self
            .get(&url)
            .send()
            .await
            .map_err(|err| failure(err.to_string()))?;
        let status = response.status();
        let metadata: RepositoryMetadata = response
            .json()
            .await
            .map_err(|err| failure(format!("unexpected metadata response ({status}): {err}")))?;
        metadata
            .default_branch
            .filter(|branch| !branch.trim().is_empty())
            .ok_or_else(|| failure(format!("repository metadata has no default branch ({status})")))
    }

    async fn fetch_tree(
        &self,
        reference: &RepositoryReference,
        branch: &str,
    ) -> Result<Vec<TreeEntry>, ListingError> {
        let failure = |reason: String| ListingError::TreeFetch {
            owner: reference.owner.clone(),
            repo: reference.repo.clone(),
            branch: branch.to_string(),
            reason,
        };

        let url = format!(
            "{}/repos/{}/{}/git/trees/{}",
            self.api_base, reference.owner, reference.repo, branch
        );
        let response = self
            .get(&url)
            .query(&[("recursive", "1")])
            .send()
            .await
            .map_err(|err| failure(err.to_string()))?;
        if !response.status().is_success() {
            return Err(failure(format!("GitHub API returned {}", response.status())));
        }
        let listing: TreeResponse = response
            .json()
            .await
            .map_err(|err| failure(format!("invalid tree response: {err}")))?;
        if listing.truncated {
            warn!(repository = %reference, "GitHub truncated the recursive tree listing");
        }
        listing
            .tree
            .ok_or_else(|| failure("empty repository tree".to_string()))
    }

    fn raw_url(&self, reference: &RepositoryReference, branch: &str, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.raw_base, reference.owner, reference.repo, branch, path
        )
    }

    async fn fetch_one(&self, file: SourceFile) -> SourceFileWithContent {
        // The raw host serves plain files; API headers and the token stay with the API.
        let content = match self.http.get(&file.raw_url).send().await {
            Ok(response) if response.status().is_success() => {
                response.text().await.unwrap_or_else(|err| {
                    warn!(path = %file.path, error = %err, "failed to read file body");
                    String::new()
                })
            }
            Ok(response) => {
                warn!(path = %file.path, status = %response.status(), "raw content request failed");
                String::new()
            }
            Err(err) => {
                warn!(path = %file.path, error = %err, "raw content request failed");
                String::new()
            }
        };
        SourceFileWithContent { file, content }
    }
}

/// Keep blob entries with the source extension, first `max_files` in tree order.
fn select_source_entries(tree: Vec<TreeEntry>, max_files: usize) -> Vec<String> {
    tree.into_iter()
        .filter(|entry| entry.kind == "blob")
        .filter_map(|entry| entry.path)
        .filter(|path| path.ends_with(SOURCE_EXTENSION))
        .take(max_files)
        .collect()
}

#[async_trait]
impl SourceLister for GithubClient {
    #[instrument(name = "list_sources", skip(self), fields(repository = %reference))]
    async fn list(
        &self,
        reference: &RepositoryReference,
        max_files: usize,
    ) -> Result<Vec<SourceFile>, ListingError> {
        let branch = self.resolve_branch(reference).await?;
        let tree = self.fetch_tree(reference, &branch).await?;
        let total_entries = tree.len();
        let files: Vec<_> = select_source_entries(tree, max_files)
            .into_iter()
            .map(|path| SourceFile {
                raw_url: self.raw_url(reference, &branch, &path),
                path,
            })
            .collect();
        debug!(%branch, total_entries, selected = files.len(), "listed repository sources");
        Ok(files)
    }
}

#[async_trait]
impl ContentFetcher for GithubClient {
    async fn fetch_all(&self, files: Vec<SourceFile>) -> Vec<SourceFileWithContent> {
        join_all(files.into_iter().map(|file| self.fetch_one(file))).await
    }
}

#[derive(Deserialize)]
struct RepositoryMetadata {
    #[serde(default)]
    default_branch: Option<String>,
}

#[derive(Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Option<Vec<TreeEntry>>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeEntry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    path: Option<String>,
}
