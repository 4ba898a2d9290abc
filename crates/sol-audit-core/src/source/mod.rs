use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod github;

pub use github::{GithubClient, GithubSettings};

/// File extension selected for auditing.
pub const SOURCE_EXTENSION: &str = ".sol";

static REPOSITORY_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://github\.com/([^/]+)/([^/]+)(?:/tree/([^/]+))?")
        .expect("repository url regex is valid")
});

/// Owner/repository/branch triple parsed from a GitHub URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryReference {
    pub owner: String,
    pub repo: String,
    /// Explicit branch from a `/tree/{branch}` suffix; resolved later when absent.
    pub branch: Option<String>,
}

impl RepositoryReference {
    /// Parse `https://github.com/{owner}/{repo}[/tree/{branch}]`.
    ///
    /// Only the prefix is matched, so trailing segments such as a path
    /// inside the branch are ignored.
    pub fn parse(input: &str) -> Result<Self, ListingError> {
        let invalid = || ListingError::InvalidReference {
            input: input.to_string(),
        };
        let captures = REPOSITORY_URL.captures(input.trim()).ok_or_else(invalid)?;
        let owner = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        let repo = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
        if owner.trim().is_empty() || repo.trim().is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: captures.get(3).map(|m| m.as_str().to_string()),
        })
    }
}

impl FromStr for RepositoryReference {
    type Err = ListingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RepositoryReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)?;
        if let Some(branch) = &self.branch {
            write!(f, "@{branch}")?;
        }
        Ok(())
    }
}

/// A repository file selected for auditing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Repository-relative path.
    pub path: String,
    /// Direct address of the raw file content.
    pub raw_url: String,
}

/// A listed file plus its fetched content; empty when the fetch failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFileWithContent {
    #[serde(flatten)]
    pub file: SourceFile,
    pub content: String,
}

impl SourceFileWithContent {
    /// Number of newline-delimited segments; empty content counts as zero.
    pub fn line_count(&self) -> usize {
        if self.content.is_empty() {
            0
        } else {
            self.content.split('\n').count()
        }
    }
}

/// Errors raised while resolving and listing a repository.
#[derive(Debug, Error)]
pub enum ListingError {
    #[error("unsupported or invalid GitHub repository URL `{input}`")]
    InvalidReference { input: String },
    #[error("couldn't resolve default branch for {owner}/{repo}: {reason}")]
    BranchResolution {
        owner: String,
        repo: String,
        reason: String,
    },
    #[error("could not fetch file tree for {owner}/{repo}@{branch}: {reason}")]
    TreeFetch {
        owner: String,
        repo: String,
        branch: String,
        reason: String,
    },
}

/// Lists the auditable files of a repository.
#[async_trait]
pub trait SourceLister: Send + Sync {
    /// Return at most `max_files` source files in repository tree order.
    async fn list(
        &self,
        reference: &RepositoryReference,
        max_files: usize,
    ) -> Result<Vec<SourceFile>, ListingError>;
}

/// Retrieves raw content for listed files.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch every file; output preserves input order and length and never fails as a whole.
    async fn fetch_all(&self, files: Vec<SourceFile>) -> Vec<SourceFileWithContent>;
}
