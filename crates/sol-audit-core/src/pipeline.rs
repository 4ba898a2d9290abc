//! Repository audit orchestration.
//!
//! A run moves through listing, size checking and sequential auditing.
//! Listing and size failures end the run with no partial result; once
//! auditing starts every file ends up either audited or carrying the
//! fallback result, and the run always completes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::audit::{AuditResult, AuditSnapshot, FileOutcome};
use crate::llm::SourceAuditor;
use crate::source::{ContentFetcher, ListingError, RepositoryReference, SourceLister};

pub const DEFAULT_MAX_FILES: usize = 10;
pub const DEFAULT_TOTAL_LINE_CAP: usize = 2000;

/// Caller-supplied limits for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum number of source files taken from the repository tree.
    pub max_files: usize,
    /// Maximum total line count across fetched files.
    pub total_line_cap: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            total_line_cap: DEFAULT_TOTAL_LINE_CAP,
        }
    }
}

/// Terminal failures of a repository audit run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Listing(#[from] ListingError),
    #[error("no Solidity files found in {repository}")]
    NoSourceFilesFound { repository: String },
    #[error(
        "repository too large: {total_lines} total lines of Solidity exceeds the limit of {cap}"
    )]
    RepositoryTooLarge { total_lines: usize, cap: usize },
}

/// Lists, fetches and audits the Solidity files of a repository.
pub struct RepositoryAuditPipeline<L, F> {
    lister: Arc<L>,
    fetcher: Arc<F>,
    config: PipelineConfig,
}

impl<L, F> RepositoryAuditPipeline<L, F>
where
    L: SourceLister,
    F: ContentFetcher,
{
    pub fn new(lister: Arc<L>, fetcher: Arc<F>) -> Self {
        Self::with_config(lister, fetcher, PipelineConfig::default())
    }

    pub fn with_config(lister: Arc<L>, fetcher: Arc<F>, config: PipelineConfig) -> Self {
        Self {
            lister,
            fetcher,
            config,
        }
    }

    pub fn config(&self) -> PipelineConfig {
        self.config
    }

    /// Audit every listed file and return the final snapshot.
    ///
    /// `on_progress` receives an owned copy of the snapshot after each file
    /// is audited, in listing order.
    #[instrument(name = "repository_audit", skip(self, auditor, on_progress))]
    pub async fn run<A, P>(
        &self,
        reference: &str,
        auditor: &A,
        mut on_progress: P,
    ) -> Result<AuditSnapshot, PipelineError>
    where
        A: SourceAuditor + ?Sized,
        P: FnMut(AuditSnapshot) + Send,
    {
        let reference = RepositoryReference::parse(reference)?;

        let files = self
            .lister
            .list(&reference, self.config.max_files)
            .await?;
        if files.is_empty() {
            return Err(PipelineError::NoSourceFilesFound {
                repository: reference.to_string(),
            });
        }
        info!(files = files.len(), repository = %reference, "listed source files");

        let fetched = self.fetcher.fetch_all(files).await;
        let total_lines: usize = fetched.iter().map(|f| f.line_count()).sum();
        debug!(total_lines, cap = self.config.total_line_cap, "size check");
        if total_lines > self.config.total_line_cap {
            return Err(PipelineError::RepositoryTooLarge {
                total_lines,
                cap: self.config.total_line_cap,
            });
        }

        let mut snapshot = AuditSnapshot {
            file_order: fetched.iter().map(|f| f.file.path.clone()).collect(),
            ..Default::default()
        };

        for (index, file) in fetched.iter().enumerate() {
            let path = &file.file.path;
            if file.content.is_empty() {
                warn!(%path, "skipping file without content");
                continue;
            }
            debug!(index, %path, "auditing file");
            let outcome = match auditor.audit(&file.content).await {
                Ok(result) => FileOutcome::Audited { result },
                Err(err) => {
                    warn!(%path, error = %format!("{err:#}"), "audit failed; using fallback result");
                    FileOutcome::Fallback {
                        result: AuditResult::fallback(),
                        reason: format!("{err:#}"),
                    }
                }
            };
            snapshot.results.insert(path.clone(), outcome);
            on_progress(snapshot.clone());
        }

        info!(
            audited = snapshot.results.len(),
            fallbacks = snapshot.fallback_count(),
            "repository audit complete"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{Severity, Vulnerability};
    use crate::source::{SourceFile, SourceFileWithContent};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeRepository {
        files: Vec<(String, String)>,
    }

    impl FakeRepository {
        fn new(files: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                files: files
                    .iter()
                    .map(|(p, c)| (p.to_string(), c.to_string()))
                    .collect(),
            })
        }
    }

    #[async_trait]
    impl SourceLister for FakeRepository {
        async fn list(
            &self,
            reference: &RepositoryReference,
            max_files: usize,
        ) -> Result<Vec<SourceFile>, ListingError> {
            Ok(self
                .files
                .iter()
                .filter(|(path, _)| path.ends_with(".sol"))
                .take(max_files)
                .map(|(path, _)| SourceFile {
                    path: path.clone(),
                    raw_url: format!("mem://{}/{}/{path}", reference.owner, reference.repo),
                })
                .collect())
        }
    }

    #[async_trait]
    impl ContentFetcher for FakeRepository {
        async fn fetch_all(&self, files: Vec<SourceFile>) -> Vec<SourceFileWithContent> {
            let contents: HashMap<_, _> = self.files.iter().cloned().collect();
            files
                .into_iter()
                .map(|file| SourceFileWithContent {
                    content: contents.get(&file.path).cloned().unwrap_or_default(),
                    file,
                })
                .collect()
        }
    }

    /// Audits by echoing the first line of the source as a finding; fails on sources containing `FAIL`.
    #[derive(Default)]
    struct EchoAuditor {
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SourceAuditor for EchoAuditor {
        async fn audit(&self, source: &str) -> Result<AuditResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(source.to_string());
            if source.contains("FAIL") {
                return Err(anyhow!("vendor exploded"));
            }
            Ok(AuditResult {
                vulnerabilities: vec![Vulnerability {
                    line: 1,
                    kind: "Echo".into(),
                    message: source.lines().next().unwrap_or_default().to_string(),
                    severity: Severity::Low,
                }],
                explanations: vec![],
                suggested_fixes: vec![],
            })
        }
    }

    fn lines(n: usize) -> String {
        (1..=n)
            .map(|i| format!("// line {i}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn pipeline(
        repo: &Arc<FakeRepository>,
        config: PipelineConfig,
    ) -> RepositoryAuditPipeline<FakeRepository, FakeRepository> {
        RepositoryAuditPipeline::with_config(Arc::clone(repo), Arc::clone(repo), config)
    }

    const URL: &str = "https://github.com/acme/demo";

    #[tokio::test]
    async fn isolates_per_file_failures() {
        let repo = FakeRepository::new(&[
            ("one.sol", "contract One {}"),
            ("two.sol", "contract Two { FAIL }"),
            ("three.sol", "contract Three {}"),
        ]);
        let auditor = EchoAuditor::default();
        let snapshot = pipeline(&repo, PipelineConfig::default())
            .run(URL, &auditor, |_| {})
            .await
            .unwrap();

        assert_eq!(snapshot.file_order, vec!["one.sol", "two.sol", "three.sol"]);
        assert_eq!(snapshot.results.len(), 3);
        assert!(matches!(
            snapshot.results["one.sol"],
            FileOutcome::Audited { .. }
        ));
        let two = &snapshot.results["two.sol"];
        assert!(two.is_fallback());
        assert_eq!(two.result(), &AuditResult::fallback());
        assert_eq!(
            snapshot.results["three.sol"].result().vulnerabilities[0].message,
            "contract Three {}"
        );
    }

    #[tokio::test]
    async fn publishes_snapshots_in_listing_order() {
        let repo = FakeRepository::new(&[
            ("a.sol", "contract A {}"),
            ("b.sol", ""),
            ("c.sol", "contract C {}"),
        ]);
        let auditor = EchoAuditor::default();
        let mut published = Vec::new();
        let final_snapshot = pipeline(&repo, PipelineConfig::default())
            .run(URL, &auditor, |snapshot| published.push(snapshot))
            .await
            .unwrap();

        assert_eq!(published.len(), 2);
        assert_eq!(published[0].results.len(), 1);
        assert!(published[0].results.contains_key("a.sol"));
        assert_eq!(published[0].file_order, vec!["a.sol", "b.sol", "c.sol"]);
        assert_eq!(published[1].results.len(), 2);
        assert_eq!(published.last(), Some(&final_snapshot));
    }

    #[tokio::test]
    async fn empty_content_is_listed_but_not_audited() {
        let repo = FakeRepository::new(&[("a.sol", "contract A {}"), ("empty.sol", "")]);
        let auditor = EchoAuditor::default();
        let snapshot = pipeline(&repo, PipelineConfig::default())
            .run(URL, &auditor, |_| {})
            .await
            .unwrap();

        assert_eq!(snapshot.file_order, vec!["a.sol", "empty.sol"]);
        assert!(!snapshot.results.contains_key("empty.sol"));
        assert_eq!(auditor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_source_files_is_terminal() {
        let repo = FakeRepository::new(&[("README.md", "# demo"), ("lib/x.js", "x")]);
        let auditor = EchoAuditor::default();
        let mut published = 0;
        let err = pipeline(&repo, PipelineConfig::default())
            .run(URL, &auditor, |_| published += 1)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::NoSourceFilesFound { ref repository } if repository == "acme/demo"));
        assert_eq!(published, 0);
        assert_eq!(auditor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn oversized_repository_is_rejected_before_auditing() {
        let repo = FakeRepository::new(&[("a.sol", &lines(10)), ("b.sol", &lines(5))]);
        let auditor = EchoAuditor::default();
        let err = pipeline(
            &repo,
            PipelineConfig {
                max_files: 10,
                total_line_cap: 12,
            },
        )
        .run(URL, &auditor, |_| {})
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::RepositoryTooLarge {
                total_lines: 15,
                cap: 12
            }
        ));
        assert!(err.to_string().contains("12"));
        assert_eq!(auditor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn line_cap_is_inclusive() {
        let repo = FakeRepository::new(&[("a.sol", &lines(10)), ("b.sol", &lines(5))]);
        let auditor = EchoAuditor::default();
        let snapshot = pipeline(
            &repo,
            PipelineConfig {
                max_files: 10,
                total_line_cap: 15,
            },
        )
        .run(URL, &auditor, |_| {})
        .await
        .unwrap();
        assert_eq!(snapshot.results.len(), 2);
    }

    #[tokio::test]
    async fn max_files_caps_the_run() {
        let names: Vec<String> = (0..15).map(|i| format!("c{i:02}.sol")).collect();
        let files: Vec<(&str, &str)> = names.iter().map(|n| (n.as_str(), "contract X {}")).collect();
        let repo = FakeRepository::new(&files);
        let auditor = EchoAuditor::default();
        let snapshot = pipeline(
            &repo,
            PipelineConfig {
                max_files: 4,
                total_line_cap: 2000,
            },
        )
        .run(URL, &auditor, |_| {})
        .await
        .unwrap();

        assert_eq!(snapshot.file_order, names[..4].to_vec());
        assert_eq!(auditor.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn invalid_reference_fails_before_listing() {
        let repo = FakeRepository::new(&[("a.sol", "contract A {}")]);
        let auditor = EchoAuditor::default();
        let err = pipeline(&repo, PipelineConfig::default())
            .run("not a url", &auditor, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Listing(ListingError::InvalidReference { .. })
        ));
    }

    #[tokio::test]
    async fn audits_run_sequentially_in_order() {
        let repo = FakeRepository::new(&[
            ("z.sol", "contract Z {}"),
            ("a.sol", "contract A {}"),
            ("m.sol", "contract M {}"),
        ]);
        let auditor = EchoAuditor::default();
        pipeline(&repo, PipelineConfig::default())
            .run(URL, &auditor, |_| {})
            .await
            .unwrap();
        assert_eq!(
            *auditor.seen.lock().unwrap(),
            vec!["contract Z {}", "contract A {}", "contract M {}"]
        );
    }
}
