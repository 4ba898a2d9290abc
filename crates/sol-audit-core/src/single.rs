use serde::Serialize;
use tracing::warn;

use crate::audit::AuditResult;
use crate::llm::SourceAuditor;

/// Result of auditing one pasted source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SingleAudit {
    Live { result: AuditResult },
    Fallback { result: AuditResult, reason: String },
}

impl SingleAudit {
    pub fn result(&self) -> &AuditResult {
        match self {
            Self::Live { result } | Self::Fallback { result, .. } => result,
        }
    }

    /// Only live results are worth persisting.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live { .. })
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            Self::Fallback { reason, .. } => Some(reason),
            Self::Live { .. } => None,
        }
    }
}

/// Audit a single source text, substituting the fallback result when no
/// auditor is configured or the audit fails.
pub async fn audit_single<A>(auditor: Option<&A>, source: &str) -> SingleAudit
where
    A: SourceAuditor + ?Sized,
{
    let Some(auditor) = auditor else {
        return SingleAudit::Fallback {
            result: AuditResult::fallback(),
            reason: "no API key configured; showing sample results".into(),
        };
    };
    match auditor.audit(source).await {
        Ok(result) => SingleAudit::Live { result },
        Err(err) => {
            let reason = format!("{err:#}");
            warn!(error = %reason, "single-file audit failed; using fallback result");
            SingleAudit::Fallback {
                result: AuditResult::fallback(),
                reason,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    struct FixedAuditor(Option<AuditResult>);

    #[async_trait]
    impl SourceAuditor for FixedAuditor {
        async fn audit(&self, _source: &str) -> Result<AuditResult> {
            self.0.clone().ok_or_else(|| anyhow!("quota exceeded"))
        }
    }

    fn empty_result() -> AuditResult {
        AuditResult {
            vulnerabilities: vec![],
            explanations: vec![],
            suggested_fixes: vec![],
        }
    }

    #[tokio::test]
    async fn missing_auditor_falls_back() {
        let outcome = audit_single::<FixedAuditor>(None, "contract A {}").await;
        assert!(!outcome.is_live());
        assert_eq!(outcome.result(), &AuditResult::fallback());
        assert!(outcome.fallback_reason().unwrap().contains("no API key"));
    }

    #[tokio::test]
    async fn failure_surfaces_reason_with_fallback() {
        let auditor = FixedAuditor(None);
        let outcome = audit_single(Some(&auditor), "contract A {}").await;
        assert_eq!(outcome.result(), &AuditResult::fallback());
        assert_eq!(outcome.fallback_reason(), Some("quota exceeded"));
    }

    #[tokio::test]
    async fn success_is_live() {
        let auditor = FixedAuditor(Some(empty_result()));
        let outcome = audit_single(Some(&auditor), "contract A {}").await;
        assert!(outcome.is_live());
        assert_eq!(outcome.result(), &empty_result());
    }
}
