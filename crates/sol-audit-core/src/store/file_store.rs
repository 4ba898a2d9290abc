use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use super::{newest_first, validate_user_id, AuditRecord, AuditStore};
use crate::audit::AuditResult;

/// Stores each user's audits as a JSON array in `<base>/<user>.json`.
pub struct FileAuditStore {
    base_path: PathBuf,
}

impl FileAuditStore {
    /// Create a store rooted at the given directory; it is created on first save.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn user_path(&self, user_id: &str) -> PathBuf {
        self.base_path.join(format!("{user_id}.json"))
    }

    async fn load(&self, path: &Path) -> Result<Vec<AuditRecord>> {
        let raw = match fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read audit history at {}", path.display()))
            }
        };
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid audit history file at {}", path.display()))
    }
}

#[async_trait]
impl AuditStore for FileAuditStore {
    async fn save(
        &self,
        user_id: &str,
        source_code: &str,
        report: &AuditResult,
    ) -> Result<AuditRecord> {
        let record = AuditRecord::new(user_id, source_code, report.clone())?;
        let path = self.user_path(user_id);
        let mut records = self.load(&path).await?;
        records.push(record.clone());

        fs::create_dir_all(&self.base_path).await.with_context(|| {
            format!(
                "failed to create audit store directory {}",
                self.base_path.display()
            )
        })?;
        let serialized = serde_json::to_string_pretty(&records)?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, serialized)
            .await
            .with_context(|| format!("failed to write {}", staging.display()))?;
        fs::rename(&staging, &path)
            .await
            .with_context(|| format!("failed to replace {}", path.display()))?;
        debug!(user = user_id, total = records.len(), "saved audit record");
        Ok(record)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<AuditRecord>> {
        validate_user_id(user_id)?;
        let mut records = self.load(&self.user_path(user_id)).await?;
        newest_first(&mut records);
        Ok(records)
    }
}
