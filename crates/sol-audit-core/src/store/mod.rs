use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result as AnyResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::audit::AuditResult;

pub mod file_store;

pub use file_store::FileAuditStore;

/// A persisted single-file audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub user_id: String,
    pub source_code: String,
    pub report: AuditResult,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(user_id: &str, source_code: &str, report: AuditResult) -> Result<Self, StoreError> {
        validate_user_id(user_id)?;
        Ok(Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            source_code: source_code.to_string(),
            report,
            created_at: Utc::now(),
        })
    }
}

/// Validation errors for store keys.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("user id must not be blank")]
    BlankUser,
    #[error("user id `{0}` may only contain ASCII letters, digits, `-`, `_`, `.` and `@`")]
    InvalidUser(String),
}

pub(crate) fn validate_user_id(user_id: &str) -> Result<(), StoreError> {
    if user_id.trim().is_empty() {
        return Err(StoreError::BlankUser);
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@');
    if !user_id.chars().all(allowed) || user_id.starts_with('.') {
        return Err(StoreError::InvalidUser(user_id.to_string()));
    }
    Ok(())
}

/// Per-user history of single-file audits, keyed by user identity.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist a new audit for `user_id` and return the stored record.
    async fn save(&self, user_id: &str, source_code: &str, report: &AuditResult)
        -> AnyResult<AuditRecord>;

    /// All audits for `user_id`, newest first.
    async fn list_for_user(&self, user_id: &str) -> AnyResult<Vec<AuditRecord>>;
}

fn newest_first(records: &mut [AuditRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Volatile store used by tests and one-shot sessions.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    records: Mutex<HashMap<String, Vec<AuditRecord>>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn save(
        &self,
        user_id: &str,
        source_code: &str,
        report: &AuditResult,
    ) -> AnyResult<AuditRecord> {
        let record = AuditRecord::new(user_id, source_code, report.clone())?;
        let mut guard = self
            .records
            .lock()
            .map_err(|_| anyhow!("audit store lock poisoned"))?;
        guard
            .entry(user_id.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn list_for_user(&self, user_id: &str) -> AnyResult<Vec<AuditRecord>> {
        validate_user_id(user_id)?;
        let guard = self
            .records
            .lock()
            .map_err(|_| anyhow!("audit store lock poisoned"))?;
        let mut records = guard.get(user_id).cloned().unwrap_or_default();
        newest_first(&mut records);
        Ok(records)
    }
}
