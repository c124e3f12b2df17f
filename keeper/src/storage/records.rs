//! Deployment record store
//!
//! Durable, ordered log of [`DeploymentRecord`]s (most recent first) plus the
//! derived "current release" pointer. Every mutation runs under one mutex that
//! is held across mutate-and-persist, and the history file is replaced
//! atomically, so concurrent webhook and operator calls cannot lose updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::deploy::fsm;
use crate::errors::KeeperError;
use crate::filesys::file::File;
use crate::models::deployment::{DeploymentRecord, DeploymentStatus};
use crate::telemetry;

/// Version written into the history document
pub const HISTORY_SCHEMA_VERSION: u32 = 1;

/// On-disk history document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryDocument {
    pub schema_version: u32,
    pub deployments: Vec<DeploymentRecord>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PersistedHistory {
    Versioned(HistoryDocument),
    Legacy(Vec<DeploymentRecord>),
}

/// Deployment record store
pub struct RecordStore {
    file: File,
    records: Mutex<Vec<DeploymentRecord>>,
}

impl RecordStore {
    /// Open the store, loading any persisted history.
    ///
    /// A missing or unreadable history file yields an empty store.
    pub async fn open(file: File) -> Self {
        let records = load_history(&file).await;
        info!(
            "Loaded {} deployment records from {}",
            records.len(),
            file.path().display()
        );
        Self {
            file,
            records: Mutex::new(records),
        }
    }

    /// Path of the backing history file
    pub fn file(&self) -> &File {
        &self.file
    }

    /// Add a record at the head of the history and persist
    pub async fn append(
        &self,
        mut record: DeploymentRecord,
    ) -> Result<DeploymentRecord, KeeperError> {
        let mut records = self.records.lock().await;

        if records.iter().any(|r| r.id == record.id) {
            return Err(KeeperError::Internal(format!(
                "Duplicate deployment id: {}",
                record.id
            )));
        }
        if let Some(previous_id) = &record.previous_id {
            if !records.iter().any(|r| &r.id == previous_id) {
                return Err(KeeperError::PreconditionFailed(format!(
                    "previous deployment {} does not exist",
                    previous_id
                )));
            }
        }

        // createdAt must follow insertion order even when the clock stalls
        if let Some(head) = records.first() {
            if record.created_at <= head.created_at {
                record.created_at = head.created_at + chrono::Duration::microseconds(1);
            }
        }

        records.insert(0, record.clone());
        refresh_rollback_eligibility(&mut records);
        info!(
            "Recorded deployment {} ({} on {}, status {})",
            record.id, record.revision, record.git_ref, record.status
        );

        self.persist(&records).await?;
        Ok(record)
    }

    /// Change the status of a record and persist.
    ///
    /// Moving a record to `Success` makes it current and the release it
    /// replaces becomes rollback eligible. Records older than the current
    /// release cannot become `Success` again (`InvalidTransition`).
    pub async fn update_status(
        &self,
        id: &str,
        status: DeploymentStatus,
        health_check_passed: Option<bool>,
    ) -> Result<DeploymentRecord, KeeperError> {
        let mut records = self.records.lock().await;

        let position = records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| KeeperError::NotFound(id.to_string()))?;

        // Success must make the record current, so a newer release blocks it
        if status == DeploymentStatus::Success {
            if let Some(newer) = records[..position]
                .iter()
                .find(|r| r.status == DeploymentStatus::Success)
            {
                return Err(KeeperError::InvalidTransition(format!(
                    "{} is older than current release {}",
                    id, newer.id
                )));
            }
        }

        let record = &mut records[position];
        let previous = record.status;
        record.status = fsm::transition(previous, status)?;
        if let Some(passed) = health_check_passed {
            record.health_check_passed = Some(passed);
        }
        debug!("Deployment {} status: {} -> {}", id, previous, status);

        refresh_rollback_eligibility(&mut records);
        let updated = records[position].clone();

        telemetry::record_status(status);
        self.persist(&records).await?;
        Ok(updated)
    }

    /// All records, most recent first
    pub async fn list(&self) -> Vec<DeploymentRecord> {
        self.records.lock().await.clone()
    }

    /// Look up one record
    pub async fn get(&self, id: &str) -> Result<DeploymentRecord, KeeperError> {
        self.records
            .lock()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| KeeperError::NotFound(id.to_string()))
    }

    /// The current release: the most recently created `Success` record
    pub async fn current(&self) -> Result<DeploymentRecord, KeeperError> {
        self.records
            .lock()
            .await
            .iter()
            .find(|r| r.status == DeploymentStatus::Success)
            .cloned()
            .ok_or_else(|| KeeperError::NotFound("no current release".to_string()))
    }

    /// Records still pending or deploying that were created before `cutoff`
    pub async fn stuck(&self, cutoff: DateTime<Utc>) -> Vec<DeploymentRecord> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| r.status.is_in_flight() && r.created_at < cutoff)
            .cloned()
            .collect()
    }

    async fn persist(&self, records: &[DeploymentRecord]) -> Result<(), KeeperError> {
        let document = HistoryDocument {
            schema_version: HISTORY_SCHEMA_VERSION,
            deployments: records.to_vec(),
        };

        if let Err(e) = self.file.write_json_atomic(&document).await {
            // The in-memory history is now ahead of the file on disk
            error!(
                "PERSISTENCE FAILED for {}: {}; in-memory deployment history has diverged from disk",
                self.file.path().display(),
                e
            );
            telemetry::persistence_failed();
            return Err(KeeperError::PersistenceFailed(e.to_string()));
        }
        Ok(())
    }
}

/// Recompute `rollback_eligible` for the whole history.
///
/// A record is eligible when it is `Success` and a newer `Success` exists.
fn refresh_rollback_eligibility(records: &mut [DeploymentRecord]) {
    let mut newer_success = false;
    for record in records.iter_mut() {
        let is_success = record.status == DeploymentStatus::Success;
        record.rollback_eligible = is_success && newer_success;
        newer_success |= is_success;
    }
}

async fn load_history(file: &File) -> Vec<DeploymentRecord> {
    if !file.exists().await {
        warn!(
            "No deployment history at {}, starting empty",
            file.path().display()
        );
        return Vec::new();
    }

    match file.read_json::<PersistedHistory>().await {
        Ok(PersistedHistory::Versioned(document)) => {
            if document.schema_version > HISTORY_SCHEMA_VERSION {
                warn!(
                    "Deployment history schema version {} is newer than supported version {}",
                    document.schema_version, HISTORY_SCHEMA_VERSION
                );
            }
            document.deployments
        }
        Ok(PersistedHistory::Legacy(records)) => {
            info!("Loaded unversioned deployment history, it will be rewritten on next change");
            records
        }
        Err(e) => {
            warn!(
                "Unable to read deployment history at {}: {}; starting empty",
                file.path().display(),
                e
            );
            // the next persist would overwrite it
            if matches!(e, KeeperError::JsonError(_)) {
                let suffix = format!("corrupt-{}", Utc::now().format("%Y%m%dT%H%M%SZ"));
                match file.move_aside(&suffix).await {
                    Ok(moved) => warn!(
                        "Unreadable deployment history kept at {}",
                        moved.path().display()
                    ),
                    Err(e) => error!("Unable to keep unreadable deployment history: {}", e),
                }
            }
            Vec::new()
        }
    }
}
