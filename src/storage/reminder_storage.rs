use std::{path::Path, path::PathBuf, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

use crate::reminder::{Reminder, ReminderId, ValidationError};

use super::model::{NewReminder, UpdateReminder};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("reminder document at {} is malformed: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize reminder document: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("writing {} did not finish within {timeout:?}", path.display())]
    Timeout { path: PathBuf, timeout: Duration },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("reminder {0} does not exist")]
    NotFound(ReminderId),
    #[error("no reminder id is left after {0}")]
    IdsExhausted(ReminderId),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Owner of all reminder state.
///
/// Every call is atomic with respect to other callers, and every mutating call has
/// persisted the complete store by the time it returns successfully. A failed
/// mutation leaves the in-memory state as it was before the call.
#[async_trait]
pub trait ReminderStorage: Send + Sync {
    async fn get(&self, id: ReminderId) -> Option<Reminder>;

    /// Snapshot of all reminders in insertion order.
    async fn get_all(&self) -> Vec<Reminder>;

    async fn insert(&self, reminder: NewReminder) -> Result<Reminder, StorageError>;

    async fn update(&self, reminder: UpdateReminder) -> Result<Reminder, StorageError>;

    /// Flips the active flag. The fired date is left untouched.
    async fn toggle_active(&self, id: ReminderId) -> Result<Reminder, StorageError>;

    /// Removing an unknown id is not an error.
    async fn remove(&self, id: ReminderId) -> Result<(), StorageError>;

    /// Writes the current store to `path` without touching the primary location.
    async fn export(&self, path: &Path) -> Result<(), StorageError>;
}
