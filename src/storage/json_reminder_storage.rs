use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex as StdMutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::{fs, sync::Mutex};

use crate::reminder::{Reminder, ReminderFireTime, ReminderId, validate_text};

use super::{
    NewReminder, PersistenceError, ReminderDocument, ReminderStorage, ReminderStorageModel,
    StorageError, UpdateReminder,
};

pub const DEFAULT_PERSIST_TIMEOUT: Duration = Duration::from_secs(5);

static TEMP_FILE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

struct JsonReminderStore {
    document: ReminderDocument,
    last_id: ReminderId,
}

impl JsonReminderStore {
    fn new(document: ReminderDocument) -> Self {
        let last_id = document
            .reminders
            .iter()
            .map(|reminder| reminder.id)
            .max()
            .unwrap_or(0);

        Self { document, last_id }
    }

    /// Millisecond timestamp, bumped past the largest id seen so far.
    fn next_id(&self) -> Result<ReminderId, StorageError> {
        let after_last = self
            .last_id
            .checked_add(1)
            .ok_or(StorageError::IdsExhausted(self.last_id))?;

        Ok(Utc::now().timestamp_millis().max(after_last))
    }
}

/// Reminder store backed by a single JSON document that is rewritten on every mutation.
pub struct JsonReminderStorage {
    path: PathBuf,
    persist_timeout: Duration,
    store: Mutex<JsonReminderStore>,
}

impl JsonReminderStorage {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        Self::open_with_timeout(path, DEFAULT_PERSIST_TIMEOUT).await
    }

    /// Loads the document at `path`.
    ///
    /// A missing file is created empty right away. An unreadable or malformed file is
    /// left on disk as it is and the store starts empty; the next mutation replaces it.
    pub async fn open_with_timeout(path: impl Into<PathBuf>, persist_timeout: Duration) -> Self {
        let path = path.into();

        let document = match read_document(&path).await {
            Ok(Some(document)) => {
                log::info!(
                    "Loaded {} reminders from {}",
                    document.reminders.len(),
                    path.display()
                );
                document
            }
            Ok(None) => {
                log::info!("No reminder document at {}, creating one", path.display());
                let document = ReminderDocument::default();
                if let Err(err) = write_document(&path, &document, persist_timeout).await {
                    log::warn!("Unable to create the reminder document. [error = {err}]");
                }
                document
            }
            Err(err) => {
                log::warn!(
                    "Ignoring unreadable reminder document, starting empty. The file is replaced on the next save. [error = {err}]"
                );
                ReminderDocument::default()
            }
        };

        Self {
            path,
            persist_timeout,
            store: Mutex::new(JsonReminderStore::new(document)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persists `document` and only then makes it the current state.
    async fn commit(
        &self,
        store: &mut JsonReminderStore,
        document: ReminderDocument,
    ) -> Result<(), PersistenceError> {
        write_document(&self.path, &document, self.persist_timeout).await?;
        store.document = document;
        Ok(())
    }

    async fn modify<F>(&self, id: ReminderId, apply: F) -> Result<Reminder, StorageError>
    where
        F: FnOnce(&mut ReminderStorageModel) + Send,
    {
        let mut store = self.store.lock().await;
        let mut document = store.document.clone();
        let reminder = document
            .reminders
            .iter_mut()
            .find(|reminder| reminder.id == id)
            .ok_or(StorageError::NotFound(id))?;

        apply(reminder);
        let updated = reminder.clone();

        self.commit(&mut store, document).await?;
        Ok(updated.into())
    }
}

#[async_trait]
impl ReminderStorage for JsonReminderStorage {
    async fn get(&self, id: ReminderId) -> Option<Reminder> {
        let store = self.store.lock().await;
        store
            .document
            .reminders
            .iter()
            .find(|reminder| reminder.id == id)
            .cloned()
            .map(Into::into)
    }

    async fn get_all(&self) -> Vec<Reminder> {
        let store = self.store.lock().await;
        store
            .document
            .reminders
            .iter()
            .cloned()
            .map(Into::into)
            .collect()
    }

    async fn insert(&self, reminder: NewReminder) -> Result<Reminder, StorageError> {
        let text = validate_text(&reminder.text)?;
        let fire_at: ReminderFireTime = reminder.fire_at.parse()?;

        let mut store = self.store.lock().await;
        let created = ReminderStorageModel {
            id: store.next_id()?,
            text,
            fire_at: fire_at.to_string(),
            active: reminder.active,
            last_fired_on: None,
        };

        let mut document = store.document.clone();
        document.reminders.push(created.clone());
        self.commit(&mut store, document).await?;
        store.last_id = created.id;

        log::info!("Created reminder {} at {}", created.id, created.fire_at);
        Ok(created.into())
    }

    async fn update(&self, update: UpdateReminder) -> Result<Reminder, StorageError> {
        let UpdateReminder {
            id,
            text,
            fire_at,
            active,
            last_fired_on,
        } = update;

        let text = text.as_deref().map(validate_text).transpose()?;
        let fire_at = fire_at
            .as_deref()
            .map(str::parse::<ReminderFireTime>)
            .transpose()?;

        self.modify(id, move |reminder| {
            if let Some(text) = text {
                reminder.text = text;
            }
            if let Some(fire_at) = fire_at {
                reminder.fire_at = fire_at.to_string();
            }
            if let Some(active) = active {
                reminder.active = active;
            }
            if let Some(last_fired_on) = last_fired_on {
                reminder.last_fired_on = last_fired_on;
            }
        })
        .await
    }

    async fn toggle_active(&self, id: ReminderId) -> Result<Reminder, StorageError> {
        self.modify(id, |reminder| reminder.active = !reminder.active).await
    }

    async fn remove(&self, id: ReminderId) -> Result<(), StorageError> {
        let mut store = self.store.lock().await;
        let mut document = store.document.clone();
        let before = document.reminders.len();
        document.reminders.retain(|reminder| reminder.id != id);

        if document.reminders.len() == before {
            log::debug!("Reminder {id} is already gone");
        }

        self.commit(&mut store, document).await?;
        Ok(())
    }

    async fn export(&self, path: &Path) -> Result<(), StorageError> {
        let store = self.store.lock().await;
        write_document(path, &store.document, self.persist_timeout).await?;
        log::info!(
            "Exported {} reminders to {}",
            store.document.reminders.len(),
            path.display()
        );
        Ok(())
    }
}

async fn read_document(path: &Path) -> Result<Option<ReminderDocument>, PersistenceError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PersistenceError::Io {
                path: path.to_owned(),
                source,
            });
        }
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| PersistenceError::Malformed {
            path: path.to_owned(),
            source,
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteStage {
    Writing,
    Renamed,
    Abandoned,
}

/// Writes the full document next to `path` and renames it into place, so readers only
/// ever see a complete snapshot.
///
/// A write that misses `timeout` is abandoned before its rename. If the rename already
/// happened the write counts as done, so the file on disk always matches the outcome
/// reported to the caller.
async fn write_document(
    path: &Path,
    document: &ReminderDocument,
    timeout: Duration,
) -> Result<(), PersistenceError> {
    let mut json = serde_json::to_vec_pretty(document)?;
    json.push(b'\n');

    let stage = Arc::new(StdMutex::new(WriteStage::Writing));
    let mut write = tokio::task::spawn_blocking({
        let path = path.to_owned();
        let stage = stage.clone();
        move || replace_file(&path, &json, &stage)
    });

    let joined = match tokio::time::timeout(timeout, &mut write).await {
        Ok(joined) => joined,
        Err(_) => {
            if abandon(&stage) {
                return Err(PersistenceError::Timeout {
                    path: path.to_owned(),
                    timeout,
                });
            }

            log::warn!(
                "Writing {} took longer than {timeout:?} but completed",
                path.display()
            );
            write.await
        }
    };

    joined.map_err(|err| PersistenceError::Io {
        path: path.to_owned(),
        source: std::io::Error::other(err),
    })?
}

/// Marks the write abandoned unless its rename already went through.
fn abandon(stage: &StdMutex<WriteStage>) -> bool {
    let mut stage = stage.lock().unwrap_or_else(PoisonError::into_inner);
    if *stage == WriteStage::Renamed {
        return false;
    }

    *stage = WriteStage::Abandoned;
    true
}

fn replace_file(
    path: &Path,
    json: &[u8],
    stage: &StdMutex<WriteStage>,
) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error(parent))?;
    }

    let sequence = TEMP_FILE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let tmp_path = path.with_extension(format!("json.{sequence}.tmp"));
    std::fs::write(&tmp_path, json).map_err(io_error(&tmp_path))?;

    // Held across the rename so a timeout cannot be reported while it is in flight.
    let mut stage = stage.lock().unwrap_or_else(PoisonError::into_inner);
    if *stage == WriteStage::Abandoned {
        let _ = std::fs::remove_file(&tmp_path);
        return Ok(());
    }

    if let Err(source) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(PersistenceError::Io {
            path: path.to_owned(),
            source,
        });
    }
    *stage = WriteStage::Renamed;

    Ok(())
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistenceError {
    let path = path.to_owned();
    move |source| PersistenceError::Io { path, source }
}

#[cfg(test)]
mod tests;
