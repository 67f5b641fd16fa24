mod json_reminder_storage;
mod model;
mod reminder_storage;

pub use json_reminder_storage::{DEFAULT_PERSIST_TIMEOUT, JsonReminderStorage};
pub use model::{NewReminder, ReminderDocument, ReminderStorageModel, UpdateReminder};
pub use reminder_storage::{PersistenceError, ReminderStorage, StorageError};
