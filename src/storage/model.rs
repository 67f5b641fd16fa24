use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::reminder::{Reminder, ReminderId};

pub struct NewReminder {
    pub text: String,
    pub fire_at: String,
    pub active: bool,
}

impl NewReminder {
    pub fn new(text: impl Into<String>, fire_at: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            fire_at: fire_at.into(),
            active: true,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Field-wise replacement of a stored reminder. `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct UpdateReminder {
    pub id: ReminderId,
    pub text: Option<String>,
    pub fire_at: Option<String>,
    pub active: Option<bool>,
    pub last_fired_on: Option<Option<NaiveDate>>,
}

impl UpdateReminder {
    pub fn new(id: ReminderId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn fire_at(mut self, fire_at: impl Into<String>) -> Self {
        self.fire_at = Some(fire_at.into());
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    pub fn last_fired_on(mut self, last_fired_on: Option<NaiveDate>) -> Self {
        self.last_fired_on = Some(last_fired_on);
        self
    }
}

/// The whole persisted store. Always written as one complete snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderDocument {
    #[serde(rename = "lembretes", default)]
    pub reminders: Vec<ReminderStorageModel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderStorageModel {
    pub id: ReminderId,
    #[serde(rename = "texto")]
    pub text: String,
    #[serde(rename = "horario")]
    pub fire_at: String,
    #[serde(rename = "ativo", default = "default_active")]
    pub active: bool,
    #[serde(rename = "ultimo_disparo_em", default)]
    pub last_fired_on: Option<NaiveDate>,
}

fn default_active() -> bool {
    true
}

impl From<Reminder> for ReminderStorageModel {
    fn from(value: Reminder) -> Self {
        Self {
            id: value.id,
            text: value.text,
            fire_at: value.fire_at,
            active: value.active,
            last_fired_on: value.last_fired_on,
        }
    }
}

impl From<ReminderStorageModel> for Reminder {
    fn from(value: ReminderStorageModel) -> Self {
        Self {
            id: value.id,
            text: value.text,
            fire_at: value.fire_at,
            active: value.active,
            last_fired_on: value.last_fired_on,
        }
    }
}
