use std::{fmt, str::FromStr};

use chrono::{NaiveDate, NaiveTime, Timelike};
use thiserror::Error;

pub type ReminderId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("reminder text must not be empty")]
    EmptyText,
    #[error("invalid time of day {0:?}, expected HH:MM in 24-hour format")]
    InvalidFireTime(String),
}

/// Time of day a reminder fires at, with minute precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReminderFireTime(NaiveTime);

impl ReminderFireTime {
    pub fn new(inner: NaiveTime) -> Self {
        let normalized_time = inner
            .with_nanosecond(0)
            .and_then(|time| time.with_second(0))
            .expect("Will never fail.");
        Self(normalized_time)
    }

    pub fn time(&self) -> &NaiveTime {
        &self.0
    }

    /// True when `now` falls within this minute.
    pub fn matches(&self, now: &NaiveTime) -> bool {
        self.0.hour() == now.hour() && self.0.minute() == now.minute()
    }
}

impl fmt::Display for ReminderFireTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl ReminderFireTime {
    /// Parses a stored value, which must already be exactly `HH:MM` with no padding
    /// around it.
    pub fn parse_exact(s: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidFireTime(s.to_owned());

        // chrono accepts single-digit hours, the stored form is always zero-padded.
        let bytes = s.as_bytes();
        let well_formed = bytes.len() == 5
            && bytes[2] == b':'
            && bytes
                .iter()
                .enumerate()
                .all(|(i, b)| i == 2 || b.is_ascii_digit());
        if !well_formed {
            return Err(invalid());
        }

        NaiveTime::parse_from_str(s, "%H:%M")
            .map(Self::new)
            .map_err(|_| invalid())
    }
}

/// Lenient form used for user input: surrounding whitespace is ignored.
impl FromStr for ReminderFireTime {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_exact(s.trim()).map_err(|_| ValidationError::InvalidFireTime(s.to_owned()))
    }
}

/// Trims reminder text and rejects it when nothing is left.
pub fn validate_text(text: &str) -> Result<String, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyText);
    }
    Ok(trimmed.to_owned())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub id: ReminderId,
    pub text: String,
    /// Raw `HH:MM` value as persisted. Use [`Reminder::fire_time`] to validate it.
    pub fire_at: String,
    pub active: bool,
    pub last_fired_on: Option<NaiveDate>,
}

impl Reminder {
    pub fn fire_time(&self) -> Result<ReminderFireTime, ValidationError> {
        ReminderFireTime::parse_exact(&self.fire_at)
    }

    pub fn fired_on(&self, date: NaiveDate) -> bool {
        self.last_fired_on == Some(date)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReminderOrder {
    #[default]
    FireTime,
    Text,
}

/// Search and ordering applied to a listing snapshot.
#[derive(Debug, Clone, Default)]
pub struct ReminderQuery {
    pub search: Option<String>,
    pub order: ReminderOrder,
}

impl ReminderQuery {
    pub fn apply(&self, reminders: Vec<Reminder>) -> Vec<Reminder> {
        let needle = self
            .search
            .as_deref()
            .map(|search| search.trim().to_lowercase())
            .filter(|search| !search.is_empty());

        let mut reminders: Vec<Reminder> = match needle {
            Some(needle) => reminders
                .into_iter()
                .filter(|reminder| reminder.text.to_lowercase().contains(&needle))
                .collect(),
            None => reminders,
        };

        match self.order {
            ReminderOrder::FireTime => reminders.sort_by(|a, b| a.fire_at.cmp(&b.fire_at)),
            ReminderOrder::Text => {
                reminders.sort_by_cached_key(|reminder| reminder.text.to_lowercase())
            }
        }

        reminders
    }
}
