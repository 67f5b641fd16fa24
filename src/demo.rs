use chrono::{NaiveDateTime, TimeDelta};

use crate::{
    reminder::{Reminder, ReminderFireTime},
    storage::{NewReminder, ReminderStorage, StorageError},
};

const DEMO_REMINDERS: [(&str, i64); 3] = [
    ("Drink water", 1),
    ("Stretch your back", 2),
    ("Send the report", 3),
];

/// Adds a few reminders due within the next minutes so firing can be watched live.
pub async fn seed_demo_reminders(
    storage: &dyn ReminderStorage,
    now: NaiveDateTime,
) -> Result<Vec<Reminder>, StorageError> {
    let mut created = Vec::with_capacity(DEMO_REMINDERS.len());

    for (text, minutes_ahead) in DEMO_REMINDERS {
        let fire_at = ReminderFireTime::new((now + TimeDelta::minutes(minutes_ahead)).time());
        let reminder = storage
            .insert(NewReminder::new(text, fire_at.to_string()))
            .await?;
        created.push(reminder);
    }

    log::info!("Seeded {} demo reminders", created.len());
    Ok(created)
}
