use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::reminder::{Reminder, ReminderFireTime, ReminderId};

const NOTIFICATION_TITLE: &str = "Reminder";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderNotification {
    pub reminder_id: ReminderId,
    pub title: String,
    pub message: String,
}

impl ReminderNotification {
    pub fn fired(reminder: &Reminder, fire_time: ReminderFireTime) -> Self {
        Self {
            reminder_id: reminder.id,
            title: NOTIFICATION_TITLE.to_owned(),
            message: format!("{fire_time} - {}", reminder.text),
        }
    }
}

/// Receiving side of the scheduler. Called from the poll loop, so implementations
/// should hand work off quickly instead of blocking.
#[async_trait]
pub trait ReminderDeliveryChannel: Send + Sync + 'static {
    async fn notify(&self, notification: &ReminderNotification) -> anyhow::Result<()>;

    async fn report_status(&self, message: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryEvent {
    Fired(ReminderNotification),
    Status(String),
}

/// Queues scheduler events for a display that drains them on its own task.
pub struct QueueDeliveryChannel {
    tx: mpsc::UnboundedSender<DeliveryEvent>,
}

impl QueueDeliveryChannel {
    pub fn create() -> (Self, mpsc::UnboundedReceiver<DeliveryEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ReminderDeliveryChannel for QueueDeliveryChannel {
    async fn notify(&self, notification: &ReminderNotification) -> anyhow::Result<()> {
        self.tx
            .send(DeliveryEvent::Fired(notification.clone()))
            .context("Display is no longer receiving notifications")
    }

    async fn report_status(&self, message: &str) -> anyhow::Result<()> {
        self.tx
            .send(DeliveryEvent::Status(message.to_owned()))
            .context("Display is no longer receiving status updates")
    }
}
