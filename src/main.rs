use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use lembrete::{
    appsettings::AppSettings,
    demo,
    reminder::ReminderQuery,
    scheduling::{DeliveryEvent, FireScheduler, QueueDeliveryChannel},
    storage::{JsonReminderStorage, ReminderStorage},
};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    pretty_env_logger::formatted_timed_builder()
        .parse_filters(&std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_owned()))
        .init();

    let settings = AppSettings::new().context("Failed to load application settings")?;
    log::info!("Starting reminder scheduler with {settings:?}");

    let storage = Arc::new(
        JsonReminderStorage::open_with_timeout(&settings.storage.path, settings.persist_timeout())
            .await,
    );
    log_reminders(storage.as_ref()).await;

    let (delivery, events) = QueueDeliveryChannel::create();
    let display = tokio::spawn(run_console_display(events));

    let mut scheduler = FireScheduler::new(storage.clone(), Arc::new(delivery))
        .with_interval(settings.poll_interval());

    if settings.scheduler.demo {
        demo::seed_demo_reminders(storage.as_ref(), Local::now().naive_local())
            .await
            .context("Failed to seed demo reminders")?;
        scheduler.set_accelerated(true);
    }

    scheduler.start()?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    log::info!("Shutting down");

    scheduler.stop().await?;
    drop(scheduler);
    display.await.context("Display task terminated abnormally")?;

    Ok(())
}

async fn log_reminders(storage: &dyn ReminderStorage) {
    let reminders = ReminderQuery::default().apply(storage.get_all().await);
    if reminders.is_empty() {
        log::info!("No reminders yet");
    }

    for reminder in reminders {
        log::info!(
            "[{}] {} {} (id {})",
            if reminder.active { "on" } else { "off" },
            reminder.fire_at,
            reminder.text,
            reminder.id
        );
    }
}

/// Stands in for a display: drains scheduler events on its own task.
async fn run_console_display(mut events: mpsc::UnboundedReceiver<DeliveryEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            DeliveryEvent::Fired(notification) => {
                log::info!("[NOTIFY] {}: {}", notification.title, notification.message)
            }
            DeliveryEvent::Status(status) => log::debug!("[STATUS] {status}"),
        }
    }
}
