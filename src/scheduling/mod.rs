mod clock;
mod delivery;
mod fire_scheduler;

pub use clock::{Clock, LocalClock};
pub use delivery::{
    DeliveryEvent, QueueDeliveryChannel, ReminderDeliveryChannel, ReminderNotification,
};
pub use fire_scheduler::{
    ACCELERATED_POLL_INTERVAL, DEFAULT_POLL_INTERVAL, FireScheduler, PollReport, SchedulerState,
};
