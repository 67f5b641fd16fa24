pub mod appsettings;
pub mod demo;
pub mod reminder;
pub mod scheduling;
pub mod storage;
