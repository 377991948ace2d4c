pub mod auth;
pub mod booking;
pub mod locks;
pub mod reminders;
