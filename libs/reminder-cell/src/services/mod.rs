pub mod sender;
pub mod sweep;
pub mod template;

pub use sender::{NotificationSender, TwilioSender};
pub use sweep::{ReminderService, SweepSettings};
