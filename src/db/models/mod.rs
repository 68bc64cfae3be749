//! Database models, one file per table.

pub mod event;
pub mod notification_log;
pub mod notification_settings;
pub mod push_subscription;

pub use self::event::*;
pub use self::notification_log::*;
pub use self::notification_settings::*;
pub use self::push_subscription::*;
