pub mod event;
pub mod notification_log;
pub mod notification_settings;
pub mod push_subscription;

pub use event::EventRepository;
pub use notification_log::NotificationLogRepository;
pub use notification_settings::NotificationSettingsRepository;
pub use push_subscription::PushSubscriptionRepository;
