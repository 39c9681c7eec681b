//! Security Module
//!
//! Access-pattern monitoring and outbound security notifications.

mod events;
mod monitor;

pub(crate) use events::Notifier;
pub use events::{notification_channel, ChannelSink, NotificationSink, SecurityEvent};
pub use monitor::{
    pressure_relief_target, SecurityMonitor, ACCESS_WINDOW_MS, MEMORY_PRESSURE_PERCENT,
    OVERFLOW_WARNING_RATIO, PRESSURE_RELIEF_PERCENT,
};
