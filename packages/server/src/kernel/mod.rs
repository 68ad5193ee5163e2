//! Kernel module - orchestration and outbound infrastructure.

pub mod discord;
pub mod scheduler;

pub use discord::{DiscordNotifier, NotificationSink};
pub use scheduler::{CheckError, Scheduler, SchedulerConfig};
