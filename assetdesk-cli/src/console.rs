//! Terminal collaborators for the session manager

use assetdesk_auth::{Navigator, Notification, NotificationLevel, Notifier};

/// Prints notifications to the terminal
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Success => println!("✅ {}", notification.message),
            NotificationLevel::Info => println!("ℹ️  {}", notification.message),
            NotificationLevel::Warning => eprintln!("⚠️  {}", notification.message),
            NotificationLevel::Error => eprintln!("❌ {}", notification.message),
        }
    }
}

/// A terminal has no router; print the destination instead
#[derive(Debug, Default)]
pub struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn navigate(&self, path: &str) {
        println!("➡️  {}", path);
    }
}
