use harvest_core::{CoreError, NotificationError};
use notify_rust::Notification;
use reddit_client::{Notifier, RedditApiClient};
use tracing::info;

const APP_NAME: &str = "subreddit-harvester";

/// Shows notifications on the local desktop. The target account is only
/// logged.
#[derive(Debug, Clone, Default)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    async fn send(&self, target: &str, subject: &str, body: &str) -> Result<(), CoreError> {
        Notification::new()
            .appname(APP_NAME)
            .summary(subject)
            .body(body)
            .show()
            .map_err(|e| {
                CoreError::Notification(NotificationError::Desktop {
                    reason: e.to_string(),
                })
            })?;

        info!("Desktop notification shown for {}", target);
        Ok(())
    }
}

/// Delivery channel picked at startup.
#[derive(Debug, Clone)]
pub enum DeliveryChannel {
    /// Private message through the API.
    Message(RedditApiClient),
    Desktop(DesktopNotifier),
}

impl Notifier for DeliveryChannel {
    async fn send(&self, target: &str, subject: &str, body: &str) -> Result<(), CoreError> {
        match self {
            DeliveryChannel::Message(client) => client.send(target, subject, body).await,
            DeliveryChannel::Desktop(desktop) => desktop.send(target, subject, body).await,
        }
    }
}
