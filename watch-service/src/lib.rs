//! Watches one account for new comments and notifies someone when its most
//! recent comment changes.

pub mod marker;
pub mod notifier;

pub use marker::{Marker, MarkerStore};
pub use notifier::{DeliveryChannel, DesktopNotifier};

use chrono::{DateTime, Utc};
use harvest_core::{CoreError, RedditComment, WatchConfig};
use reddit_client::{ContentSource, Notifier, RetryExecutor};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// First observation of the account; the marker now exists.
    Initialized {
        marker: DateTime<Utc>,
        notified: bool,
    },
    /// A marker written by the older watcher was replaced without notifying;
    /// its timestamps are not comparable with current ones.
    Migrated {
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },
    Unchanged,
    Notified {
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },
    /// The account has no comments; nothing was written.
    NoComments,
}

pub fn notification_subject(account: &str) -> String {
    format!("New comment found for {}", account)
}

pub fn notification_body(account: &str, comment: &RedditComment) -> String {
    format!(
        "The following comment has been found for user: {}\n\n{}",
        account, comment.body
    )
}

pub struct WatchController<S, N> {
    source: S,
    notifier: N,
    markers: MarkerStore,
    retry: RetryExecutor,
    notify_on_first_observation: bool,
    scan_limit: u32,
}

impl<S: ContentSource, N: Notifier> WatchController<S, N> {
    pub fn new(
        source: S,
        notifier: N,
        markers: MarkerStore,
        retry: RetryExecutor,
        config: &WatchConfig,
    ) -> Self {
        Self {
            source,
            notifier,
            markers,
            retry,
            notify_on_first_observation: config.notify_on_first_observation,
            scan_limit: config.scan_limit(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn markers(&self) -> &MarkerStore {
        &self.markers
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Latest comment of `account` by creation time; the earlier entry wins a
    /// tie.
    pub async fn get_most_recent_comment(
        &self,
        account: &str,
    ) -> Result<Option<RedditComment>, CoreError> {
        let operation = format!("comments of {}", account);
        let comments = self
            .retry
            .execute(&operation, || {
                self.source.account_comments(account, self.scan_limit)
            })
            .await?;

        debug!("Scanned {} comments of {}", comments.len(), account);
        Ok(comments.into_iter().fold(None, |latest, comment| match latest {
            Some(best) if best.created >= comment.created => Some(best),
            _ => Some(comment),
        }))
    }

    /// One check of `account`. `target` receives the notification.
    ///
    /// The marker only moves after the notification went out, so a failed
    /// delivery is attempted again on the next poll.
    pub async fn poll(&self, account: &str, target: &str) -> Result<WatchOutcome, CoreError> {
        let previous = self.markers.load_marker(account).await?;

        let Some(latest) = self.get_most_recent_comment(account).await? else {
            info!("{} has no comments yet", account);
            return Ok(WatchOutcome::NoComments);
        };
        let current = latest.created;

        match previous {
            None => {
                let notified = self.notify_on_first_observation;
                if notified {
                    self.notify(account, target, &latest).await?;
                }
                self.markers.store(account, &current).await?;
                info!("Started watching {} at {}", account, current);
                Ok(WatchOutcome::Initialized {
                    marker: current,
                    notified,
                })
            }
            Some(Marker {
                at: previous,
                legacy: true,
            }) => {
                self.markers.store(account, &current).await?;
                info!("Migrated the marker of {} to {}", account, current);
                Ok(WatchOutcome::Migrated { previous, current })
            }
            Some(Marker { at: previous, .. }) if previous == current => {
                debug!("No new comment for {}", account);
                Ok(WatchOutcome::Unchanged)
            }
            Some(Marker { at: previous, .. }) => {
                self.notify(account, target, &latest).await?;
                self.markers.store(account, &current).await?;
                Ok(WatchOutcome::Notified { previous, current })
            }
        }
    }

    async fn notify(
        &self,
        account: &str,
        target: &str,
        comment: &RedditComment,
    ) -> Result<(), CoreError> {
        self.notifier
            .send(
                target,
                &notification_subject(account),
                &notification_body(account, comment),
            )
            .await?;
        info!("Notified {} about a new comment by {}", target, account);
        Ok(())
    }
}
