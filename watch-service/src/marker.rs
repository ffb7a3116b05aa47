use chrono::{DateTime, Utc};
use harvest_core::time::{format_marker, parse_marker};
use harvest_core::{CoreError, WatchConfig};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A stored marker value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub at: DateTime<Utc>,
    /// Float-valued file left by the older watcher. Those recorded the
    /// listing's local `created` time instead of `created_utc`, so the value
    /// cannot be compared with a fresh one.
    pub legacy: bool,
}

/// One `<account>.txt` file per tracked account holding the creation time of
/// the last comment seen, in unix seconds.
#[derive(Debug, Clone)]
pub struct MarkerStore {
    dir: PathBuf,
}

impl MarkerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config(config: &WatchConfig) -> Result<Self, CoreError> {
        Ok(Self::new(config.resolved_marker_dir()?))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, account: &str) -> Result<PathBuf, CoreError> {
        if account.is_empty() || account.contains(['/', '\\']) || account.starts_with('.') {
            return Err(CoreError::invalid_input(format!(
                "Invalid account name '{}'",
                account
            )));
        }
        Ok(self.dir.join(format!("{}.txt", account)))
    }

    /// `None` when the account has never been observed.
    pub async fn load(&self, account: &str) -> Result<Option<DateTime<Utc>>, CoreError> {
        Ok(self.load_marker(account).await?.map(|marker| marker.at))
    }

    pub async fn load_marker(&self, account: &str) -> Result<Option<Marker>, CoreError> {
        let path = self.path_for(account)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(Marker {
                at: parse_marker(&contents)?,
                legacy: contents.trim().parse::<i64>().is_err(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoreError::Io(e)),
        }
    }

    pub async fn store(&self, account: &str, timestamp: &DateTime<Utc>) -> Result<(), CoreError> {
        let path = self.path_for(account)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, format_marker(timestamp)).await?;
        debug!("Marker for {} set to {}", account, timestamp);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn temp_markers() -> MarkerStore {
        MarkerStore::new(std::env::temp_dir().join(format!("test_markers_{}", uuid::Uuid::new_v4())))
    }

    #[tokio::test]
    async fn test_missing_marker() {
        let markers = temp_markers();
        assert_eq!(markers.load("someone").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_store_and_load() {
        let markers = temp_markers();
        let ts = Utc.timestamp_opt(1418000000, 0).unwrap();

        markers.store("someone", &ts).await.unwrap();
        assert_eq!(markers.load("someone").await.unwrap(), Some(ts));

        let contents = tokio::fs::read_to_string(markers.path_for("someone").unwrap())
            .await
            .unwrap();
        assert_eq!(contents, "1418000000");
    }

    #[tokio::test]
    async fn test_legacy_float_marker() {
        let markers = temp_markers();
        tokio::fs::create_dir_all(markers.dir()).await.unwrap();
        tokio::fs::write(markers.path_for("old").unwrap(), "1418000000.0")
            .await
            .unwrap();

        let loaded = markers.load_marker("old").await.unwrap().unwrap();
        assert_eq!(loaded.at.timestamp(), 1418000000);
        assert!(loaded.legacy);

        markers.store("old", &loaded.at).await.unwrap();
        assert!(!markers.load_marker("old").await.unwrap().unwrap().legacy);
    }

    #[test]
    fn test_rejects_path_like_accounts() {
        let markers = MarkerStore::new("/tmp");
        assert!(markers.path_for("../etc/passwd").is_err());
        assert!(markers.path_for("").is_err());
        assert_eq!(
            markers.path_for("someone").unwrap(),
            PathBuf::from("/tmp/someone.txt")
        );
    }
}
