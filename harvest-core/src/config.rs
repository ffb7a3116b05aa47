//! TOML configuration. Every section is optional; missing keys fall back to
//! the defaults below.

use crate::{ConfigError, CoreError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const ACCESS_TOKEN_ENV: &str = "REDDIT_ACCESS_TOKEN";
pub const USER_AGENT_ENV: &str = "REDDIT_USER_AGENT";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub reddit: RedditConfig,
    pub harvest: HarvestConfig,
    pub retry: RetryConfig,
    pub watch: WatchConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub user_agent: String,
    /// Bearer token for the OAuth API host. Without it the public JSON host
    /// is used, which is read-only.
    pub access_token: Option<String>,
    /// Overrides the API host, mostly for tests.
    pub api_base: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            user_agent: "subreddit-harvester/0.1".to_string(),
            access_token: None,
            api_base: None,
            timeout_seconds: 30,
        }
    }
}

/// Order in which a comment tree is flattened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Traversal {
    #[default]
    BreadthFirst,
    DepthFirst,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub fine_scale_hours: u64,
    pub posts_per_window: u32,
    pub comments_per_post: usize,
    /// Number of popular subreddits harvested when none are named.
    pub popular_limit: u32,
    /// Drop placeholders and deleted comments before applying
    /// `comments_per_post` instead of after.
    pub filter_before_truncate: bool,
    pub traversal: Traversal,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            fine_scale_hours: 12,
            posts_per_window: 200,
            comments_per_post: 100,
            popular_limit: 200,
            filter_before_truncate: false,
            traversal: Traversal::BreadthFirst,
        }
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Base delay for exponential backoff (in milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay between retries (in milliseconds)
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Maximum jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::reddit()
    }
}

impl RetryConfig {
    /// Create retry config tuned for Reddit API rate limiting
    pub fn reddit() -> Self {
        Self {
            max_attempts: 10,
            base_delay_ms: 2000, // Start with 2 seconds
            max_delay_ms: 60000, // Max 1 minute delay
            backoff_multiplier: 2.0,
            jitter_factor: 0.2, // 20% jitter to prevent thundering herd
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Notify on the very first poll of an account, when no marker exists yet.
    pub notify_on_first_observation: bool,
    /// Directory holding `<account>.txt` markers. Defaults to the home
    /// directory.
    pub marker_dir: Option<PathBuf>,
    /// Size of the newest-first comment page scanned for the latest comment.
    pub comment_scan_limit: Option<u32>,
    /// Deliver notifications on the desktop instead of as Reddit messages.
    pub desktop: bool,
}

impl WatchConfig {
    pub const DEFAULT_SCAN_LIMIT: u32 = 25;

    pub fn scan_limit(&self) -> u32 {
        self.comment_scan_limit.unwrap_or(Self::DEFAULT_SCAN_LIMIT)
    }

    pub fn resolved_marker_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.marker_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::home_dir().ok_or(ConfigError::NoHomeDirectory),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Directory holding the `<name>.db` stores. Defaults to `~/Databases`.
    pub base_path: Option<PathBuf>,
}

impl DatabaseConfig {
    pub fn resolved_base_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.base_path {
            Some(path) => Ok(path.clone()),
            None => dirs::home_dir()
                .map(|home| home.join("Databases"))
                .ok_or(ConfigError::NoHomeDirectory),
        }
    }
}

impl AppConfig {
    /// Loads the file at `path` (or the defaults), applies environment
    /// overrides and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, CoreError> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        CoreError::Config(ConfigError::FileNotFound {
                            path: path.display().to_string(),
                        })
                    } else {
                        CoreError::Io(e)
                    }
                })?;
                Self::from_toml_str(&contents)?
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(ACCESS_TOKEN_ENV).filter(|t| !t.is_empty()) {
            self.reddit.access_token = Some(token);
        }
        if let Some(agent) = lookup(USER_AGENT_ENV).filter(|a| !a.is_empty()) {
            self.reddit.user_agent = agent;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &str, value: impl ToString) -> ConfigError {
            ConfigError::InvalidValue {
                field: field.to_string(),
                value: value.to_string(),
            }
        }

        let fine_scale_hours = self.harvest.fine_scale_hours;
        let representable = i64::try_from(fine_scale_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .is_some();
        if fine_scale_hours == 0 || !representable {
            return Err(invalid("harvest.fine_scale_hours", fine_scale_hours));
        }
        if self.harvest.comments_per_post == 0 {
            return Err(invalid("harvest.comments_per_post", 0));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", 0));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(invalid("retry.jitter_factor", self.retry.jitter_factor));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(invalid(
                "retry.backoff_multiplier",
                self.retry.backoff_multiplier,
            ));
        }
        if self.watch.scan_limit() == 0 {
            return Err(invalid("watch.comment_scan_limit", 0));
        }
        if self.reddit.user_agent.trim().is_empty() {
            return Err(invalid("reddit.user_agent", "<empty>"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.harvest.fine_scale_hours, 12);
        assert_eq!(config.harvest.posts_per_window, 200);
        assert_eq!(config.harvest.comments_per_post, 100);
        assert!(!config.harvest.filter_before_truncate);
        assert_eq!(config.harvest.traversal, Traversal::BreadthFirst);
        assert!(!config.watch.notify_on_first_observation);
        assert_eq!(config.retry.max_attempts, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = AppConfig::from_toml_str(
            r#"
            [harvest]
            fine_scale_hours = 24
            traversal = "depth_first"
            filter_before_truncate = true

            [watch]
            notify_on_first_observation = true
            marker_dir = "/tmp/markers"

            [retry]
            max_attempts = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.harvest.fine_scale_hours, 24);
        assert_eq!(config.harvest.posts_per_window, 200);
        assert_eq!(config.harvest.traversal, Traversal::DepthFirst);
        assert!(config.harvest.filter_before_truncate);
        assert!(config.watch.notify_on_first_observation);
        assert_eq!(
            config.watch.resolved_marker_dir().unwrap(),
            PathBuf::from("/tmp/markers")
        );
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 2000);
    }

    #[test]
    fn test_invalid_toml() {
        let err = AppConfig::from_toml_str("[harvest]\nfine_scale_hours = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validation_rejects_zero_scale() {
        let mut config = AppConfig::default();
        config.harvest.fine_scale_hours = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "harvest.fine_scale_hours"
        ));
    }

    #[test]
    fn test_validation_rejects_oversized_scale() {
        let mut config = AppConfig::default();
        config.harvest.fine_scale_hours = 3_000_000_000_000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "harvest.fine_scale_hours"
        ));

        config.harvest.fine_scale_hours = 24 * 365;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config.apply_overrides(|key| match key {
            ACCESS_TOKEN_ENV => Some("token-123".to_string()),
            USER_AGENT_ENV => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.reddit.access_token.as_deref(), Some("token-123"));
        assert_eq!(config.reddit.user_agent, "subreddit-harvester/0.1");
    }

    #[test]
    fn test_missing_file() {
        let path = std::env::temp_dir().join(format!("missing-{}.toml", uuid::Uuid::new_v4()));
        let err = AppConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
