//! Collaborator seams: where posts and comments come from, and where
//! notifications go.

use harvest_core::{CommentNode, CoreError, RedditComment, RedditPost, Subreddit, TimeWindow};

/// Largest page the listing endpoints hand out.
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchSort {
    #[default]
    Relevance,
    Top,
}

impl SearchSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchSort::Relevance => "relevance",
            SearchSort::Top => "top",
        }
    }
}

/// Named period accepted by the `t` search parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFilter {
    Hour,
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFilter::Hour => "hour",
            TimeFilter::Day => "day",
            TimeFilter::Week => "week",
            TimeFilter::Month => "month",
            TimeFilter::Year => "year",
            TimeFilter::All => "all",
        }
    }
}

impl std::str::FromStr for TimeFilter {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "hour" => Ok(TimeFilter::Hour),
            "day" => Ok(TimeFilter::Day),
            "week" => Ok(TimeFilter::Week),
            "month" => Ok(TimeFilter::Month),
            "year" => Ok(TimeFilter::Year),
            "all" => Ok(TimeFilter::All),
            other => Err(CoreError::invalid_input(format!(
                "Unknown time period '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchQuery {
    /// Every submission created inside the window (cloudsearch syntax).
    Window(TimeWindow),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub subreddit: String,
    pub query: SearchQuery,
    pub sort: SearchSort,
    pub time_filter: Option<TimeFilter>,
    /// Total number of posts wanted across all pages, `None` for everything
    /// the source will return.
    pub limit: Option<u32>,
}

impl SearchRequest {
    pub fn window(subreddit: impl Into<String>, window: TimeWindow, limit: Option<u32>) -> Self {
        Self {
            subreddit: subreddit.into(),
            query: SearchQuery::Window(window),
            sort: SearchSort::Top,
            time_filter: None,
            limit,
        }
    }

    /// Empty query restricted to a named period.
    pub fn recent(subreddit: impl Into<String>, period: TimeFilter) -> Self {
        Self {
            subreddit: subreddit.into(),
            query: SearchQuery::Text(String::new()),
            sort: SearchSort::Relevance,
            time_filter: Some(period),
            limit: None,
        }
    }

    pub fn query_text(&self) -> String {
        match &self.query {
            SearchQuery::Window(window) => window.search_term(),
            SearchQuery::Text(text) => text.clone(),
        }
    }

    pub fn uses_cloudsearch(&self) -> bool {
        matches!(self.query, SearchQuery::Window(_))
    }
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor for the next page; `None` on the last one.
    pub after: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self { items, after: None }
    }
}

/// Remote content API. Calls fail with
/// `RedditApiError::RateLimitExceeded` when the source is overloaded; that is
/// the only retryable failure.
pub trait ContentSource {
    async fn search_page(
        &self,
        request: &SearchRequest,
        after: Option<&str>,
        page_size: u32,
    ) -> Result<Page<RedditPost>, CoreError>;

    async fn comment_tree(&self, post: &RedditPost) -> Result<Vec<CommentNode>, CoreError>;

    /// Newest-first page of an account's comments.
    async fn account_comments(
        &self,
        account: &str,
        limit: u32,
    ) -> Result<Vec<RedditComment>, CoreError>;

    async fn popular_subreddits(&self, limit: u32) -> Result<Vec<Subreddit>, CoreError>;
}

pub trait Notifier {
    async fn send(&self, target: &str, subject: &str, body: &str) -> Result<(), CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_window_request_uses_cloudsearch() {
        let window = TimeWindow::new(
            Utc.with_ymd_and_hms(2014, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2014, 1, 1, 12, 0, 0).unwrap(),
        );
        let request = SearchRequest::window("funny", window, Some(200));

        assert!(request.uses_cloudsearch());
        assert_eq!(request.sort, SearchSort::Top);
        assert_eq!(request.query_text(), "timestamp:1388534400..1388577600");
        assert_eq!(request.limit, Some(200));
    }

    #[test]
    fn test_recent_request() {
        let request = SearchRequest::recent("rust", TimeFilter::Week);
        assert!(!request.uses_cloudsearch());
        assert_eq!(request.query_text(), "");
        assert_eq!(request.time_filter, Some(TimeFilter::Week));
        assert_eq!(request.limit, None);
    }

    #[test]
    fn test_time_filter_parsing() {
        assert_eq!("Week".parse::<TimeFilter>().unwrap(), TimeFilter::Week);
        assert!("fortnight".parse::<TimeFilter>().is_err());
    }
}
