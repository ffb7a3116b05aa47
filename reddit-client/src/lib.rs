pub mod api;
pub mod retry;
pub mod source;


pub use api::RedditApiClient;
pub use retry::{RetryExecutor, RetryMetrics};
pub use source::{
    ContentSource, Notifier, Page, SearchQuery, SearchRequest, SearchSort, TimeFilter,
    MAX_PAGE_SIZE,
};
