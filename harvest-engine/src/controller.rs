use crate::planner::plan;
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use harvest_core::{CommentNode, CoreError, RedditPost, TimeWindow};
use reddit_client::{ContentSource, RetryExecutor, SearchRequest, TimeFilter, MAX_PAGE_SIZE};
use tracing::{debug, info};

struct Cursor {
    request: SearchRequest,
    after: Option<String>,
    fetched: u32,
    exhausted: bool,
}

/// Turns windowed searches into lazy post streams. Every source call goes
/// through the retry executor.
pub struct HarvestController<S> {
    source: S,
    retry: RetryExecutor,
    page_size: u32,
}

impl<S: ContentSource> HarvestController<S> {
    pub fn new(source: S, retry: RetryExecutor) -> Self {
        Self {
            source,
            retry,
            page_size: MAX_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn retry(&self) -> &RetryExecutor {
        &self.retry
    }

    /// Posts of one window, at most `cap` of them.
    pub fn harvest(
        &self,
        subreddit: &str,
        window: TimeWindow,
        cap: Option<u32>,
    ) -> impl Stream<Item = Result<RedditPost, CoreError>> + '_ {
        debug!(
            "Harvesting r/{} between {} and {}",
            subreddit, window.start, window.end
        );
        self.search(SearchRequest::window(subreddit, window, cap))
    }

    /// Posts of every window between `start` and `end`, window after window.
    /// Planning errors are reported before anything is fetched.
    pub fn harvest_range(
        &self,
        subreddit: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        fine_scale: Duration,
        cap_per_window: Option<u32>,
    ) -> Result<impl Stream<Item = Result<RedditPost, CoreError>> + '_, CoreError> {
        let windows = plan(start, end, fine_scale)?;
        info!(
            "Harvesting r/{} over {} windows of {} hours",
            subreddit,
            windows.len(),
            fine_scale.num_hours()
        );

        let subreddit = subreddit.to_string();
        Ok(stream::iter(windows)
            .map(move |window| self.harvest(&subreddit, window, cap_per_window))
            .flatten())
    }

    /// Everything the source returns for an empty query over `period`.
    pub fn recent(
        &self,
        subreddit: &str,
        period: TimeFilter,
    ) -> impl Stream<Item = Result<RedditPost, CoreError>> + '_ {
        self.search(SearchRequest::recent(subreddit, period))
    }

    /// Pages through `request`, fetching the next page only once the
    /// previous one has been consumed.
    pub fn search(
        &self,
        request: SearchRequest,
    ) -> impl Stream<Item = Result<RedditPost, CoreError>> + '_ {
        let cursor = Cursor {
            request,
            after: None,
            fetched: 0,
            exhausted: false,
        };

        stream::try_unfold(cursor, move |mut cursor| async move {
            let remaining = cursor
                .request
                .limit
                .map(|limit| limit.saturating_sub(cursor.fetched));
            if cursor.exhausted || remaining == Some(0) {
                return Ok(None);
            }

            let page_size = remaining.map_or(self.page_size, |r| r.min(self.page_size));
            let operation = format!(
                "search r/{} '{}'",
                cursor.request.subreddit,
                cursor.request.query_text()
            );
            let page = {
                let request = &cursor.request;
                let after = cursor.after.as_deref();
                self.retry
                    .execute(&operation, move || {
                        self.source.search_page(request, after, page_size)
                    })
                    .await?
            };

            let mut items = page.items;
            if let Some(remaining) = remaining {
                items.truncate(remaining as usize);
            }
            debug!(
                "Fetched {} posts for {} (after: {:?})",
                items.len(),
                operation,
                cursor.after
            );

            cursor.fetched += items.len() as u32;
            cursor.exhausted = page.after.is_none() || items.is_empty();
            cursor.after = page.after;

            Ok::<_, CoreError>(Some((stream::iter(items.into_iter().map(Ok::<_, CoreError>)), cursor)))
        })
        .try_flatten()
    }

    pub async fn comment_tree(&self, post: &RedditPost) -> Result<Vec<CommentNode>, CoreError> {
        let operation = format!("comments of {}", post.id);
        self.retry
            .execute(&operation, || self.source.comment_tree(post))
            .await
    }

    /// `explicit` when given, otherwise the source's most popular subreddits.
    pub async fn resolve_channels(
        &self,
        explicit: Vec<String>,
        popular_limit: u32,
    ) -> Result<Vec<String>, CoreError> {
        if !explicit.is_empty() {
            return Ok(explicit);
        }

        let popular = self
            .retry
            .execute("list popular subreddits", || {
                self.source.popular_subreddits(popular_limit)
            })
            .await?;
        let channels: Vec<String> = popular.into_iter().map(|s| s.name).collect();
        if channels.is_empty() {
            return Err(CoreError::invalid_input("No subreddits to harvest"));
        }

        info!("Harvesting {} popular subreddits", channels.len());
        Ok(channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{post, rate_limited, window_query, ScriptedSource};
    use chrono::TimeZone;
    use harvest_core::{RedditApiError, RetryConfig};
    use reddit_client::Page;

    fn fast_retry(max_attempts: u32) -> RetryExecutor {
        RetryExecutor::new(RetryConfig {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 2,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        })
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2014, 1, day, 0, 0, 0).unwrap()
    }

    async fn ids<St>(stream: St) -> Result<Vec<String>, CoreError>
    where
        St: Stream<Item = Result<RedditPost, CoreError>>,
    {
        stream.map_ok(|p| p.id).try_collect().await
    }

    #[tokio::test]
    async fn test_range_concatenates_windows_in_order() {
        let windows = plan(at(1), at(4), Duration::hours(24)).unwrap();
        let source = ScriptedSource::new();
        source.add_pages(
            "funny",
            &window_query(&windows[0]),
            vec![Page::last(vec![post("t3_1a", "funny"), post("t3_1b", "funny")])],
        );
        source.add_pages(
            "funny",
            &window_query(&windows[2]),
            vec![Page::last(vec![post("t3_3a", "funny")])],
        );

        let controller = HarvestController::new(source, fast_retry(3));
        let stream = controller
            .harvest_range("funny", at(1), at(4), Duration::hours(24), Some(10))
            .unwrap();

        assert_eq!(ids(stream).await.unwrap(), vec!["t3_1a", "t3_1b", "t3_3a"]);

        let queries: Vec<String> = controller
            .source()
            .searches()
            .into_iter()
            .map(|call| call.query)
            .collect();
        let expected: Vec<String> = windows.iter().map(window_query).collect();
        assert_eq!(queries, expected);
    }

    #[tokio::test]
    async fn test_pagination_stops_at_cap() {
        let window = TimeWindow::new(at(1), at(2));
        let source = ScriptedSource::new();
        source.add_pages(
            "rust",
            &window_query(&window),
            vec![
                Page {
                    items: vec![post("t3_a", "rust"), post("t3_b", "rust")],
                    after: Some("t3_b".to_string()),
                },
                Page {
                    items: vec![post("t3_c", "rust"), post("t3_d", "rust")],
                    after: Some("t3_d".to_string()),
                },
                Page::last(vec![post("t3_e", "rust")]),
            ],
        );

        let controller = HarvestController::new(source, fast_retry(3)).with_page_size(2);
        let posts = ids(controller.harvest("rust", window, Some(3))).await.unwrap();
        assert_eq!(posts, vec!["t3_a", "t3_b", "t3_c"]);

        let calls = controller.source().searches();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].after, None);
        assert_eq!(calls[1].after.as_deref(), Some("t3_b"));
        assert_eq!(calls[1].page_size, 1);
    }

    #[tokio::test]
    async fn test_pagination_follows_cursor_without_cap() {
        let window = TimeWindow::new(at(1), at(2));
        let source = ScriptedSource::new();
        source.add_pages(
            "rust",
            &window_query(&window),
            vec![
                Page {
                    items: vec![post("t3_a", "rust")],
                    after: Some("t3_a".to_string()),
                },
                Page::last(vec![post("t3_b", "rust")]),
            ],
        );

        let controller = HarvestController::new(source, fast_retry(3));
        let posts = ids(controller.harvest("rust", window, None)).await.unwrap();
        assert_eq!(posts, vec!["t3_a", "t3_b"]);
    }

    #[tokio::test]
    async fn test_stream_is_lazy() {
        let window = TimeWindow::new(at(1), at(2));
        let source = ScriptedSource::new();
        source.add_pages(
            "rust",
            &window_query(&window),
            vec![
                Page {
                    items: vec![post("t3_a", "rust")],
                    after: Some("t3_a".to_string()),
                },
                Page::last(vec![post("t3_b", "rust")]),
            ],
        );

        let controller = HarvestController::new(source, fast_retry(3));
        let stream = controller.harvest("rust", window, None);
        futures::pin_mut!(stream);

        assert!(controller.source().searches().is_empty());
        let first = stream.try_next().await.unwrap().unwrap();
        assert_eq!(first.id, "t3_a");
        assert_eq!(controller.source().searches().len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limits_are_retried() {
        let window = TimeWindow::new(at(1), at(2));
        let source = ScriptedSource::new();
        source.add_pages(
            "rust",
            &window_query(&window),
            vec![Page::last(vec![post("t3_a", "rust")])],
        );
        source.fail_next(rate_limited());
        source.fail_next(rate_limited());

        let controller = HarvestController::new(source, fast_retry(5));
        let posts = ids(controller.harvest("rust", window, None)).await.unwrap();

        assert_eq!(posts, vec!["t3_a"]);
        assert_eq!(controller.retry().get_metrics().successful_retries, 1);
    }

    #[tokio::test]
    async fn test_retry_cap_surfaces_final_failure() {
        let window = TimeWindow::new(at(1), at(2));
        let source = ScriptedSource::new();
        for _ in 0..3 {
            source.fail_next(rate_limited());
        }

        let controller = HarvestController::new(source, fast_retry(3));
        let err = ids(controller.harvest("rust", window, None))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::RetriesExhausted { attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn test_other_errors_propagate() {
        let window = TimeWindow::new(at(1), at(2));
        let source = ScriptedSource::new();
        source.fail_next(CoreError::RedditApi(RedditApiError::Forbidden {
            resource: "/r/private".to_string(),
        }));

        let controller = HarvestController::new(source, fast_retry(5));
        let err = ids(controller.harvest("private", window, None))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::RedditApi(RedditApiError::Forbidden { .. })
        ));
        assert_eq!(controller.source().searches().len(), 1);
    }

    #[tokio::test]
    async fn test_recent_uses_period() {
        let source = ScriptedSource::new();
        source.add_pages("rust", "", vec![Page::last(vec![post("t3_new", "rust")])]);

        let controller = HarvestController::new(source, fast_retry(3));
        let posts = ids(controller.recent("rust", TimeFilter::Day)).await.unwrap();

        assert_eq!(posts, vec!["t3_new"]);
        assert_eq!(
            controller.source().searches()[0].time_filter,
            Some(TimeFilter::Day)
        );
    }

    #[tokio::test]
    async fn test_range_rejects_inverted_dates() {
        let controller = HarvestController::new(ScriptedSource::new(), fast_retry(3));
        let result = controller.harvest_range("rust", at(4), at(1), Duration::hours(24), None);
        assert!(matches!(result, Err(CoreError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_resolve_channels() {
        let source = ScriptedSource::new();
        source.set_popular(&["AskReddit", "funny"]);
        let controller = HarvestController::new(source, fast_retry(3));

        let explicit = controller
            .resolve_channels(vec!["rust".to_string()], 200)
            .await
            .unwrap();
        assert_eq!(explicit, vec!["rust"]);

        let popular = controller.resolve_channels(vec![], 200).await.unwrap();
        assert_eq!(popular, vec!["AskReddit", "funny"]);

        let empty = HarvestController::new(ScriptedSource::new(), fast_retry(3));
        assert!(matches!(
            empty.resolve_channels(vec![], 200).await,
            Err(CoreError::InvalidInput { .. })
        ));
    }
}
