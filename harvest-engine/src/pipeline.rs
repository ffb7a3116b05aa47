use crate::controller::HarvestController;
use crate::extractor::CommentExtractor;
use crate::planner::window_size;
use chrono::{DateTime, Duration, Utc};
use database::Store;
use futures::{Stream, TryStreamExt};
use harvest_core::{CoreError, HarvestConfig, RedditPost};
use reddit_client::{ContentSource, TimeFilter};
use tracing::{debug, info};

/// What to fetch for every channel.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub fine_scale: Duration,
    pub posts_per_window: Option<u32>,
    pub comments_per_post: usize,
}

impl HarvestRange {
    pub fn from_config(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        config: &HarvestConfig,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            start,
            end,
            fine_scale: window_size(config.fine_scale_hours)?,
            posts_per_window: Some(config.posts_per_window),
            comments_per_post: config.comments_per_post,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestReport {
    pub channels: usize,
    pub posts: u64,
    pub comments: u64,
}

impl std::ops::AddAssign for HarvestReport {
    fn add_assign(&mut self, other: Self) {
        self.channels += other.channels;
        self.posts += other.posts;
        self.comments += other.comments;
    }
}

/// Streams posts into the store one at a time: save the post, fetch its
/// comments, save those, then move on.
pub struct HarvestPipeline<'a, S> {
    controller: &'a HarvestController<S>,
    extractor: CommentExtractor,
    store: &'a Store,
}

impl<'a, S: ContentSource> HarvestPipeline<'a, S> {
    pub fn new(
        controller: &'a HarvestController<S>,
        extractor: CommentExtractor,
        store: &'a Store,
    ) -> Self {
        Self {
            controller,
            extractor,
            store,
        }
    }

    pub async fn run(
        &self,
        channels: &[String],
        range: &HarvestRange,
    ) -> Result<HarvestReport, CoreError> {
        if channels.is_empty() {
            return Err(CoreError::invalid_input("No subreddits to harvest"));
        }

        let mut report = HarvestReport::default();
        for (index, channel) in channels.iter().enumerate() {
            info!(
                "Harvesting r/{} ({}/{})",
                channel,
                index + 1,
                channels.len()
            );
            report += self.harvest_channel(channel, range).await?;
        }

        info!(
            "Harvest finished: {} subreddits, {} posts, {} comments",
            report.channels, report.posts, report.comments
        );
        Ok(report)
    }

    pub async fn run_recent(
        &self,
        channels: &[String],
        period: TimeFilter,
        comments_per_post: usize,
    ) -> Result<HarvestReport, CoreError> {
        if channels.is_empty() {
            return Err(CoreError::invalid_input("No subreddits to harvest"));
        }

        let mut report = HarvestReport::default();
        for channel in channels {
            report += self
                .harvest_recent(channel, period, comments_per_post)
                .await?;
        }
        Ok(report)
    }

    pub async fn harvest_channel(
        &self,
        channel: &str,
        range: &HarvestRange,
    ) -> Result<HarvestReport, CoreError> {
        let posts = self.controller.harvest_range(
            channel,
            range.start,
            range.end,
            range.fine_scale,
            range.posts_per_window,
        )?;
        let mut report = self.persist(posts, range.comments_per_post).await?;
        report.channels = 1;

        info!(
            "r/{}: {} posts, {} comments",
            channel, report.posts, report.comments
        );
        Ok(report)
    }

    /// Stores whatever the source lists for `channel` over the named period,
    /// without any date windows.
    pub async fn harvest_recent(
        &self,
        channel: &str,
        period: TimeFilter,
        comments_per_post: usize,
    ) -> Result<HarvestReport, CoreError> {
        let posts = self.controller.recent(channel, period);
        let mut report = self.persist(posts, comments_per_post).await?;
        report.channels = 1;

        info!(
            "r/{} (past {}): {} posts, {} comments",
            channel,
            period.as_str(),
            report.posts,
            report.comments
        );
        Ok(report)
    }

    async fn persist<St>(
        &self,
        posts: St,
        comments_per_post: usize,
    ) -> Result<HarvestReport, CoreError>
    where
        St: Stream<Item = Result<RedditPost, CoreError>>,
    {
        futures::pin_mut!(posts);

        let mut report = HarvestReport::default();
        while let Some(post) = posts.try_next().await? {
            self.store.save_submission(&post).await?;

            let tree = self.controller.comment_tree(&post).await?;
            let comments = self.extractor.extract(&post, &tree, comments_per_post);
            for comment in &comments {
                self.store.save_comment(comment).await?;
            }

            debug!("Saved {} with {} comments", post.id, comments.len());
            report.posts += 1;
            report.comments += comments.len() as u64;
        }
        Ok(report)
    }
}
