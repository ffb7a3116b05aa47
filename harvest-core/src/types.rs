use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Text stored for a submission: self posts carry their body, link posts
/// carry the external URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostBody {
    SelfText(String),
    Link(String),
}

impl PostBody {
    pub fn as_str(&self) -> &str {
        match self {
            PostBody::SelfText(text) => text,
            PostBody::Link(url) => url,
        }
    }

    pub fn is_self(&self) -> bool {
        matches!(self, PostBody::SelfText(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedditPost {
    /// Fullname (`t3_...`).
    pub id: String,
    pub title: String,
    pub body: PostBody,
    pub score: i64,
    pub created: DateTime<Utc>,
    /// Fullname of the subreddit (`t5_...`).
    pub subreddit_id: String,
    pub subreddit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedditComment {
    pub created: DateTime<Utc>,
    /// `None` once the author deleted their account or the comment.
    pub author: Option<String>,
    pub body: String,
    pub score: i64,
    /// Fullname of the owning post.
    pub post_id: String,
}

/// One entry of a post's comment tree as returned by the source.
#[derive(Debug, Clone, PartialEq)]
pub enum CommentNode {
    Comment(RawComment),
    More(MoreComments),
}

impl CommentNode {
    pub fn replies(&self) -> &[CommentNode] {
        match self {
            CommentNode::Comment(comment) => &comment.replies,
            CommentNode::More(_) => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawComment {
    pub id: String,
    pub author: Option<String>,
    pub body: String,
    pub score: i64,
    pub created: DateTime<Utc>,
    pub replies: Vec<CommentNode>,
}

/// "Load more comments" placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct MoreComments {
    pub id: String,
    pub count: u64,
    pub children: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subreddit {
    pub id: String,
    pub name: String,
    pub title: String,
}

/// Inclusive `[start, end]` search window. Neighbouring windows are separated
/// by one second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn width(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// Cloudsearch range term understood by the search endpoint.
    pub fn search_term(&self) -> String {
        format!(
            "timestamp:{}..{}",
            self.start.timestamp(),
            self.end.timestamp()
        )
    }
}
