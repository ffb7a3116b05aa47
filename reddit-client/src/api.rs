use crate::source::{ContentSource, Notifier, Page, SearchRequest, MAX_PAGE_SIZE};
use harvest_core::time::from_unix_seconds;
use harvest_core::{
    CommentNode, ConfigError, CoreError, MoreComments, NotificationError, PostBody, RawComment,
    RedditApiError, RedditComment, RedditConfig, RedditPost, Subreddit,
};
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

const REDDIT_OAUTH_BASE: &str = "https://oauth.reddit.com";
const REDDIT_PUBLIC_BASE: &str = "https://www.reddit.com";

/// Author name the API reports once an account or comment is deleted.
const DELETED_AUTHOR: &str = "[deleted]";

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditPostData {
    /// Fullname, `t3_` prefixed.
    pub name: String,
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub url: String,
    pub subreddit: String,
    pub subreddit_id: String,
    pub created_utc: f64,
    pub score: i64,
    pub is_self: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditSubredditData {
    /// Fullname, `t5_` prefixed.
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub title: String,
}

/// Listing whose children mix comments and "more" placeholders.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedditThingListing {
    pub data: RedditThingListingData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedditThingListingData {
    pub children: Vec<RedditThing>,
    #[serde(default)]
    pub after: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum RedditThing {
    #[serde(rename = "t1")]
    Comment(RedditCommentData),
    #[serde(rename = "more")]
    More(RedditMoreData),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditCommentData {
    pub id: String,
    pub author: String,
    pub body: String,
    pub score: i64,
    pub created_utc: f64,
    /// Fullname of the owning post.
    #[serde(default)]
    pub link_id: String,
    #[serde(default)]
    pub replies: Replies,
}

/// The API sends `""` instead of an empty listing for leaf comments.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Replies {
    Listing(Box<RedditThingListing>),
    Empty(String),
}

impl Default for Replies {
    fn default() -> Self {
        Replies::Empty(String::new())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditMoreData {
    pub id: String,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub children: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ComposeResponse {
    #[serde(default)]
    json: ComposeJson,
}

#[derive(Debug, Default, Deserialize)]
struct ComposeJson {
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

fn author_name(author: String) -> Option<String> {
    if author == DELETED_AUTHOR || author.is_empty() {
        None
    } else {
        Some(author)
    }
}

fn timestamp(created_utc: f64, what: &str) -> Result<chrono::DateTime<chrono::Utc>, CoreError> {
    from_unix_seconds(created_utc).ok_or_else(|| {
        CoreError::RedditApi(RedditApiError::InvalidResponse {
            details: format!("Invalid created_utc {} on {}", created_utc, what),
        })
    })
}

impl TryFrom<RedditPostData> for RedditPost {
    type Error = CoreError;

    fn try_from(post_data: RedditPostData) -> Result<Self, Self::Error> {
        let created = timestamp(post_data.created_utc, &post_data.name)?;
        let body = if post_data.is_self {
            PostBody::SelfText(post_data.selftext)
        } else {
            PostBody::Link(post_data.url)
        };

        Ok(Self {
            id: post_data.name,
            title: post_data.title,
            body,
            score: post_data.score,
            created,
            subreddit_id: post_data.subreddit_id,
            subreddit: post_data.subreddit,
        })
    }
}

impl TryFrom<RedditCommentData> for RedditComment {
    type Error = CoreError;

    fn try_from(comment: RedditCommentData) -> Result<Self, Self::Error> {
        Ok(Self {
            created: timestamp(comment.created_utc, &comment.id)?,
            author: author_name(comment.author),
            body: comment.body,
            score: comment.score,
            post_id: comment.link_id,
        })
    }
}

impl TryFrom<RedditThing> for CommentNode {
    type Error = CoreError;

    fn try_from(thing: RedditThing) -> Result<Self, Self::Error> {
        match thing {
            RedditThing::Comment(comment) => {
                let replies = match comment.replies {
                    Replies::Listing(listing) => listing
                        .data
                        .children
                        .into_iter()
                        .map(CommentNode::try_from)
                        .collect::<Result<Vec<_>, _>>()?,
                    Replies::Empty(_) => Vec::new(),
                };
                Ok(CommentNode::Comment(RawComment {
                    created: timestamp(comment.created_utc, &comment.id)?,
                    id: comment.id,
                    author: author_name(comment.author),
                    body: comment.body,
                    score: comment.score,
                    replies,
                }))
            }
            RedditThing::More(more) => Ok(CommentNode::More(MoreComments {
                id: more.id,
                count: more.count,
                children: more.children,
            })),
        }
    }
}

/// HTTP implementation of the content source and the private-message
/// notifier.
#[derive(Debug, Clone)]
pub struct RedditApiClient {
    http_client: Client,
    base_url: Url,
    access_token: Option<String>,
    user_agent: String,
}

impl RedditApiClient {
    pub fn new(config: &RedditConfig) -> Result<Self, CoreError> {
        let base = match (&config.api_base, &config.access_token) {
            (Some(base), _) => base.as_str(),
            (None, Some(_)) => REDDIT_OAUTH_BASE,
            (None, None) => REDDIT_PUBLIC_BASE,
        };
        let base_url = Url::parse(base).map_err(|e| {
            CoreError::Config(ConfigError::InvalidValue {
                field: "reddit.api_base".to_string(),
                value: format!("{} ({})", base, e),
            })
        })?;

        let http_client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            http_client,
            base_url,
            access_token: config.access_token.clone(),
            user_agent: config.user_agent.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    /// Sends one request and maps failure statuses onto `RedditApiError`.
    /// `not_found` names the resource a 404 refers to.
    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        query_params: &[(&str, &str)],
        form: Option<&[(&str, &str)]>,
        not_found: impl FnOnce() -> RedditApiError,
    ) -> Result<Response, CoreError> {
        let url = self.base_url.join(endpoint).map_err(|e| {
            CoreError::invalid_input(format!("Invalid endpoint '{}': {}", endpoint, e))
        })?;

        let mut request_builder = self.http_client.request(method.clone(), url);
        if let Some(token) = &self.access_token {
            request_builder = request_builder.bearer_auth(token);
        }
        if !query_params.is_empty() {
            request_builder = request_builder.query(query_params);
        }
        if let Some(form) = form {
            request_builder = request_builder.form(form);
        }

        debug!("Making Reddit API request: {} {}", method, endpoint);
        let response = match request_builder.send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Network error for {} {}: {}", method, endpoint, e);
                if e.is_timeout() {
                    return Err(CoreError::RedditApi(RedditApiError::RequestTimeout));
                }
                return Err(CoreError::Network(e));
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!("Request successful: {} {}", status, endpoint);
            return Ok(response);
        }

        let api_error = match status.as_u16() {
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.trim().parse::<u64>().ok());
                warn!(
                    "Rate limited on {} (retry after: {:?} seconds)",
                    endpoint, retry_after
                );
                RedditApiError::RateLimitExceeded { retry_after }
            }
            401 => RedditApiError::AuthenticationFailed {
                reason: format!("{} rejected the access token", endpoint),
            },
            403 => RedditApiError::Forbidden {
                resource: endpoint.to_string(),
            },
            404 => not_found(),
            code if status.is_server_error() => RedditApiError::ServerError { status_code: code },
            code => RedditApiError::InvalidResponse {
                details: format!("Unexpected status {} for {}", code, endpoint),
            },
        };

        if !matches!(api_error, RedditApiError::RateLimitExceeded { .. }) {
            error!("Request failed with status: {} for {}", status, endpoint);
        }
        Err(CoreError::RedditApi(api_error))
    }

    async fn parse_json<T: serde::de::DeserializeOwned>(
        response: Response,
        what: &str,
    ) -> Result<T, CoreError> {
        response.json().await.map_err(|e| {
            error!("Failed to parse {}: {}", what, e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse {}", what),
            })
        })
    }

    /// Sends a private message to `recipient`. Needs an access token.
    pub async fn compose_message(
        &self,
        recipient: &str,
        subject: &str,
        text: &str,
    ) -> Result<(), CoreError> {
        if self.access_token.is_none() {
            return Err(CoreError::Notification(
                NotificationError::MissingCredentials,
            ));
        }

        let form = [
            ("api_type", "json"),
            ("to", recipient),
            ("subject", subject),
            ("text", text),
        ];
        let delivery_failed = |reason: String| {
            CoreError::Notification(NotificationError::DeliveryFailed {
                target: recipient.to_string(),
                reason,
            })
        };

        let response = self
            .make_request(Method::POST, "/api/compose", &[], Some(&form), || {
                RedditApiError::UserNotFound {
                    user: recipient.to_string(),
                }
            })
            .await
            .map_err(|e| delivery_failed(e.to_string()))?;

        let outcome: ComposeResponse = Self::parse_json(response, "compose response")
            .await
            .map_err(|e| delivery_failed(e.to_string()))?;
        if !outcome.json.errors.is_empty() {
            let reason = serde_json::to_string(&outcome.json.errors)?;
            return Err(delivery_failed(reason));
        }

        info!("Sent message to {}", recipient);
        Ok(())
    }
}

impl ContentSource for RedditApiClient {
    async fn search_page(
        &self,
        request: &SearchRequest,
        after: Option<&str>,
        page_size: u32,
    ) -> Result<Page<RedditPost>, CoreError> {
        let endpoint = format!("/r/{}/search.json", request.subreddit);
        let query = request.query_text();
        let limit = page_size.clamp(1, MAX_PAGE_SIZE).to_string();

        let mut params = vec![
            ("q", query.as_str()),
            ("restrict_sr", "on"),
            ("sort", request.sort.as_str()),
            ("limit", limit.as_str()),
        ];
        if request.uses_cloudsearch() {
            params.push(("syntax", "cloudsearch"));
        }
        if let Some(period) = request.time_filter {
            params.push(("t", period.as_str()));
        }
        if let Some(after) = after {
            params.push(("after", after));
        }

        let response = self
            .make_request(Method::GET, &endpoint, &params, None, || {
                RedditApiError::SubredditNotFound {
                    subreddit: request.subreddit.clone(),
                }
            })
            .await?;
        let listing: RedditListing<RedditPostData> =
            Self::parse_json(response, &format!("search results for r/{}", request.subreddit))
                .await?;

        let items = listing
            .data
            .children
            .into_iter()
            .map(|child| RedditPost::try_from(child.data))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            "Retrieved {} posts from r/{} (after: {:?})",
            items.len(),
            request.subreddit,
            after
        );
        Ok(Page {
            items,
            after: listing.data.after,
        })
    }

    async fn comment_tree(&self, post: &RedditPost) -> Result<Vec<CommentNode>, CoreError> {
        let id36 = post.id.strip_prefix("t3_").unwrap_or(&post.id);
        let endpoint = format!("/comments/{}.json", id36);

        let response = self
            .make_request(Method::GET, &endpoint, &[], None, || {
                RedditApiError::PostNotFound {
                    post_id: post.id.clone(),
                }
            })
            .await?;
        // First element is the post itself, second the comment forest.
        let (_, comments): (serde::de::IgnoredAny, RedditThingListing) =
            Self::parse_json(response, &format!("comments for {}", post.id)).await?;

        comments
            .data
            .children
            .into_iter()
            .map(CommentNode::try_from)
            .collect()
    }

    async fn account_comments(
        &self,
        account: &str,
        limit: u32,
    ) -> Result<Vec<RedditComment>, CoreError> {
        let endpoint = format!("/user/{}/comments.json", account);
        let limit = limit.clamp(1, MAX_PAGE_SIZE).to_string();
        let params = [("sort", "new"), ("limit", limit.as_str())];

        let response = self
            .make_request(Method::GET, &endpoint, &params, None, || {
                RedditApiError::UserNotFound {
                    user: account.to_string(),
                }
            })
            .await?;
        let listing: RedditThingListing =
            Self::parse_json(response, &format!("comments of {}", account)).await?;

        listing
            .data
            .children
            .into_iter()
            .filter_map(|thing| match thing {
                RedditThing::Comment(comment) => Some(RedditComment::try_from(comment)),
                RedditThing::More(_) => None,
            })
            .collect()
    }

    async fn popular_subreddits(&self, limit: u32) -> Result<Vec<Subreddit>, CoreError> {
        let mut subreddits = Vec::new();
        let mut after: Option<String> = None;

        while subreddits.len() < limit as usize {
            let remaining = limit as usize - subreddits.len();
            let page_size = remaining.min(MAX_PAGE_SIZE as usize).to_string();
            let mut params = vec![("limit", page_size.as_str())];
            if let Some(cursor) = after.as_deref() {
                params.push(("after", cursor));
            }

            let response = self
                .make_request(
                    Method::GET,
                    "/subreddits/popular.json",
                    &params,
                    None,
                    || RedditApiError::InvalidResponse {
                        details: "Popular subreddit listing not found".to_string(),
                    },
                )
                .await?;
            let listing: RedditListing<RedditSubredditData> =
                Self::parse_json(response, "popular subreddits").await?;

            let page_len = listing.data.children.len();
            subreddits.extend(
                listing
                    .data
                    .children
                    .into_iter()
                    .take(remaining)
                    .map(|child| Subreddit {
                        id: child.data.name,
                        name: child.data.display_name,
                        title: child.data.title,
                    }),
            );

            after = listing.data.after;
            if after.is_none() || page_len == 0 {
                break;
            }
        }

        info!("Retrieved {} popular subreddits", subreddits.len());
        Ok(subreddits)
    }
}

impl Notifier for RedditApiClient {
    async fn send(&self, target: &str, subject: &str, body: &str) -> Result<(), CoreError> {
        self.compose_message(target, subject, body).await
    }
}
