//! SQLite persistence for harvested submissions and comments.
//!
//! The schema is fixed and shared with existing `.db` files: column names and
//! order must not change, since `merge` copies rows with `INSERT ... SELECT`.

pub mod merge;


pub use merge::{merge_stores, MergeReport};

use harvest_core::time::format_store_date;
use harvest_core::{CoreError, DatabaseError, RedditComment, RedditPost};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const STORE_EXTENSION: &str = "db";

const CREATE_COMMENTS: &str = r#"
    CREATE TABLE IF NOT EXISTS comments (
        date TEXT,
        user TEXT,
        body TEXT,
        comScore INTEGER,
        postID TEXT
    )
"#;

const CREATE_SUBMISSIONS: &str = r#"
    CREATE TABLE IF NOT EXISTS submissions (
        postID TEXT,
        postTitle TEXT,
        postBody TEXT,
        postScore INTEGER,
        postDate TEXT,
        subredditName TEXT,
        subredditID TEXT
    )
"#;

/// Row counts of a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub submissions: u64,
    pub comments: u64,
}

/// Append-only store. Owns its single connection until `close`.
#[derive(Debug)]
pub struct Store {
    pool: SqlitePool,
    path: PathBuf,
}

fn sql_error(e: sqlx::Error) -> CoreError {
    CoreError::Database(DatabaseError::Sql(e))
}

impl Store {
    /// Opens `<base_path>/<name>.db`, creating the directory, the file and
    /// the tables as needed.
    pub async fn init(name: &str, base_path: &Path) -> Result<Self, CoreError> {
        Self::open(&Self::path_for(name, base_path)?).await
    }

    /// Resolves the file a store name refers to.
    pub fn path_for(name: &str, base_path: &Path) -> Result<PathBuf, CoreError> {
        let name = name.trim();
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(CoreError::invalid_input(format!(
                "Invalid database name '{}'",
                name
            )));
        }

        let file = if Path::new(name).extension().and_then(|e| e.to_str()) == Some(STORE_EXTENSION)
        {
            name.to_string()
        } else {
            format!("{}.{}", name, STORE_EXTENSION)
        };
        Ok(base_path.join(file))
    }

    /// Opens the store file at `path`.
    pub async fn open(path: &Path) -> Result<Self, CoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| {
                CoreError::Database(DatabaseError::ConnectionFailed {
                    reason: format!("{}: {}", path.display(), e),
                })
            })?;

        let store = Self {
            pool,
            path: path.to_path_buf(),
        };
        store.ensure_schema().await?;

        info!("Opened store {}", path.display());
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), CoreError> {
        for (table, statement) in [
            ("comments", CREATE_COMMENTS),
            ("submissions", CREATE_SUBMISSIONS),
        ] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to create table {}: {}", table, e);
                    CoreError::Database(DatabaseError::SchemaFailed {
                        table: table.to_string(),
                    })
                })?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Link posts store their URL in `postBody`.
    pub async fn save_submission(&self, post: &RedditPost) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO submissions (
                postID, postTitle, postBody, postScore, postDate, subredditName, subredditID
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.title)
        .bind(post.body.as_str())
        .bind(post.score)
        .bind(format_store_date(&post.created))
        .bind(&post.subreddit)
        .bind(&post.subreddit_id)
        .execute(&self.pool)
        .await
        .map_err(sql_error)?;

        debug!("Saved submission {} from r/{}", post.id, post.subreddit);
        Ok(())
    }

    pub async fn save_comment(&self, comment: &RedditComment) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO comments (date, user, body, comScore, postID)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(format_store_date(&comment.created))
        .bind(comment.author.as_deref())
        .bind(&comment.body)
        .bind(comment.score)
        .bind(&comment.post_id)
        .execute(&self.pool)
        .await
        .map_err(sql_error)?;

        Ok(())
    }

    /// Subreddit names, most submissions first.
    pub async fn distinct_channels(&self) -> Result<Vec<String>, CoreError> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT subredditName
            FROM submissions
            WHERE subredditName IS NOT NULL
            GROUP BY subredditName
            ORDER BY COUNT(*) DESC, subredditName ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(sql_error)
    }

    /// Bodies of every comment on a submission of `channel`, in insertion
    /// order.
    pub async fn comment_text_by_channel(&self, channel: &str) -> Result<Vec<String>, CoreError> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT comments.body
            FROM comments
            JOIN submissions ON comments.postID = submissions.postID
            WHERE submissions.subredditName = ?
            ORDER BY comments.rowid
            "#,
        )
        .bind(channel)
        .fetch_all(&self.pool)
        .await
        .map_err(sql_error)
    }

    pub async fn counts(&self) -> Result<StoreCounts, CoreError> {
        let submissions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM submissions")
            .fetch_one(&self.pool)
            .await
            .map_err(sql_error)?;
        let comments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments")
            .fetch_one(&self.pool)
            .await
            .map_err(sql_error)?;

        Ok(StoreCounts {
            submissions: submissions.max(0) as u64,
            comments: comments.max(0) as u64,
        })
    }

    pub async fn close(self) {
        self.pool.close().await;
        info!("Closed store {}", self.path.display());
    }
}
