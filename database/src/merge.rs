use crate::{Store, StoreCounts, STORE_EXTENSION};
use harvest_core::{CoreError, DatabaseError};
use sqlx::{Connection, SqliteConnection};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub destination: PathBuf,
    /// Input files, in the order they were merged.
    pub sources: Vec<PathBuf>,
    pub counts: StoreCounts,
}

/// `*.db` files of `dir` in lexicographic order, `exclude` left out.
pub async fn list_stores(dir: &Path, exclude: Option<&Path>) -> Result<Vec<PathBuf>, CoreError> {
    let excluded = match exclude {
        Some(path) => tokio::fs::canonicalize(path).await.ok(),
        None => None,
    };

    let mut stores = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_store = path.extension().and_then(|e| e.to_str()) == Some(STORE_EXTENSION);
        if !is_store || !entry.file_type().await?.is_file() {
            continue;
        }
        if excluded.is_some() && tokio::fs::canonicalize(&path).await.ok() == excluded {
            continue;
        }
        stores.push(path);
    }

    stores.sort();
    Ok(stores)
}

/// Concatenates every store in `dir` into `destination`. Rows are copied
/// verbatim; nothing is deduplicated.
///
/// An existing destination is replaced only when `overwrite` is set. The
/// merge is built in a scratch file next to `destination` and moved into
/// place once every source went in, so a failure leaves `destination`
/// untouched.
pub async fn merge_stores(
    dir: &Path,
    destination: &Path,
    overwrite: bool,
) -> Result<MergeReport, CoreError> {
    let sources = list_stores(dir, Some(destination)).await?;
    let Some((first, rest)) = sources.split_first() else {
        return Err(CoreError::Database(DatabaseError::NoStores {
            dir: dir.display().to_string(),
        }));
    };

    if tokio::fs::try_exists(destination).await? && !overwrite {
        return Err(CoreError::Database(DatabaseError::DestinationExists {
            path: destination.display().to_string(),
        }));
    }

    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let scratch = scratch_path(destination);
    tokio::fs::copy(first, &scratch).await?;
    debug!("Copied {} to {}", first.display(), scratch.display());

    let counts = match append_stores(&scratch, rest).await {
        Ok(counts) => counts,
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_file(&scratch).await {
                warn!("Could not remove {}: {}", scratch.display(), cleanup);
            }
            return Err(e);
        }
    };

    if overwrite && tokio::fs::try_exists(destination).await? {
        info!("Overwriting {}", destination.display());
    }
    tokio::fs::rename(&scratch, destination).await?;

    Ok(MergeReport {
        destination: destination.to_path_buf(),
        sources,
        counts,
    })
}

fn scratch_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

async fn append_stores(target: &Path, sources: &[PathBuf]) -> Result<StoreCounts, CoreError> {
    let store = Store::open(target).await?;
    let result = append_each(&store, sources).await;
    let counts = match result {
        Ok(()) => store.counts().await,
        Err(e) => Err(e),
    };
    store.close().await;
    counts
}

async fn append_each(store: &Store, sources: &[PathBuf]) -> Result<(), CoreError> {
    let mut conn = store.pool().acquire().await?;

    for source in sources {
        let source_path = source.to_string_lossy().to_string();
        sqlx::query("ATTACH DATABASE ? AS src")
            .bind(&source_path)
            .execute(&mut *conn)
            .await?;

        let copied = copy_attached(&mut conn).await;

        // ATTACH and DETACH cannot run inside a transaction, so the detach
        // happens here whether or not the copy went through.
        sqlx::query("DETACH DATABASE src")
            .execute(&mut *conn)
            .await?;

        let (submissions, comments) = copied.map_err(|e| {
            CoreError::Database(DatabaseError::MergeFailed {
                store: source.display().to_string(),
                reason: e.to_string(),
            })
        })?;
        info!(
            "Merged {} ({} submissions, {} comments)",
            source.display(),
            submissions,
            comments
        );
    }

    Ok(())
}

/// Copies both tables of the attached `src` in one transaction.
async fn copy_attached(conn: &mut SqliteConnection) -> Result<(u64, u64), sqlx::Error> {
    let mut tx = conn.begin().await?;

    let submissions = sqlx::query(
        r#"
        INSERT INTO submissions (
            postID, postTitle, postBody, postScore, postDate, subredditName, subredditID
        )
        SELECT postID, postTitle, postBody, postScore, postDate, subredditName, subredditID
        FROM src.submissions
        "#,
    )
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let comments = sqlx::query(
        r#"
        INSERT INTO comments (date, user, body, comScore, postID)
        SELECT date, user, body, comScore, postID
        FROM src.comments
        "#,
    )
    .execute(&mut *tx)
    .await?
    .rows_affected();

    tx.commit().await?;
    Ok((submissions, comments))
}
