//! src/services/blob_store.rs
//!
//! BlobStore: bucket-as-table storage backed by SQLite. Every bucket is one
//! catalog table holding `(id, file_name, file_data)` rows; a small registry
//! table records which tables were created as buckets so enumeration does not
//! depend on raw schema introspection.

use crate::models::{
    bucket::BucketName,
    file::{FileName, StoredFile},
};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

/// Coarse classification of a [`StoreError`], used by callers that only need
/// to know how to react (e.g. which HTTP status to answer with).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Connection,
    Storage,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("file name invalid: {0}")]
    InvalidFileName(String),
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("file `{file}` not found in bucket `{bucket}`")]
    FileNotFound { bucket: String, file: String },
    #[error("failed to connect to catalog: {0}")]
    Connection(#[source] sqlx::Error),
    #[error("bucket `{0}` collides with an existing table that lacks the file columns")]
    IncompatibleBucket(String),
    #[error("{context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: sqlx::Error,
    },
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidBucketName { .. } | StoreError::InvalidFileName(_) => {
                ErrorKind::Validation
            }
            StoreError::BucketNotFound(_) | StoreError::FileNotFound { .. } => ErrorKind::NotFound,
            StoreError::Connection(_) => ErrorKind::Connection,
            StoreError::IncompatibleBucket(_) | StoreError::Storage { .. } => ErrorKind::Storage,
        }
    }

    /// Wrap a catalog failure with the operation it interrupted.
    fn storage(context: impl Into<String>) -> impl FnOnce(sqlx::Error) -> Self {
        let context = context.into();
        move |source| StoreError::Storage { context, source }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Settings needed to open the catalog.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// SQLite URL, e.g. `sqlite://./data/blobstore.db` or `sqlite::memory:`.
    pub database_url: String,

    /// Upper bound on pooled connections.
    pub max_connections: u32,
}

/// Name of the table listing engine-created buckets. Starts with `_`, so it
/// can never pass [`BucketName::parse`].
const REGISTRY_TABLE: &str = "__buckets";

/// Columns a table must have to be usable as a bucket.
const BUCKET_COLUMNS: [&str; 3] = ["id", "file_name", "file_data"];

/// BlobStore provides the bucket and file operations:
/// - Create/delete bucket (create/drop a table, keep the registry in sync)
/// - Insert file (append a row)
/// - Get/delete file by name
/// - List files in a bucket, list buckets
///
/// The handle is cheap to clone; clones share one connection pool.
/// No locks are held in-process: concurrent access is serialized by SQLite.
#[derive(Clone, Debug)]
pub struct BlobStore {
    db: SqlitePool,
}

impl BlobStore {
    /// Open the catalog, probe it, and make sure the bucket registry exists.
    ///
    /// Any failure here is a [`StoreError::Connection`]; the pool is closed
    /// before the error is returned.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(StoreError::Connection)?
            .create_if_missing(true);

        let mut pool = SqlitePoolOptions::new().max_connections(config.max_connections.max(1));
        if is_in_memory(&config.database_url) {
            // the shared in-memory catalog vanishes with its last connection
            pool = pool
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let db = pool
            .connect_with(options)
            .await
            .map_err(StoreError::Connection)?;

        let store = Self { db };
        if let Err(err) = store.bootstrap().await {
            store.close().await;
            return Err(StoreError::Connection(err));
        }

        info!("connected to catalog at {}", config.database_url);
        Ok(store)
    }

    /// Liveness round-trip followed by registry creation.
    async fn bootstrap(&self) -> Result<(), sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.db)
            .await?;

        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {REGISTRY_TABLE} (
                name TEXT NOT NULL PRIMARY KEY COLLATE NOCASE
            )"
        );
        sqlx::query(&ddl).execute(&self.db).await?;
        Ok(())
    }

    /// Release every pooled connection. Clones of this handle stop working.
    pub async fn close(self) {
        self.db.close().await;
        debug!("catalog connection pool closed");
    }

    /// Lightweight catalog round-trip for readiness checks.
    pub async fn ping(&self) -> StoreResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.db)
            .await
            .map_err(StoreError::storage("catalog liveness probe failed"))?;
        Ok(())
    }

    /// Create a bucket table if it does not exist yet and register it.
    ///
    /// The transaction takes the write lock up front (`BEGIN IMMEDIATE`) so
    /// concurrent creates wait on the busy timeout instead of failing when a
    /// deferred read lock cannot be upgraded.
    ///
    /// Idempotent. A pre-existing table of the same name is accepted only if
    /// it has the bucket columns; otherwise nothing is registered and
    /// [`StoreError::IncompatibleBucket`] is returned.
    pub async fn create_bucket(&self, bucket: &str) -> StoreResult<()> {
        let bucket = BucketName::parse(bucket)?;
        let context = format!("failed to create bucket `{bucket}`");

        let mut tx = self
            .db
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(StoreError::storage(&context))?;

        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_name TEXT NOT NULL,
                file_data BLOB
            )",
            bucket.quoted()
        );
        sqlx::query(&ddl)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::storage(&context))?;

        let columns = sqlx::query_scalar::<_, String>("SELECT name FROM pragma_table_info(?)")
            .bind(bucket.as_str())
            .fetch_all(&mut *tx)
            .await
            .map_err(StoreError::storage(&context))?;
        let compatible = BUCKET_COLUMNS
            .iter()
            .all(|wanted| columns.iter().any(|have| have.eq_ignore_ascii_case(wanted)));
        if !compatible {
            // dropping `tx` rolls back
            return Err(StoreError::IncompatibleBucket(bucket.to_string()));
        }

        let register = format!("INSERT OR IGNORE INTO {REGISTRY_TABLE} (name) VALUES (?)");
        sqlx::query(&register)
            .bind(bucket.as_str())
            .execute(&mut *tx)
            .await
            .map_err(StoreError::storage(&context))?;

        tx.commit().await.map_err(StoreError::storage(&context))?;

        info!(bucket = %bucket, "ensured bucket exists");
        Ok(())
    }

    /// Drop a bucket table and everything in it.
    ///
    /// Existence is checked explicitly against the registry first, so a
    /// missing bucket is reported as [`StoreError::BucketNotFound`] and the
    /// catalog is left untouched.
    pub async fn delete_bucket(&self, bucket: &str) -> StoreResult<()> {
        let bucket = BucketName::parse(bucket)?;
        let context = format!("failed to delete bucket `{bucket}`");

        let mut tx = self
            .db
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(StoreError::storage(&context))?;

        let lookup = format!("SELECT COUNT(*) FROM {REGISTRY_TABLE} WHERE name = ?");
        let count = sqlx::query_scalar::<_, i64>(&lookup)
            .bind(bucket.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(StoreError::storage(format!(
                "failed to check if bucket `{bucket}` exists"
            )))?;
        if count == 0 {
            return Err(StoreError::BucketNotFound(bucket.to_string()));
        }

        let drop_table = format!("DROP TABLE IF EXISTS {}", bucket.quoted());
        sqlx::query(&drop_table)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::storage(&context))?;

        let unregister = format!("DELETE FROM {REGISTRY_TABLE} WHERE name = ?");
        sqlx::query(&unregister)
            .bind(bucket.as_str())
            .execute(&mut *tx)
            .await
            .map_err(StoreError::storage(&context))?;

        tx.commit().await.map_err(StoreError::storage(&context))?;

        info!(bucket = %bucket, "deleted bucket");
        Ok(())
    }

    /// Append a file row to a bucket and return its surrogate id.
    ///
    /// The bucket is not looked up first: inserting into a bucket that was
    /// never created fails inside the catalog and surfaces as a storage error.
    /// Repeated names are kept as separate rows.
    pub async fn insert_file(&self, bucket: &str, file_name: &str, data: &[u8]) -> StoreResult<i64> {
        let bucket = BucketName::parse(bucket)?;
        let file_name = FileName::parse(file_name)?;

        let sql = format!(
            "INSERT INTO {} (file_name, file_data) VALUES (?, ?)",
            bucket.quoted()
        );
        let result = sqlx::query(&sql)
            .bind(file_name.as_str())
            .bind(data)
            .execute(&self.db)
            .await
            .map_err(StoreError::storage(format!(
                "failed to insert file `{file_name}` into bucket `{bucket}`"
            )))?;

        let id = result.last_insert_rowid();
        info!(
            bucket = %bucket,
            file = %file_name,
            id,
            size_bytes = data.len(),
            "inserted file"
        );
        Ok(id)
    }

    /// Remove every row named exactly `file_name` and return how many went.
    ///
    /// Zero affected rows means the file was absent.
    pub async fn delete_file(&self, bucket: &str, file_name: &str) -> StoreResult<u64> {
        let bucket = BucketName::parse(bucket)?;
        let file_name = FileName::parse(file_name)?;

        let sql = format!("DELETE FROM {} WHERE file_name = ?", bucket.quoted());
        let removed = sqlx::query(&sql)
            .bind(file_name.as_str())
            .execute(&self.db)
            .await
            .map_err(StoreError::storage(format!(
                "failed to delete file `{file_name}` from bucket `{bucket}`"
            )))?
            .rows_affected();

        if removed == 0 {
            return Err(StoreError::FileNotFound {
                bucket: bucket.to_string(),
                file: file_name.to_string(),
            });
        }

        info!(bucket = %bucket, file = %file_name, removed, "deleted file");
        Ok(removed)
    }

    /// Fetch the payload stored under `file_name`.
    ///
    /// With duplicate names the earliest upload (lowest id) wins.
    pub async fn get_file(&self, bucket: &str, file_name: &str) -> StoreResult<Vec<u8>> {
        let bucket = BucketName::parse(bucket)?;
        let file_name = FileName::parse(file_name)?;

        let sql = format!(
            "SELECT id, file_name, file_data FROM {}
             WHERE file_name = ? ORDER BY id ASC LIMIT 1",
            bucket.quoted()
        );
        let row = sqlx::query_as::<_, StoredFile>(&sql)
            .bind(file_name.as_str())
            .fetch_optional(&self.db)
            .await
            .map_err(StoreError::storage(format!(
                "failed to retrieve file `{file_name}` from bucket `{bucket}`"
            )))?
            .ok_or_else(|| StoreError::FileNotFound {
                bucket: bucket.to_string(),
                file: file_name.to_string(),
            })?;

        debug!(bucket = %bucket, file = %row.file_name, id = row.id, "retrieved file");
        Ok(row.into_bytes())
    }

    /// All file names in a bucket, one entry per row, in upload order.
    pub async fn list_files(&self, bucket: &str) -> StoreResult<Vec<String>> {
        let bucket = BucketName::parse(bucket)?;

        let sql = format!("SELECT file_name FROM {} ORDER BY id ASC", bucket.quoted());
        let names = sqlx::query_scalar::<_, String>(&sql)
            .fetch_all(&self.db)
            .await
            .map_err(StoreError::storage(format!(
                "failed to query files from bucket `{bucket}`"
            )))?;

        debug!(bucket = %bucket, count = names.len(), "listed files");
        Ok(names)
    }

    /// All registered bucket names, in the order they were created.
    pub async fn list_buckets(&self) -> StoreResult<Vec<String>> {
        let sql = format!("SELECT name FROM {REGISTRY_TABLE} ORDER BY rowid ASC");
        let names = sqlx::query_scalar::<_, String>(&sql)
            .fetch_all(&self.db)
            .await
            .map_err(StoreError::storage("failed to query bucket names"))?;

        debug!(count = names.len(), "listed buckets");
        Ok(names)
    }
}

/// True for URLs naming an in-memory SQLite catalog.
fn is_in_memory(database_url: &str) -> bool {
    let url = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    url.split('?').next() == Some(":memory:") || url.contains("mode=memory")
}

/// Fresh store over a private in-memory catalog.
#[cfg(test)]
pub(crate) async fn memory_store() -> BlobStore {
    BlobStore::connect(&StoreConfig {
        database_url: "sqlite::memory:".into(),
        max_connections: 1,
    })
    .await
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_bucket_is_idempotent() {
        let store = memory_store().await;
        store.create_bucket("docs").await.unwrap();
        store.create_bucket("docs").await.unwrap();

        let buckets = store.list_buckets().await.unwrap();
        assert_eq!(buckets, vec!["docs".to_string()]);
    }

    #[tokio::test]
    async fn bucket_names_are_case_insensitive() {
        let store = memory_store().await;
        store.create_bucket("Docs").await.unwrap();
        store.create_bucket("docs").await.unwrap();

        assert_eq!(store.list_buckets().await.unwrap(), vec!["Docs".to_string()]);
        store.insert_file("docs", "a.txt", b"x").await.unwrap();
        assert_eq!(store.get_file("DOCS", "a.txt").await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn list_buckets_keeps_creation_order() {
        let store = memory_store().await;
        for name in ["zeta", "alpha", "mid"] {
            store.create_bucket(name).await.unwrap();
        }
        assert_eq!(store.list_buckets().await.unwrap(), vec!["zeta", "alpha", "mid"]);
    }

    #[tokio::test]
    async fn invalid_bucket_names_never_reach_the_catalog() {
        let store = memory_store().await;
        for name in ["", "x\"; DROP TABLE __buckets; --", "1abc", "sqlite_master"] {
            let err = store.create_bucket(name).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
        assert!(store.list_buckets().await.unwrap().is_empty());
        store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn round_trips_arbitrary_bytes() {
        let store = memory_store().await;
        store.create_bucket("bin").await.unwrap();

        let all_bytes: Vec<u8> = (0..=255u8).rev().collect();
        let payloads: [&[u8]; 4] = [b"", &[0xFF, 0xD8, 0xFF], &[0, 0, 0, 0x80, 0xC3], &all_bytes];
        for (i, payload) in payloads.iter().enumerate() {
            let name = format!("f{i}.bin");
            store.insert_file("bin", &name, payload).await.unwrap();
            assert_eq!(store.get_file("bin", &name).await.unwrap(), *payload);
        }
    }

    #[tokio::test]
    async fn insert_assigns_increasing_ids() {
        let store = memory_store().await;
        store.create_bucket("ids").await.unwrap();
        let first = store.insert_file("ids", "a", b"1").await.unwrap();
        let second = store.insert_file("ids", "a", b"2").await.unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn duplicate_names_read_first_and_delete_all() {
        let store = memory_store().await;
        store.create_bucket("docs").await.unwrap();
        store.insert_file("docs", "dup.txt", b"first").await.unwrap();
        store.insert_file("docs", "other.txt", b"keep").await.unwrap();
        store.insert_file("docs", "dup.txt", b"second").await.unwrap();

        assert_eq!(store.get_file("docs", "dup.txt").await.unwrap(), b"first");
        assert_eq!(
            store.list_files("docs").await.unwrap(),
            vec!["dup.txt", "other.txt", "dup.txt"]
        );

        assert_eq!(store.delete_file("docs", "dup.txt").await.unwrap(), 2);
        let err = store.get_file("docs", "dup.txt").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(store.list_files("docs").await.unwrap(), vec!["other.txt"]);
    }

    #[tokio::test]
    async fn delete_missing_file_is_not_found() {
        let store = memory_store().await;
        store.create_bucket("docs").await.unwrap();
        store.insert_file("docs", "Readme.md", b"x").await.unwrap();

        let err = store.delete_file("docs", "readme.md").await.unwrap_err();
        assert!(matches!(err, StoreError::FileNotFound { .. }));
        assert_eq!(store.list_files("docs").await.unwrap(), vec!["Readme.md"]);
    }

    #[tokio::test]
    async fn empty_bucket_lists_no_files() {
        let store = memory_store().await;
        store.create_bucket("empty").await.unwrap();
        assert!(store.list_files("empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_operations_on_unknown_bucket_are_storage_errors() {
        let store = memory_store().await;

        let err = store.get_file("ghost", "a.txt").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        let err = store.delete_file("ghost", "a.txt").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        let err = store.list_files("ghost").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        let err = store.insert_file("ghost", "a.txt", b"x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(err.to_string().contains("ghost"));

        assert!(store.list_buckets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_bucket_removes_table_and_registry_entry() {
        let store = memory_store().await;
        store.create_bucket("images").await.unwrap();
        store.create_bucket("docs").await.unwrap();
        store.insert_file("images", "a.png", b"png").await.unwrap();

        store.delete_bucket("images").await.unwrap();

        assert_eq!(store.list_buckets().await.unwrap(), vec!["docs"]);
        let err = store.list_files("images").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[tokio::test]
    async fn delete_missing_bucket_is_not_found_and_changes_nothing() {
        let store = memory_store().await;
        store.create_bucket("docs").await.unwrap();
        store.insert_file("docs", "a.txt", b"x").await.unwrap();

        let err = store.delete_bucket("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::BucketNotFound(ref name) if name == "nope"));

        assert_eq!(store.list_buckets().await.unwrap(), vec!["docs"]);
        assert_eq!(store.list_files("docs").await.unwrap(), vec!["a.txt"]);
    }

    #[tokio::test]
    async fn unregistered_tables_are_not_buckets() {
        let store = memory_store().await;
        sqlx::query("CREATE TABLE stray (id INTEGER PRIMARY KEY, note TEXT)")
            .execute(&store.db)
            .await
            .unwrap();

        assert!(store.list_buckets().await.unwrap().is_empty());
        let err = store.delete_bucket("stray").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn incompatible_existing_table_is_rejected() {
        let store = memory_store().await;
        sqlx::query("CREATE TABLE stray (id INTEGER PRIMARY KEY, note TEXT)")
            .execute(&store.db)
            .await
            .unwrap();

        let err = store.create_bucket("stray").await.unwrap_err();
        assert!(matches!(err, StoreError::IncompatibleBucket(_)));
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(store.list_buckets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn compatible_existing_table_is_adopted() {
        let store = memory_store().await;
        sqlx::query(
            "CREATE TABLE legacy (id INTEGER PRIMARY KEY, file_name TEXT NOT NULL, file_data BLOB)",
        )
        .execute(&store.db)
        .await
        .unwrap();
        sqlx::query("INSERT INTO legacy (file_name, file_data) VALUES ('old.txt', NULL)")
            .execute(&store.db)
            .await
            .unwrap();

        store.create_bucket("legacy").await.unwrap();
        assert_eq!(store.list_buckets().await.unwrap(), vec!["legacy"]);
        assert!(store.get_file("legacy", "old.txt").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn operations_fail_after_close() {
        let store = memory_store().await;
        let handle = store.clone();
        store.close().await;

        let err = handle.list_buckets().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(handle.ping().await.unwrap_err().kind(), ErrorKind::Storage);
    }

    #[test]
    fn in_memory_urls_are_recognized() {
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite://:memory:"));
        assert!(is_in_memory("sqlite://catalog.db?mode=memory&cache=shared"));
        assert!(!is_in_memory("sqlite://./data/blobstore.db"));
        assert!(!is_in_memory("sqlite:memory.db"));
    }

    #[tokio::test]
    async fn in_memory_catalog_keeps_a_connection_open() {
        let store = memory_store().await;
        store.create_bucket("docs").await.unwrap();
        assert!(store.db.size() >= 1);
        assert_eq!(store.list_buckets().await.unwrap(), vec!["docs"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_bucket_lifecycle_on_shared_handle() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("catalog.db").display());
        let store = BlobStore::connect(&StoreConfig {
            database_url: url,
            max_connections: 5,
        })
        .await
        .unwrap();

        let creates: Vec<_> = (0..20)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.create_bucket(&format!("b{}", i % 4)).await })
            })
            .collect();
        for handle in creates {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.list_buckets().await.unwrap().len(), 4);

        let deletes: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.delete_bucket("b1").await })
            })
            .collect();
        let mut deleted = 0;
        for handle in deletes {
            match handle.await.unwrap() {
                Ok(()) => deleted += 1,
                Err(err) => assert_eq!(err.kind(), ErrorKind::NotFound, "{err}"),
            }
        }
        assert_eq!(deleted, 1);

        let mut remaining = store.list_buckets().await.unwrap();
        remaining.sort();
        assert_eq!(remaining, vec!["b0", "b2", "b3"]);
        store.close().await;
    }

    #[tokio::test]
    async fn connect_fails_when_catalog_cannot_open() {
        let err = BlobStore::connect(&StoreConfig {
            database_url: "sqlite:///nonexistent-blobstore-dir/nested/catalog.db".into(),
            max_connections: 1,
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }
}
