//! SQLite-backed cursor store
//!
//! A single WAL-mode SQLite file holds the version ledger. The ledger table is
//! created on first use, so a fresh environment needs no manual setup.
//!
//! ```ignore
//! let store = SqliteCursorStore::connect("sqlite://docsync.db", "file_tracker").await?;
//! store.set_last_version("Tracker", &version).await?;
//! ```

use crate::error::CursorError;
use crate::store::{CursorRecord, VersionCursorStore};
use crate::version::Version;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Default ledger table name
pub const DEFAULT_TABLE: &str = "file_tracker";

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("identifier pattern compiles")
});

/// Durable [`VersionCursorStore`] on top of SQLite
#[derive(Debug)]
pub struct SqliteCursorStore {
    pool: SqlitePool,
    table: String,
    schema: OnceCell<()>,
}

impl SqliteCursorStore {
    /// Open (lazily) the store at a `sqlite://` URL
    ///
    /// No connection is made until the first operation; connectivity problems
    /// surface there as [`CursorError::StoreUnavailable`].
    ///
    /// # Errors
    /// - [`CursorError::InvalidConfig`] for a malformed URL or table name
    pub async fn connect(url: &str, table: &str) -> Result<Self, CursorError> {
        if !IDENTIFIER.is_match(table) {
            return Err(CursorError::InvalidConfig(format!(
                "table name '{table}' is not a plain SQL identifier"
            )));
        }

        let opts = SqliteConnectOptions::from_str(url)
            .map_err(|e| CursorError::InvalidConfig(format!("bad sqlite url '{url}': {e}")))?
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy_with(opts);

        Ok(Self {
            pool,
            table: table.to_string(),
            schema: OnceCell::new(),
        })
    }

    /// Open the store backed by a file path
    ///
    /// # Errors
    /// See [`SqliteCursorStore::connect`].
    pub async fn open(path: impl AsRef<Path>, table: &str) -> Result<Self, CursorError> {
        let url = format!("sqlite://{}", path.as_ref().display());
        Self::connect(&url, table).await
    }

    /// Ledger table name
    #[inline]
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the ledger table if it does not exist yet
    ///
    /// Runs at most once per store instance; every operation calls it.
    ///
    /// # Errors
    /// Returns [`CursorError::StoreUnavailable`] when the database cannot be opened.
    pub async fn ensure_schema(&self) -> Result<(), CursorError> {
        self.schema
            .get_or_try_init(|| async {
                let ddl = format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        document_name TEXT PRIMARY KEY,
                        version TEXT NOT NULL,
                        created_at TEXT NOT NULL,
                        updated_at TEXT NOT NULL
                    )",
                    self.table
                );
                sqlx::query(&ddl).execute(&self.pool).await?;
                tracing::debug!(table = %self.table, "cursor ledger schema ready");
                Ok::<(), CursorError>(())
            })
            .await?;
        Ok(())
    }

    /// Remove a document's record
    ///
    /// Administrative only; normal synchronization never deletes cursors.
    ///
    /// # Errors
    /// Propagates backend failures.
    pub async fn forget(&self, name: &str) -> Result<bool, CursorError> {
        self.ensure_schema().await?;
        let sql = format!("DELETE FROM {} WHERE document_name = ?1", self.table);
        let done = sqlx::query(&sql).bind(name).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    fn decode(row: &SqliteRow) -> Result<CursorRecord, CursorError> {
        let name: String = row.try_get("document_name")?;
        let raw_version: String = row.try_get("version")?;
        let version = Version::parse(&raw_version).map_err(|source| CursorError::CorruptRecord {
            name: name.clone(),
            source,
        })?;
        let created_at = parse_timestamp(&row.try_get::<String, _>("created_at")?)?;
        let updated_at = parse_timestamp(&row.try_get::<String, _>("updated_at")?)?;

        Ok(CursorRecord {
            name,
            version,
            created_at,
            updated_at,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, CursorError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| CursorError::Backend(format!("bad bookkeeping timestamp '{raw}': {e}")))
}

#[async_trait]
impl VersionCursorStore for SqliteCursorStore {
    async fn record(&self, name: &str) -> Result<Option<CursorRecord>, CursorError> {
        self.ensure_schema().await?;
        let sql = format!(
            "SELECT document_name, version, created_at, updated_at FROM {} WHERE document_name = ?1",
            self.table
        );
        let row = sqlx::query(&sql).bind(name).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn set_last_version(&self, name: &str, version: &Version) -> Result<(), CursorError> {
        self.ensure_schema().await?;
        let sql = format!(
            "INSERT INTO {} (document_name, version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(document_name) DO UPDATE
             SET version = excluded.version, updated_at = excluded.updated_at",
            self.table
        );
        sqlx::query(&sql)
            .bind(name)
            .bind(version.to_rfc3339())
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        tracing::debug!(document = name, %version, "cursor advanced");
        Ok(())
    }

    async fn records(&self) -> Result<Vec<CursorRecord>, CursorError> {
        self.ensure_schema().await?;
        let sql = format!(
            "SELECT document_name, version, created_at, updated_at FROM {} ORDER BY document_name",
            self.table
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(Self::decode).collect()
    }
}
