//! SQLite-backed download store.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use thiserror::Error;

use crate::seeding::DownloadSeedingPolicy;

use super::types::{DownloadFilter, DownloadStatus, TorrentDownload};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Duplicate entry: {0}")]
    Duplicate(String),
}

/// Persistence for managed downloads.
pub trait DownloadStore: Send + Sync {
    fn insert(&self, download: &TorrentDownload) -> Result<(), StoreError>;

    fn get(&self, id: &str) -> Result<Option<TorrentDownload>, StoreError>;

    fn get_by_info_hash(&self, info_hash: &str) -> Result<Option<TorrentDownload>, StoreError>;

    fn list(&self, filter: &DownloadFilter) -> Result<Vec<TorrentDownload>, StoreError>;

    fn update(&self, download: &TorrentDownload) -> Result<(), StoreError>;

    fn delete(&self, id: &str) -> Result<bool, StoreError>;

    fn count_by_status(&self, status: DownloadStatus) -> Result<u64, StoreError>;

    /// Sum of downloaded and uploaded bytes over non-removed downloads.
    fn totals(&self) -> Result<(u64, u64), StoreError>;
}

/// SQLite-backed download store.
pub struct SqliteDownloadStore {
    conn: Mutex<Connection>,
}

impl SqliteDownloadStore {
    /// Open the store at the given path, creating tables if needed.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS downloads (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                info_hash TEXT NOT NULL,
                magnet_uri TEXT NOT NULL,
                client_name TEXT NOT NULL,
                client_id TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                progress REAL NOT NULL DEFAULT 0,
                size_bytes INTEGER NOT NULL DEFAULT 0,
                downloaded_bytes INTEGER NOT NULL DEFAULT 0,
                uploaded_bytes INTEGER NOT NULL DEFAULT 0,
                download_speed INTEGER NOT NULL DEFAULT 0,
                upload_speed INTEGER NOT NULL DEFAULT 0,
                peers INTEGER NOT NULL DEFAULT 0,
                seeders INTEGER NOT NULL DEFAULT 0,
                leechers INTEGER NOT NULL DEFAULT 0,
                eta_secs INTEGER,
                save_path TEXT,
                category TEXT,
                requested_by TEXT,
                error_message TEXT,
                favorite INTEGER NOT NULL DEFAULT 0,
                seeding_policy TEXT,
                added_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                stopped_at TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_downloads_info_hash
                ON downloads(info_hash) WHERE status != 'removed';
            CREATE INDEX IF NOT EXISTS idx_downloads_status ON downloads(status);
            CREATE INDEX IF NOT EXISTS idx_downloads_client ON downloads(client_name);
            "#,
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn map_insert_error(e: rusqlite::Error, info_hash: &str) -> StoreError {
        if let rusqlite::Error::SqliteFailure(err, _) = &e {
            if err.code == rusqlite::ErrorCode::ConstraintViolation {
                return StoreError::Duplicate(info_hash.to_string());
            }
        }
        StoreError::Database(e.to_string())
    }

    fn build_where_clause(filter: &DownloadFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?".to_string());
            params.push(Box::new(status.as_str().to_string()));
        }

        if !filter.statuses.is_empty() {
            let placeholders = vec!["?"; filter.statuses.len()].join(", ");
            conditions.push(format!("status IN ({})", placeholders));
            for status in &filter.statuses {
                params.push(Box::new(status.as_str().to_string()));
            }
        }

        if let Some(ref client_name) = filter.client_name {
            conditions.push("client_name = ?".to_string());
            params.push(Box::new(client_name.clone()));
        }

        if let Some(ref category) = filter.category {
            conditions.push("category = ?".to_string());
            params.push(Box::new(category.clone()));
        }

        if let Some(favorite) = filter.favorite {
            conditions.push("favorite = ?".to_string());
            params.push(Box::new(favorite as i64));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_download(row: &rusqlite::Row) -> rusqlite::Result<TorrentDownload> {
        let status_str: String = row.get(6)?;
        let seeding_policy_json: Option<String> = row.get(22)?;
        let added_at_str: String = row.get(23)?;
        let started_at_str: Option<String> = row.get(24)?;
        let completed_at_str: Option<String> = row.get(25)?;
        let stopped_at_str: Option<String> = row.get(26)?;
        let updated_at_str: String = row.get(27)?;

        let status = DownloadStatus::parse(&status_str).unwrap_or(DownloadStatus::Failed);
        let seeding_policy: Option<DownloadSeedingPolicy> =
            seeding_policy_json.and_then(|json| serde_json::from_str(&json).ok());

        Ok(TorrentDownload {
            id: row.get(0)?,
            name: row.get(1)?,
            info_hash: row.get(2)?,
            magnet_uri: row.get(3)?,
            client_name: row.get(4)?,
            client_id: row.get(5)?,
            status,
            progress: row.get(7)?,
            size_bytes: row.get::<_, i64>(8)? as u64,
            downloaded_bytes: row.get::<_, i64>(9)? as u64,
            uploaded_bytes: row.get::<_, i64>(10)? as u64,
            download_speed: row.get::<_, i64>(11)? as u64,
            upload_speed: row.get::<_, i64>(12)? as u64,
            peers: row.get::<_, i64>(13)? as u32,
            seeders: row.get::<_, i64>(14)? as u32,
            leechers: row.get::<_, i64>(15)? as u32,
            eta_secs: row.get::<_, Option<i64>>(16)?.map(|v| v as u64),
            save_path: row.get(17)?,
            category: row.get(18)?,
            requested_by: row.get(19)?,
            error_message: row.get(20)?,
            favorite: row.get::<_, i64>(21)? != 0,
            seeding_policy,
            added_at: parse_timestamp(&added_at_str),
            started_at: started_at_str.as_deref().map(parse_timestamp_str),
            completed_at: completed_at_str.as_deref().map(parse_timestamp_str),
            stopped_at: stopped_at_str.as_deref().map(parse_timestamp_str),
            updated_at: parse_timestamp(&updated_at_str),
        })
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    parse_timestamp_str(s)
}

fn parse_timestamp_str(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

const SELECT_COLUMNS: &str = "id, name, info_hash, magnet_uri, client_name, client_id, status, \
    progress, size_bytes, downloaded_bytes, uploaded_bytes, download_speed, upload_speed, peers, \
    seeders, leechers, eta_secs, save_path, category, requested_by, error_message, favorite, \
    seeding_policy, added_at, started_at, completed_at, stopped_at, updated_at";

impl DownloadStore for SqliteDownloadStore {
    fn insert(&self, download: &TorrentDownload) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();

        let seeding_policy_json = download
            .seeding_policy
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        conn.execute(
            &format!(
                "INSERT INTO downloads ({}) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                SELECT_COLUMNS
            ),
            params![
                download.id,
                download.name,
                download.info_hash,
                download.magnet_uri,
                download.client_name,
                download.client_id,
                download.status.as_str(),
                download.progress,
                download.size_bytes as i64,
                download.downloaded_bytes as i64,
                download.uploaded_bytes as i64,
                download.download_speed as i64,
                download.upload_speed as i64,
                download.peers as i64,
                download.seeders as i64,
                download.leechers as i64,
                download.eta_secs.map(|v| v as i64),
                download.save_path,
                download.category,
                download.requested_by,
                download.error_message,
                download.favorite as i64,
                seeding_policy_json,
                download.added_at.to_rfc3339(),
                download.started_at.map(|dt| dt.to_rfc3339()),
                download.completed_at.map(|dt| dt.to_rfc3339()),
                download.stopped_at.map(|dt| dt.to_rfc3339()),
                download.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Self::map_insert_error(e, &download.info_hash))?;

        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<TorrentDownload>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let result = conn.query_row(
            &format!("SELECT {} FROM downloads WHERE id = ?", SELECT_COLUMNS),
            params![id],
            Self::row_to_download,
        );

        match result {
            Ok(download) => Ok(Some(download)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e.to_string())),
        }
    }

    fn get_by_info_hash(&self, info_hash: &str) -> Result<Option<TorrentDownload>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let result = conn.query_row(
            &format!(
                "SELECT {} FROM downloads WHERE info_hash = ? AND status != 'removed'",
                SELECT_COLUMNS
            ),
            params![info_hash.to_lowercase()],
            Self::row_to_download,
        );

        match result {
            Ok(download) => Ok(Some(download)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e.to_string())),
        }
    }

    fn list(&self, filter: &DownloadFilter) -> Result<Vec<TorrentDownload>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);
        let limit_clause = filter
            .limit
            .map(|l| format!("LIMIT {}", l))
            .unwrap_or_default();

        let sql = format!(
            "SELECT {} FROM downloads {} ORDER BY added_at DESC {}",
            SELECT_COLUMNS, where_clause, limit_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_download)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut downloads = Vec::new();
        for row in rows {
            downloads.push(row.map_err(|e| StoreError::Database(e.to_string()))?);
        }
        Ok(downloads)
    }

    fn update(&self, download: &TorrentDownload) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();

        let seeding_policy_json = download
            .seeding_policy
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let changed = conn
            .execute(
                "UPDATE downloads SET name = ?, client_id = ?, status = ?, progress = ?, \
                 size_bytes = ?, downloaded_bytes = ?, uploaded_bytes = ?, download_speed = ?, \
                 upload_speed = ?, peers = ?, seeders = ?, leechers = ?, eta_secs = ?, \
                 save_path = ?, category = ?, requested_by = ?, error_message = ?, favorite = ?, \
                 seeding_policy = ?, started_at = ?, completed_at = ?, stopped_at = ?, \
                 updated_at = ? WHERE id = ?",
                params![
                    download.name,
                    download.client_id,
                    download.status.as_str(),
                    download.progress,
                    download.size_bytes as i64,
                    download.downloaded_bytes as i64,
                    download.uploaded_bytes as i64,
                    download.download_speed as i64,
                    download.upload_speed as i64,
                    download.peers as i64,
                    download.seeders as i64,
                    download.leechers as i64,
                    download.eta_secs.map(|v| v as i64),
                    download.save_path,
                    download.category,
                    download.requested_by,
                    download.error_message,
                    download.favorite as i64,
                    seeding_policy_json,
                    download.started_at.map(|dt| dt.to_rfc3339()),
                    download.completed_at.map(|dt| dt.to_rfc3339()),
                    download.stopped_at.map(|dt| dt.to_rfc3339()),
                    Utc::now().to_rfc3339(),
                    download.id,
                ],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(StoreError::Database(format!(
                "No download with id {}",
                download.id
            )));
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();

        let changed = conn
            .execute("DELETE FROM downloads WHERE id = ?", params![id])
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(changed > 0)
    }

    fn count_by_status(&self, status: DownloadStatus) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            "SELECT COUNT(*) FROM downloads WHERE status = ?",
            params![status.as_str()],
            |row| row.get::<_, i64>(0),
        )
        .map(|count| count as u64)
        .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn totals(&self) -> Result<(u64, u64), StoreError> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            "SELECT COALESCE(SUM(downloaded_bytes), 0), COALESCE(SUM(uploaded_bytes), 0) \
             FROM downloads WHERE status != 'removed'",
            [],
            |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64)),
        )
        .map_err(|e| StoreError::Database(e.to_string()))
    }
}
