//! SQLite-backed seeding policy store.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::types::{PolicyAction, PolicyError, SeedingPolicy};

/// Persistence for named seeding policies.
pub trait PolicyStore: Send + Sync {
    fn upsert(&self, policy: &SeedingPolicy) -> Result<(), PolicyError>;

    fn get(&self, name: &str) -> Result<Option<SeedingPolicy>, PolicyError>;

    /// Policy scoped to a category, if one exists.
    fn get_for_category(&self, category: &str) -> Result<Option<SeedingPolicy>, PolicyError>;

    fn list(&self) -> Result<Vec<SeedingPolicy>, PolicyError>;

    fn delete(&self, name: &str) -> Result<bool, PolicyError>;
}

pub struct SqlitePolicyStore {
    conn: Mutex<Connection>,
}

impl SqlitePolicyStore {
    pub fn new(path: &Path) -> Result<Self, PolicyError> {
        let conn = Connection::open(path).map_err(|e| PolicyError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, PolicyError> {
        let conn =
            Connection::open_in_memory().map_err(|e| PolicyError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), PolicyError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS seeding_policies (
                name TEXT PRIMARY KEY,
                category TEXT,
                ratio_limit REAL,
                time_limit_minutes INTEGER,
                action TEXT NOT NULL,
                keep_files INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_policies_category ON seeding_policies(category);
            "#,
        )
        .map_err(|e| PolicyError::Database(e.to_string()))?;
        Ok(())
    }

    fn row_to_policy(row: &rusqlite::Row) -> rusqlite::Result<SeedingPolicy> {
        let action_str: String = row.get(4)?;
        let action = match action_str.as_str() {
            "pause" => PolicyAction::Pause,
            "remove" => PolicyAction::Remove,
            _ => PolicyAction::Stop,
        };
        let created_at_str: String = row.get(6)?;
        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(SeedingPolicy {
            name: row.get(0)?,
            category: row.get(1)?,
            ratio_limit: row.get(2)?,
            time_limit_minutes: row.get::<_, Option<i64>>(3)?.map(|v| v as u64),
            action,
            keep_files: row.get::<_, i64>(5)? != 0,
            created_at,
        })
    }
}

impl PolicyStore for SqlitePolicyStore {
    fn upsert(&self, policy: &SeedingPolicy) -> Result<(), PolicyError> {
        if policy.name.trim().is_empty() {
            return Err(PolicyError::Invalid("policy name cannot be empty".to_string()));
        }
        if let Some(ratio) = policy.ratio_limit {
            if ratio <= 0.0 || !ratio.is_finite() {
                return Err(PolicyError::Invalid(
                    "ratio_limit must be positive".to_string(),
                ));
            }
        }

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO seeding_policies (name, category, ratio_limit, time_limit_minutes, action, keep_files, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(name) DO UPDATE SET category = excluded.category, \
             ratio_limit = excluded.ratio_limit, time_limit_minutes = excluded.time_limit_minutes, \
             action = excluded.action, keep_files = excluded.keep_files",
            params![
                policy.name,
                policy.category,
                policy.ratio_limit,
                policy.time_limit_minutes.map(|v| v as i64),
                policy.action.as_str(),
                policy.keep_files as i64,
                policy.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| PolicyError::Database(e.to_string()))?;
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<SeedingPolicy>, PolicyError> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT name, category, ratio_limit, time_limit_minutes, action, keep_files, created_at \
             FROM seeding_policies WHERE name = ?",
            params![name],
            Self::row_to_policy,
        );
        match result {
            Ok(policy) => Ok(Some(policy)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(PolicyError::Database(e.to_string())),
        }
    }

    fn get_for_category(&self, category: &str) -> Result<Option<SeedingPolicy>, PolicyError> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT name, category, ratio_limit, time_limit_minutes, action, keep_files, created_at \
             FROM seeding_policies WHERE category = ? ORDER BY name LIMIT 1",
            params![category],
            Self::row_to_policy,
        );
        match result {
            Ok(policy) => Ok(Some(policy)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(PolicyError::Database(e.to_string())),
        }
    }

    fn list(&self) -> Result<Vec<SeedingPolicy>, PolicyError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT name, category, ratio_limit, time_limit_minutes, action, keep_files, created_at \
                 FROM seeding_policies ORDER BY name",
            )
            .map_err(|e| PolicyError::Database(e.to_string()))?;

        let rows = stmt
            .query_map([], Self::row_to_policy)
            .map_err(|e| PolicyError::Database(e.to_string()))?;

        let mut policies = Vec::new();
        for row in rows {
            policies.push(row.map_err(|e| PolicyError::Database(e.to_string()))?);
        }
        Ok(policies)
    }

    fn delete(&self, name: &str) -> Result<bool, PolicyError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute("DELETE FROM seeding_policies WHERE name = ?", params![name])
            .map_err(|e| PolicyError::Database(e.to_string()))?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_policy(name: &str, category: Option<&str>) -> SeedingPolicy {
        SeedingPolicy {
            name: name.to_string(),
            category: category.map(|s| s.to_string()),
            ratio_limit: Some(2.0),
            time_limit_minutes: Some(1440),
            action: PolicyAction::Stop,
            keep_files: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_upsert_and_get() {
        let store = SqlitePolicyStore::in_memory().unwrap();
        store.upsert(&make_policy("default", None)).unwrap();

        let policy = store.get("default").unwrap().expect("Should exist");
        assert_eq!(policy.ratio_limit, Some(2.0));
        assert_eq!(policy.action, PolicyAction::Stop);

        // Upsert updates in place
        let mut updated = make_policy("default", None);
        updated.ratio_limit = Some(4.0);
        updated.action = PolicyAction::Remove;
        store.upsert(&updated).unwrap();

        let policy = store.get("default").unwrap().expect("Should exist");
        assert_eq!(policy.ratio_limit, Some(4.0));
        assert_eq!(policy.action, PolicyAction::Remove);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_get_for_category() {
        let store = SqlitePolicyStore::in_memory().unwrap();
        store.upsert(&make_policy("movies", Some("movies"))).unwrap();
        store.upsert(&make_policy("general", None)).unwrap();

        let policy = store.get_for_category("movies").unwrap().expect("Should exist");
        assert_eq!(policy.name, "movies");
        assert!(store.get_for_category("music").unwrap().is_none());
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let store = SqlitePolicyStore::in_memory().unwrap();

        let mut bad = make_policy("", None);
        assert!(matches!(store.upsert(&bad), Err(PolicyError::Invalid(_))));

        bad.name = "ok".to_string();
        bad.ratio_limit = Some(-1.0);
        assert!(matches!(store.upsert(&bad), Err(PolicyError::Invalid(_))));
    }

    #[test]
    fn test_delete() {
        let store = SqlitePolicyStore::in_memory().unwrap();
        store.upsert(&make_policy("default", None)).unwrap();

        assert!(store.delete("default").unwrap());
        assert!(store.get("default").unwrap().is_none());
        assert!(!store.delete("default").unwrap());
    }
}
