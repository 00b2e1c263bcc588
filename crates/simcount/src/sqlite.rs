use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::{CounterBacking, CounterIdentity, CounterSnapshot, CounterStoreError};

/// Counter snapshots in a SQLite file, one row per counter identity.
#[derive(Debug, Clone)]
pub struct SqliteCounterStore {
    pool: SqlitePool,
}

impl SqliteCounterStore {
    pub async fn new(path: &str) -> Result<Self, CounterStoreError> {
        let url = sqlite_url(path);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        sqlx::query("PRAGMA journal_mode = WAL;")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA synchronous = NORMAL;")
            .execute(&pool)
            .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sim_counters (\
                identity TEXT PRIMARY KEY,\
                imported INTEGER NOT NULL,\
                exported INTEGER NOT NULL,\
                imported_remainder REAL NOT NULL,\
                exported_remainder REAL NOT NULL,\
                timestamp_ms INTEGER,\
                updated_at INTEGER NOT NULL\
            )",
        )
        .execute(&pool)
        .await?;

        info!(path = %path, "counter store initialized");

        Ok(Self { pool })
    }

    pub async fn counter_count(&self) -> Result<i64, CounterStoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM sim_counters")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("count"))
    }
}

#[async_trait]
impl CounterBacking for SqliteCounterStore {
    async fn load(&self, identity: &CounterIdentity) -> Result<Option<CounterSnapshot>, CounterStoreError> {
        let key = identity.key();
        let row = sqlx::query(
            "SELECT imported, exported, imported_remainder, exported_remainder, timestamp_ms \
             FROM sim_counters WHERE identity = ?",
        )
        .bind(&key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(CounterSnapshot {
            imported: from_column(&key, row.get::<i64, _>("imported"))?,
            exported: from_column(&key, row.get::<i64, _>("exported"))?,
            imported_remainder: row.get::<f64, _>("imported_remainder"),
            exported_remainder: row.get::<f64, _>("exported_remainder"),
            timestamp_ms: row.get::<Option<i64>, _>("timestamp_ms"),
        }))
    }

    async fn save(&self, identity: &CounterIdentity, snapshot: &CounterSnapshot) -> Result<(), CounterStoreError> {
        let key = identity.key();
        sqlx::query(
            "INSERT INTO sim_counters \
                (identity, imported, exported, imported_remainder, exported_remainder, timestamp_ms, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(identity) DO UPDATE SET \
                imported = excluded.imported,\
                exported = excluded.exported,\
                imported_remainder = excluded.imported_remainder,\
                exported_remainder = excluded.exported_remainder,\
                timestamp_ms = excluded.timestamp_ms,\
                updated_at = excluded.updated_at",
        )
        .bind(&key)
        .bind(to_column(&key, snapshot.imported)?)
        .bind(to_column(&key, snapshot.exported)?)
        .bind(snapshot.imported_remainder)
        .bind(snapshot.exported_remainder)
        .bind(snapshot.timestamp_ms)
        .bind(unix_ms())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn to_column(key: &str, value: u64) -> Result<i64, CounterStoreError> {
    i64::try_from(value).map_err(|_| CounterStoreError::Overflow {
        key: key.to_string(),
        value,
    })
}

fn from_column(key: &str, value: i64) -> Result<u64, CounterStoreError> {
    u64::try_from(value).map_err(|_| CounterStoreError::Negative {
        key: key.to_string(),
        value,
    })
}

fn sqlite_url(path: &str) -> String {
    if path.starts_with("sqlite:") {
        path.to_string()
    } else {
        format!("sqlite://{path}?mode=rwc")
    }
}

fn unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
