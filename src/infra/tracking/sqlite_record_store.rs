// SQLite-backed record store for moderation actions.
//
// Tables:
// - bans: One row per ban/quiet/removal, closed by setting removal + removal_op
// - comments: Free-text comments per ban, append-only

use crate::core::tracking::glob;
use crate::core::tracking::{Comment, ModerationRecord, NewRecord, RecordKind, RecordStore, TrackingError};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;

pub struct SqliteRecordStore {
    pool: Pool<Sqlite>,
}

fn storage_err(e: sqlx::Error) -> TrackingError {
    TrackingError::StorageError(e.to_string())
}

/// Fixed-width UTC timestamps so string order is time order.
fn to_db_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn from_db_time(value: &str) -> Result<DateTime<Utc>, TrackingError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TrackingError::StorageError(format!("bad timestamp {:?}: {}", value, e)))
}

fn record_from_row(row: &SqliteRow) -> Result<ModerationRecord, TrackingError> {
    let kind_str: String = row.get("kind");
    let kind = RecordKind::parse(&kind_str)
        .ok_or_else(|| TrackingError::StorageError(format!("unknown record kind {:?}", kind_str)))?;
    let created_at: String = row.get("time");
    let removed_at: Option<String> = row.get("removal");

    Ok(ModerationRecord {
        id: row.get("id"),
        channel: row.get("channel"),
        mask: row.get("mask"),
        kind,
        operator: row.get("operator"),
        operator_hostmask: row.get("operator_hostmask"),
        created_at: from_db_time(&created_at)?,
        removed_at: removed_at.as_deref().map(from_db_time).transpose()?,
        removal_operator: row.get("removal_op"),
        log: row.get("log"),
        review_requested: row.get("review_requested"),
    })
}

impl SqliteRecordStore {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure the file exists if it's a file path
        let path_str = database_url.trim_start_matches("sqlite://");
        if !database_url.contains(":memory:") && !Path::new(path_str).exists() {
            if let Some(parent) = Path::new(path_str).parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::File::create(path_str)?;
        }

        let conn_str = if database_url.starts_with("sqlite:") {
            database_url.to_string()
        } else {
            format!("sqlite://{}", database_url)
        };

        let pool = SqlitePoolOptions::new().connect(&conn_str).await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), TrackingError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                channel VARCHAR(30) NOT NULL,
                mask VARCHAR(100) NOT NULL,
                kind TEXT NOT NULL,
                operator VARCHAR(30) NOT NULL,
                operator_hostmask VARCHAR(100),
                time TEXT NOT NULL,
                removal TEXT,
                removal_op VARCHAR(30),
                log TEXT,
                review_requested BOOLEAN NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS bans_open ON bans(channel, removal, mask)",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS comments (
                ban_id INTEGER NOT NULL,
                who VARCHAR(100) NOT NULL,
                comment MEDIUMTEXT NOT NULL,
                time TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS comments_ban_id ON comments(ban_id)")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn create_record(&self, record: NewRecord) -> Result<ModerationRecord, TrackingError> {
        // One statement: the row comes back with its id or nothing was written
        let row = sqlx::query(
            r#"
            INSERT INTO bans (channel, mask, kind, operator, operator_hostmask, time)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&record.channel)
        .bind(record.kind.stored_mask(&record.mask))
        .bind(record.kind.as_str())
        .bind(&record.operator)
        .bind(&record.operator_hostmask)
        .bind(to_db_time(record.created_at))
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;

        record_from_row(&row)
    }

    async fn get_record(&self, record_id: i64) -> Result<Option<ModerationRecord>, TrackingError> {
        let row = sqlx::query("SELECT * FROM bans WHERE id = ?")
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn find_open_record(
        &self,
        channel: &str,
        mask: &str,
    ) -> Result<Option<i64>, TrackingError> {
        let row = sqlx::query(
            r#"
            SELECT id FROM bans
            WHERE channel = ? AND mask = ? AND removal IS NULL AND kind != 'removal'
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(channel)
        .bind(mask)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.map(|r| r.get::<i64, _>("id")))
    }

    async fn close_record(
        &self,
        record_id: i64,
        removal_operator: &str,
        removed_at: DateTime<Utc>,
    ) -> Result<(), TrackingError> {
        // Both columns in one statement, and only while still open
        let result = sqlx::query(
            "UPDATE bans SET removal = ?, removal_op = ? WHERE id = ? AND removal IS NULL",
        )
        .bind(to_db_time(removed_at))
        .bind(removal_operator)
        .bind(record_id)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let exists = sqlx::query("SELECT 1 FROM bans WHERE id = ?")
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?
            .is_some();

        Err(TrackingError::InvalidTransition(if exists {
            format!("record {} is already closed", record_id)
        } else {
            format!("record {} does not exist", record_id)
        }))
    }

    async fn add_comment(&self, comment: Comment) -> Result<(), TrackingError> {
        sqlx::query("INSERT INTO comments (ban_id, who, comment, time) VALUES (?, ?, ?, ?)")
            .bind(comment.record_id)
            .bind(&comment.author)
            .bind(&comment.text)
            .bind(to_db_time(comment.time))
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn list_comments(&self, record_id: i64) -> Result<Vec<Comment>, TrackingError> {
        let rows = sqlx::query(
            "SELECT ban_id, who, comment, time FROM comments WHERE ban_id = ? ORDER BY rowid",
        )
        .bind(record_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let mut comments = Vec::with_capacity(rows.len());
        for row in rows {
            let time: String = row.get("time");
            comments.push(Comment {
                record_id: row.get("ban_id"),
                author: row.get("who"),
                text: row.get("comment"),
                time: from_db_time(&time)?,
            });
        }
        Ok(comments)
    }

    async fn open_channels(&self) -> Result<Vec<String>, TrackingError> {
        let rows = sqlx::query(
            "SELECT DISTINCT channel FROM bans WHERE removal IS NULL ORDER BY channel",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows.iter().map(|r| r.get::<String, _>("channel")).collect())
    }

    async fn list_stale_open_records(
        &self,
        channel: &str,
        older_than: DateTime<Utc>,
        ignore: &[String],
    ) -> Result<Vec<ModerationRecord>, TrackingError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM bans
            WHERE channel = ?
              AND removal IS NULL
              AND kind != 'removal'
              AND review_requested = 0
              AND time < ?
            ORDER BY id
            "#,
        )
        .bind(channel)
        .bind(to_db_time(older_than))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let mut records = Vec::new();
        for row in &rows {
            let record = record_from_row(row)?;
            if !glob::matches_any(ignore, &record.operator) {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn mark_review_requested(&self, record_id: i64) -> Result<(), TrackingError> {
        sqlx::query("UPDATE bans SET review_requested = 1 WHERE id = ?")
            .bind(record_id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store() -> (SqliteRecordStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bans.db");
        let store = SqliteRecordStore::new(path.to_str().unwrap()).await.unwrap();
        (store, dir)
    }

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn new_record(mask: &str, kind: RecordKind, operator: &str, at: DateTime<Utc>) -> NewRecord {
        NewRecord {
            channel: "#test".into(),
            mask: mask.into(),
            kind,
            operator: operator.into(),
            operator_hostmask: Some(format!("{}!user@host.net", operator)),
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let (store, _dir) = store().await;

        let first = store
            .create_record(new_record("asd!*@*", RecordKind::Ban, "op", t(0)))
            .await
            .unwrap();
        let second = store
            .create_record(new_record("dude!*@*", RecordKind::Quiet, "op", t(1)))
            .await
            .unwrap();
        assert_eq!((first.id, second.id), (1, 2));
        assert_eq!(second, store.get_record(2).await.unwrap().unwrap());

        let quiet = second;
        assert_eq!(quiet.mask, "%dude!*@*");
        assert_eq!(quiet.kind, RecordKind::Quiet);
        assert_eq!(quiet.created_at, t(1));
        assert_eq!(quiet.operator_hostmask.as_deref(), Some("op!user@host.net"));
        assert!(quiet.is_open());
        assert!(!quiet.review_requested);
    }

    #[tokio::test]
    async fn test_find_and_close() {
        let (store, _dir) = store().await;
        store
            .create_record(new_record("asd!*@*", RecordKind::Ban, "op", t(0)))
            .await
            .unwrap();
        store
            .create_record(new_record("asd!*@*", RecordKind::Ban, "op", t(1)))
            .await
            .unwrap();
        store
            .create_record(new_record("asd!*@*", RecordKind::Quiet, "op", t(2)))
            .await
            .unwrap();

        // Last one in wins; the quiet has a different stored mask
        let id = store.find_open_record("#test", "asd!*@*").await.unwrap();
        assert_eq!(id, Some(2));
        assert_eq!(store.find_open_record("#test", "%asd!*@*").await.unwrap(), Some(3));
        assert_eq!(store.find_open_record("#other", "asd!*@*").await.unwrap(), None);

        store.close_record(2, "op2", t(10)).await.unwrap();
        let closed = store.get_record(2).await.unwrap().unwrap();
        assert_eq!(closed.removed_at, Some(t(10)));
        assert_eq!(closed.removal_operator.as_deref(), Some("op2"));
        assert_eq!(store.find_open_record("#test", "asd!*@*").await.unwrap(), Some(1));

        assert!(matches!(
            store.close_record(2, "op2", t(11)).await,
            Err(TrackingError::InvalidTransition(_))
        ));
        assert!(matches!(
            store.close_record(99, "op2", t(11)).await,
            Err(TrackingError::InvalidTransition(_))
        ));
        // The failed close didn't touch the closed record
        let closed = store.get_record(2).await.unwrap().unwrap();
        assert_eq!(closed.removed_at, Some(t(10)));
    }

    #[tokio::test]
    async fn test_removals_are_never_matched_for_closing() {
        let (store, _dir) = store().await;
        store
            .create_record(new_record("troll", RecordKind::Removal, "op", t(0)))
            .await
            .unwrap();
        assert_eq!(store.find_open_record("#test", "troll").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_comments_are_ordered() {
        let (store, _dir) = store().await;
        store
            .create_record(new_record("asd!*@*", RecordKind::Ban, "op", t(0)))
            .await
            .unwrap();
        store.close_record(1, "op", t(1)).await.unwrap();

        for (i, text) in ["first", "second", "third"].iter().enumerate() {
            store
                .add_comment(Comment {
                    record_id: 1,
                    author: "op".into(),
                    text: text.to_string(),
                    time: t(i as i64),
                })
                .await
                .unwrap();
        }

        let comments = store.list_comments(1).await.unwrap();
        let texts: Vec<&str> = comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert!(store.list_comments(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_listing() {
        let (store, _dir) = store().await;
        store
            .create_record(new_record("a!*@*", RecordKind::Ban, "op", t(0)))
            .await
            .unwrap();
        store
            .create_record(new_record("b!*@*", RecordKind::Ban, "FloodBot1", t(0)))
            .await
            .unwrap();
        store
            .create_record(new_record("c", RecordKind::Removal, "op", t(0)))
            .await
            .unwrap();
        store
            .create_record(new_record("d!*@*", RecordKind::Quiet, "op", t(100)))
            .await
            .unwrap();
        store
            .create_record(new_record("e!*@*", RecordKind::Ban, "op", t(0)))
            .await
            .unwrap();
        store.close_record(5, "op", t(1)).await.unwrap();

        let ignore = vec!["FloodBot?".to_string()];
        let stale = store
            .list_stale_open_records("#test", t(50), &ignore)
            .await
            .unwrap();
        let ids: Vec<i64> = stale.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1]);

        store.mark_review_requested(1).await.unwrap();
        let stale = store
            .list_stale_open_records("#test", t(200), &ignore)
            .await
            .unwrap();
        let ids: Vec<i64> = stale.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![4]);

        assert_eq!(store.open_channels().await.unwrap(), vec!["#test".to_string()]);
    }

    #[tokio::test]
    async fn test_review_marker_survives_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bans.db");
        let path = path.to_str().unwrap();

        {
            let store = SqliteRecordStore::new(path).await.unwrap();
            store
                .create_record(new_record("a!*@*", RecordKind::Ban, "op", t(0)))
                .await
                .unwrap();
            store.mark_review_requested(1).await.unwrap();
        }

        let store = SqliteRecordStore::new(path).await.unwrap();
        let record = store.get_record(1).await.unwrap().unwrap();
        assert!(record.review_requested);
        assert!(store
            .list_stale_open_records("#test", t(100), &[])
            .await
            .unwrap()
            .is_empty());
    }
}
