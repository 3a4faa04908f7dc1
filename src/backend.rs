use std::path::{Path, PathBuf};

use log::info;
use sqlx::{migrate::MigrateDatabase, Pool, Sqlite, SqlitePool};

use crate::error::Result;
use crate::record::{NewRecord, Record, RecordDraft};
use crate::time::Timestamp;
use crate::user::User;

/// Data access layer: an owned handle on the SQLite pool. Opened once at
/// startup and closed at shutdown; every record query and mutation takes
/// the owning user's id.
pub struct Backend(Pool<Sqlite>);

fn into_sql(path: &Path) -> PathBuf {
    path.join("passkeep.sql")
}

const RECORD_COLUMNS: &str =
    "id, username, password, phone, email, platform, note, created, updated, user_id";

impl Backend {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        let db_pathbuf = into_sql(data_dir);
        let db_path = db_pathbuf.to_str().expect("non utf-8 data");
        let url = format!("sqlite://{db_path}");

        if !Sqlite::database_exists(&url).await.unwrap_or(false) {
            Sqlite::create_database(&url).await?;
            info!("created {url}");
        }

        let pool = SqlitePool::connect(&url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self(pool))
    }

    pub async fn close(&self) {
        self.0.close().await;
    }
}

impl Backend {
    pub async fn find_user(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "
            SELECT id, username, pwhash, created
            FROM users
            WHERE username = ?
            ",
        )
        .bind(username)
        .fetch_optional(&self.0)
        .await?;

        Ok(user)
    }

    pub async fn find_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "
            SELECT id, username, pwhash, created
            FROM users
            WHERE id = ?
            ",
        )
        .bind(id)
        .fetch_optional(&self.0)
        .await?;

        Ok(user)
    }

    pub async fn insert_user(
        &self,
        username: &str,
        pwhash: &str,
        created: Timestamp,
    ) -> Result<i64> {
        let done = sqlx::query(
            "
            INSERT INTO users (username, pwhash, created)
            VALUES (?, ?, ?)
            ",
        )
        .bind(username)
        .bind(pwhash)
        .bind(created)
        .execute(&self.0)
        .await?;

        Ok(done.last_insert_rowid())
    }
}

impl Backend {
    /// All of a user's records, most recently updated first.
    pub async fn records_for_user(&self, user_id: i64) -> Result<Vec<Record>> {
        let records = sqlx::query_as::<_, Record>(&format!(
            "
            SELECT {RECORD_COLUMNS}
            FROM passwords
            WHERE user_id = ?
            ORDER BY updated DESC, id DESC
            "
        ))
        .bind(user_id)
        .fetch_all(&self.0)
        .await?;

        Ok(records)
    }

    /// Substring match against a single plain-text column. `column` only
    /// ever comes from `SearchField::column`, never from user input.
    pub(crate) async fn search_column(
        &self,
        user_id: i64,
        column: &'static str,
        pattern: &str,
    ) -> Result<Vec<Record>> {
        let records = sqlx::query_as::<_, Record>(&format!(
            "
            SELECT {RECORD_COLUMNS}
            FROM passwords
            WHERE user_id = ? AND {column} LIKE '%' || ? || '%'
            ORDER BY updated DESC, id DESC
            "
        ))
        .bind(user_id)
        .bind(pattern)
        .fetch_all(&self.0)
        .await?;

        Ok(records)
    }

    pub async fn record_by_id(&self, user_id: i64, id: i64) -> Result<Option<Record>> {
        let record = sqlx::query_as::<_, Record>(&format!(
            "
            SELECT {RECORD_COLUMNS}
            FROM passwords
            WHERE user_id = ? AND id = ?
            "
        ))
        .bind(user_id)
        .bind(id)
        .fetch_optional(&self.0)
        .await?;

        Ok(record)
    }

    pub async fn insert_record(
        &self,
        user_id: i64,
        draft: &RecordDraft,
        now: Timestamp,
    ) -> Result<i64> {
        let done = sqlx::query(
            "
            INSERT INTO passwords
            (username, password, phone, email, platform, note, created, updated, user_id)
            VALUES
            (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&draft.username)
        .bind(&draft.password)
        .bind(&draft.phone)
        .bind(&draft.email)
        .bind(&draft.platform)
        .bind(&draft.note)
        .bind(now)
        .bind(now)
        .bind(user_id)
        .execute(&self.0)
        .await?;

        Ok(done.last_insert_rowid())
    }

    /// Bulk insert for import: the whole batch commits in one transaction,
    /// with each row keeping its own timestamps.
    pub async fn insert_records(&self, user_id: i64, rows: Vec<NewRecord>) -> Result<Vec<i64>> {
        let mut tx = self.0.begin().await?;
        let mut ids = Vec::with_capacity(rows.len());

        for row in &rows {
            let done = sqlx::query(
                "
                INSERT INTO passwords
                (username, password, phone, email, platform, note, created, updated, user_id)
                VALUES
                (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(&row.draft.username)
            .bind(&row.draft.password)
            .bind(&row.draft.phone)
            .bind(&row.draft.email)
            .bind(&row.draft.platform)
            .bind(&row.draft.note)
            .bind(row.created)
            .bind(row.updated)
            .bind(user_id)
            .execute(&mut tx)
            .await?;

            ids.push(done.last_insert_rowid());
        }

        tx.commit().await?;
        Ok(ids)
    }

    /// Full replace of the mutable fields, refreshing `updated` and leaving
    /// `created` alone. Returns whether the user owned such a record.
    pub async fn update_record(
        &self,
        user_id: i64,
        id: i64,
        draft: &RecordDraft,
        now: Timestamp,
    ) -> Result<bool> {
        let done = sqlx::query(
            "
            UPDATE passwords
            SET username = ?, password = ?, phone = ?, email = ?,
                platform = ?, note = ?, updated = ?
            WHERE id = ? AND user_id = ?
            ",
        )
        .bind(&draft.username)
        .bind(&draft.password)
        .bind(&draft.phone)
        .bind(&draft.email)
        .bind(&draft.platform)
        .bind(&draft.note)
        .bind(now)
        .bind(id)
        .bind(user_id)
        .execute(&self.0)
        .await?;

        Ok(done.rows_affected() > 0)
    }

    pub async fn delete_record(&self, user_id: i64, id: i64) -> Result<bool> {
        let done = sqlx::query(
            "
            DELETE FROM passwords
            WHERE id = ? AND user_id = ?
            ",
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.0)
        .await?;

        Ok(done.rows_affected() > 0)
    }
}
