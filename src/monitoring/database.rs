use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use uuid::Uuid;

use super::records::*;
use super::store::{RecordStore, StoreResult};
use crate::core::StoreError;

pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Opens (creating if needed) the database at `database_path`.
    /// `:memory:` gives a private in-memory database on a single connection.
    pub async fn new(database_path: &str) -> StoreResult<Self> {
        let pool = if database_path == ":memory:" {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await?
        } else {
            if let Some(parent) = Path::new(database_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            let connection_string = if database_path.starts_with("sqlite:") {
                database_path.to_string()
            } else {
                format!("sqlite://{}?mode=rwc", database_path)
            };

            SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&connection_string)
                .await?
        };

        let store = Self { pool };
        store.initialize_schema().await?;

        Ok(store)
    }

    pub async fn in_memory() -> StoreResult<Self> {
        Self::new(":memory:").await
    }

    async fn initialize_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                dpid TEXT NOT NULL,
                boid TEXT NOT NULL,
                default_bank_id INTEGER NOT NULL,
                default_quantity INTEGER NOT NULL DEFAULT 10,
                ask_for_quantity INTEGER NOT NULL DEFAULT 0,
                password_enc TEXT NOT NULL,
                pin_enc TEXT NOT NULL,
                crn_enc TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                last_used DATETIME,
                created_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profile_keys (
                profile_id INTEGER PRIMARY KEY,
                key_material TEXT NOT NULL,
                FOREIGN KEY (profile_id) REFERENCES profiles(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                base_url TEXT NOT NULL,
                api_key TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                priority INTEGER NOT NULL DEFAULT 0,
                last_checked DATETIME,
                description TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS applications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                profile_id INTEGER NOT NULL,
                issue_id TEXT NOT NULL,
                company_name TEXT NOT NULL,
                source_id INTEGER NOT NULL,
                quantity INTEGER NOT NULL,
                bank_id INTEGER NOT NULL,
                status TEXT NOT NULL,
                applied_at DATETIME NOT NULL,
                updated_at DATETIME,
                response_message TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // At-most-once submission hinges on this index.
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_applications_profile_issue
            ON applications(profile_id, issue_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id BLOB PRIMARY KEY,
                profile_id INTEGER NOT NULL,
                state TEXT NOT NULL,
                is_active INTEGER NOT NULL,
                interval_secs INTEGER NOT NULL,
                started_at DATETIME NOT NULL,
                stopped_at DATETIME,
                last_error TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_sources_active
            ON sources(is_active, priority DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("✅ Record store schema initialized");

        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert_profile(&self, profile: NewProfileRecord) -> StoreResult<Profile> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO profiles (
                name, dpid, boid, default_bank_id, default_quantity,
                ask_for_quantity, password_enc, pin_enc, crn_enc, is_active, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(&profile.name)
        .bind(&profile.dpid)
        .bind(&profile.boid)
        .bind(profile.default_bank_id)
        .bind(profile.default_quantity)
        .bind(profile.ask_for_quantity)
        .bind(&profile.password_enc)
        .bind(&profile.pin_enc)
        .bind(&profile.crn_enc)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let id = result.last_insert_rowid();

        sqlx::query("INSERT INTO profile_keys (profile_id, key_material) VALUES (?, ?)")
            .bind(id)
            .bind(&profile.key_material)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.get_profile(id)
            .await?
            .ok_or_else(|| StoreError::not_found("profile", id))
    }

    async fn get_profile(&self, id: i64) -> StoreResult<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(profile)
    }

    async fn list_profiles(&self) -> StoreResult<Vec<Profile>> {
        let profiles = sqlx::query_as::<_, Profile>("SELECT * FROM profiles ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(profiles)
    }

    async fn update_profile(&self, profile: &Profile) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE profiles SET
                name = ?, dpid = ?, boid = ?, default_bank_id = ?, default_quantity = ?,
                ask_for_quantity = ?, password_enc = ?, pin_enc = ?, crn_enc = ?,
                is_active = ?
            WHERE id = ?
            "#,
        )
        .bind(&profile.name)
        .bind(&profile.dpid)
        .bind(&profile.boid)
        .bind(profile.default_bank_id)
        .bind(profile.default_quantity)
        .bind(profile.ask_for_quantity)
        .bind(&profile.password_enc)
        .bind(&profile.pin_enc)
        .bind(&profile.crn_enc)
        .bind(profile.is_active)
        .bind(profile.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("profile", profile.id));
        }

        Ok(())
    }

    async fn delete_profile(&self, id: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM profile_keys WHERE profile_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM profiles WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("profile", id));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn profile_key(&self, profile_id: i64) -> StoreResult<Option<String>> {
        let key = sqlx::query_scalar::<_, String>(
            "SELECT key_material FROM profile_keys WHERE profile_id = ?",
        )
        .bind(profile_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }

    async fn touch_profile_used(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE profiles SET last_used = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn insert_source(&self, source: NewSource) -> StoreResult<SourceConfig> {
        let result = sqlx::query(
            r#"
            INSERT INTO sources (name, kind, base_url, api_key, is_active, priority, description)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&source.name)
        .bind(source.kind)
        .bind(&source.base_url)
        .bind(&source.api_key)
        .bind(source.is_active)
        .bind(source.priority)
        .bind(&source.description)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get_source(id)
            .await?
            .ok_or_else(|| StoreError::not_found("source", id))
    }

    async fn get_source(&self, id: i64) -> StoreResult<Option<SourceConfig>> {
        let source = sqlx::query_as::<_, SourceConfig>("SELECT * FROM sources WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(source)
    }

    async fn list_sources(&self) -> StoreResult<Vec<SourceConfig>> {
        let sources = sqlx::query_as::<_, SourceConfig>(
            "SELECT * FROM sources ORDER BY priority DESC, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(sources)
    }

    async fn active_sources(&self) -> StoreResult<Vec<SourceConfig>> {
        let sources = sqlx::query_as::<_, SourceConfig>(
            r#"
            SELECT * FROM sources
            WHERE is_active = 1
            ORDER BY priority DESC, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(sources)
    }

    async fn update_source(&self, source: &SourceConfig) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sources SET
                name = ?, kind = ?, base_url = ?, api_key = ?,
                is_active = ?, priority = ?, description = ?
            WHERE id = ?
            "#,
        )
        .bind(&source.name)
        .bind(source.kind)
        .bind(&source.base_url)
        .bind(&source.api_key)
        .bind(source.is_active)
        .bind(source.priority)
        .bind(&source.description)
        .bind(source.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("source", source.id));
        }

        Ok(())
    }

    async fn touch_source_checked(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE sources SET last_checked = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete_source(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM sources WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("source", id));
        }

        Ok(())
    }

    async fn create_application(
        &self,
        application: NewApplication,
    ) -> StoreResult<ApplicationRecord> {
        let result = sqlx::query(
            r#"
            INSERT INTO applications (
                profile_id, issue_id, company_name, source_id, quantity,
                bank_id, status, applied_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(profile_id, issue_id) DO NOTHING
            "#,
        )
        .bind(application.profile_id)
        .bind(&application.issue_id)
        .bind(&application.company_name)
        .bind(application.source_id)
        .bind(application.quantity)
        .bind(application.bank_id)
        .bind(ApplicationStatus::Pending)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DuplicateSubmission {
                profile_id: application.profile_id,
                issue_id: application.issue_id,
            });
        }

        let id = result.last_insert_rowid();
        let record =
            sqlx::query_as::<_, ApplicationRecord>("SELECT * FROM applications WHERE id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        Ok(record)
    }

    async fn find_application(
        &self,
        profile_id: i64,
        issue_id: &str,
    ) -> StoreResult<Option<ApplicationRecord>> {
        let record = sqlx::query_as::<_, ApplicationRecord>(
            "SELECT * FROM applications WHERE profile_id = ? AND issue_id = ?",
        )
        .bind(profile_id)
        .bind(issue_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn complete_application(
        &self,
        id: i64,
        status: ApplicationStatus,
        message: Option<&str>,
    ) -> StoreResult<()> {
        if !status.is_terminal() {
            return Err(StoreError::Invalid(format!(
                "application {} cannot move back to {}",
                id, status
            )));
        }

        let result = sqlx::query(
            r#"
            UPDATE applications
            SET status = ?, response_message = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(status)
        .bind(message)
        .bind(Utc::now())
        .bind(id)
        .bind(ApplicationStatus::Pending)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Invalid(format!(
                "application {} is missing or no longer pending",
                id
            )));
        }

        Ok(())
    }

    async fn applications_for_profile(
        &self,
        profile_id: i64,
    ) -> StoreResult<Vec<ApplicationRecord>> {
        let records = sqlx::query_as::<_, ApplicationRecord>(
            r#"
            SELECT * FROM applications
            WHERE profile_id = ?
            ORDER BY applied_at DESC, id DESC
            "#,
        )
        .bind(profile_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn all_applications(&self) -> StoreResult<Vec<ApplicationRecord>> {
        let records = sqlx::query_as::<_, ApplicationRecord>(
            "SELECT * FROM applications ORDER BY applied_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn insert_session(&self, session: &SessionRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, profile_id, state, is_active, interval_secs,
                started_at, stopped_at, last_error
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session.id)
        .bind(session.profile_id)
        .bind(session.state)
        .bind(session.is_active)
        .bind(session.interval_secs)
        .bind(session.started_at)
        .bind(session.stopped_at)
        .bind(&session.last_error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_session(
        &self,
        id: Uuid,
        state: SessionState,
        stopped_at: Option<DateTime<Utc>>,
        last_error: Option<&str>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sessions SET
                state = ?,
                is_active = ?,
                stopped_at = COALESCE(?, stopped_at),
                last_error = COALESCE(?, last_error)
            WHERE id = ?
            "#,
        )
        .bind(state)
        .bind(!state.is_finished())
        .bind(stopped_at)
        .bind(last_error)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("session", id));
        }

        Ok(())
    }

    async fn mark_session_stopped(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sessions SET state = ?, is_active = 0, stopped_at = COALESCE(stopped_at, ?)
            WHERE id = ? AND state NOT IN (?, ?)
            "#,
        )
        .bind(SessionState::Stopped)
        .bind(at)
        .bind(id)
        .bind(SessionState::Stopped)
        .bind(SessionState::Failed)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_session(&self, id: Uuid) -> StoreResult<Option<SessionRecord>> {
        let session = sqlx::query_as::<_, SessionRecord>("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(session)
    }

    async fn active_sessions(&self) -> StoreResult<Vec<SessionRecord>> {
        let sessions = sqlx::query_as::<_, SessionRecord>(
            "SELECT * FROM sessions WHERE is_active = 1 ORDER BY started_at",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    async fn deactivate_all_sessions(&self, at: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sessions SET state = ?, is_active = 0, stopped_at = ?
            WHERE is_active = 1
            "#,
        )
        .bind(SessionState::Stopped)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
