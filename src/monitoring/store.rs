use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::records::*;
use crate::core::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

/// Record store seen by the engine. Individual writes are assumed to be
/// serialized by the implementation; `create_application` must be
/// create-if-absent on (profile, issue).
#[async_trait]
pub trait RecordStore: Send + Sync {
    // Profiles
    async fn insert_profile(&self, profile: NewProfileRecord) -> StoreResult<Profile>;
    async fn get_profile(&self, id: i64) -> StoreResult<Option<Profile>>;
    async fn list_profiles(&self) -> StoreResult<Vec<Profile>>;
    async fn update_profile(&self, profile: &Profile) -> StoreResult<()>;
    /// Removes the profile together with its key material.
    async fn delete_profile(&self, id: i64) -> StoreResult<()>;
    async fn profile_key(&self, profile_id: i64) -> StoreResult<Option<String>>;
    async fn touch_profile_used(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()>;

    // Sources
    async fn insert_source(&self, source: NewSource) -> StoreResult<SourceConfig>;
    async fn get_source(&self, id: i64) -> StoreResult<Option<SourceConfig>>;
    async fn list_sources(&self) -> StoreResult<Vec<SourceConfig>>;
    /// Active sources, highest priority first.
    async fn active_sources(&self) -> StoreResult<Vec<SourceConfig>>;
    async fn update_source(&self, source: &SourceConfig) -> StoreResult<()>;
    async fn touch_source_checked(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()>;
    async fn delete_source(&self, id: i64) -> StoreResult<()>;

    // Applications
    /// Fails with `StoreError::DuplicateSubmission` when the pair already exists.
    async fn create_application(&self, application: NewApplication)
        -> StoreResult<ApplicationRecord>;
    async fn find_application(
        &self,
        profile_id: i64,
        issue_id: &str,
    ) -> StoreResult<Option<ApplicationRecord>>;
    /// Moves a `pending` record to a terminal status. Other records are left untouched.
    async fn complete_application(
        &self,
        id: i64,
        status: ApplicationStatus,
        message: Option<&str>,
    ) -> StoreResult<()>;
    async fn applications_for_profile(&self, profile_id: i64)
        -> StoreResult<Vec<ApplicationRecord>>;
    async fn all_applications(&self) -> StoreResult<Vec<ApplicationRecord>>;

    // Sessions
    async fn insert_session(&self, session: &SessionRecord) -> StoreResult<()>;
    async fn update_session(
        &self,
        id: Uuid,
        state: SessionState,
        stopped_at: Option<DateTime<Utc>>,
        last_error: Option<&str>,
    ) -> StoreResult<()>;
    /// Moves a session to `stopped` unless it already reached a terminal
    /// state. Returns whether the row changed.
    async fn mark_session_stopped(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool>;
    async fn get_session(&self, id: Uuid) -> StoreResult<Option<SessionRecord>>;
    async fn active_sessions(&self) -> StoreResult<Vec<SessionRecord>>;
    /// Marks every still-active session row stopped; returns how many changed.
    async fn deactivate_all_sessions(&self, at: DateTime<Utc>) -> StoreResult<u64>;
}
