//! Operator-facing controls over sessions, listings, history, profiles and
//! sources. Thin: every call delegates to the component that owns the data.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::{ProfileError, StoreError, SupervisorError};
use crate::monitoring::records::{
    ApplicationRecord, NewSource, Profile, SessionRecord, SessionState, SourceConfig,
};
use crate::monitoring::{MonitoringSession, SessionContext, SessionSnapshot, SessionSupervisor};
use crate::profiles::{NewProfile, ProfileUpdate};
use crate::scanner::IssueListing;

/// Partial edit of a source. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct SourceUpdate {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub priority: Option<i64>,
    pub description: Option<Option<String>>,
}

/// What a single unattended pass did for one profile.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub profile_id: i64,
    /// Row written for the pass; `None` when the profile was skipped.
    pub session_id: Option<Uuid>,
    pub started: usize,
    pub error: Option<String>,
}

pub struct Operator {
    context: SessionContext,
    supervisor: Arc<SessionSupervisor>,
}

impl Operator {
    pub fn new(context: SessionContext, supervisor: Arc<SessionSupervisor>) -> Self {
        Self {
            context,
            supervisor,
        }
    }

    // Sessions

    pub async fn start_session(
        &self,
        profile_id: i64,
        interval: Option<Duration>,
    ) -> Result<SessionSnapshot, SupervisorError> {
        self.supervisor.start(profile_id, interval).await
    }

    pub async fn stop_session(&self, session_id: Uuid) -> Result<SessionSnapshot, SupervisorError> {
        self.supervisor.stop(session_id).await
    }

    pub async fn sessions(&self) -> Vec<SessionSnapshot> {
        self.supervisor.list().await
    }

    /// One poll-and-apply pass per profile without starting a loop, waiting
    /// for every submission. `None` covers all active profiles. Profiles with
    /// a running session are skipped so no issue is applied for twice.
    pub async fn run_once(
        &self,
        profile_ids: Option<&[i64]>,
    ) -> Result<Vec<RunReport>, ProfileError> {
        let ids: Vec<i64> = match profile_ids {
            Some(ids) => ids.to_vec(),
            None => self
                .context
                .profiles
                .list()
                .await?
                .into_iter()
                .filter(|p| p.is_active)
                .map(|p| p.id)
                .collect(),
        };

        let mut reports = Vec::with_capacity(ids.len());
        for profile_id in ids {
            if self.supervisor.is_running(profile_id).await {
                tracing::warn!("Skipping profile {}: a session is already running", profile_id);
                reports.push(RunReport {
                    profile_id,
                    session_id: None,
                    started: 0,
                    error: Some(SupervisorError::AlreadyRunning(profile_id).to_string()),
                });
                continue;
            }
            reports.push(self.run_profile_once(profile_id).await?);
        }

        let started: usize = reports.iter().map(|r| r.started).sum();
        tracing::info!(
            "📨 Single pass over {} profiles started {} submissions",
            reports.len(),
            started
        );
        Ok(reports)
    }

    async fn run_profile_once(&self, profile_id: i64) -> Result<RunReport, ProfileError> {
        let store = &self.context.store;
        if store.get_profile(profile_id).await?.is_none() {
            return Err(StoreError::not_found("profile", profile_id).into());
        }

        let record = SessionRecord {
            id: Uuid::new_v4(),
            profile_id,
            state: SessionState::Running,
            is_active: true,
            interval_secs: 0,
            started_at: Utc::now(),
            stopped_at: None,
            last_error: None,
        };
        store.insert_session(&record).await?;

        let mut session =
            MonitoringSession::new(&record, self.context.clone(), CancellationToken::new());
        let (state, started, error) = match session.run_once().await {
            Ok(started) => (SessionState::Stopped, started, None),
            Err(e) => {
                tracing::error!("❌ Single pass for profile {} failed: {}", profile_id, e);
                (SessionState::Failed, 0, Some(e.to_string()))
            }
        };

        store
            .update_session(record.id, state, Some(Utc::now()), error.as_deref())
            .await?;

        Ok(RunReport {
            profile_id,
            session_id: Some(record.id),
            started,
            error,
        })
    }

    // Listings and history

    pub async fn open_listings(&self) -> Result<Vec<IssueListing>, StoreError> {
        self.context.aggregator.fetch_all().await
    }

    pub async fn upcoming_listings(&self, today: NaiveDate) -> Result<Vec<IssueListing>, StoreError> {
        self.context.aggregator.fetch_upcoming(today).await
    }

    /// Application history, newest first. `None` returns every profile.
    pub async fn history(&self, profile_id: Option<i64>) -> Result<Vec<ApplicationRecord>, StoreError> {
        match profile_id {
            Some(id) => self.context.store.applications_for_profile(id).await,
            None => self.context.store.all_applications().await,
        }
    }

    // Profiles

    pub async fn create_profile(&self, profile: NewProfile) -> Result<Profile, ProfileError> {
        self.context.profiles.create(profile).await
    }

    pub async fn update_profile(
        &self,
        id: i64,
        update: ProfileUpdate,
    ) -> Result<Profile, ProfileError> {
        self.context.profiles.update(id, update).await
    }

    /// Refuses while a session for the profile is still running.
    pub async fn delete_profile(&self, id: i64) -> Result<(), ProfileError> {
        if self.supervisor.is_running(id).await {
            return Err(ProfileError::Validation(format!(
                "profile {} has a running session; stop it first",
                id
            )));
        }

        self.context.profiles.delete(id).await
    }

    pub async fn profiles(&self) -> Result<Vec<Profile>, ProfileError> {
        self.context.profiles.list().await
    }

    // Sources

    pub async fn create_source(&self, source: NewSource) -> Result<SourceConfig, StoreError> {
        if source.base_url.trim().is_empty() {
            return Err(StoreError::Invalid("source base_url must not be empty".to_string()));
        }
        let created = self.context.store.insert_source(source).await?;
        tracing::info!(
            "➕ Added source {} ({}, priority {})",
            created.name,
            created.kind,
            created.priority
        );
        Ok(created)
    }

    pub async fn update_source(
        &self,
        id: i64,
        update: SourceUpdate,
    ) -> Result<SourceConfig, StoreError> {
        let mut source = self
            .context
            .store
            .get_source(id)
            .await?
            .ok_or_else(|| StoreError::not_found("source", id))?;

        if let Some(name) = update.name {
            source.name = name;
        }
        if let Some(base_url) = update.base_url {
            source.base_url = base_url;
        }
        if let Some(api_key) = update.api_key {
            source.api_key = api_key;
        }
        if let Some(active) = update.is_active {
            source.is_active = active;
        }
        if let Some(priority) = update.priority {
            source.priority = priority;
        }
        if let Some(description) = update.description {
            source.description = description;
        }

        self.context.store.update_source(&source).await?;
        Ok(source)
    }

    pub async fn sources(&self) -> Result<Vec<SourceConfig>, StoreError> {
        self.context.store.list_sources().await
    }
}
