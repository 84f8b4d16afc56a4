use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::records::{SessionRecord, SessionState};
use super::session::{MonitoringSession, SessionContext, SessionSnapshot};
use crate::core::{HealthChecker, StoreError, SupervisorError};

struct SessionHandle {
    id: Uuid,
    cancel: CancellationToken,
    snapshot: Arc<RwLock<SessionSnapshot>>,
    task: JoinHandle<SessionState>,
}

/// Owns every monitoring session, at most one per profile.
pub struct SessionSupervisor {
    context: SessionContext,
    default_interval: Duration,
    root: CancellationToken,
    sessions: RwLock<HashMap<i64, SessionHandle>>,
    health: Option<HealthChecker>,
}

impl SessionSupervisor {
    pub fn new(context: SessionContext, default_interval: Duration) -> Self {
        Self {
            context,
            default_interval,
            root: CancellationToken::new(),
            sessions: RwLock::new(HashMap::new()),
            health: None,
        }
    }

    pub fn with_health(mut self, health: HealthChecker) -> Self {
        self.health = Some(health);
        self
    }

    /// Starts monitoring `profile_id`. Fails while a previous session for the
    /// profile is still running or draining its submissions.
    pub async fn start(
        &self,
        profile_id: i64,
        interval: Option<Duration>,
    ) -> Result<SessionSnapshot, SupervisorError> {
        let mut sessions = self.sessions.write().await;

        if let Some(existing) = sessions.get(&profile_id) {
            if !existing.task.is_finished() {
                return Err(SupervisorError::AlreadyRunning(profile_id));
            }
        }

        if self.context.store.get_profile(profile_id).await?.is_none() {
            return Err(StoreError::not_found("profile", profile_id).into());
        }

        let interval = interval.unwrap_or(self.default_interval);
        let record = SessionRecord {
            id: Uuid::new_v4(),
            profile_id,
            state: SessionState::Created,
            is_active: true,
            interval_secs: interval.as_secs().max(1) as i64,
            started_at: Utc::now(),
            stopped_at: None,
            last_error: None,
        };
        self.context.store.insert_session(&record).await?;

        let cancel = self.root.child_token();
        let session = MonitoringSession::new(&record, self.context.clone(), cancel.clone());
        let snapshot = session.snapshot_handle();
        let task = tokio::spawn(session.run());

        tracing::info!(
            "▶️  Started session {} for profile {}",
            record.id,
            profile_id
        );

        let view = snapshot.read().await.clone();
        sessions.insert(
            profile_id,
            SessionHandle {
                id: record.id,
                cancel,
                snapshot,
                task,
            },
        );
        drop(sessions);

        self.report_running().await;
        Ok(view)
    }

    /// Requests a stop and returns at once; the session finishes its
    /// in-flight submissions in the background.
    pub async fn stop(&self, session_id: Uuid) -> Result<SessionSnapshot, SupervisorError> {
        let sessions = self.sessions.read().await;
        let handle = sessions
            .values()
            .find(|h| h.id == session_id)
            .ok_or(SupervisorError::NotFound(session_id))?;

        handle.cancel.cancel();

        let now = Utc::now();
        let (view, changed) = {
            let mut snapshot = handle.snapshot.write().await;
            let changed = !snapshot.state.is_finished();
            if changed {
                snapshot.state = SessionState::Stopped;
                snapshot.is_active = false;
                snapshot.stopped_at = Some(now);
            }
            (snapshot.clone(), changed)
        };
        drop(sessions);

        // The task may have failed between the snapshot read and this write.
        if changed && self.context.store.mark_session_stopped(session_id, now).await? {
            tracing::info!("⏹️  Stopping session {}", session_id);
        }

        self.report_running().await;
        Ok(view)
    }

    pub async fn list(&self) -> Vec<SessionSnapshot> {
        let sessions = self.sessions.read().await;
        let mut views = Vec::with_capacity(sessions.len());
        for handle in sessions.values() {
            views.push(handle.snapshot.read().await.clone());
        }
        views.sort_by_key(|v| v.started_at);
        views
    }

    pub async fn get(&self, session_id: Uuid) -> Option<SessionSnapshot> {
        for view in self.list().await {
            if view.id == session_id {
                return Some(view);
            }
        }
        None
    }

    /// True while the profile's session task has not exited, including while
    /// a stopped session is still draining submissions.
    pub async fn is_running(&self, profile_id: i64) -> bool {
        self.sessions
            .read()
            .await
            .get(&profile_id)
            .is_some_and(|h| !h.task.is_finished())
    }

    pub async fn running_count(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|h| !h.task.is_finished())
            .count()
    }

    /// Cancels every session, waits for all of them and marks the remaining
    /// rows inactive.
    pub async fn shutdown(&self) -> Result<(), SupervisorError> {
        tracing::info!("🛑 Shutting down all monitoring sessions");
        self.root.cancel();

        let handles: Vec<SessionHandle> = self
            .sessions
            .write()
            .await
            .drain()
            .map(|(_, handle)| handle)
            .collect();

        let results = join_all(handles.into_iter().map(|h| h.task)).await;
        for result in results {
            if let Err(e) = result {
                tracing::error!("Session task ended abnormally: {}", e);
            }
        }

        let closed = self
            .context
            .store
            .deactivate_all_sessions(Utc::now())
            .await?;
        if closed > 0 {
            tracing::info!("Marked {} leftover session rows inactive", closed);
        }

        self.report_running().await;
        Ok(())
    }

    async fn report_running(&self) {
        if let Some(health) = &self.health {
            health.set_running_sessions(self.running_count().await).await;
        }
    }
}
