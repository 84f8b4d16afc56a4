use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::records::{NewApplication, SessionRecord, SessionState};
use super::store::RecordStore;
use crate::api::{Applicant, ApplicationOutcome, DepositoryClient, SubmissionClient};
use crate::core::{ProfileError, SessionError};
use crate::profiles::{Credentials, ProfileManager};
use crate::scanner::{Aggregator, IssueListing};

/// Shared collaborators every session works with.
#[derive(Clone)]
pub struct SessionContext {
    pub store: Arc<dyn RecordStore>,
    pub profiles: ProfileManager,
    pub depository: DepositoryClient,
    pub submissions: SubmissionClient,
    pub aggregator: Aggregator,
}

/// Point-in-time view of a session, readable while it runs.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub profile_id: i64,
    pub state: SessionState,
    pub is_active: bool,
    pub interval_secs: i64,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub ticks: u64,
    pub submitted: u64,
}

impl From<&SessionRecord> for SessionSnapshot {
    fn from(record: &SessionRecord) -> Self {
        Self {
            id: record.id,
            profile_id: record.profile_id,
            state: record.state,
            is_active: record.is_active,
            interval_secs: record.interval_secs,
            started_at: record.started_at,
            stopped_at: record.stopped_at,
            last_error: record.last_error.clone(),
            ticks: 0,
            submitted: 0,
        }
    }
}

struct Submitted {
    issue_id: String,
    outcome: ApplicationOutcome,
}

/// One profile's poll/submit loop.
///
/// `Created -> Running -> Stopped | Failed`. Stopped is reached only through
/// the cancellation token; Failed when setup fails or the depository rejects
/// the stored credentials. Every tick after the first logs in again before
/// creating any record, so an expired token never outlives one tick.
/// Submissions run on a `JoinSet` owned by the session and are always awaited
/// before `run` returns.
pub struct MonitoringSession {
    id: Uuid,
    profile_id: i64,
    interval: Duration,
    context: SessionContext,
    cancel: CancellationToken,
    snapshot: Arc<RwLock<SessionSnapshot>>,
    credentials: Option<Credentials>,
    applicant: Option<Arc<Applicant>>,
    quantity: u32,
    token_stale: bool,
    token_rejected: bool,
    in_flight: JoinSet<Submitted>,
    auth_failure: Option<String>,
}

impl MonitoringSession {
    pub fn new(record: &SessionRecord, context: SessionContext, cancel: CancellationToken) -> Self {
        Self {
            id: record.id,
            profile_id: record.profile_id,
            interval: Duration::from_secs(record.interval_secs.max(1) as u64),
            context,
            cancel,
            snapshot: Arc::new(RwLock::new(SessionSnapshot::from(record))),
            credentials: None,
            applicant: None,
            quantity: 0,
            token_stale: true,
            token_rejected: false,
            in_flight: JoinSet::new(),
            auth_failure: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn snapshot_handle(&self) -> Arc<RwLock<SessionSnapshot>> {
        self.snapshot.clone()
    }

    /// Drives the session to a terminal state.
    pub async fn run(mut self) -> SessionState {
        let cancel = self.cancel.clone();

        let prepared = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.prepare() => Some(result),
        };

        match prepared {
            None => return self.finish(SessionState::Stopped, None).await,
            Some(Err(e)) => {
                tracing::error!("❌ Session {} could not start: {}", self.id, e);
                return self.finish(SessionState::Failed, Some(e.to_string())).await;
            }
            Some(Ok(())) => {}
        }

        self.mark_running().await;
        tracing::info!(
            "🚀 Session {} running for profile {} every {:?}",
            self.id,
            self.profile_id,
            self.interval
        );

        loop {
            if let Err(e) = self.tick().await {
                tracing::error!("Session {} tick failed: {}", self.id, e);
            }

            if self.auth_failure.is_some() {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        self.drain().await;

        match self.auth_failure.take() {
            Some(message) => {
                tracing::error!("❌ Session {} lost authorization: {}", self.id, message);
                self.finish(SessionState::Failed, Some(message)).await
            }
            None => self.finish(SessionState::Stopped, None).await,
        }
    }

    /// A single pass without the loop: log in, apply to every new issue and
    /// wait for the outcomes. Returns how many submissions were started.
    pub async fn run_once(&mut self) -> Result<usize, SessionError> {
        self.prepare().await?;
        let started = self.tick().await;
        self.drain().await;
        started
    }

    /// Decrypts credentials and performs the first login.
    pub async fn prepare(&mut self) -> Result<(), SessionError> {
        let credentials = self.context.profiles.credentials(self.profile_id).await?;

        if credentials.ask_for_quantity {
            tracing::warn!(
                "Profile {} asks for a quantity per issue; unattended session uses the default of {}",
                credentials.name,
                credentials.default_quantity
            );
        }

        self.quantity = u32::try_from(credentials.default_quantity)
            .ok()
            .filter(|q| *q > 0)
            .ok_or_else(|| {
                ProfileError::Validation(format!(
                    "default quantity {} is out of range",
                    credentials.default_quantity
                ))
            })?;

        self.credentials = Some(credentials);
        self.login().await
    }

    /// Logs in with the held credentials and rebuilds the applicant around the
    /// new token and the account for the profile's default bank.
    async fn login(&mut self) -> Result<(), SessionError> {
        let Some(credentials) = self.credentials.as_ref() else {
            return Err(ProfileError::Validation(format!(
                "session {} has no credentials loaded",
                self.id
            ))
            .into());
        };
        let depository = &self.context.depository;

        let token = depository
            .login(&credentials.dpid, &credentials.boid, &credentials.password)
            .await?;
        let detail = depository.own_detail(&token).await?;
        let account = depository
            .bank_account(&token, credentials.default_bank_id)
            .await?;

        self.applicant = Some(Arc::new(Applicant {
            profile_id: credentials.profile_id,
            token,
            demat: detail.demat,
            boid: detail.boid,
            bank_id: credentials.default_bank_id,
            account,
            crn: credentials.crn.clone(),
            transaction_pin: credentials.transaction_pin.clone(),
        }));
        self.token_stale = false;
        self.token_rejected = false;

        Ok(())
    }

    /// One poll: refresh the login if needed, aggregate, then start a
    /// submission for every issue this profile has no record for. Returns how
    /// many submissions were started.
    pub async fn tick(&mut self) -> Result<usize, SessionError> {
        if self.token_stale {
            if let Err(e) = self.login().await {
                if e.is_authentication() {
                    self.auth_failure = Some(format!("login rejected: {}", e));
                }
                return Err(e);
            }
            tracing::debug!("🔐 Session {} refreshed its token", self.id);
        }

        let Some(applicant) = self.applicant.clone() else {
            return Ok(0);
        };
        self.token_stale = true;

        let listings = self.context.aggregator.fetch_all().await?;
        let mut started = 0;

        for listing in listings {
            self.reap();
            if self.token_rejected {
                tracing::warn!(
                    "Session {} token rejected mid-tick; remaining issues wait for the next login",
                    self.id
                );
                break;
            }

            if self
                .context
                .store
                .find_application(self.profile_id, &listing.issue_id)
                .await?
                .is_some()
            {
                continue;
            }

            let record = match self
                .context
                .store
                .create_application(NewApplication {
                    profile_id: self.profile_id,
                    issue_id: listing.issue_id.clone(),
                    company_name: listing.company_name.clone(),
                    source_id: listing.source_id,
                    quantity: i64::from(self.quantity),
                    bank_id: applicant.bank_id,
                })
                .await
            {
                Ok(record) => record,
                Err(e) if e.is_duplicate() => continue,
                Err(e) => return Err(e.into()),
            };

            self.spawn_submission(record.id, applicant.clone(), listing);
            started += 1;
        }

        let mut snapshot = self.snapshot.write().await;
        snapshot.ticks += 1;
        snapshot.submitted += started as u64;

        Ok(started)
    }

    fn spawn_submission(&mut self, record_id: i64, applicant: Arc<Applicant>, listing: IssueListing) {
        let store = self.context.store.clone();
        let submissions = self.context.submissions.clone();
        let quantity = self.quantity;

        self.in_flight.spawn(async move {
            let outcome = submissions.submit(&applicant, &listing, quantity).await;

            if let Err(e) = store
                .complete_application(record_id, outcome.status(), Some(outcome.message()))
                .await
            {
                tracing::error!(
                    "Failed to record outcome for {} (record {}): {}",
                    listing.issue_id,
                    record_id,
                    e
                );
            }

            if matches!(outcome, ApplicationOutcome::Success { .. }) {
                if let Err(e) = store.touch_profile_used(applicant.profile_id, Utc::now()).await {
                    tracing::warn!("Failed to stamp profile {}: {}", applicant.profile_id, e);
                }
            }

            Submitted {
                issue_id: listing.issue_id,
                outcome,
            }
        });
    }

    /// Collects submissions that already finished without waiting.
    fn reap(&mut self) {
        while let Some(joined) = self.in_flight.try_join_next() {
            self.absorb(joined);
        }
    }

    /// Waits for every in-flight submission.
    pub async fn drain(&mut self) {
        if !self.in_flight.is_empty() {
            tracing::info!(
                "⏳ Session {} waiting for {} in-flight submissions",
                self.id,
                self.in_flight.len()
            );
        }
        while let Some(joined) = self.in_flight.join_next().await {
            self.absorb(joined);
        }
    }

    fn absorb(&mut self, joined: Result<Submitted, tokio::task::JoinError>) {
        match joined {
            Ok(done) if done.outcome.is_unauthorized() => {
                tracing::warn!(
                    "Session {} token rejected while applying to {}: {}",
                    self.id,
                    done.issue_id,
                    done.outcome.message()
                );
                self.token_rejected = true;
                self.token_stale = true;
            }
            Ok(_) => {}
            Err(e) => tracing::error!("Submission task for session {} panicked: {}", self.id, e),
        }
    }

    async fn mark_running(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.snapshot.write().await.state = SessionState::Running;
        if let Err(e) = self
            .context
            .store
            .update_session(self.id, SessionState::Running, None, None)
            .await
        {
            tracing::warn!("Failed to persist session {} state: {}", self.id, e);
        }
    }

    async fn finish(&self, state: SessionState, error: Option<String>) -> SessionState {
        let now = Utc::now();
        {
            let mut snapshot = self.snapshot.write().await;
            snapshot.state = state;
            snapshot.is_active = false;
            snapshot.stopped_at.get_or_insert(now);
            if error.is_some() {
                snapshot.last_error = error.clone();
            }
        }

        if let Err(e) = self
            .context
            .store
            .update_session(self.id, state, Some(now), error.as_deref())
            .await
        {
            tracing::warn!("Failed to persist session {} state: {}", self.id, e);
        }

        tracing::info!("🛑 Session {} for profile {} {}", self.id, self.profile_id, state);
        state
    }
}
