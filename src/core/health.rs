use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

const DATABASE: &str = "database";
const DEPOSITORY_API: &str = "depository_api";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// `healthy`, `degraded` (some source or the depository is down) or
    /// `unhealthy` (the record store is unusable).
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub running_sessions: usize,
    pub failing: Vec<String>,
    pub components: ComponentHealth,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub database: bool,
    pub depository_api: bool,
    /// Per-source flags keyed `source:<id>`.
    #[serde(flatten)]
    pub sources: BTreeMap<String, bool>,
}

impl ComponentHealth {
    pub fn get(&self, key: &str) -> Option<bool> {
        match key {
            DATABASE => Some(self.database),
            DEPOSITORY_API => Some(self.depository_api),
            _ => self.sources.get(key).copied(),
        }
    }

    fn failing(&self) -> Vec<String> {
        let mut failing = Vec::new();
        if !self.database {
            failing.push(DATABASE.to_string());
        }
        if !self.depository_api {
            failing.push(DEPOSITORY_API.to_string());
        }
        failing.extend(
            self.sources
                .iter()
                .filter(|(_, healthy)| !**healthy)
                .map(|(name, _)| name.clone()),
        );
        failing
    }
}

/// Shared health view served on `/health`.
#[derive(Clone)]
pub struct HealthChecker {
    started: Instant,
    components: Arc<RwLock<ComponentHealth>>,
    running_sessions: Arc<AtomicUsize>,
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            components: Arc::new(RwLock::new(ComponentHealth::default())),
            running_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn get_status(&self) -> HealthStatus {
        let components = self.components.read().await.clone();
        let failing = components.failing();

        let status = if !components.database {
            "unhealthy"
        } else if failing.is_empty() {
            "healthy"
        } else {
            "degraded"
        };

        HealthStatus {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.started.elapsed().as_secs(),
            running_sessions: self.running_sessions.load(Ordering::Relaxed),
            failing,
            components,
        }
    }

    pub async fn update_component(&self, component: &str, healthy: bool) {
        let mut components = self.components.write().await;
        match component {
            DATABASE => components.database = healthy,
            DEPOSITORY_API => components.depository_api = healthy,
            _ => {
                components.sources.insert(component.to_string(), healthy);
            }
        }
    }

    pub async fn set_running_sessions(&self, count: usize) {
        self.running_sessions.store(count, Ordering::Relaxed);
    }
}
