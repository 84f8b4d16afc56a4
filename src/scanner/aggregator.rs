use chrono::{NaiveDate, Utc};
use std::collections::HashSet;
use std::sync::Arc;

use super::sources::SourceRegistry;
use super::IssueListing;
use crate::api::RetryableFetchClient;
use crate::core::{HealthChecker, StoreError};
use crate::monitoring::RecordStore;

/// Polls every active source and merges their listings.
#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn RecordStore>,
    fetcher: RetryableFetchClient,
    registry: Arc<SourceRegistry>,
    health: Option<HealthChecker>,
}

impl Aggregator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        fetcher: RetryableFetchClient,
        registry: Arc<SourceRegistry>,
    ) -> Self {
        Self {
            store,
            fetcher,
            registry,
            health: None,
        }
    }

    pub fn with_health(mut self, health: HealthChecker) -> Self {
        self.health = Some(health);
        self
    }

    /// Listings from all active sources, highest priority first, one entry per
    /// issue. A failing source is logged and skipped.
    pub async fn fetch_all(&self) -> Result<Vec<IssueListing>, StoreError> {
        let sources = self.store.active_sources().await?;
        let mut collected = Vec::new();

        for source in &sources {
            let Some(adapter) = self.registry.get(source.kind) else {
                tracing::warn!(
                    "No adapter registered for source {} ({}), skipping",
                    source.name,
                    source.kind
                );
                continue;
            };

            match adapter.fetch_listings(source, &self.fetcher).await {
                Ok(listings) => {
                    tracing::debug!(
                        "📥 {} listings from {} (priority {})",
                        listings.len(),
                        source.name,
                        source.priority
                    );
                    collected.extend(listings);

                    if let Err(e) = self.store.touch_source_checked(source.id, Utc::now()).await {
                        tracing::warn!("Failed to stamp source {}: {}", source.name, e);
                    }
                    self.report(source.id, true).await;
                }
                Err(e) => {
                    tracing::error!("❌ Error fetching from {}: {}", source.name, e);
                    self.report(source.id, false).await;
                }
            }
        }

        let merged = deduplicate(collected);
        tracing::info!(
            "🔎 {} open issues across {} sources",
            merged.len(),
            sources.len()
        );

        Ok(merged)
    }

    /// Merged listings whose open date is after `today`.
    pub async fn fetch_upcoming(&self, today: NaiveDate) -> Result<Vec<IssueListing>, StoreError> {
        Ok(self
            .fetch_all()
            .await?
            .into_iter()
            .filter(|l| l.opens_after(today))
            .collect())
    }

    async fn report(&self, source_id: i64, healthy: bool) {
        if let Some(health) = &self.health {
            health
                .update_component(&format!("source:{}", source_id), healthy)
                .await;
        }
    }
}

/// Keeps the first listing per issue id; input order is preserved.
pub fn deduplicate(listings: Vec<IssueListing>) -> Vec<IssueListing> {
    let mut seen = HashSet::new();
    listings
        .into_iter()
        .filter(|l| seen.insert(l.issue_id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_occurrence_wins() {
        let listings = vec![
            IssueListing::new(1, "SCRIP1", "Foo"),
            IssueListing::new(2, "SCRIP1", "Foo-stale"),
            IssueListing::new(2, "SCRIP2", "Bar"),
        ];

        let merged = deduplicate(listings);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].company_name, "Foo");
        assert_eq!(merged[0].source_id, 1);
        assert_eq!(merged[1].issue_id, "SCRIP2");
    }
}
