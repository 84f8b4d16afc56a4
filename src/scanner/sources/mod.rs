pub mod generic_rest;
pub mod native;
pub mod result_feed;

pub use generic_rest::GenericRestSource;
pub use native::NativeDepositorySource;
pub use result_feed::PublicResultFeedSource;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;

use super::IssueListing;
use crate::api::{HttpRequest, RetryableFetchClient};
use crate::core::SourceFetchError;
use crate::monitoring::records::{SourceConfig, SourceKind};

/// Capability shared by every source type: turn a `SourceConfig` into the
/// issues it currently reports.
#[async_trait]
pub trait ListingSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn fetch_listings(
        &self,
        source: &SourceConfig,
        fetcher: &RetryableFetchClient,
    ) -> Result<Vec<IssueListing>, SourceFetchError>;
}

/// Adapters by kind. New kinds are registered here; the aggregator only
/// looks them up.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    adapters: HashMap<SourceKind, Arc<dyn ListingSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(NativeDepositorySource));
        registry.register(Arc::new(PublicResultFeedSource));
        registry.register(Arc::new(GenericRestSource));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn ListingSource>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn get(&self, kind: SourceKind) -> Option<Arc<dyn ListingSource>> {
        self.adapters.get(&kind).cloned()
    }
}

/// Fetches and decodes a JSON body, folding every failure into `SourceFetchError`.
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    source: &SourceConfig,
    fetcher: &RetryableFetchClient,
    request: HttpRequest,
) -> Result<T, SourceFetchError> {
    let response = fetcher
        .fetch(request)
        .await
        .map_err(|e| SourceFetchError::new(source.id, e))?;

    if !response.status.is_success() {
        return Err(SourceFetchError::new(
            source.id,
            format!("status {}: {}", response.status, response.remote_message()),
        ));
    }

    response
        .json()
        .map_err(|e| SourceFetchError::new(source.id, format!("decode: {}", e)))
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
