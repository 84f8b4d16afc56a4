use async_trait::async_trait;
use serde::Deserialize;

use super::{fetch_json, non_empty, ListingSource};
use crate::api::{HttpRequest, RetryableFetchClient};
use crate::core::SourceFetchError;
use crate::monitoring::records::{SourceConfig, SourceKind};
use crate::scanner::IssueListing;

#[derive(Debug, Deserialize)]
struct RestListing {
    #[serde(default)]
    company_share_id: Option<String>,
    #[serde(default)]
    company_name: Option<String>,
    #[serde(default)]
    stock_symbol: Option<String>,
    #[serde(default)]
    share_type: Option<String>,
    #[serde(default)]
    share_group: Option<String>,
    #[serde(default)]
    issue_open_date: Option<String>,
    #[serde(default)]
    issue_close_date: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Any REST endpoint returning a bare array of snake_case listings.
pub struct GenericRestSource;

#[async_trait]
impl ListingSource for GenericRestSource {
    fn kind(&self) -> SourceKind {
        SourceKind::GenericRest
    }

    async fn fetch_listings(
        &self,
        source: &SourceConfig,
        fetcher: &RetryableFetchClient,
    ) -> Result<Vec<IssueListing>, SourceFetchError> {
        let bearer = source
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(|k| format!("Bearer {}", k));
        let request = HttpRequest::get(source.base_url.clone()).authorization(bearer.as_deref());

        let items: Vec<RestListing> = fetch_json(source, fetcher, request).await?;

        Ok(items
            .into_iter()
            .filter_map(|item| {
                let issue_id = non_empty(item.company_share_id)?;
                Some(IssueListing {
                    source_id: source.id,
                    company_name: non_empty(item.company_name).unwrap_or_else(|| issue_id.clone()),
                    issue_id,
                    scrip: non_empty(item.stock_symbol),
                    share_group: non_empty(item.share_group),
                    share_type: non_empty(item.share_type),
                    open_date: non_empty(item.issue_open_date),
                    close_date: non_empty(item.issue_close_date),
                    status: non_empty(item.status).unwrap_or_else(|| "open".to_string()),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::retry::RetryPolicy;
    use crate::api::transport::{HttpResponse, MockHttpTransport};
    use reqwest::StatusCode;
    use std::sync::Arc;

    fn source(api_key: Option<&str>) -> SourceConfig {
        SourceConfig {
            id: 9,
            name: "partner".to_string(),
            kind: SourceKind::GenericRest,
            base_url: "http://partner.test/ipos".to_string(),
            api_key: api_key.map(str::to_string),
            is_active: true,
            priority: 1,
            last_checked: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_bearer_auth_when_key_present() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|r| {
                r.url == "http://partner.test/ipos"
                    && r.headers == vec![("Authorization".to_string(), "Bearer k-1".to_string())]
            })
            .times(1)
            .returning(|_| {
                Ok(HttpResponse::new(
                    StatusCode::OK,
                    r#"[{"company_share_id":"SCRIP2","company_name":"Baz Finance","status":"upcoming"}]"#,
                ))
            });

        let fetcher = RetryableFetchClient::new(Arc::new(transport), RetryPolicy::default());
        let listings = GenericRestSource
            .fetch_listings(&source(Some("k-1")), &fetcher)
            .await
            .unwrap();

        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].issue_id, "SCRIP2");
        assert_eq!(listings[0].status, "upcoming");
    }

    #[tokio::test]
    async fn test_client_error_is_source_error() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|r| r.headers.is_empty())
            .times(1)
            .returning(|_| Ok(HttpResponse::new(StatusCode::FORBIDDEN, "nope")));

        let fetcher = RetryableFetchClient::new(Arc::new(transport), RetryPolicy::default());
        let err = GenericRestSource
            .fetch_listings(&source(None), &fetcher)
            .await
            .unwrap_err();

        assert!(err.cause.contains("403"));
    }
}
