use async_trait::async_trait;
use serde::Deserialize;

use super::{fetch_json, non_empty, ListingSource};
use crate::api::types::DataEnvelope;
use crate::api::{HttpRequest, RetryableFetchClient};
use crate::core::SourceFetchError;
use crate::monitoring::records::{SourceConfig, SourceKind};
use crate::scanner::IssueListing;

const ENDPOINT: &str = "/result/openIpo";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenIpo {
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
}

/// Public open-issue feed. No auth; the stock symbol is the identifier.
///
/// Symbol-keyed ids are not depository share ids: the apply endpoint rejects
/// them, and they never merge with the same issue listed by the depository
/// under its numeric id. Use the feed for discovery and upcoming listings.
pub struct PublicResultFeedSource;

#[async_trait]
impl ListingSource for PublicResultFeedSource {
    fn kind(&self) -> SourceKind {
        SourceKind::PublicResultFeed
    }

    async fn fetch_listings(
        &self,
        source: &SourceConfig,
        fetcher: &RetryableFetchClient,
    ) -> Result<Vec<IssueListing>, SourceFetchError> {
        let url = format!("{}{}", source.base_url.trim_end_matches('/'), ENDPOINT);
        let envelope: DataEnvelope<OpenIpo> =
            fetch_json(source, fetcher, HttpRequest::get(url)).await?;

        Ok(envelope
            .data
            .into_iter()
            .filter_map(|item| {
                let issue_id = non_empty(item.stock_symbol)?;
                Some(IssueListing {
                    source_id: source.id,
                    company_name: non_empty(item.company_name).unwrap_or_else(|| issue_id.clone()),
                    scrip: Some(issue_id.clone()),
                    issue_id,
                    share_group: non_empty(item.share_group),
                    share_type: non_empty(item.share_type),
                    open_date: non_empty(item.issue_open_date),
                    close_date: non_empty(item.issue_close_date),
                    status: "open".to_string(),
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
    use std::time::Duration;

    fn source() -> SourceConfig {
        SourceConfig {
            id: 5,
            name: "results".to_string(),
            kind: SourceKind::PublicResultFeed,
            base_url: "http://results.test/".to_string(),
            api_key: None,
            is_active: true,
            priority: 5,
            last_checked: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_reads_flat_data_array() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|r| r.url == "http://results.test/result/openIpo" && r.headers.is_empty())
            .times(1)
            .returning(|_| {
                Ok(HttpResponse::new(
                    StatusCode::OK,
                    r#"{"data":[
                        {"companyName":"Foo Hydropower","stockSymbol":"FOO","issueOpenDate":"2026-10-20"},
                        {"companyName":"Nameless","stockSymbol":""}
                    ]}"#,
                ))
            });

        let fetcher = RetryableFetchClient::new(Arc::new(transport), RetryPolicy::default());
        let listings = PublicResultFeedSource
            .fetch_listings(&source(), &fetcher)
            .await
            .unwrap();

        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].issue_id, "FOO");
        assert_eq!(listings[0].open_date.as_deref(), Some("2026-10-20"));
    }

    #[tokio::test]
    async fn test_exhausted_retries_become_source_error() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .times(2)
            .returning(|_| Ok(HttpResponse::new(StatusCode::SERVICE_UNAVAILABLE, "")));

        let fetcher = RetryableFetchClient::new(
            Arc::new(transport),
            RetryPolicy {
                max_attempts: 2,
                backoff_step: Duration::from_millis(1),
            },
        );
        let err = PublicResultFeedSource
            .fetch_listings(&source(), &fetcher)
            .await
            .unwrap_err();

        assert_eq!(err.source_id, 5);
        assert!(err.cause.contains("after 2 attempts"));
    }
}
