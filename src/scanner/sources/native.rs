use async_trait::async_trait;
use serde::Deserialize;

use super::{fetch_json, non_empty, ListingSource};
use crate::api::depository::applicable_issue_filter;
use crate::api::types::ObjectEnvelope;
use crate::api::{HttpRequest, RetryableFetchClient};
use crate::core::SourceFetchError;
use crate::monitoring::records::{SourceConfig, SourceKind};
use crate::scanner::IssueListing;

const ENDPOINT: &str = "/companyShare/applicableIssue/";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplicableIssue {
    company_share_id: serde_json::Value,
    #[serde(default)]
    scrip: Option<String>,
    #[serde(default)]
    company_name: Option<String>,
    #[serde(default)]
    share_type_name: Option<String>,
    #[serde(default)]
    share_group_name: Option<String>,
    #[serde(default)]
    issue_open_date: Option<String>,
    #[serde(default)]
    issue_close_date: Option<String>,
    #[serde(default)]
    status_name: Option<String>,
    /// Present once the depository itself has an application on file.
    #[serde(default)]
    action: Option<String>,
}

impl ApplicableIssue {
    fn issue_id(&self) -> Option<String> {
        match &self.company_share_id {
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        }
    }

    fn already_actioned(&self) -> bool {
        self.action
            .as_deref()
            .map(|a| !a.trim().is_empty())
            .unwrap_or(false)
    }
}

/// The depository's own applicable-issue list.
pub struct NativeDepositorySource;

#[async_trait]
impl ListingSource for NativeDepositorySource {
    fn kind(&self) -> SourceKind {
        SourceKind::NativeDepository
    }

    async fn fetch_listings(
        &self,
        source: &SourceConfig,
        fetcher: &RetryableFetchClient,
    ) -> Result<Vec<IssueListing>, SourceFetchError> {
        let url = format!("{}{}", source.base_url.trim_end_matches('/'), ENDPOINT);
        let request =
            HttpRequest::post(url, applicable_issue_filter()).authorization(source.api_key.as_deref());

        let envelope: ObjectEnvelope<ApplicableIssue> = fetch_json(source, fetcher, request).await?;

        let mut listings = Vec::with_capacity(envelope.object.len());
        for item in envelope.object {
            if item.already_actioned() {
                tracing::debug!(
                    "Skipping {:?}: already actioned ({:?})",
                    item.scrip,
                    item.action
                );
                continue;
            }

            let Some(issue_id) = item.issue_id() else {
                tracing::warn!("Source {} returned an issue without companyShareId", source.id);
                continue;
            };

            let company_name = non_empty(item.company_name).unwrap_or_else(|| issue_id.clone());
            listings.push(IssueListing {
                source_id: source.id,
                issue_id,
                company_name,
                scrip: non_empty(item.scrip),
                share_group: non_empty(item.share_group_name),
                share_type: non_empty(item.share_type_name),
                open_date: non_empty(item.issue_open_date),
                close_date: non_empty(item.issue_close_date),
                status: non_empty(item.status_name).unwrap_or_else(|| "open".to_string()),
            });
        }

        Ok(listings)
    }
}
