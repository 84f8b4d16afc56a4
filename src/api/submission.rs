use reqwest::StatusCode;
use std::fmt;
use std::sync::Arc;

use super::transport::{HttpRequest, HttpTransport};
use super::types::{ApplyRequest, AuthToken, BankAccount};
use crate::monitoring::records::ApplicationStatus;
use crate::scanner::IssueListing;

const APPLY_ENDPOINT: &str = "/applicantForm/share/apply";

/// Everything an application needs, resolved once when a session starts.
#[derive(Clone)]
pub struct Applicant {
    pub profile_id: i64,
    pub token: AuthToken,
    pub demat: String,
    pub boid: String,
    pub bank_id: i64,
    pub account: BankAccount,
    pub crn: String,
    pub transaction_pin: String,
}

impl fmt::Debug for Applicant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Applicant")
            .field("profile_id", &self.profile_id)
            .field("boid", &self.boid)
            .field("bank_id", &self.bank_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationOutcome {
    Success { message: String },
    Failed { message: String },
    /// The request may have been accepted. Never resubmitted automatically.
    Ambiguous { message: String },
    /// Token or credentials no longer accepted.
    Unauthorized { message: String },
}

impl ApplicationOutcome {
    pub fn status(&self) -> ApplicationStatus {
        match self {
            ApplicationOutcome::Success { .. } => ApplicationStatus::Success,
            ApplicationOutcome::Failed { .. } | ApplicationOutcome::Unauthorized { .. } => {
                ApplicationStatus::Failed
            }
            ApplicationOutcome::Ambiguous { .. } => ApplicationStatus::Ambiguous,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApplicationOutcome::Success { message }
            | ApplicationOutcome::Failed { message }
            | ApplicationOutcome::Ambiguous { message }
            | ApplicationOutcome::Unauthorized { message } => message,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApplicationOutcome::Unauthorized { .. })
    }
}

/// Single-shot application call. Deliberately bypasses `RetryableFetchClient`.
#[derive(Clone)]
pub struct SubmissionClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
}

impl SubmissionClient {
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn payload(applicant: &Applicant, listing: &IssueListing, quantity: u32) -> ApplyRequest {
        ApplyRequest {
            demat: applicant.demat.clone(),
            boid: applicant.boid.clone(),
            account_number: applicant.account.account_number.clone(),
            customer_id: applicant.account.id,
            account_branch_id: applicant.account.account_branch_id,
            account_type_id: applicant.account.account_type_id,
            bank_id: applicant.bank_id.to_string(),
            crn_number: applicant.crn.clone(),
            transaction_pin: applicant.transaction_pin.clone(),
            applied_kitta: quantity.to_string(),
            company_share_id: listing.issue_id.clone(),
        }
    }

    pub async fn submit(
        &self,
        applicant: &Applicant,
        listing: &IssueListing,
        quantity: u32,
    ) -> ApplicationOutcome {
        let body = match serde_json::to_value(Self::payload(applicant, listing, quantity)) {
            Ok(body) => body,
            Err(e) => {
                return ApplicationOutcome::Failed {
                    message: format!("could not encode application: {}", e),
                }
            }
        };

        let request = HttpRequest::post(format!("{}{}", self.base_url, APPLY_ENDPOINT), body)
            .authorization(Some(applicant.token.as_str()));

        tracing::info!(
            "📨 Applying {} kitta to {} ({}) for profile {}",
            quantity,
            listing.company_name,
            listing.issue_id,
            applicant.profile_id
        );

        let outcome = match self.transport.execute(request).await {
            Ok(response) => match response.status {
                StatusCode::CREATED => ApplicationOutcome::Success {
                    message: response.remote_message(),
                },
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    ApplicationOutcome::Unauthorized {
                        message: response.remote_message(),
                    }
                }
                status if status.is_server_error() || status.is_success() => {
                    ApplicationOutcome::Ambiguous {
                        message: format!(
                            "unconfirmed ({}): {}",
                            status,
                            response.remote_message()
                        ),
                    }
                }
                _ => ApplicationOutcome::Failed {
                    message: response.remote_message(),
                },
            },
            Err(e) if e.may_have_reached_server() => ApplicationOutcome::Ambiguous {
                message: format!("no confirmation received: {}", e),
            },
            Err(e) => ApplicationOutcome::Failed {
                message: format!("request not sent: {}", e),
            },
        };

        match &outcome {
            ApplicationOutcome::Success { .. } => {
                tracing::info!("✅ Applied to {} ({})", listing.company_name, listing.issue_id)
            }
            ApplicationOutcome::Ambiguous { message } => tracing::warn!(
                "⚠️  Application to {} is unconfirmed and needs manual review: {}",
                listing.issue_id,
                message
            ),
            other => tracing::error!(
                "❌ Application to {} failed: {}",
                listing.issue_id,
                other.message()
            ),
        }

        outcome
    }
}
