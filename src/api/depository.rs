use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::retry::RetryableFetchClient;
use super::transport::{HttpRequest, HttpResponse};
use super::types::*;
use crate::core::{AuthenticationError, DepositoryError};

/// Read-side client for the depository API. Every call goes through the
/// retrying fetcher; the application endpoint lives in `SubmissionClient`.
#[derive(Clone)]
pub struct DepositoryClient {
    fetcher: RetryableFetchClient,
    base_url: String,
}

impl DepositoryClient {
    pub fn new(fetcher: RetryableFetchClient, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: HttpRequest,
    ) -> Result<T, DepositoryError> {
        let response = self.fetcher.fetch(request).await?;
        Self::check_status(endpoint, &response)?;

        response.json().map_err(|e| DepositoryError::Decode {
            endpoint: endpoint.to_string(),
            cause: e.to_string(),
        })
    }

    fn check_status(endpoint: &str, response: &HttpResponse) -> Result<(), DepositoryError> {
        match response.status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
                AuthenticationError::Rejected(response.remote_message()).into(),
            ),
            status if status.is_success() => Ok(()),
            status => {
                let message = response.remote_message();
                tracing::error!("Depository API error: {} {} - {}", endpoint, status, message);
                Err(DepositoryError::Status {
                    endpoint: endpoint.to_string(),
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }

    pub async fn capitals(&self) -> Result<Vec<Capital>, DepositoryError> {
        let endpoint = "/capital/";
        self.request(endpoint, HttpRequest::get(self.url(endpoint)))
            .await
    }

    /// Maps a DPID (e.g. "13700") to the depository's numeric client id.
    pub async fn client_id_for(&self, dpid: &str) -> Result<i64, DepositoryError> {
        let capitals = self.capitals().await?;

        capitals
            .into_iter()
            .find(|c| c.code == dpid)
            .map(|c| c.id)
            .ok_or_else(|| AuthenticationError::UnknownParticipant(dpid.to_string()).into())
    }

    pub async fn authenticate(
        &self,
        client_id: i64,
        username: &str,
        password: &str,
    ) -> Result<AuthToken, DepositoryError> {
        let endpoint = "/auth/";
        let body = serde_json::to_value(LoginRequest {
            client_id,
            username,
            password,
        })
        .map_err(|e| DepositoryError::Decode {
            endpoint: endpoint.to_string(),
            cause: e.to_string(),
        })?;

        let response = self
            .fetcher
            .fetch(HttpRequest::post(self.url(endpoint), body))
            .await?;

        if response.status.is_client_error() {
            return Err(AuthenticationError::Rejected(response.remote_message()).into());
        }
        Self::check_status(endpoint, &response)?;

        match response.header("authorization") {
            Some(token) if !token.is_empty() => Ok(AuthToken::new(token)),
            _ => Err(AuthenticationError::MissingToken.into()),
        }
    }

    /// Resolves the participant and logs in. Credentials are checked once per call.
    pub async fn login(
        &self,
        dpid: &str,
        username: &str,
        password: &str,
    ) -> Result<AuthToken, DepositoryError> {
        let client_id = self.client_id_for(dpid).await?;
        let token = self.authenticate(client_id, username, password).await?;
        tracing::info!("🔐 Logged in to depository as {} (DP {})", username, dpid);
        Ok(token)
    }

    pub async fn own_detail(&self, token: &AuthToken) -> Result<OwnDetail, DepositoryError> {
        let endpoint = "/ownDetail/";
        self.request(
            endpoint,
            HttpRequest::get(self.url(endpoint)).authorization(Some(token.as_str())),
        )
        .await
    }

    pub async fn banks(&self, token: &AuthToken) -> Result<Vec<BankBrief>, DepositoryError> {
        let endpoint = "/bank/";
        self.request(
            endpoint,
            HttpRequest::get(self.url(endpoint)).authorization(Some(token.as_str())),
        )
        .await
    }

    pub async fn bank_accounts(
        &self,
        token: &AuthToken,
        bank_id: i64,
    ) -> Result<Vec<BankAccount>, DepositoryError> {
        let endpoint = format!("/bank/{}", bank_id);
        self.request(
            &endpoint,
            HttpRequest::get(self.url(&endpoint)).authorization(Some(token.as_str())),
        )
        .await
    }

    /// First account registered under `bank_id`.
    pub async fn bank_account(
        &self,
        token: &AuthToken,
        bank_id: i64,
    ) -> Result<BankAccount, DepositoryError> {
        self.bank_accounts(token, bank_id)
            .await?
            .into_iter()
            .next()
            .ok_or(DepositoryError::NoBankAccount(bank_id))
    }

    pub async fn ping(&self) -> bool {
        let endpoint = "/capital/";
        match self.fetcher.fetch(HttpRequest::get(self.url(endpoint))).await {
            Ok(response) => response.status.is_success(),
            Err(e) => {
                tracing::warn!("Depository connection test failed: {}", e);
                false
            }
        }
    }
}

/// Filter body the depository expects on `/companyShare/applicableIssue/`.
pub fn applicable_issue_filter() -> serde_json::Value {
    json!({
        "filterFieldParams": [],
        "page": 1,
        "size": 10,
        "searchRoleViewConstants": "VIEW_APPLICABLE_SHARE",
        "filterDateParams": []
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::retry::RetryPolicy;
    use crate::api::transport::MockHttpTransport;
    use std::sync::Arc;
    use std::time::Duration;

    fn client(transport: MockHttpTransport) -> DepositoryClient {
        let fetcher = RetryableFetchClient::new(
            Arc::new(transport),
            RetryPolicy {
                max_attempts: 2,
                backoff_step: Duration::from_millis(1),
            },
        );
        DepositoryClient::new(fetcher, "http://cdsc.test/api/meroShare/")
    }

    #[tokio::test]
    async fn test_login_resolves_client_id_and_reads_token_header() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|r| r.url.ends_with("/capital/"))
            .times(1)
            .returning(|_| {
                Ok(HttpResponse::new(
                    StatusCode::OK,
                    r#"[{"id":128,"code":"13700","name":"Example Capital"}]"#,
                ))
            });
        transport
            .expect_execute()
            .withf(|r| r.url.ends_with("/auth/") && r.body.as_ref().unwrap()["clientId"] == 128)
            .times(1)
            .returning(|_| {
                Ok(HttpResponse::new(StatusCode::OK, "{}").with_header("Authorization", "tok-1"))
            });

        let token = client(transport)
            .login("13700", "00000001", "secret")
            .await
            .unwrap();
        assert_eq!(token.as_str(), "tok-1");
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_authentication_errors() {
        let mut transport = MockHttpTransport::new();
        transport.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse::new(
                StatusCode::UNAUTHORIZED,
                r#"{"message":"Invalid credentials"}"#,
            ))
        });

        let err = client(transport)
            .authenticate(128, "00000001", "wrong")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DepositoryError::Authentication(AuthenticationError::Rejected(ref m)) if m == "Invalid credentials"
        ));
    }

    #[tokio::test]
    async fn test_unknown_participant() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .returning(|_| Ok(HttpResponse::new(StatusCode::OK, "[]")));

        let err = client(transport).client_id_for("99999").await.unwrap_err();
        assert!(matches!(
            err,
            DepositoryError::Authentication(AuthenticationError::UnknownParticipant(_))
        ));
    }

    #[tokio::test]
    async fn test_bank_account_requires_an_entry() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .withf(|r| r.url.ends_with("/bank/44"))
            .returning(|_| Ok(HttpResponse::new(StatusCode::OK, "[]")));

        let err = client(transport)
            .bank_account(&AuthToken::new("tok"), 44)
            .await
            .unwrap_err();
        assert!(matches!(err, DepositoryError::NoBankAccount(44)));
    }
}
