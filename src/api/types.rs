use serde::{Deserialize, Serialize};
use std::fmt;

/// Depository participant as listed by `/capital/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capital {
    pub id: i64,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest<'a> {
    pub client_id: i64,
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnDetail {
    pub demat: String,
    pub boid: String,
    #[serde(default)]
    pub client_code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankBrief {
    pub id: i64,
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
}

/// Account behind a bank, as returned by `/bank/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankAccount {
    pub account_number: String,
    pub account_branch_id: i64,
    pub account_type_id: i64,
    /// Depository-side customer id for this account.
    pub id: i64,
    #[serde(default)]
    pub branch_name: Option<String>,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    pub demat: String,
    pub boid: String,
    pub account_number: String,
    pub customer_id: i64,
    pub account_branch_id: i64,
    pub account_type_id: i64,
    pub bank_id: String,
    pub crn_number: String,
    #[serde(rename = "transactionPIN")]
    pub transaction_pin: String,
    pub applied_kitta: String,
    pub company_share_id: String,
}

impl fmt::Debug for ApplyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplyRequest")
            .field("boid", &self.boid)
            .field("bank_id", &self.bank_id)
            .field("applied_kitta", &self.applied_kitta)
            .field("company_share_id", &self.company_share_id)
            .finish_non_exhaustive()
    }
}

/// `{ "object": [...] }` envelope used by depository list endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectEnvelope<T> {
    pub object: Vec<T>,
    #[serde(default, rename = "totalCount")]
    pub total_count: Option<i64>,
}

/// `{ "data": [...] }` envelope used by the public result feed.
#[derive(Debug, Clone, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_request_wire_names() {
        let request = ApplyRequest {
            demat: "1301370000000001".to_string(),
            boid: "00000001".to_string(),
            account_number: "0010".to_string(),
            customer_id: 9,
            account_branch_id: 3,
            account_type_id: 1,
            bank_id: "44".to_string(),
            crn_number: "CRN-1".to_string(),
            transaction_pin: "1234".to_string(),
            applied_kitta: "10".to_string(),
            company_share_id: "571".to_string(),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["transactionPIN"], "1234");
        assert_eq!(json["appliedKitta"], "10");
        assert_eq!(json["crnNumber"], "CRN-1");
        assert!(!format!("{:?}", request).contains("1234"));
    }
}
