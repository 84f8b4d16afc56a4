use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(rename_all = "kebab-case")]
pub enum SourceKind {
    NativeDepository,
    PublicResultFeed,
    GenericRest,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::NativeDepository => "native-depository",
            SourceKind::PublicResultFeed => "public-result-feed",
            SourceKind::GenericRest => "generic-rest",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "native-depository" => Ok(SourceKind::NativeDepository),
            "public-result-feed" => Ok(SourceKind::PublicResultFeed),
            "generic-rest" => Ok(SourceKind::GenericRest),
            other => Err(format!("unknown source kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SourceConfig {
    pub id: i64,
    pub name: String,
    pub kind: SourceKind,
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub is_active: bool,
    pub priority: i64,
    pub last_checked: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSource {
    pub name: String,
    pub kind: SourceKind,
    pub base_url: String,
    pub api_key: Option<String>,
    pub is_active: bool,
    pub priority: i64,
    pub description: Option<String>,
}

/// Investor profile as persisted. Secrets are ciphertext produced by the vault.
#[derive(Clone, Serialize, sqlx::FromRow)]
pub struct Profile {
    pub id: i64,
    pub name: String,
    pub dpid: String,
    pub boid: String,
    pub default_bank_id: i64,
    pub default_quantity: i64,
    pub ask_for_quantity: bool,
    #[serde(skip_serializing)]
    pub password_enc: String,
    #[serde(skip_serializing)]
    pub pin_enc: String,
    #[serde(skip_serializing)]
    pub crn_enc: String,
    pub is_active: bool,
    pub last_used: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("dpid", &self.dpid)
            .field("boid", &self.boid)
            .field("default_bank_id", &self.default_bank_id)
            .field("default_quantity", &self.default_quantity)
            .field("ask_for_quantity", &self.ask_for_quantity)
            .field("is_active", &self.is_active)
            .finish_non_exhaustive()
    }
}

/// Insert payload for a profile; `key_material` lands in `profile_keys`.
#[derive(Clone)]
pub struct NewProfileRecord {
    pub name: String,
    pub dpid: String,
    pub boid: String,
    pub default_bank_id: i64,
    pub default_quantity: i64,
    pub ask_for_quantity: bool,
    pub password_enc: String,
    pub pin_enc: String,
    pub crn_enc: String,
    pub key_material: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Success,
    Failed,
    /// The depository may or may not have accepted it; needs a human to check.
    Ambiguous,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Success => "success",
            ApplicationStatus::Failed => "failed",
            ApplicationStatus::Ambiguous => "ambiguous",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApplicationStatus::Pending)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApplicationRecord {
    pub id: i64,
    pub profile_id: i64,
    pub issue_id: String,
    pub company_name: String,
    pub source_id: i64,
    pub quantity: i64,
    pub bank_id: i64,
    pub status: ApplicationStatus,
    pub applied_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub response_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewApplication {
    pub profile_id: i64,
    pub issue_id: String,
    pub company_name: String,
    pub source_id: i64,
    pub quantity: i64,
    pub bank_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SessionState {
    Created,
    Running,
    Stopped,
    Failed,
}

impl SessionState {
    pub fn is_finished(&self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Created => "created",
            SessionState::Running => "running",
            SessionState::Stopped => "stopped",
            SessionState::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SessionRecord {
    pub id: Uuid,
    pub profile_id: i64,
    pub state: SessionState,
    pub is_active: bool,
    pub interval_secs: i64,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}
