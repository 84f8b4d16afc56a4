use thiserror::Error;
use uuid::Uuid;

/// Failure below the HTTP status line: nothing usable came back.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// A connect failure means the request never left this process.
    pub fn may_have_reached_server(&self) -> bool {
        !matches!(self, TransportError::Connect(_))
    }
}

#[derive(Debug, Clone, Error)]
#[error("request to {url} failed after {attempts} attempts: {last_error}")]
pub struct FetchExhaustedError {
    pub url: String,
    pub attempts: u32,
    pub last_error: String,
}

#[derive(Debug, Clone, Error)]
#[error("source {source_id} fetch failed: {cause}")]
pub struct SourceFetchError {
    pub source_id: i64,
    pub cause: String,
}

impl SourceFetchError {
    pub fn new(source_id: i64, cause: impl ToString) -> Self {
        Self {
            source_id,
            cause: cause.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("decryption failed: {0}")]
    Decryption(String),
    #[error("encryption failed")]
    Encryption,
    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

#[derive(Debug, Clone, Error)]
pub enum AuthenticationError {
    #[error("credentials rejected: {0}")]
    Rejected(String),
    #[error("unknown depository participant {0}")]
    UnknownParticipant(String),
    #[error("login response carried no authorization token")]
    MissingToken,
}

#[derive(Debug, Error)]
pub enum DepositoryError {
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),
    #[error(transparent)]
    Fetch(#[from] FetchExhaustedError),
    #[error("unexpected status {status} from {endpoint}: {message}")]
    Status {
        endpoint: String,
        status: u16,
        message: String,
    },
    #[error("failed to decode {endpoint} response: {cause}")]
    Decode { endpoint: String, cause: String },
    #[error("no account registered for bank {0}")]
    NoBankAccount(i64),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("application for profile {profile_id} on issue {issue_id} already exists")]
    DuplicateSubmission { profile_id: i64, issue_id: String },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid stored value: {0}")]
    Invalid(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::DuplicateSubmission { .. })
    }
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("invalid profile: {0}")]
    Validation(String),
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Depository(#[from] DepositoryError),
}

/// Reasons a session leaves `Created` for `Failed`.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Depository(#[from] DepositoryError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SessionError {
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            SessionError::Depository(DepositoryError::Authentication(_))
        )
    }
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("a session for profile {0} is already running")]
    AlreadyRunning(i64),
    #[error("session {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
}
