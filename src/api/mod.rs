pub mod depository;
pub mod retry;
pub mod submission;
pub mod transport;
pub mod types;

pub use depository::DepositoryClient;
pub use retry::{RetryPolicy, RetryableFetchClient};
pub use submission::{Applicant, ApplicationOutcome, SubmissionClient};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use types::*;
