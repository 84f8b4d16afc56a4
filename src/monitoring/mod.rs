pub mod database;
pub mod records;
pub mod session;
pub mod store;
pub mod supervisor;

pub use database::SqliteRecordStore;
pub use records::{
    ApplicationRecord, ApplicationStatus, NewApplication, NewSource, Profile, SessionRecord,
    SessionState, SourceConfig, SourceKind,
};
pub use session::{MonitoringSession, SessionContext, SessionSnapshot};
pub use store::{RecordStore, StoreResult};
pub use supervisor::SessionSupervisor;
