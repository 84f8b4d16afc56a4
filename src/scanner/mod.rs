pub mod aggregator;
pub mod sources;

pub use aggregator::{deduplicate, Aggregator};
pub use sources::{ListingSource, SourceRegistry};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One open or upcoming issue as reported by a source. Rebuilt every poll;
/// identity is `issue_id` regardless of which source produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueListing {
    pub source_id: i64,
    pub issue_id: String,
    pub company_name: String,
    pub scrip: Option<String>,
    pub share_group: Option<String>,
    pub share_type: Option<String>,
    pub open_date: Option<String>,
    pub close_date: Option<String>,
    pub status: String,
}

impl IssueListing {
    pub fn new(source_id: i64, issue_id: impl Into<String>, company_name: impl Into<String>) -> Self {
        Self {
            source_id,
            issue_id: issue_id.into(),
            company_name: company_name.into(),
            scrip: None,
            share_group: None,
            share_type: None,
            open_date: None,
            close_date: None,
            status: "open".to_string(),
        }
    }

    /// Parses the leading `YYYY-MM-DD` of the reported open date.
    pub fn open_day(&self) -> Option<NaiveDate> {
        let raw = self.open_date.as_deref()?.trim();
        let prefix = raw.get(..10)?;
        NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
    }

    pub fn opens_after(&self, day: NaiveDate) -> bool {
        self.open_day().map(|open| open > day).unwrap_or(false)
    }
}
