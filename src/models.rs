use serde::{Deserialize, Serialize};

/// A listing as scraped from a page, before it has been persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawListing {
    pub title: String,
    pub company: String,
    pub location: String,
    pub link: String, // canonical absolute URL, the identity key
}

/// A persisted listing. Rows in the curated set reuse the id of the
/// raw row they were derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredListing {
    pub id: i64,
    pub title: String,
    pub company: String,
    pub location: String,
    pub link: String,
    pub fetched_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    SkippedDuplicate,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    pub inserted: usize,
    pub skipped: usize,
}

impl BatchStats {
    pub fn record(&mut self, outcome: InsertOutcome) {
        match outcome {
            InsertOutcome::Inserted => self.inserted += 1,
            InsertOutcome::SkippedDuplicate => self.skipped += 1,
        }
    }
}
