use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::{BatchStats, InsertOutcome, RawListing, StoredListing};

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::configure(conn, path.to_path_buf())
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(conn, PathBuf::from(":memory:"))
    }

    fn configure(conn: Connection, path: PathBuf) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn default_path() -> PathBuf {
        // Use XDG data directory or fallback
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "trawl") {
            proj_dirs.data_dir().join("trawl.db")
        } else {
            PathBuf::from("trawl.db")
        }
    }

    /// Creates both tables if they are missing. Safe on every startup.
    pub fn ensure_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS job_listings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                company TEXT NOT NULL DEFAULT '',
                location TEXT NOT NULL DEFAULT '',
                link TEXT NOT NULL UNIQUE,
                fetched_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS filtered_jobs (
                id INTEGER PRIMARY KEY REFERENCES job_listings(id),
                title TEXT NOT NULL,
                company TEXT NOT NULL DEFAULT '',
                location TEXT NOT NULL DEFAULT '',
                link TEXT NOT NULL UNIQUE,
                fetched_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    // --- Raw listings ---

    /// Inserts the listing unless its link is already stored. First write wins.
    pub fn insert_if_absent(&self, listing: &RawListing) -> Result<InsertOutcome> {
        let fetched_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let changed = self.conn.execute(
            "INSERT INTO job_listings (title, company, location, link, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(link) DO NOTHING",
            params![
                listing.title,
                listing.company,
                listing.location,
                listing.link,
                fetched_at
            ],
        )?;

        if changed == 0 {
            tracing::debug!("Skipping duplicate listing {}", listing.link);
            Ok(InsertOutcome::SkippedDuplicate)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    /// Inserts every listing in order. Duplicates are counted, not fatal.
    pub fn insert_batch(&self, listings: &[RawListing]) -> Result<BatchStats> {
        let tx = self.conn.unchecked_transaction()?;
        let mut stats = BatchStats::default();
        for listing in listings {
            stats.record(self.insert_if_absent(listing)?);
        }
        tx.commit()?;
        Ok(stats)
    }

    /// Every stored listing in insertion order.
    pub fn all(&self) -> Result<Vec<StoredListing>> {
        self.select_all("job_listings")
    }

    pub fn count(&self) -> Result<usize> {
        self.count_rows("job_listings")
    }

    // --- Curated listings ---

    /// Copies a stored listing into the curated set, keeping its id.
    pub fn curate_if_absent(&self, listing: &StoredListing) -> Result<InsertOutcome> {
        let changed = self.conn.execute(
            "INSERT INTO filtered_jobs (id, title, company, location, link, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT DO NOTHING",
            params![
                listing.id,
                listing.title,
                listing.company,
                listing.location,
                listing.link,
                listing.fetched_at
            ],
        )?;

        Ok(if changed == 0 {
            InsertOutcome::SkippedDuplicate
        } else {
            InsertOutcome::Inserted
        })
    }

    pub fn all_curated(&self) -> Result<Vec<StoredListing>> {
        self.select_all("filtered_jobs")
    }

    pub fn curated_count(&self) -> Result<usize> {
        self.count_rows("filtered_jobs")
    }

    pub(crate) fn transaction(&self) -> Result<rusqlite::Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    fn select_all(&self, table: &str) -> Result<Vec<StoredListing>> {
        let sql = format!(
            "SELECT id, title, company, location, link, fetched_at FROM {} ORDER BY id",
            table
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::row_to_listing)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn count_rows(&self, table: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn row_to_listing(row: &rusqlite::Row) -> rusqlite::Result<StoredListing> {
        Ok(StoredListing {
            id: row.get(0)?,
            title: row.get(1)?,
            company: row.get(2)?,
            location: row.get(3)?,
            link: row.get(4)?,
            fetched_at: row.get(5)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(title: &str, link: &str) -> RawListing {
        RawListing {
            title: title.to_string(),
            company: "Acme".to_string(),
            location: "Remote".to_string(),
            link: link.to_string(),
        }
    }

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.ensure_schema().unwrap();
        db
    }

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let db = db();
        db.ensure_schema().unwrap();
        db.ensure_schema().unwrap();
        assert_eq!(db.count().unwrap(), 0);
        assert_eq!(db.curated_count().unwrap(), 0);
    }

    #[test]
    fn test_insert_same_link_twice_keeps_one_row() {
        let db = db();
        let first = listing("Rust Engineer", "https://site.example/jobs/view/1");
        assert_eq!(db.insert_if_absent(&first).unwrap(), InsertOutcome::Inserted);

        let again = listing("Rust Engineer (updated)", "https://site.example/jobs/view/1");
        assert_eq!(
            db.insert_if_absent(&again).unwrap(),
            InsertOutcome::SkippedDuplicate
        );

        let rows = db.all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Rust Engineer");
    }

    #[test]
    fn test_insert_batch_counts_duplicates_and_continues() {
        let db = db();
        db.insert_if_absent(&listing("Existing", "https://site.example/jobs/view/2"))
            .unwrap();

        let batch = vec![
            listing("A", "https://site.example/jobs/view/1"),
            listing("Existing again", "https://site.example/jobs/view/2"),
            listing("B", "https://site.example/jobs/view/3"),
            listing("A again", "https://site.example/jobs/view/1"),
            listing("C", "https://site.example/jobs/view/4"),
        ];
        let stats = db.insert_batch(&batch).unwrap();
        assert_eq!(stats, BatchStats { inserted: 3, skipped: 2 });

        let titles: Vec<_> = db.all().unwrap().into_iter().map(|l| l.title).collect();
        assert_eq!(titles, vec!["Existing", "A", "B", "C"]);
    }

    #[test]
    fn test_fetched_at_is_set_on_insert() {
        let db = db();
        db.insert_if_absent(&listing("A", "https://site.example/jobs/view/1"))
            .unwrap();
        let row = &db.all().unwrap()[0];
        assert!(chrono::DateTime::parse_from_rfc3339(&row.fetched_at).is_ok());
    }

    #[test]
    fn test_curate_keeps_source_id_and_skips_duplicates() {
        let db = db();
        db.insert_batch(&[
            listing("A", "https://site.example/jobs/view/1"),
            listing("B", "https://site.example/jobs/view/2"),
        ])
        .unwrap();
        let second = db.all().unwrap().remove(1);

        assert_eq!(db.curate_if_absent(&second).unwrap(), InsertOutcome::Inserted);
        assert_eq!(
            db.curate_if_absent(&second).unwrap(),
            InsertOutcome::SkippedDuplicate
        );

        let curated = db.all_curated().unwrap();
        assert_eq!(curated, vec![second]);
    }

    #[test]
    fn test_curate_rejects_rows_not_in_store() {
        let db = db();
        let orphan = StoredListing {
            id: 42,
            title: "Ghost".to_string(),
            company: String::new(),
            location: String::new(),
            link: "https://site.example/jobs/view/42".to_string(),
            fetched_at: "2026-01-01T00:00:00Z".to_string(),
        };
        assert!(db.curate_if_absent(&orphan).is_err());
    }

    #[test]
    fn test_file_backed_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("trawl.db");
        {
            let db = Database::open(&path).unwrap();
            db.ensure_schema().unwrap();
            db.insert_if_absent(&listing("A", "https://site.example/jobs/view/1"))
                .unwrap();
        }
        let db = Database::open(&path).unwrap();
        db.ensure_schema().unwrap();
        assert_eq!(db.count().unwrap(), 1);
        assert_eq!(
            db.insert_if_absent(&listing("A", "https://site.example/jobs/view/1"))
                .unwrap(),
            InsertOutcome::SkippedDuplicate
        );
    }
}
