use crate::db::Database;
use crate::error::Result;
use crate::models::InsertOutcome;

/// Case-insensitive include/exclude keyword sets matched against titles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keywords {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl Keywords {
    pub fn new<I, E>(include: I, exclude: E) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        Self {
            include: lowered(include),
            exclude: lowered(exclude),
        }
    }

    pub fn include(&self) -> &[String] {
        &self.include
    }

    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    /// True when the title contains an include keyword and no exclude
    /// keyword. An empty include set admits nothing.
    pub fn admits(&self, title: &str) -> bool {
        let title = title.to_lowercase();
        self.include.iter().any(|kw| title.contains(kw.as_str()))
            && !self.exclude.iter().any(|kw| title.contains(kw.as_str()))
    }
}

fn lowered<T>(keywords: T) -> Vec<String>
where
    T: IntoIterator,
    T::Item: AsRef<str>,
{
    keywords
        .into_iter()
        .map(|kw| kw.as_ref().trim().to_lowercase())
        .filter(|kw| !kw.is_empty())
        .collect()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TriageReport {
    pub examined: usize,
    pub matched: usize,
    pub admitted: usize,
}

/// Copies every stored listing whose title passes `keywords` into the
/// curated set. Rows already curated stay put, even if they no longer match.
pub fn run(db: &Database, keywords: &Keywords) -> Result<TriageReport> {
    let listings = db.all()?;
    let mut report = TriageReport {
        examined: listings.len(),
        ..Default::default()
    };

    let tx = db.transaction()?;
    for listing in listings.iter().filter(|l| keywords.admits(&l.title)) {
        report.matched += 1;
        if db.curate_if_absent(listing)? == InsertOutcome::Inserted {
            tracing::debug!("Curated #{} {}", listing.id, listing.title);
            report.admitted += 1;
        }
    }
    tx.commit()?;

    tracing::info!(
        "Triage examined {} listings, {} matched, {} newly curated",
        report.examined,
        report.matched,
        report.admitted
    );
    Ok(report)
}
