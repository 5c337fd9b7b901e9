use std::path::Path;
use std::time::Duration;

use chrono::Local;
use scraper::Html;

use crate::browser::PageDriver;
use crate::db::Database;
use crate::error::{HuntError, Result};
use crate::extract::{Extraction, Extractor};
use crate::models::BatchStats;
use crate::session::SessionState;

/// Where and how to fetch the listing page.
#[derive(Debug, Clone)]
pub struct Target<'a> {
    pub url: &'a str,
    pub origin: &'a str,
    pub wait_timeout: Duration,
    pub settle: Duration,
    pub snapshot_dir: Option<&'a Path>,
}

#[derive(Debug)]
pub struct IngestReport {
    pub extraction: Extraction,
    /// `None` when nothing was persisted (dry run).
    pub stats: Option<BatchStats>,
    /// Browser session as it stood after the fetch; the caller persists it.
    pub session: SessionState,
}

/// Renders the page with its lazy-loaded cards and returns the DOM along
/// with the session state left behind by the visit.
///
/// The order is fixed: restore session, navigate, wait for the container,
/// scroll, settle, then read the DOM. Reading any earlier under-counts cards.
pub async fn fetch_page<D: PageDriver>(
    driver: &mut D,
    target: &Target<'_>,
    container: &str,
    session: &SessionState,
) -> Result<(String, SessionState)> {
    driver.restore_session(target.origin, session).await?;
    driver.navigate(target.url).await?;

    if !driver.wait_for(container, target.wait_timeout).await? {
        return Err(HuntError::NavigationTimeout {
            selector: container.to_string(),
            waited: target.wait_timeout,
        });
    }

    driver.trigger_lazy_load().await?;
    driver.settle(target.settle).await;

    let html = driver.page_source().await?;
    let session = driver.capture_session().await?;
    Ok((html, session))
}

/// One ingestion run: fetch, extract, and persist new listings into `store`.
/// With no store the run only extracts.
pub async fn run<D: PageDriver>(
    driver: &mut D,
    target: &Target<'_>,
    extractor: &Extractor,
    store: Option<&Database>,
    session: SessionState,
) -> Result<IngestReport> {
    let container = extractor.container_selector();
    let (html, session) = fetch_page(driver, target, &container, &session).await?;

    let extraction = extractor.extract(&Html::parse_document(&html));
    if extraction.is_empty() {
        tracing::warn!(
            "No listings extracted from {} with any of {} profiles; the page markup may have changed",
            target.url,
            extractor.profiles().len()
        );
        if let Some(dir) = target.snapshot_dir {
            let path = write_snapshot(dir, &html)?;
            tracing::warn!("Saved page snapshot to {}", path.display());
        }
    }

    let stats = match store {
        Some(db) => {
            let stats = db.insert_batch(&extraction.listings)?;
            tracing::info!(
                "Stored {} new listings, skipped {} already known",
                stats.inserted,
                stats.skipped
            );
            Some(stats)
        }
        None => None,
    };

    Ok(IngestReport {
        extraction,
        stats,
        session,
    })
}

/// Opens the login page and gives the user `wait` to sign in by hand,
/// including any MFA step, then captures the resulting session.
pub async fn capture_login<D: PageDriver>(
    driver: &mut D,
    login_url: &str,
    wait: Duration,
) -> Result<SessionState> {
    driver.navigate(login_url).await?;
    tracing::info!("Waiting {}s for manual login", wait.as_secs());
    driver.settle(wait).await;
    driver.capture_session().await
}

/// [`capture_login`] followed by saving the session, so the login is on
/// disk before the browser is torn down.
pub async fn login_and_save<D: PageDriver>(
    driver: &mut D,
    login_url: &str,
    wait: Duration,
    session_path: &Path,
) -> Result<SessionState> {
    let session = capture_login(driver, login_url, wait).await?;
    session.save(session_path)?;
    Ok(session)
}

fn write_snapshot(dir: &Path, html: &str) -> Result<std::path::PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("empty-{}.html", Local::now().format("%Y%m%d-%H%M%S")));
    std::fs::write(&path, html)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ProfileSpec;
    use crate::link::LinkResolver;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Restore(Option<Vec<u8>>),
        Navigate(String),
        WaitFor(String, Duration),
        LazyLoad,
        Settle(Duration),
        Source,
        Capture,
    }

    /// Records every call; the DOM only "renders" once lazy load has settled.
    struct FakeDriver {
        calls: Vec<Call>,
        html: String,
        container_present: bool,
        settled: bool,
    }

    impl FakeDriver {
        fn new(html: &str) -> Self {
            Self {
                calls: Vec::new(),
                html: html.to_string(),
                container_present: true,
                settled: false,
            }
        }

        fn without_container() -> Self {
            Self {
                container_present: false,
                ..Self::new("")
            }
        }
    }

    impl PageDriver for FakeDriver {
        async fn restore_session(&mut self, _origin: &str, state: &SessionState) -> Result<()> {
            self.calls.push(Call::Restore(state.bytes().map(|b| b.to_vec())));
            Ok(())
        }

        async fn navigate(&mut self, url: &str) -> Result<()> {
            self.calls.push(Call::Navigate(url.to_string()));
            Ok(())
        }

        async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<bool> {
            self.calls.push(Call::WaitFor(selector.to_string(), timeout));
            Ok(self.container_present)
        }

        async fn trigger_lazy_load(&mut self) -> Result<()> {
            self.calls.push(Call::LazyLoad);
            Ok(())
        }

        async fn settle(&mut self, duration: Duration) {
            self.settled = self.calls.last() == Some(&Call::LazyLoad);
            self.calls.push(Call::Settle(duration));
        }

        async fn page_source(&mut self) -> Result<String> {
            self.calls.push(Call::Source);
            if self.settled {
                Ok(self.html.clone())
            } else {
                Ok("<html><body></body></html>".to_string())
            }
        }

        async fn capture_session(&mut self) -> Result<SessionState> {
            self.calls.push(Call::Capture);
            Ok(SessionState::from_bytes(b"after".to_vec()))
        }
    }

    fn extractor() -> Extractor {
        let specs = vec![ProfileSpec {
            name: "v1".to_string(),
            container: "ul.results".to_string(),
            card: "ul.results > li".to_string(),
            title: "h3".to_string(),
            company: Some(".company".to_string()),
            location: None,
            link: Some("a".to_string()),
        }];
        Extractor::new(&specs, LinkResolver::new("https://site.example", false).unwrap()).unwrap()
    }

    fn target() -> Target<'static> {
        Target {
            url: "https://site.example/jobs/search",
            origin: "https://site.example",
            wait_timeout: Duration::from_secs(15),
            settle: Duration::from_millis(1500),
            snapshot_dir: None,
        }
    }

    const PAGE: &str = r#"<ul class="results">
        <li><a href="/jobs/view/1"><h3>Rust Engineer</h3></a><span class="company">Acme</span></li>
        <li><a href="https://site.example/jobs/view/1?trk=x"><h3>Rust Engineer</h3></a></li>
        <li><a href="/jobs/view/2"><h3>Data Engineer</h3></a></li>
    </ul>"#;

    #[tokio::test]
    async fn test_run_follows_wait_lazy_load_settle_order() {
        let mut driver = FakeDriver::new(PAGE);
        let session = SessionState::from_bytes(b"before".to_vec());

        let report = run(&mut driver, &target(), &extractor(), None, session)
            .await
            .unwrap();

        assert_eq!(
            driver.calls,
            vec![
                Call::Restore(Some(b"before".to_vec())),
                Call::Navigate("https://site.example/jobs/search".to_string()),
                Call::WaitFor("ul.results".to_string(), Duration::from_secs(15)),
                Call::LazyLoad,
                Call::Settle(Duration::from_millis(1500)),
                Call::Source,
                Call::Capture,
            ]
        );
        assert_eq!(report.extraction.listings.len(), 3);
        assert_eq!(report.stats, None);
        assert_eq!(report.session.bytes(), Some(&b"after"[..]));
    }

    #[tokio::test]
    async fn test_run_persists_and_collapses_equivalent_links() {
        let db = Database::open_in_memory().unwrap();
        db.ensure_schema().unwrap();
        let mut driver = FakeDriver::new(PAGE);

        let report = run(
            &mut driver,
            &target(),
            &extractor(),
            Some(&db),
            SessionState::unauthenticated(),
        )
        .await
        .unwrap();

        assert_eq!(report.stats, Some(BatchStats { inserted: 2, skipped: 1 }));
        let stored = db.all().unwrap();
        assert_eq!(stored[0].link, "https://site.example/jobs/view/1");
        assert_eq!(stored[0].company, "Acme");
        assert_eq!(stored[1].title, "Data Engineer");
    }

    #[tokio::test]
    async fn test_second_run_skips_everything() {
        let db = Database::open_in_memory().unwrap();
        db.ensure_schema().unwrap();

        for expected in [BatchStats { inserted: 2, skipped: 1 }, BatchStats { inserted: 0, skipped: 3 }] {
            let mut driver = FakeDriver::new(PAGE);
            let report = run(
                &mut driver,
                &target(),
                &extractor(),
                Some(&db),
                SessionState::unauthenticated(),
            )
            .await
            .unwrap();
            assert_eq!(report.stats, Some(expected));
        }
        assert_eq!(db.count().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_missing_container_is_navigation_timeout() {
        let db = Database::open_in_memory().unwrap();
        db.ensure_schema().unwrap();
        let mut driver = FakeDriver::without_container();

        let err = run(
            &mut driver,
            &target(),
            &extractor(),
            Some(&db),
            SessionState::unauthenticated(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, HuntError::NavigationTimeout { .. }));
        assert!(!driver.calls.contains(&Call::Source));
        assert_eq!(db.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_page_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = FakeDriver::new("<html><body><p>Nothing here</p></body></html>");
        let mut target = target();
        target.snapshot_dir = Some(dir.path());

        let report = run(
            &mut driver,
            &target,
            &extractor(),
            None,
            SessionState::unauthenticated(),
        )
        .await
        .unwrap();

        assert!(report.extraction.is_empty());
        let snapshots: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(snapshots.len(), 1);
    }

    #[tokio::test]
    async fn test_capture_login_waits_then_captures() {
        let mut driver = FakeDriver::new("");
        let session = capture_login(
            &mut driver,
            "https://site.example/login",
            Duration::from_secs(120),
        )
        .await
        .unwrap();

        assert_eq!(
            driver.calls,
            vec![
                Call::Navigate("https://site.example/login".to_string()),
                Call::Settle(Duration::from_secs(120)),
                Call::Capture,
            ]
        );
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_login_and_save_writes_session_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut driver = FakeDriver::new("");

        login_and_save(
            &mut driver,
            "https://site.example/login",
            Duration::from_secs(1),
            &path,
        )
        .await
        .unwrap();

        assert_eq!(driver.calls.last(), Some(&Call::Capture));
        assert_eq!(std::fs::read(&path).unwrap(), b"after");
    }
}
