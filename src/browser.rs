use std::future::Future;
use std::time::Duration;

use thirtyfour::prelude::*;
use thirtyfour::Cookie;

use crate::error::{HuntError, Result};
use crate::session::SessionState;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// The slice of browser automation the pipeline needs. Implemented over
/// WebDriver for real runs and by a recording fake in tests.
pub trait PageDriver: Send {
    /// Installs previously captured session state before navigation.
    fn restore_session(
        &mut self,
        origin: &str,
        state: &SessionState,
    ) -> impl Future<Output = Result<()>> + Send;

    fn navigate(&mut self, url: &str) -> impl Future<Output = Result<()>> + Send;

    /// Polls until `selector` matches. `Ok(false)` means the wait timed out.
    fn wait_for(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Scrolls to the bottom so lazily loaded cards get rendered.
    fn trigger_lazy_load(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn settle(&mut self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Serialized DOM as currently rendered.
    fn page_source(&mut self) -> impl Future<Output = Result<String>> + Send;

    fn capture_session(&mut self) -> impl Future<Output = Result<SessionState>> + Send;
}

/// [`PageDriver`] over a WebDriver server such as chromedriver.
pub struct WebDriverPage {
    driver: WebDriver,
}

impl WebDriverPage {
    pub async fn connect(webdriver_url: &str, headless: bool) -> Result<Self> {
        let mut caps = DesiredCapabilities::chrome();
        if headless {
            caps.set_headless()?;
        }
        caps.add_arg("--window-size=1280,2000")?;

        let driver = WebDriver::new(webdriver_url, caps).await.map_err(|e| {
            HuntError::Browser(format!(
                "Failed to start a session on {}. Is chromedriver running? {}",
                webdriver_url, e
            ))
        })?;
        tracing::debug!("Connected to WebDriver at {}", webdriver_url);
        Ok(Self { driver })
    }

    pub async fn quit(self) -> Result<()> {
        self.driver.quit().await?;
        Ok(())
    }
}

impl PageDriver for WebDriverPage {
    async fn restore_session(&mut self, origin: &str, state: &SessionState) -> Result<()> {
        let Some(bytes) = state.bytes() else {
            return Ok(());
        };
        let cookies: Vec<Cookie> = match serde_json::from_slice(bytes) {
            Ok(cookies) => cookies,
            Err(e) => {
                tracing::warn!("Ignoring unreadable session state: {}", e);
                return Ok(());
            }
        };

        // Cookies can only be set for the domain currently loaded
        self.driver.goto(origin).await?;
        let total = cookies.len();
        for cookie in cookies {
            if let Err(e) = self.driver.add_cookie(cookie).await {
                tracing::debug!("Browser rejected a stored cookie: {}", e);
            }
        }
        tracing::debug!("Restored {} cookies for {}", total, origin);
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<()> {
        tracing::info!("Navigating to {}", url);
        self.driver
            .goto(url)
            .await
            .map_err(|e| HuntError::Browser(format!("Failed to navigate to {}: {}", url, e)))
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<bool> {
        let found = self
            .driver
            .query(By::Css(selector))
            .wait(timeout, POLL_INTERVAL)
            .exists()
            .await?;
        Ok(found)
    }

    async fn trigger_lazy_load(&mut self) -> Result<()> {
        self.driver
            .execute("window.scrollTo(0, document.body.scrollHeight);", Vec::new())
            .await?;
        Ok(())
    }

    async fn settle(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn page_source(&mut self) -> Result<String> {
        Ok(self.driver.source().await?)
    }

    async fn capture_session(&mut self) -> Result<SessionState> {
        let cookies = self.driver.get_all_cookies().await?;
        let bytes = serde_json::to_vec(&cookies)
            .map_err(|e| HuntError::Browser(format!("Failed to serialize cookies: {}", e)))?;
        Ok(SessionState::from_bytes(bytes))
    }
}
