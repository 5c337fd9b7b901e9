use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that abort a command. Per-card gaps, profile fallthrough and
/// duplicate links are not errors; they only show up in result counts.
#[derive(Error, Debug)]
pub enum HuntError {
    /// Required configuration is missing or malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A profile rule is not a valid CSS selector.
    #[error("Profile '{profile}': invalid {field} selector '{selector}'")]
    Selector {
        profile: String,
        field: &'static str,
        selector: String,
    },

    /// The listing container never appeared on the page.
    #[error("Listing container '{selector}' did not appear within {}s", .waited.as_secs())]
    NavigationTimeout { selector: String, waited: Duration },

    /// The browser automation runtime failed.
    #[error("Browser error: {0}")]
    Browser(String),

    /// Session state could not be read or written.
    #[error("Session file {}: {source}", .path.display())]
    Session {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HuntError {
    /// True for failures that should be re-run later rather than fixed in config.
    pub fn is_transient(&self) -> bool {
        matches!(self, HuntError::NavigationTimeout { .. } | HuntError::Browser(_))
    }
}

impl From<thirtyfour::error::WebDriverError> for HuntError {
    fn from(err: thirtyfour::error::WebDriverError) -> Self {
        HuntError::Browser(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HuntError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_timeout_message() {
        let err = HuntError::NavigationTimeout {
            selector: "ul.jobs".to_string(),
            waited: Duration::from_secs(15),
        };
        assert_eq!(
            err.to_string(),
            "Listing container 'ul.jobs' did not appear within 15s"
        );
        assert!(err.is_transient());
    }

    #[test]
    fn test_configuration_is_not_transient() {
        let err = HuntError::Configuration("search_url is not set".to_string());
        assert!(!err.is_transient());
        assert!(err.to_string().contains("search_url"));
    }
}
