use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::db::Database;
use crate::error::{HuntError, Result};
use crate::extract::{builtin_profiles, ProfileSpec};
use crate::link::origin_of;
use crate::triage::Keywords;

/// Config file contents. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    search_url: Option<String>,
    origin: Option<String>,
    session_path: Option<PathBuf>,
    db_path: Option<PathBuf>,
    include_keywords: Vec<String>,
    exclude_keywords: Vec<String>,
    webdriver_url: Option<String>,
    headless: Option<bool>,
    wait_timeout_secs: Option<u64>,
    settle_millis: Option<u64>,
    login_url: Option<String>,
    login_wait_secs: Option<u64>,
    keep_query: bool,
    snapshot_dir: Option<PathBuf>,
    profiles: Vec<ProfileSpec>,
}

/// Values supplied on the command line or through the environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub search_url: Option<String>,
    pub db_path: Option<PathBuf>,
    pub webdriver_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    search_url: Option<String>,
    origin: Option<String>,
    pub session_path: PathBuf,
    pub db_path: PathBuf,
    pub keywords: Keywords,
    pub webdriver_url: String,
    pub headless: bool,
    pub wait_timeout: Duration,
    /// How long to let lazily loaded cards render after scrolling.
    pub settle: Duration,
    pub login_url: String,
    pub login_wait: Duration,
    pub keep_query: bool,
    pub snapshot_dir: Option<PathBuf>,
    pub profiles: Vec<ProfileSpec>,
}

impl Config {
    /// Loads `path`, or the default config file when `path` is `None`.
    /// Only an explicitly named file has to exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => read_file(path)?,
            None => {
                let default = default_config_path();
                if default.exists() {
                    read_file(&default)?
                } else {
                    FileConfig::default()
                }
            }
        };
        Ok(Self::from_file(file))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let file: FileConfig = toml::from_str(text)
            .map_err(|e| HuntError::Configuration(format!("Invalid config: {}", e)))?;
        Ok(Self::from_file(file))
    }

    fn from_file(file: FileConfig) -> Self {
        let profiles = if file.profiles.is_empty() {
            builtin_profiles()
        } else {
            file.profiles
        };

        Self {
            search_url: file.search_url.filter(|s| !s.trim().is_empty()),
            origin: file.origin,
            session_path: file.session_path.unwrap_or_else(default_session_path),
            db_path: file.db_path.unwrap_or_else(Database::default_path),
            keywords: Keywords::new(file.include_keywords, file.exclude_keywords),
            webdriver_url: file
                .webdriver_url
                .unwrap_or_else(|| "http://localhost:9515".to_string()),
            headless: file.headless.unwrap_or(true),
            wait_timeout: Duration::from_secs(file.wait_timeout_secs.unwrap_or(15)),
            settle: Duration::from_millis(file.settle_millis.unwrap_or(2000)),
            login_url: file
                .login_url
                .unwrap_or_else(|| "https://www.linkedin.com/login".to_string()),
            login_wait: Duration::from_secs(file.login_wait_secs.unwrap_or(120)),
            keep_query: file.keep_query,
            snapshot_dir: file.snapshot_dir,
            profiles,
        }
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(url) = overrides.search_url.filter(|s| !s.trim().is_empty()) {
            self.search_url = Some(url);
        }
        if let Some(path) = overrides.db_path {
            self.db_path = path;
        }
        if let Some(url) = overrides.webdriver_url {
            self.webdriver_url = url;
        }
    }

    /// Keyword sets for one filter run. Each non-empty list given here
    /// replaces its configured counterpart; an empty one keeps it.
    pub fn keywords_with(&self, include: Vec<String>, exclude: Vec<String>) -> Keywords {
        let include = if include.is_empty() {
            self.keywords.include().to_vec()
        } else {
            include
        };
        let exclude = if exclude.is_empty() {
            self.keywords.exclude().to_vec()
        } else {
            exclude
        };
        Keywords::new(include, exclude)
    }

    /// The listing page to fetch. Fetching without one is a fatal error.
    pub fn search_url(&self) -> Result<&str> {
        self.search_url.as_deref().ok_or_else(|| {
            HuntError::Configuration(
                "search_url is not set (config file or TRAWL_SEARCH_URL)".to_string(),
            )
        })
    }

    /// Origin used to resolve relative links: the configured one, or the
    /// scheme and host of the search URL.
    pub fn origin(&self) -> Result<String> {
        match &self.origin {
            Some(origin) => Ok(origin.clone()),
            None => origin_of(self.search_url()?),
        }
    }
}

fn read_file(path: &Path) -> Result<FileConfig> {
    let text = fs::read_to_string(path).map_err(|e| {
        HuntError::Configuration(format!("Cannot read config {}: {}", path.display(), e))
    })?;
    toml::from_str(&text).map_err(|e| {
        HuntError::Configuration(format!("Invalid config {}: {}", path.display(), e))
    })
}

pub fn default_config_path() -> PathBuf {
    match directories::ProjectDirs::from("", "", "trawl") {
        Some(dirs) => dirs.config_dir().join("config.toml"),
        None => PathBuf::from("trawl.toml"),
    }
}

fn default_session_path() -> PathBuf {
    match directories::ProjectDirs::from("", "", "trawl") {
        Some(dirs) => dirs.data_dir().join("session.json"),
        None => PathBuf::from("session.json"),
    }
}
