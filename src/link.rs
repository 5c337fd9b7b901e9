use url::Url;

use crate::error::{HuntError, Result};

/// Turns the hrefs found on a listing page into canonical absolute URLs,
/// which are the identity of a listing.
#[derive(Debug, Clone)]
pub struct LinkResolver {
    origin: Url,
    keep_query: bool,
}

impl LinkResolver {
    pub fn new(origin: &str, keep_query: bool) -> Result<Self> {
        let origin = Url::parse(origin)
            .map_err(|e| HuntError::Configuration(format!("Invalid origin '{}': {}", origin, e)))?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(HuntError::Configuration(format!(
                "Origin must be http or https, got '{}'",
                origin
            )));
        }
        Ok(Self { origin, keep_query })
    }

    /// Resolves `href` against the origin. Returns `None` for empty hrefs
    /// and for anything that does not land on an http(s) URL.
    pub fn canonicalize(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            return None;
        }

        let mut url = self.origin.join(href).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }

        // Listing sites append tracking parameters that change per visit
        url.set_fragment(None);
        if !self.keep_query {
            url.set_query(None);
        }

        Some(url.into())
    }
}

/// Scheme and host of a URL, used when no origin is configured explicitly.
pub fn origin_of(url: &str) -> Result<String> {
    let parsed = Url::parse(url)
        .map_err(|e| HuntError::Configuration(format!("Invalid URL '{}': {}", url, e)))?;
    match parsed.origin() {
        origin @ url::Origin::Tuple(..) => Ok(origin.ascii_serialization()),
        url::Origin::Opaque(_) => Err(HuntError::Configuration(format!(
            "URL '{}' has no host to derive an origin from",
            url
        ))),
    }
}
