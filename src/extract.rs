use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::error::{HuntError, Result};
use crate::link::LinkResolver;
use crate::models::RawListing;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Selector rules for one known markup schema, as written in config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSpec {
    pub name: String,
    /// Element wrapping the whole result list; used for the presence wait.
    pub container: String,
    /// One match per listing card.
    pub card: String,
    pub title: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// Element carrying the detail href. When absent the card itself must
    /// carry it.
    #[serde(default)]
    pub link: Option<String>,
}

/// A compiled, immutable [`ProfileSpec`].
#[derive(Debug, Clone)]
pub struct ExtractionProfile {
    name: String,
    container: String,
    card: Selector,
    title: Selector,
    company: Option<Selector>,
    location: Option<Selector>,
    link: Option<Selector>,
}

impl ExtractionProfile {
    pub fn compile(spec: &ProfileSpec) -> Result<Self> {
        let parse = |field: &'static str, selector: &str| {
            Selector::parse(selector).map_err(|_| HuntError::Selector {
                profile: spec.name.clone(),
                field,
                selector: selector.to_string(),
            })
        };

        // Validated here so the presence wait never receives a bad selector
        parse("container", &spec.container)?;

        Ok(Self {
            name: spec.name.clone(),
            container: spec.container.clone(),
            card: parse("card", &spec.card)?,
            title: parse("title", &spec.title)?,
            company: spec.company.as_deref().map(|s| parse("company", s)).transpose()?,
            location: spec.location.as_deref().map(|s| parse("location", s)).transpose()?,
            link: spec.link.as_deref().map(|s| parse("link", s)).transpose()?,
        })
    }

    pub fn container(&self) -> &str {
        &self.container
    }
}

/// Known schemas of the listing site, most recent first.
pub fn builtin_profiles() -> Vec<ProfileSpec> {
    vec![
        ProfileSpec {
            name: "scaffold-2024".to_string(),
            container: "div.scaffold-layout__list".to_string(),
            card: "li.scaffold-layout__list-item".to_string(),
            title: "a.job-card-container__link strong".to_string(),
            company: Some(".artdeco-entity-lockup__subtitle".to_string()),
            location: Some(".job-card-container__metadata-wrapper li".to_string()),
            link: Some("a.job-card-container__link".to_string()),
        },
        ProfileSpec {
            name: "results-list-legacy".to_string(),
            container: "ul.jobs-search-results__list".to_string(),
            card: "li.jobs-search-results__list-item".to_string(),
            title: "a.job-card-list__title".to_string(),
            company: Some(
                ".job-card-container__primary-description, .job-card-container__company-name"
                    .to_string(),
            ),
            location: Some(".job-card-container__metadata-item".to_string()),
            link: Some("a.job-card-list__title".to_string()),
        },
        ProfileSpec {
            name: "guest-search".to_string(),
            container: "ul.jobs-search__results-list".to_string(),
            card: "ul.jobs-search__results-list > li".to_string(),
            title: "h3.base-search-card__title".to_string(),
            company: Some("h4.base-search-card__subtitle".to_string()),
            location: Some("span.job-search-card__location".to_string()),
            link: Some("a.base-card__full-link".to_string()),
        },
    ]
}

/// Result of one extraction pass over a page.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Profile adopted for the page, `None` when no profile matched.
    pub profile: Option<String>,
    pub listings: Vec<RawListing>,
    /// Cards of the adopted profile dropped for lacking a title or link.
    pub skipped_cards: usize,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }
}

pub struct Extractor {
    profiles: Vec<ExtractionProfile>,
    links: LinkResolver,
}

impl Extractor {
    pub fn new(specs: &[ProfileSpec], links: LinkResolver) -> Result<Self> {
        if specs.is_empty() {
            return Err(HuntError::Configuration(
                "At least one extraction profile is required".to_string(),
            ));
        }
        let profiles = specs
            .iter()
            .map(ExtractionProfile::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { profiles, links })
    }

    pub fn profiles(&self) -> &[ExtractionProfile] {
        &self.profiles
    }

    /// Selector list matching the container of any profile.
    pub fn container_selector(&self) -> String {
        self.profiles
            .iter()
            .map(|p| p.container())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Applies the profiles in order and adopts the first one that yields a
    /// fully resolved card. Profiles are never mixed within a page.
    pub fn extract(&self, document: &Html) -> Extraction {
        for profile in &self.profiles {
            let cards: Vec<ElementRef> = document.select(&profile.card).collect();
            if cards.is_empty() {
                tracing::debug!("Profile '{}' matched no cards", profile.name);
                continue;
            }

            let mut listings = Vec::with_capacity(cards.len());
            let mut skipped = 0;
            for (index, card) in cards.iter().enumerate() {
                match self.extract_card(profile, *card) {
                    Some(listing) => listings.push(listing),
                    None => {
                        tracing::debug!(
                            "Profile '{}': card {} has no title or link, skipping",
                            profile.name,
                            index
                        );
                        skipped += 1;
                    }
                }
            }

            if listings.is_empty() {
                tracing::debug!(
                    "Profile '{}' matched {} cards but none resolved",
                    profile.name,
                    cards.len()
                );
                continue;
            }

            tracing::info!(
                "Adopted profile '{}': {} listings, {} cards skipped",
                profile.name,
                listings.len(),
                skipped
            );
            return Extraction {
                profile: Some(profile.name.clone()),
                listings,
                skipped_cards: skipped,
            };
        }

        Extraction::default()
    }

    fn extract_card(&self, profile: &ExtractionProfile, card: ElementRef) -> Option<RawListing> {
        let title = first_text(card, &profile.title).filter(|t| !t.is_empty())?;

        let href = match &profile.link {
            Some(selector) => card
                .select(selector)
                .find_map(|el| el.value().attr("href")),
            None => card.value().attr("href"),
        }?;
        let link = self.links.canonicalize(href)?;

        let optional = |selector: &Option<Selector>| {
            selector
                .as_ref()
                .and_then(|s| first_text(card, s))
                .unwrap_or_default()
        };

        Some(RawListing {
            title,
            company: optional(&profile.company),
            location: optional(&profile.location),
            link,
        })
    }
}

fn first_text(scope: ElementRef, selector: &Selector) -> Option<String> {
    scope.select(selector).next().map(|el| normalize_text(&el.text().collect::<String>()))
}

/// Collapses runs of whitespace and trims.
pub fn normalize_text(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}
