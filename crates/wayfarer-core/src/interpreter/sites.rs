//! Per-host knowledge for the site-aware actions.
//!
//! Two job boards get dedicated handling; everything else degrades to
//! generic heuristics. Selector sets here mirror what the boards actually
//! serve and are expected to drift; keep them in one place.

use url::Url;

use crate::interpreter::payload::SearchPayload;

/// Hosts with dedicated search, parse and apply handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KnownHost {
    LinkedIn,
    Indeed,
}

/// Field selectors for structured job extraction on a known host.
pub(crate) struct ParseFields {
    pub container: &'static str,
    pub title: &'static str,
    pub company: &'static str,
    pub location: &'static str,
    pub link: &'static str,
}

impl KnownHost {
    pub fn from_host(host: &str) -> Option<Self> {
        let host = host.to_ascii_lowercase();
        if host == "linkedin.com" || host.ends_with(".linkedin.com") {
            Some(Self::LinkedIn)
        } else if host == "indeed.com" || host.ends_with(".indeed.com") {
            Some(Self::Indeed)
        } else {
            None
        }
    }

    /// Direct search-results URL for this board.
    pub fn search_url(&self, payload: &SearchPayload) -> String {
        let (base, query_key, location_key) = match self {
            Self::LinkedIn => (
                "https://www.linkedin.com/jobs/search/",
                "keywords",
                "location",
            ),
            Self::Indeed => ("https://www.indeed.com/jobs", "q", "l"),
        };

        let mut url = match Url::parse(base) {
            Ok(url) => url,
            // Bases above are static and valid; this arm is unreachable.
            Err(_) => return base.to_string(),
        };
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair(query_key, &payload.query);
            if let Some(location) = &payload.location {
                pairs.append_pair(location_key, location);
            }
        }
        url.into()
    }

    pub fn parse_fields(&self) -> ParseFields {
        match self {
            Self::LinkedIn => ParseFields {
                container: ".job-card-container",
                title: ".job-card-list__title",
                company: ".job-card-container__company-name",
                location: ".job-card-container__metadata-item",
                link: "a.job-card-list__title, a.job-card-container__link",
            },
            Self::Indeed => ParseFields {
                container: ".job_seen_beacon",
                title: "h2.jobTitle",
                company: "[data-testid='company-name']",
                location: "[data-testid='text-location']",
                link: "h2.jobTitle a",
            },
        }
    }

    /// Selector for the board's apply control. Unknown hosts have no
    /// fallback; apply fails explicitly there.
    pub fn apply_selector(&self) -> &'static str {
        match self {
            Self::LinkedIn => ".jobs-apply-button",
            Self::Indeed => "#indeedApplyButton",
        }
    }
}

/// Candidate selectors for a generic on-page search input, tried in order.
pub(crate) const SEARCH_INPUT_SELECTORS: &[&str] = &[
    "input[type='search']",
    "input[name='q']",
    "input[name='query']",
    "input[name='search']",
    "input[placeholder*='search']",
];

/// Last-resort: a site-scoped external web search for the query.
pub(crate) fn external_search_url(host: &str, query: &str) -> String {
    let mut url = match Url::parse("https://www.google.com/search") {
        Ok(url) => url,
        Err(_) => return "https://www.google.com/search".to_string(),
    };
    let scoped = if host.is_empty() {
        query.to_string()
    } else {
        format!("site:{host} {query}")
    };
    url.query_pairs_mut().append_pair("q", &scoped);
    url.into()
}

/// Host component of a URL string, or empty if unparseable.
pub(crate) fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_recognition_includes_subdomains() {
        assert_eq!(KnownHost::from_host("www.linkedin.com"), Some(KnownHost::LinkedIn));
        assert_eq!(KnownHost::from_host("indeed.com"), Some(KnownHost::Indeed));
        assert_eq!(KnownHost::from_host("de.indeed.com"), Some(KnownHost::Indeed));
        assert_eq!(KnownHost::from_host("jobs.example.com"), None);
        // Suffix match must not swallow look-alike domains.
        assert_eq!(KnownHost::from_host("notlinkedin.com"), None);
    }

    #[test]
    fn test_search_url_encodes_query_and_location() {
        let payload = SearchPayload {
            query: "rust engineer".to_string(),
            location: Some("New York".to_string()),
        };
        let url = KnownHost::LinkedIn.search_url(&payload);
        assert!(url.starts_with("https://www.linkedin.com/jobs/search/?"));
        assert!(url.contains("keywords=rust+engineer"));
        assert!(url.contains("location=New+York"));

        let url = KnownHost::Indeed.search_url(&payload);
        assert!(url.contains("q=rust+engineer"));
        assert!(url.contains("l=New+York"));
    }

    #[test]
    fn test_external_search_url_is_site_scoped() {
        let url = external_search_url("jobs.example.com", "backend developer");
        assert!(url.starts_with("https://www.google.com/search?q="));
        assert!(url.contains("site%3Ajobs.example.com"));
    }

    #[test]
    fn test_host_of_handles_garbage() {
        assert_eq!(host_of("https://www.example.com/jobs"), "www.example.com");
        assert_eq!(host_of("not a url"), "");
    }
}
