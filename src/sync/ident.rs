use std::fmt;

/// Stable catalog identifier for one ebook.
///
/// The OPDS feed publishes identifiers in the form
/// `url:https://standardebooks.org/ebooks/<author>/<title>`; the wrapped URL is
/// also the resolvable page for the book, which the deprecation check probes.
/// The prefix is handled only here, never at call sites.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EbookId(String);

const URL_PREFIX: &str = "url:";

impl EbookId {
    /// Decode a `url:`-prefixed catalog identifier.
    pub fn decode(raw: &str) -> Option<Self> {
        let url = raw.trim().strip_prefix(URL_PREFIX)?;
        if url.is_empty() {
            return None;
        }
        Some(Self::from_url(url))
    }

    /// Wrap a bare URL (e.g. a redirect target) back into identifier form.
    pub fn from_url(url: &str) -> Self {
        Self(url.trim().trim_end_matches('/').to_string())
    }

    /// The catalog's own `url:`-prefixed spelling of this identifier.
    pub fn encode(&self) -> String {
        format!("{URL_PREFIX}{}", self.0)
    }

    /// The resolvable URL form, suitable for an HTTP request.
    pub fn url(&self) -> &str {
        &self.0
    }

    pub fn is_standard_ebooks(&self) -> bool {
        self.0.contains("standardebooks.org")
    }

    /// The canonical slug derived from the URL path after `/ebooks/`,
    /// path separators flattened to underscores.
    pub fn slug(&self) -> Option<String> {
        let rest = self.0.split_once("/ebooks/")?.1;
        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return None;
        }
        Some(segments.join("_"))
    }
}

impl fmt::Display for EbookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
