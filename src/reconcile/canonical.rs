use std::collections::HashSet;
use std::fmt;
use tracing::debug;
use url::Url;

/// Case-insensitive identity of a package URL
///
/// Derived from the URL's absolute string form. The original [`Url`] is kept
/// separately for storage and display; only the key is compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the identity key used at every set and map boundary
pub fn canonicalize(url: &Url) -> CanonicalKey {
    CanonicalKey(url.as_str().to_lowercase())
}

/// Collapses URLs sharing a canonical key, keeping the first one seen
///
/// Order of the surviving representatives follows the input order.
pub fn dedup_canonical<I>(urls: I) -> Vec<Url>
where
    I: IntoIterator<Item = Url>,
{
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for url in urls {
        if seen.insert(canonicalize(&url)) {
            unique.push(url);
        } else {
            debug!("Dropping duplicate identity: {}", url);
        }
    }
    unique
}
