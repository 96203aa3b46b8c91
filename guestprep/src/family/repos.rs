//! Repositories already configured in a guest, and when they conflict
//! with requested ones.

use crate::request::Repository;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShippedRepository {
    /// Identifier passed to the family's remove command.
    pub id: String,
    pub alias: String,
    pub url: String,
}

impl ShippedRepository {
    /// Whether this repository must be removed before `requested` are added.
    ///
    /// Conflicts on same scheme and source, on alias equal to a requested
    /// name, or when the repository points at installation media.
    pub fn conflicts_with(&self, requested: &[Repository], media_schemes: &[&str]) -> bool {
        if let Some(scheme) = scheme_of(&self.url)
            && media_schemes.iter().any(|m| m.eq_ignore_ascii_case(scheme))
        {
            return true;
        }

        requested
            .iter()
            .any(|repo| repo.name == self.alias || same_source(&repo.url, &self.url))
    }
}

fn scheme_of(url: &str) -> Option<&str> {
    url.split_once(':').map(|(scheme, _)| scheme.trim())
}

fn same_source(a: &str, b: &str) -> bool {
    match (Url::parse(a.trim()), Url::parse(b.trim())) {
        (Ok(a), Ok(b)) => {
            a.scheme() == b.scheme()
                && a.host_str() == b.host_str()
                && a.port_or_known_default() == b.port_or_known_default()
                && a.path().trim_end_matches('/') == b.path().trim_end_matches('/')
        }
        _ => a.trim().trim_end_matches('/') == b.trim().trim_end_matches('/'),
    }
}
