use super::config::RulesConfig;
use std::collections::HashSet;
use url::Host;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ListVerdict {
    Denied(String),
    Allowed(String),
    Unlisted,
}

/// Operator-maintained allow and deny lists. An entry covers the domain itself and
/// every subdomain of it.
#[derive(Debug, Clone, Default)]
pub(crate) struct DomainList {
    allowed: HashSet<String>,
    denied: HashSet<String>,
}

impl DomainList {
    pub(crate) fn from_config(config: &RulesConfig) -> Self {
        Self {
            allowed: normalize_all(&config.allowed_domains),
            denied: normalize_all(&config.denied_domains),
        }
    }

    /// Deny entries win over allow entries.
    pub(crate) fn verdict(&self, domain: &str) -> ListVerdict {
        let domain = ascii_domain(domain);
        if let Some(entry) = find(&self.denied, &domain) {
            return ListVerdict::Denied(entry.to_string());
        }
        if let Some(entry) = find(&self.allowed, &domain) {
            return ListVerdict::Allowed(entry.to_string());
        }
        ListVerdict::Unlisted
    }
}

fn find<'a>(entries: &'a HashSet<String>, domain: &str) -> Option<&'a str> {
    parent_domains(domain).find_map(|candidate| entries.get(candidate).map(String::as_str))
}

pub(crate) fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// ASCII (punycode) form of a normalized domain, as the URL parser reports hosts.
/// Input the IDNA rules reject is kept as normalized.
pub(crate) fn ascii_domain(domain: &str) -> String {
    let domain = normalize_domain(domain);
    match Host::parse(&domain) {
        Ok(Host::Domain(ascii)) => ascii,
        Ok(host) => host.to_string(),
        Err(_) => domain,
    }
}

/// `a.b.example.com`, `b.example.com`, `example.com`, `com`.
pub(crate) fn parent_domains(domain: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(Some(domain), |current| {
        current.split_once('.').map(|(_, rest)| rest)
    })
    .filter(|candidate| !candidate.is_empty())
}

/// True when `host` is `domain` or one of its subdomains.
pub(crate) fn is_same_or_subdomain(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn normalize_all(values: &[String]) -> HashSet<String> {
    values
        .iter()
        .map(|value| ascii_domain(value))
        .filter(|value| !value.is_empty())
        .collect()
}
