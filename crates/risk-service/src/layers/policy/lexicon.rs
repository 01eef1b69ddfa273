use super::config::RulesConfig;
use super::domain_list::{ascii_domain, is_same_or_subdomain};
use regex::Regex;

/// Compiled lexical vocabulary shared by the rule-based and model backends.
#[derive(Debug, Clone)]
pub(crate) struct Lexicon {
    risky_tlds: Vec<String>,
    shorteners: Vec<String>,
    phishing_keywords: Vec<String>,
    social_keywords: Vec<String>,
    typosquat_patterns: Vec<String>,
    malware_extensions: Vec<String>,
    brand_patterns: Vec<Regex>,
}

impl Lexicon {
    pub(crate) fn from_config(config: &RulesConfig) -> anyhow::Result<Self> {
        let mut brand_patterns = Vec::with_capacity(config.brand_patterns.len());
        for pattern in &config.brand_patterns {
            let regex = Regex::new(pattern)
                .map_err(|err| anyhow::anyhow!("invalid brand pattern {pattern}: {err}"))?;
            brand_patterns.push(regex);
        }
        Ok(Self {
            risky_tlds: lowercase_all(&config.risky_tlds)
                .into_iter()
                .map(|tld| dotted_suffix(&tld))
                .filter(|tld| tld.len() > 1)
                .collect(),
            shorteners: config
                .shorteners
                .iter()
                .map(|value| ascii_domain(value))
                .filter(|value| !value.is_empty())
                .collect(),
            phishing_keywords: lowercase_all(&config.phishing_keywords),
            social_keywords: lowercase_all(&config.social_keywords),
            typosquat_patterns: lowercase_all(&config.typosquat_patterns),
            malware_extensions: lowercase_all(&config.malware_extensions),
            brand_patterns,
        })
    }

    pub(crate) fn has_risky_tld(&self, domain: &str) -> bool {
        self.risky_tlds.iter().any(|tld| domain.ends_with(tld.as_str()))
    }

    /// Expects the ASCII form of the domain.
    pub(crate) fn is_shortener(&self, domain: &str) -> bool {
        self.shorteners
            .iter()
            .any(|shortener| is_same_or_subdomain(domain, shortener))
    }

    pub(crate) fn phishing_keyword_hits(&self, text: &str) -> usize {
        count_hits(&self.phishing_keywords, text)
    }

    pub(crate) fn social_keyword_hits(&self, text: &str) -> usize {
        count_hits(&self.social_keywords, text)
    }

    pub(crate) fn is_typosquat(&self, domain: &str) -> bool {
        self.typosquat_patterns
            .iter()
            .any(|pattern| domain.contains(pattern.as_str()))
    }

    pub(crate) fn has_malware_extension(&self, path: &str) -> bool {
        self.malware_extensions
            .iter()
            .any(|extension| path.ends_with(extension.as_str()))
    }

    pub(crate) fn impersonates_brand(&self, domain: &str) -> bool {
        self.brand_patterns
            .iter()
            .any(|pattern| pattern.is_match(domain))
    }
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty())
        .collect()
}

/// A TLD entry only ever matches whole labels.
fn dotted_suffix(tld: &str) -> String {
    format!(".{}", tld.trim_start_matches('.'))
}

fn count_hits(keywords: &[String], text: &str) -> usize {
    keywords
        .iter()
        .filter(|keyword| text.contains(keyword.as_str()))
        .count()
}
