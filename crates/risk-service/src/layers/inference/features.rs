//! Lexical features of a URL and its domain.
//!
//! Every feature is normalized into `[0, 1]` so rule weights and model weights
//! stay comparable across features.

use crate::layers::policy::domain_list::{ascii_domain, is_same_or_subdomain, normalize_domain};
use crate::layers::policy::lexicon::Lexicon;
use protocol::RiskRequest;
use std::collections::HashMap;
use std::net::IpAddr;
use url::{Host, Url};

pub(crate) const FEATURE_COUNT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Feature {
    UrlLength,
    DomainLength,
    SubdomainDepth,
    DigitRatio,
    HyphenCount,
    DomainEntropy,
    IpHost,
    AtSymbol,
    NotHttps,
    Unparseable,
    HostMismatch,
    RiskyTld,
    Shortener,
    Homograph,
    Typosquat,
    PhishingKeywords,
    SocialKeywords,
    MalwareExtension,
    BrandImpersonation,
    EncodedChars,
}

impl Feature {
    pub(crate) const ALL: [Feature; FEATURE_COUNT] = [
        Feature::UrlLength,
        Feature::DomainLength,
        Feature::SubdomainDepth,
        Feature::DigitRatio,
        Feature::HyphenCount,
        Feature::DomainEntropy,
        Feature::IpHost,
        Feature::AtSymbol,
        Feature::NotHttps,
        Feature::Unparseable,
        Feature::HostMismatch,
        Feature::RiskyTld,
        Feature::Shortener,
        Feature::Homograph,
        Feature::Typosquat,
        Feature::PhishingKeywords,
        Feature::SocialKeywords,
        Feature::MalwareExtension,
        Feature::BrandImpersonation,
        Feature::EncodedChars,
    ];

    pub(crate) fn name(self) -> &'static str {
        match self {
            Feature::UrlLength => "url_length",
            Feature::DomainLength => "domain_length",
            Feature::SubdomainDepth => "subdomain_depth",
            Feature::DigitRatio => "digit_ratio",
            Feature::HyphenCount => "hyphen_count",
            Feature::DomainEntropy => "domain_entropy",
            Feature::IpHost => "ip_host",
            Feature::AtSymbol => "at_symbol",
            Feature::NotHttps => "not_https",
            Feature::Unparseable => "unparseable",
            Feature::HostMismatch => "host_mismatch",
            Feature::RiskyTld => "risky_tld",
            Feature::Shortener => "shortener",
            Feature::Homograph => "homograph",
            Feature::Typosquat => "typosquat",
            Feature::PhishingKeywords => "phishing_keywords",
            Feature::SocialKeywords => "social_keywords",
            Feature::MalwareExtension => "malware_extension",
            Feature::BrandImpersonation => "brand_impersonation",
            Feature::EncodedChars => "encoded_chars",
        }
    }

    pub(crate) fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|feature| feature.name() == name)
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Features {
    values: [f64; FEATURE_COUNT],
}

impl Features {
    pub(crate) fn extract(request: &RiskRequest, lexicon: &Lexicon) -> Self {
        let mut features = Self {
            values: [0.0; FEATURE_COUNT],
        };
        let domain = normalize_domain(&request.domain);
        // Hosts from the URL parser are punycode; compare like with like.
        let ascii = ascii_domain(&domain);
        let raw_url = request.url.trim();
        let url_lower = raw_url.to_lowercase();

        features.set(Feature::UrlLength, ratio(raw_url.chars().count() as f64, 100.0));
        features.set(Feature::DomainLength, ratio(domain.chars().count() as f64, 40.0));
        let dots = domain.matches('.').count();
        features.set(
            Feature::SubdomainDepth,
            ratio(dots.saturating_sub(2) as f64, 3.0),
        );
        features.set(Feature::DigitRatio, digit_ratio(&domain));
        features.set(
            Feature::HyphenCount,
            ratio(domain.matches('-').count() as f64, 4.0),
        );
        features.set(Feature::DomainEntropy, ratio(shannon_entropy(&domain), 4.5));
        features.set_flag(Feature::AtSymbol, raw_url.contains('@'));
        features.set(
            Feature::EncodedChars,
            ratio(raw_url.matches('%').count() as f64, 10.0),
        );

        let mut ip_host = ascii.parse::<IpAddr>().is_ok();
        match parse_url(raw_url) {
            Some(parsed) => {
                features.set_flag(Feature::NotHttps, parsed.scheme() != "https");
                match parsed.host() {
                    Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => ip_host = true,
                    Some(Host::Domain(host)) => {
                        let host = normalize_domain(host);
                        features.set_flag(
                            Feature::HostMismatch,
                            !is_same_or_subdomain(&host, &ascii),
                        );
                    }
                    None => features.set_flag(Feature::Unparseable, true),
                }
                let path = parsed.path().to_lowercase();
                features.set_flag(
                    Feature::MalwareExtension,
                    lexicon.has_malware_extension(&path),
                );
            }
            None => {
                features.set_flag(Feature::Unparseable, true);
                features.set_flag(Feature::NotHttps, !url_lower.starts_with("https://"));
            }
        }
        features.set_flag(Feature::IpHost, ip_host);

        features.set_flag(Feature::RiskyTld, lexicon.has_risky_tld(&domain));
        features.set_flag(Feature::Shortener, lexicon.is_shortener(&ascii));
        features.set_flag(Feature::Homograph, is_homograph(&domain));
        features.set_flag(Feature::Typosquat, lexicon.is_typosquat(&domain));
        features.set(
            Feature::PhishingKeywords,
            ratio(lexicon.phishing_keyword_hits(&url_lower) as f64, 3.0),
        );
        features.set(
            Feature::SocialKeywords,
            ratio(lexicon.social_keyword_hits(&url_lower) as f64, 3.0),
        );
        features.set_flag(
            Feature::BrandImpersonation,
            lexicon.impersonates_brand(&domain),
        );
        features
    }

    pub(crate) fn get(&self, feature: Feature) -> f64 {
        self.values[feature.index()]
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (Feature, f64)> + '_ {
        Feature::ALL
            .iter()
            .map(move |feature| (*feature, self.get(*feature)))
    }

    /// Name/value view for diagnostics.
    pub(crate) fn named(&self) -> HashMap<&'static str, f64> {
        self.iter()
            .map(|(feature, value)| (feature.name(), value))
            .collect()
    }

    fn set(&mut self, feature: Feature, value: f64) {
        self.values[feature.index()] = value;
    }

    fn set_flag(&mut self, feature: Feature, flag: bool) {
        self.set(feature, if flag { 1.0 } else { 0.0 });
    }
}

/// Scheme-less input (`example.com/login`) is read as plain http.
fn parse_url(raw: &str) -> Option<Url> {
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(&format!("http://{raw}")).ok(),
        Err(_) => None,
    }
}

fn ratio(value: f64, scale: f64) -> f64 {
    (value / scale).clamp(0.0, 1.0)
}

fn digit_ratio(domain: &str) -> f64 {
    let total = domain.chars().count();
    if total == 0 {
        return 0.0;
    }
    let digits = domain.chars().filter(|c| c.is_ascii_digit()).count();
    digits as f64 / total as f64
}

fn shannon_entropy(text: &str) -> f64 {
    let mut counts: HashMap<char, usize> = HashMap::new();
    for ch in text.chars() {
        *counts.entry(ch).or_insert(0) += 1;
    }
    let total = text.chars().count() as f64;
    if total == 0.0 {
        return 0.0;
    }
    counts
        .values()
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum()
}

fn is_homograph(domain: &str) -> bool {
    if domain.split('.').any(|label| label.starts_with("xn--")) {
        return true;
    }
    let has_latin = domain.chars().any(|c| c.is_ascii_alphabetic());
    let has_cyrillic = domain.chars().any(|c| ('\u{0400}'..='\u{04FF}').contains(&c));
    let has_greek = domain.chars().any(|c| ('\u{0370}'..='\u{03FF}').contains(&c));
    has_latin && (has_cyrillic || has_greek)
}
