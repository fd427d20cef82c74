//! Domain rule record

use crate::status::{DomainKind, DomainStatus};
use serde::{Deserialize, Serialize};

/// A persisted domain rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRule {
    /// Domain name, suffix or glob, normalised for its kind
    pub domain: String,
    /// Which index the rule lives in
    pub kind: DomainKind,
    /// Policy applied on match
    pub status: DomainStatus,
    /// Creation time, milliseconds since the Unix epoch
    pub created_at: u64,
    /// Last modification time, milliseconds since the Unix epoch
    pub modified_at: u64,
}

impl DomainRule {
    /// Create a rule stamped with the current time
    pub fn new(domain: &str, kind: DomainKind, status: DomainStatus) -> Self {
        let now = crate::now_millis();
        Self {
            domain: normalize_for_kind(domain, kind),
            kind,
            status,
            created_at: now,
            modified_at: now,
        }
    }

    /// Same rule with a new status, keeping the creation time
    pub fn with_status(&self, status: DomainStatus) -> Self {
        Self {
            status,
            modified_at: crate::now_millis(),
            ..self.clone()
        }
    }
}

/// Canonical form used for index keys: trimmed, ASCII-lowercased, without
/// a trailing root dot
pub fn normalize_domain(domain: &str) -> String {
    let domain = domain.trim();
    let domain = domain.strip_suffix('.').unwrap_or(domain);
    domain.to_ascii_lowercase()
}

pub(crate) fn normalize_for_kind(domain: &str, kind: DomainKind) -> String {
    let domain = normalize_domain(domain);
    match kind {
        // "*.ru" and ".ru" both name the suffix "ru"
        DomainKind::Tld => domain
            .trim_start_matches("*.")
            .trim_start_matches('.')
            .to_string(),
        DomainKind::Exact | DomainKind::Wildcard => domain,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_domain() {
        assert_eq!(normalize_domain("  Example.COM. "), "example.com");
        assert_eq!(normalize_domain("example.com"), "example.com");
    }

    #[test]
    fn test_tld_rule_normalised() {
        let rule = DomainRule::new("*.RU", DomainKind::Tld, DomainStatus::Block);
        assert_eq!(rule.domain, "ru");

        let rule = DomainRule::new(".co.uk", DomainKind::Tld, DomainStatus::Block);
        assert_eq!(rule.domain, "co.uk");
    }

    #[test]
    fn test_wildcard_rule_keeps_star() {
        let rule = DomainRule::new("*.Ads.Example.com", DomainKind::Wildcard, DomainStatus::Block);
        assert_eq!(rule.domain, "*.ads.example.com");
    }

    #[test]
    fn test_with_status_keeps_created_at() {
        let rule = DomainRule::new("a.com", DomainKind::Exact, DomainStatus::Block);
        let updated = rule.with_status(DomainStatus::Whitelist);
        assert_eq!(updated.created_at, rule.created_at);
        assert_eq!(updated.status, DomainStatus::Whitelist);
        assert!(updated.modified_at >= rule.modified_at);
    }
}
