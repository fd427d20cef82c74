//! IP rule record

use super::host::HostSpecifier;
use crate::status::IpRuleStatus;
use serde::{Deserialize, Serialize};

/// A persisted per-app IP rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRule {
    /// App identity the rule is scoped to
    pub uid: i32,
    /// Address or range, with optional port
    pub host: HostSpecifier,
    /// Policy applied on match
    pub status: IpRuleStatus,
    /// Last modification time, milliseconds since the Unix epoch
    pub modified_at: u64,
}

impl IpRule {
    /// Create a rule stamped with the current time
    pub fn new(uid: i32, host: HostSpecifier, status: IpRuleStatus) -> Self {
        Self {
            uid,
            host,
            status,
            modified_at: crate::now_millis(),
        }
    }

    /// Key of the rule in the exact index
    pub(crate) fn key(&self) -> (HostSpecifier, i32) {
        (self.host, self.uid)
    }

    /// Whether this rule applies to a connection by `uid` to `addr:port`
    ///
    /// Port-less rules match every port.
    pub(crate) fn covers(&self, uid: i32, addr: std::net::IpAddr, port: Option<u16>) -> bool {
        self.uid == uid
            && self.host.contains(addr)
            && self.host.port().map_or(true, |p| Some(p) == port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_covers_checks_uid_and_port() {
        let host = HostSpecifier::parse("10.0.0.0/8", Some(443)).unwrap();
        let rule = IpRule::new(7, host, IpRuleStatus::Block);
        let addr = "10.9.9.9".parse().unwrap();

        assert!(rule.covers(7, addr, Some(443)));
        assert!(!rule.covers(7, addr, Some(80)));
        assert!(!rule.covers(7, addr, None));
        assert!(!rule.covers(8, addr, Some(443)));
    }

    #[test]
    fn test_portless_rule_covers_all_ports() {
        let host = HostSpecifier::parse("10.0.0.0/8", None).unwrap();
        let rule = IpRule::new(0, host, IpRuleStatus::Block);
        let addr = "10.1.2.3".parse().unwrap();

        assert!(rule.covers(0, addr, Some(443)));
        assert!(rule.covers(0, addr, None));
    }
}
