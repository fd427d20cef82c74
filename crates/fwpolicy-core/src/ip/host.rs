//! Host specifiers
//!
//! A [`HostSpecifier`] is an address or CIDR block plus an optional port.
//! Plain addresses are stored as full-length networks (`/32`, `/128`), so a
//! single type covers both exact hosts and ranges.

use crate::error::{Error, Result};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Address or address range, with an optional port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostSpecifier {
    net: IpNet,
    port: Option<u16>,
}

impl HostSpecifier {
    /// Parse `1.2.3.4`, `10.0.0.0/8`, `::1`, `[::1]` or `2001:db8::/32`
    ///
    /// Host bits of a CIDR block are cleared, so `10.1.2.3/8` equals
    /// `10.0.0.0/8`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidHost`] if the text is neither an address nor
    /// a CIDR block.
    pub fn parse(host: &str, port: Option<u16>) -> Result<Self> {
        let text = host.trim();
        let text = text
            .strip_prefix('[')
            .and_then(|t| t.strip_suffix(']'))
            .unwrap_or(text);

        let net = if text.contains('/') {
            IpNet::from_str(text).map_err(|_| Error::invalid_host(host))?.trunc()
        } else {
            IpAddr::from_str(text)
                .map(IpNet::from)
                .map_err(|_| Error::invalid_host(host))?
        };

        Ok(Self { net, port })
    }

    /// Exact host specifier for a single address
    pub fn from_addr(addr: IpAddr, port: Option<u16>) -> Self {
        Self {
            net: IpNet::from(addr),
            port,
        }
    }

    /// Network address (the address itself for exact hosts)
    pub fn addr(&self) -> IpAddr {
        self.net.addr()
    }

    /// Port, if the specifier is port-specific
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Same host without the port
    pub fn without_port(&self) -> Self {
        Self {
            net: self.net,
            port: None,
        }
    }

    /// True when the specifier covers more than one address
    pub fn is_range(&self) -> bool {
        self.net.prefix_len() < self.net.max_prefix_len()
    }

    /// True for `0.0.0.0` and `::` (bare or `/0`), which stand for every
    /// address of their family
    pub fn is_any(&self) -> bool {
        let unspecified = match self.net.addr() {
            IpAddr::V4(a) => a == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(a) => a == Ipv6Addr::UNSPECIFIED,
        };
        unspecified && (self.net.prefix_len() == 0 || !self.is_range())
    }

    /// True when `addr` falls inside this specifier
    ///
    /// The "any" address contains every address of its own family only.
    pub fn contains(&self, addr: IpAddr) -> bool {
        if self.is_any() {
            return self.net.addr().is_ipv4() == addr.is_ipv4();
        }
        self.net.contains(&addr)
    }
}

impl fmt::Display for HostSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let host = if self.is_range() {
            self.net.to_string()
        } else {
            self.net.addr().to_string()
        };

        match (self.port, self.net.addr()) {
            (Some(port), IpAddr::V6(_)) => write!(f, "[{host}]:{port}"),
            (Some(port), IpAddr::V4(_)) => write!(f, "{host}:{port}"),
            (None, _) => f.write_str(&host),
        }
    }
}

/// Index a rule is filed into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSlot {
    /// Keyed by `(host, uid)` for direct lookup
    Exact,
    /// Scanned for containment
    Wildcard,
}

impl IndexSlot {
    /// Pick the index for a host; the only place this decision is made
    pub fn classify(host: &HostSpecifier) -> Self {
        if host.is_range() || host.is_any() {
            Self::Wildcard
        } else {
            Self::Exact
        }
    }
}

/// Parse a connection address as the hot path receives it
///
/// Accepts bare and bracketed IPv6. Returns `None` for anything else.
pub fn parse_address(address: &str) -> Option<IpAddr> {
    let text = address.trim();
    let text = text
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .unwrap_or(text);
    IpAddr::from_str(text).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_exact() {
        let host = HostSpecifier::parse("1.2.3.4", Some(443)).unwrap();
        assert!(!host.is_range());
        assert!(!host.is_any());
        assert_eq!(host.port(), Some(443));
        assert_eq!(host.to_string(), "1.2.3.4:443");
        assert_eq!(IndexSlot::classify(&host), IndexSlot::Exact);
    }

    #[test]
    fn test_parse_range_truncates() {
        let a = HostSpecifier::parse("10.1.2.3/8", None).unwrap();
        let b = HostSpecifier::parse("10.0.0.0/8", None).unwrap();
        assert_eq!(a, b);
        assert!(a.is_range());
        assert_eq!(a.to_string(), "10.0.0.0/8");
        assert_eq!(IndexSlot::classify(&a), IndexSlot::Wildcard);
    }

    #[test]
    fn test_parse_v6() {
        let host = HostSpecifier::parse("[2001:db8::1]", Some(53)).unwrap();
        assert_eq!(host.to_string(), "[2001:db8::1]:53");

        let net = HostSpecifier::parse("2001:db8::/32", None).unwrap();
        assert!(net.contains("2001:db8:ffff::1".parse().unwrap()));
        assert!(!net.contains("2001:db9::1".parse().unwrap()));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(HostSpecifier::parse("example.com", None).is_err());
        assert!(HostSpecifier::parse("10.0.0.0/40", None).is_err());
        assert!(HostSpecifier::parse("", None).is_err());
    }

    #[test]
    fn test_any_address() {
        let any4 = HostSpecifier::parse("0.0.0.0", None).unwrap();
        assert!(any4.is_any());
        assert_eq!(IndexSlot::classify(&any4), IndexSlot::Wildcard);
        assert!(any4.contains("8.8.8.8".parse().unwrap()));
        assert!(!any4.contains("2001:db8::1".parse().unwrap()));

        let any6 = HostSpecifier::parse("::", Some(443)).unwrap();
        assert!(any6.contains("2001:db8::1".parse().unwrap()));
        assert!(!any6.contains("8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address(" 1.2.3.4 "), Some("1.2.3.4".parse().unwrap()));
        assert_eq!(parse_address("[::1]"), Some("::1".parse().unwrap()));
        assert_eq!(parse_address("not-an-ip"), None);
    }

    proptest! {
        #[test]
        fn exact_v4_hosts_are_never_ranges(a in any::<u8>(), b in any::<u8>(), c in any::<u8>(), d in 1u8..=255) {
            let host = HostSpecifier::from_addr(IpAddr::V4(Ipv4Addr::new(a, b, c, d)), None);
            prop_assert_eq!(IndexSlot::classify(&host), IndexSlot::Exact);
            prop_assert!(host.contains(host.addr()));
        }

        #[test]
        fn v4_block_contains_its_members(a in any::<u8>(), b in any::<u8>(), c in any::<u8>(), d in any::<u8>(), prefix in 1u8..32) {
            let addr = Ipv4Addr::new(a, b, c, d);
            let host = HostSpecifier::parse(&format!("{addr}/{prefix}"), None).unwrap();
            prop_assert!(host.is_range());
            prop_assert!(host.contains(IpAddr::V4(addr)));
        }
    }
}
