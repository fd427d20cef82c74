//! Per-app IP rules and the connection resolver
//!
//! Rules whose host is a single address live in an exact index keyed by
//! `(host, uid)`. Rules on CIDR blocks or the "any" address live in a
//! wildcard index that is scanned for containment. [`IndexSlot::classify`]
//! is the single place that decides between the two.

mod host;
mod rule;
mod store;

pub use host::{parse_address, HostSpecifier, IndexSlot};
pub use rule::IpRule;
pub use store::IpStore;
