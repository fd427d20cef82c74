//! Domain rules and the domain resolver
//!
//! Rules are partitioned by [`DomainKind`](crate::status::DomainKind) into
//! three disjoint indexes:
//! - exact domain names (`ads.example.com`)
//! - public suffixes (`ru`, `co.uk`)
//! - wildcard globs (`*.ads.example.com`)
//!
//! Resolution order is exact, then public suffix, then wildcard. The first
//! tier that yields a status other than `NONE` wins.

mod rule;
mod store;
mod suffix;
mod wildcard;

pub use rule::{normalize_domain, DomainRule};
pub use store::DomainStore;
pub use suffix::public_suffix;
pub use wildcard::WildcardPattern;
