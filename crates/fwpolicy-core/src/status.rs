//! Rule kinds and statuses
//!
//! Every enum here is persisted by an explicit integer id. The ids are part
//! of the storage format and must never be renumbered; new variants take new
//! ids.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! stable_ids {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $id:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(into = "i32", try_from = "i32")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Stable persisted id
            pub const fn id(self) -> i32 {
                match self {
                    $($name::$variant => $id),+
                }
            }

            /// Look up a variant by its persisted id
            pub fn from_id(id: i32) -> Option<Self> {
                match id {
                    $($id => Some($name::$variant),)+
                    _ => None,
                }
            }

            /// Short lowercase label used in logs and on the command line
            pub const fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl From<$name> for i32 {
            fn from(value: $name) -> i32 {
                value.id()
            }
        }

        impl TryFrom<i32> for $name {
            type Error = Error;

            fn try_from(id: i32) -> Result<Self> {
                Self::from_id(id).ok_or(Error::UnknownId {
                    kind: stringify!($name),
                    id,
                })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                let wanted = s.trim().replace('_', "-");
                if let Ok(id) = wanted.parse::<i32>() {
                    return Self::try_from(id);
                }
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(&wanted))
                    .ok_or_else(|| Error::UnknownName {
                        kind: stringify!($name),
                        name: s.to_string(),
                    })
            }
        }
    };
}

stable_ids! {
    /// Shape of a domain rule; decides which index the rule is filed into
    DomainKind {
        /// Literal domain name
        Exact = 0 => "exact",
        /// Glob pattern over the whole domain, `*` matching any characters
        Wildcard = 1 => "wildcard",
        /// Public suffix such as `ru` or `co.uk`
        Tld = 2 => "tld",
    }
}

stable_ids! {
    /// Policy attached to a domain rule
    DomainStatus {
        /// No rule (implicit allow)
        None = 0 => "none",
        /// Block resolution
        Block = 1 => "block",
        /// Always allow, overriding blocklists
        Whitelist = 2 => "whitelist",
    }
}

stable_ids! {
    /// Policy attached to an IP rule
    IpRuleStatus {
        /// No rule (implicit allow)
        None = 0 => "none",
        /// Block the connection
        Block = 1 => "block",
        /// Allow, skipping the app's own firewall rules
        BypassAppRules = 2 => "bypass-app-rules",
        /// Allow, skipping every firewall rule
        BypassUniversal = 3 => "bypass-universal",
    }
}

stable_ids! {
    /// Per-app firewall mode
    FirewallStatus {
        /// App bypasses all firewall rules
        BypassUniversal = 2 => "bypass-universal",
        /// App is excluded from the tunnel entirely
        Exclude = 3 => "exclude",
        /// App may only reach addresses it has explicit rules for
        Isolate = 4 => "isolate",
        /// Regular firewalling
        None = 5 => "none",
        /// No policy is known for the uid
        Untracked = 6 => "untracked",
        /// App's DNS queries skip the DNS firewall
        BypassDnsFirewall = 7 => "bypass-dns-firewall",
    }
}

stable_ids! {
    /// Which network types an app is blocked on
    ConnectionStatus {
        /// Blocked on metered and unmetered networks
        Both = 0 => "both",
        /// Blocked on unmetered (Wi-Fi) networks
        Unmetered = 1 => "unmetered",
        /// Blocked on metered (mobile) networks
        Metered = 2 => "metered",
        /// Not blocked
        Allow = 3 => "allow",
    }
}

/// Resolution tier that produced a domain verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchedBy {
    /// Served from the lookup cache
    Cache,
    /// Exact domain rule
    Domain,
    /// Public suffix rule
    Tld,
    /// Wildcard rule, or the final tier when nothing matched
    Wildcard,
}

impl Default for DomainStatus {
    fn default() -> Self {
        Self::None
    }
}

impl DomainStatus {
    /// True when no rule applies
    pub fn is_none(self) -> bool {
        self == Self::None
    }
}

impl Default for IpRuleStatus {
    fn default() -> Self {
        Self::None
    }
}

impl IpRuleStatus {
    /// True when no rule applies
    pub fn is_none(self) -> bool {
        self == Self::None
    }
}

impl Default for FirewallStatus {
    fn default() -> Self {
        Self::Untracked
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::Allow
    }
}
