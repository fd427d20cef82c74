//! Public suffix extraction

/// Public suffix of `domain` (`com`, `co.uk`, ...), or `None` when the input
/// is not a well-formed host name
///
/// Expects a normalised domain (see [`normalize_domain`](super::normalize_domain)).
/// Labels must be non-empty and built from ASCII letters, digits, `-` and
/// `_`, without a leading `-` or `_`. Anything else is treated as having no
/// suffix rather than as an error.
///
/// Top-level labels missing from the public suffix list still count as
/// suffixes, so a rule on `lan` matches `printer.lan`.
pub fn public_suffix(domain: &str) -> Option<&str> {
    if !is_host_name(domain) {
        return None;
    }
    psl::suffix_str(domain)
}

fn is_host_name(domain: &str) -> bool {
    !domain.is_empty()
        && domain.len() <= 253
        && domain.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with(['_', '-'])
                && label
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        })
}
