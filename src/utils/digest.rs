//! Content-addressing primitives.

use std::collections::HashMap;

/// Simple digest of a URL (or any string) for mapping purposes.
///
/// CRC-32 of the UTF-8 bytes, rendered in decimal. Stable across runs and
/// platforms so it can be used in archive paths and cache keys.
pub fn get_digest(value: &str) -> String {
    crc32fast::hash(value.as_bytes()).to_string()
}

/// Cheap fingerprint of a remote resource built from cache-validation headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionIdent {
    /// Value of the preferred header that was present.
    Known(String),
    /// Nothing usable was returned. Never matches a cached entry.
    Unknown,
}

impl VersionIdent {
    /// A fixed identity for resources whose URL is considered stable enough.
    pub fn fixed(value: &str) -> Self {
        Self::Known(value.to_string())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Known(value) => Some(value),
            Self::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

/// Pick `ETag` > `Last-Modified` > `Content-Length` from response headers.
///
/// Header names are matched case-insensitively; empty values are skipped.
pub fn version_ident_from_headers(headers: &HashMap<String, String>) -> VersionIdent {
    for wanted in ["etag", "last-modified", "content-length"] {
        let found = headers
            .iter()
            .find(|(name, value)| name.eq_ignore_ascii_case(wanted) && !value.trim().is_empty());
        if let Some((_, value)) = found {
            return VersionIdent::Known(value.trim().to_string());
        }
    }
    VersionIdent::Unknown
}
