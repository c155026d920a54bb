//! Shared utility functions.
//!
//! - `digest`: dedup keys and version identities
//! - `ident`: crawl identities derived from link targets
//! - `css`: stylesheet `url()` rewriting

mod css;
mod digest;
mod ident;

pub use css::{parse_css, CssResource};
pub use digest::{get_digest, version_ident_from_headers, VersionIdent};
pub use ident::{
    article_ident_for, cat_ident_for, normalize_ident, slugify_stem, to_root_for, to_url,
};
