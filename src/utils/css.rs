//! Stylesheet rewriting for offline use.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use url::Url;

use super::digest::get_digest;

static CSS_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\(\s*['"]?([^'")]*?)['"]?\s*\)"#).expect("css url regex should compile")
});

/// A resource referenced from a stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssResource {
    /// Absolute URL to retrieve the resource from.
    pub url: String,
    /// Archive path to store it at.
    pub path: String,
}

/// Archive path for a stylesheet resource, keeping a short extension for MIME detection.
fn resource_path(url: &Url) -> String {
    let digest = get_digest(url.as_str());
    let ext = url
        .path()
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()));
    match ext {
        Some(ext) => format!("assets/{digest}.{ext}"),
        None => format!("assets/{digest}"),
    }
}

/// Rewrite every `url()` in `style` to an archive path.
///
/// Returns the transformed stylesheet and the resources to fetch. Relative
/// references are resolved against `css_url`. Inline `data:` URIs and
/// same-document fragments are left alone. Rewritten references are relative
/// to a stylesheet stored under `assets/`.
pub fn parse_css(style: &str, css_url: &Url) -> (String, Vec<CssResource>) {
    let mut resources: Vec<CssResource> = Vec::new();

    let output = CSS_URL_RE.replace_all(style, |caps: &Captures| {
        let target = caps[1].trim();
        if target.is_empty() || target.starts_with("data:") || target.starts_with('#') {
            return caps[0].to_string();
        }
        let resolved = match css_url.join(target) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            _ => return caps[0].to_string(),
        };
        let path = resource_path(&resolved);
        let rewritten = format!("url(\"../{path}\")");
        if !resources.iter().any(|r| r.path == path) {
            resources.push(CssResource {
                url: resolved.to_string(),
                path,
            });
        }
        rewritten
    });

    (output.into_owned(), resources)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn css_url() -> Url {
        Url::parse("https://www.wikihow.com/extensions/skin/style.css").unwrap()
    }

    #[test]
    fn test_parse_css_rewrites_urls() {
        let css = r#"body { background: url("/images/bg.png") no-repeat; }
@font-face { src: url(fonts/a.woff2) format("woff2"); }"#;
        let (out, resources) = parse_css(css, &css_url());

        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].url, "https://www.wikihow.com/images/bg.png");
        assert!(resources[0].path.starts_with("assets/"));
        assert!(resources[0].path.ends_with(".png"));
        assert_eq!(
            resources[1].url,
            "https://www.wikihow.com/extensions/skin/fonts/a.woff2"
        );
        assert!(out.contains(&format!("url(\"../{}\")", resources[0].path)));
        assert!(out.contains("no-repeat"));
        assert!(!out.contains("/images/bg.png"));
    }

    #[test]
    fn test_parse_css_skips_data_and_fragments() {
        let css = "a { background: url(data:image/png;base64,AAAA); filter: url(#blur); }";
        let (out, resources) = parse_css(css, &css_url());
        assert!(resources.is_empty());
        assert_eq!(out, css);
    }

    #[test]
    fn test_parse_css_dedups_resources() {
        let css = "a { background: url('x.svg'); } b { background: url(\"x.svg\"); }";
        let (_, resources) = parse_css(css, &css_url());
        assert_eq!(resources.len(), 1);
    }
}
