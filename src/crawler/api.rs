//! Source-site query API (MediaWiki `api.php`).

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{Result, ScrapeError};
use crate::fetch::{FetchError, Fetcher};
use crate::site::{API_PATH, CATEGORY_NAMESPACE};

#[derive(Debug, Deserialize)]
struct SiteInfoResponse {
    query: SiteInfoQuery,
}

#[derive(Debug, Deserialize)]
struct SiteInfoQuery {
    namespaces: HashMap<String, Namespace>,
}

#[derive(Debug, Deserialize)]
struct Namespace {
    #[serde(rename = "*")]
    local: Option<String>,
    canonical: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MembersResponse {
    #[serde(rename = "continue")]
    next: Option<MembersContinue>,
    query: Option<MembersQuery>,
}

#[derive(Debug, Deserialize)]
struct MembersContinue {
    cmcontinue: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MembersQuery {
    categorymembers: Vec<Member>,
}

#[derive(Debug, Deserialize)]
struct Member {
    ns: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct PagesResponse {
    query: Option<PagesQuery>,
}

#[derive(Debug, Deserialize)]
struct PagesQuery {
    #[serde(default)]
    pages: HashMap<String, PageInfo>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    missing: Option<serde_json::Value>,
    invalid: Option<serde_json::Value>,
}

/// Direct members of a category.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CategoryMembers {
    pub subcategories: Vec<String>,
    pub articles: Vec<String>,
}

/// Crawl identity of a page title (`Tie a Tie` → `Tie-a-Tie`).
pub fn title_to_ident(title: &str) -> String {
    title.trim().replace(' ', "-")
}

/// Query-API client bound to one site.
pub struct QueryApi<'a> {
    fetcher: &'a dyn Fetcher,
    endpoint: Url,
}

impl<'a> QueryApi<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, base_url: &Url) -> Result<Self> {
        let endpoint = base_url.join(API_PATH).map_err(|e| {
            ScrapeError::Config(format!("invalid API endpoint for {}: {}", base_url, e))
        })?;
        Ok(Self { fetcher, endpoint })
    }

    fn url(&self, params: &[(&str, &str)]) -> String {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .extend_pairs(params.iter().copied())
            .append_pair("format", "json");
        url.to_string()
    }

    async fn get<T: DeserializeOwned>(&self, params: &[(&str, &str)]) -> Result<T> {
        let url = self.url(params);
        debug!("Querying {}", url);
        let body = self.fetcher.get_page(&url).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Localized name of the category namespace (`Category`, `Categoría`...).
    pub async fn category_prefix(&self) -> Result<Option<String>> {
        let info: SiteInfoResponse = self
            .get(&[
                ("action", "query"),
                ("meta", "siteinfo"),
                ("siprop", "namespaces"),
            ])
            .await?;
        let prefix = info
            .query
            .namespaces
            .get(&CATEGORY_NAMESPACE.to_string())
            .and_then(|ns| {
                ns.local
                    .clone()
                    .or_else(|| ns.name.clone())
                    .or_else(|| ns.canonical.clone())
            })
            .map(|p| title_to_ident(&p))
            .filter(|p| !p.is_empty());
        Ok(prefix)
    }

    /// Every direct member of a category, following continuation.
    pub async fn category_members(&self, prefix: &str, ident: &str) -> Result<CategoryMembers> {
        let title = format!("{}:{}", prefix, ident.replace('-', " "));
        let marker = format!("{}:", prefix);
        let mut members = CategoryMembers::default();
        let mut cursor: Option<String> = None;

        loop {
            let mut params = vec![
                ("action", "query"),
                ("list", "categorymembers"),
                ("cmtitle", title.as_str()),
                ("cmlimit", "500"),
                ("cmtype", "page|subcat"),
            ];
            if let Some(cursor) = cursor.as_deref() {
                params.push(("cmcontinue", cursor));
            }
            let response: MembersResponse = self.get(&params).await?;

            for member in response.query.map(|q| q.categorymembers).unwrap_or_default() {
                if member.ns == CATEGORY_NAMESPACE {
                    let name = member
                        .title
                        .strip_prefix(&marker)
                        .or_else(|| member.title.split_once(':').map(|(_, name)| name))
                        .unwrap_or(&member.title);
                    members.subcategories.push(title_to_ident(name));
                } else if member.ns == 0 {
                    members.articles.push(title_to_ident(&member.title));
                }
            }

            cursor = response.next.and_then(|n| n.cmcontinue);
            if cursor.is_none() {
                break;
            }
        }
        Ok(members)
    }

    /// Whether the site knows a page with this identity.
    pub async fn page_exists(&self, ident: &str) -> Result<bool> {
        let title = ident.replace('-', " ");
        let response: PagesResponse = self
            .get(&[("action", "query"), ("titles", title.as_str())])
            .await?;
        let pages = response.query.map(|q| q.pages).unwrap_or_default();
        Ok(pages.iter().any(|(id, page)| {
            id != "-1" && !id.starts_with('-') && page.missing.is_none() && page.invalid.is_none()
        }))
    }
}

/// Whether a 404 for an article is a "content under review" placeholder
/// rather than a genuinely missing page.
///
/// Any failure to ask counts as genuinely missing.
pub async fn is_soft_404(api: &QueryApi<'_>, ident: &str) -> bool {
    match api.page_exists(ident).await {
        Ok(exists) => exists,
        Err(ScrapeError::Fetch(FetchError::NotFound { .. })) => false,
        Err(e) => {
            debug!("Soft 404 lookup for {} failed: {}", ident, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers by matching a query parameter fragment in the requested URL.
    struct ApiStub {
        answers: Vec<(&'static str, &'static str)>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Fetcher for ApiStub {
        async fn get_page(&self, url: &str) -> std::result::Result<String, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            self.answers
                .iter()
                .find(|(needle, _)| url.contains(needle))
                .map(|(_, body)| body.to_string())
                .ok_or_else(|| FetchError::NotFound { url: url.to_string() })
        }
        async fn get_bytes(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
            Err(FetchError::NotFound { url: url.to_string() })
        }
        async fn head(&self, url: &str) -> std::result::Result<HashMap<String, String>, FetchError> {
            Err(FetchError::NotFound { url: url.to_string() })
        }
    }

    fn stub(answers: Vec<(&'static str, &'static str)>) -> ApiStub {
        ApiStub {
            answers,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn base() -> Url {
        Url::parse("https://es.wikihow.com/").unwrap()
    }

    #[tokio::test]
    async fn test_category_prefix() {
        let fetcher = stub(vec![(
            "siteinfo",
            r#"{"query":{"namespaces":{"0":{"id":0,"*":""},"14":{"id":14,"canonical":"Category","*":"Categoría"}}}}"#,
        )]);
        let api = QueryApi::new(&fetcher, &base()).unwrap();
        assert_eq!(api.category_prefix().await.unwrap().as_deref(), Some("Categoría"));
    }

    #[tokio::test]
    async fn test_category_members_follows_continuation() {
        let fetcher = stub(vec![
            (
                "cmcontinue=page%7C2",
                r#"{"query":{"categorymembers":[{"ns":0,"title":"Hacer pan"}]}}"#,
            ),
            (
                "categorymembers",
                r#"{"continue":{"cmcontinue":"page|2","continue":"-||"},"query":{"categorymembers":[{"ns":0,"title":"Cocinar arroz"},{"ns":14,"title":"Categoría:Postres caseros"},{"ns":6,"title":"Archivo:x.jpg"}]}}"#,
            ),
        ]);
        let api = QueryApi::new(&fetcher, &base()).unwrap();
        let members = api.category_members("Categoría", "Cocina").await.unwrap();
        assert_eq!(members.articles, vec!["Cocinar-arroz", "Hacer-pan"]);
        assert_eq!(members.subcategories, vec!["Postres-caseros"]);
        assert_eq!(fetcher.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_soft_404() {
        let fetcher = stub(vec![
            (
                "titles=Under+review",
                r#"{"query":{"pages":{"123":{"pageid":123,"ns":0,"title":"Under review"}}}}"#,
            ),
            (
                "titles=Gone",
                r#"{"query":{"pages":{"-1":{"ns":0,"title":"Gone","missing":""}}}}"#,
            ),
        ]);
        let api = QueryApi::new(&fetcher, &base()).unwrap();
        assert!(is_soft_404(&api, "Under-review").await);
        assert!(!is_soft_404(&api, "Gone").await);
        assert!(!is_soft_404(&api, "Unknown").await);
    }

    #[test]
    fn test_title_to_ident() {
        assert_eq!(title_to_ident(" Tie a Tie "), "Tie-a-Tie");
    }
}
