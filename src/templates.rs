//! Askama templates for the archive's HTML pages.
//!
//! Each struct corresponds to an HTML template in the templates/ directory.

use askama::Template;

/// Values shared by every page.
#[derive(Debug, Clone, Copy)]
pub struct PageFrame<'a> {
    pub site_name: &'a str,
    pub language: &'a str,
    pub stylesheets: &'a [String],
}

/// A category entry on the homepage.
pub struct HomeCategory {
    pub path: String,
    pub title: String,
}

#[derive(Template)]
#[template(path = "home.html")]
pub struct HomeTemplate<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub to_root: &'a str,
    pub site_name: &'a str,
    pub language: &'a str,
    pub stylesheets: &'a [String],
    pub categories: Vec<HomeCategory>,
}

#[derive(Template)]
#[template(path = "category.html")]
pub struct CategoryTemplate<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub page: usize,
    pub last_page: usize,
    pub to_root: &'a str,
    pub site_name: &'a str,
    pub language: &'a str,
    pub stylesheets: &'a [String],
}

#[derive(Template)]
#[template(path = "article.html")]
pub struct ArticleTemplate<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub to_root: &'a str,
    pub site_name: &'a str,
    pub language: &'a str,
    pub stylesheets: &'a [String],
}

#[derive(Template)]
#[template(path = "unavailable.html")]
pub struct UnavailableTemplate<'a> {
    pub title: &'a str,
    pub to_root: &'a str,
    pub site_name: &'a str,
    pub language: &'a str,
    pub stylesheets: &'a [String],
}

impl<'a> PageFrame<'a> {
    pub fn home(
        &self,
        title: &'a str,
        description: &'a str,
        categories: Vec<HomeCategory>,
    ) -> HomeTemplate<'a> {
        HomeTemplate {
            title,
            description,
            to_root: "./",
            site_name: self.site_name,
            language: self.language,
            stylesheets: self.stylesheets,
            categories,
        }
    }

    pub fn category(
        &self,
        title: &'a str,
        content: &'a str,
        page: usize,
        last_page: usize,
        to_root: &'a str,
    ) -> CategoryTemplate<'a> {
        CategoryTemplate {
            title,
            content,
            page,
            last_page,
            to_root,
            site_name: self.site_name,
            language: self.language,
            stylesheets: self.stylesheets,
        }
    }

    pub fn article(&self, title: &'a str, content: &'a str, to_root: &'a str) -> ArticleTemplate<'a> {
        ArticleTemplate {
            title,
            content,
            to_root,
            site_name: self.site_name,
            language: self.language,
            stylesheets: self.stylesheets,
        }
    }

    pub fn unavailable(&self, title: &'a str, to_root: &'a str) -> UnavailableTemplate<'a> {
        UnavailableTemplate {
            title,
            to_root,
            site_name: self.site_name,
            language: self.language,
            stylesheets: self.stylesheets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(stylesheets: &[String]) -> PageFrame<'_> {
        PageFrame {
            site_name: "wikiHow",
            language: "en",
            stylesheets,
        }
    }

    #[test]
    fn test_article_template() {
        let css = vec!["assets/123.css".to_string()];
        let html = frame(&css)
            .article("Tie a Tie", "<p>Step <b>1</b></p>", "./../")
            .render()
            .unwrap();
        assert!(html.contains("<title>Tie a Tie</title>"));
        assert!(html.contains("<p>Step <b>1</b></p>"));
        assert!(html.contains(r#"href="./../assets/123.css""#));
        assert!(html.contains(r#"src="./../assets/app.js""#));
    }

    #[test]
    fn test_each_stylesheet_is_linked_once() {
        let css = vec!["assets/123.css".to_string(), "assets/app.css".to_string()];
        let html = frame(&css).article("Knit", "", "./").render().unwrap();
        assert_eq!(html.matches("assets/app.css").count(), 1);
        assert_eq!(html.matches("assets/123.css").count(), 1);
        let first = html.find("assets/123.css").unwrap();
        assert!(first < html.find("assets/app.css").unwrap());
    }

    #[test]
    fn test_home_template_escapes_titles() {
        let html = frame(&[])
            .home(
                "wikiHow",
                "How to do anything",
                vec![HomeCategory {
                    path: "Category:Food/1".to_string(),
                    title: "Food & Entertaining".to_string(),
                }],
            )
            .render()
            .unwrap();
        assert!(html.contains(r#"<a href="./Category:Food/1">Food &amp; Entertaining</a>"#));
        assert!(html.contains("How to do anything"));
    }

    #[test]
    fn test_category_template_pages() {
        let html = frame(&[])
            .category("Food", "<ul></ul>", 2, 3, "./../")
            .render()
            .unwrap();
        assert!(html.contains("2 / 3"));
        let single = frame(&[])
            .category("Food", "", 1, 1, "./../")
            .render()
            .unwrap();
        assert!(!single.contains("1 / 1"));
    }
}
