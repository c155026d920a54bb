//! Structural knowledge about the source site.
//!
//! Everything that breaks when the site changes its markup lives here:
//! selectors for homepage metadata, category listings, pagination, article
//! content, blocks to strip, video containers and the link-removal table.

/// Page listing every top-level category.
pub const CATEGORY_LISTING_PATH: &str = "/Special:CategoryListing";

/// MediaWiki query API endpoint.
pub const API_PATH: &str = "/api.php";

/// Namespace id of categories in the query API.
pub const CATEGORY_NAMESPACE: i64 = 14;

/// Category prefix used when the site does not tell us its own.
pub const DEFAULT_CATEGORY_PREFIX: &str = "Category";

// Homepage metadata
pub const HOME_TITLE: &str = "title";
pub const HOME_DESCRIPTION: &str = r#"meta[name="description"]"#;
pub const HOME_ICON: &str = r#"link[rel="apple-touch-icon"][href]"#;
pub const HOME_FAVICON: &str = r#"link[rel="icon"][href], link[rel="shortcut icon"][href]"#;
pub const STYLESHEETS: &str = r#"link[rel="stylesheet"][href], link[as="style"][href]"#;
pub const FOOTER_LINKS: &str = "#footer_links a[href], #footer .footer_links a[href]";

// Category pages
pub const CATEGORY_LISTING_LINKS: &str = "#catlist_container #catlist a[href], .cat_container a[href]";
pub const SUBCATEGORY_LINKS: &str = "#subcats > ul a[href]";
pub const CATEGORY_ARTICLE_LINKS: &str = "#cat_all div.responsive_thumb > a[href]";
pub const PAGINATION_LINKS: &str = "#large_pagination a[href]";
pub const CATEGORY_DESCRIPTION: &str = "#cat_description, .cat_description";

// Article pages
pub const PAGE_CONTENT: &str = "#bodycontents";
pub const PAGE_TITLE: &str = "h1";
/// Where page content is looked for, first match wins.
pub const CONTENT_REGIONS: &[&str] = &[PAGE_CONTENT, "#article", "#content", "body"];
pub const RELATED_LINKS: &str = "#relatedwikihows > a.related-wh[href]";
pub const RELATED_SECTION: &str = "#relatedwikihows, .section.relatedwikihows";

/// Non-content regions removed from every page before rewriting.
pub const BLOCK_LIST: &[&str] = &[
    "script",
    "noscript",
    "#article_rating",
    "#article_rating_mobile",
    "#sp_helpful_new",
    "#qa",
    ".qa",
    "#social_proof_mobile",
    "#sp_helpful",
    ".wh_ad_inner",
    ".wh_ad_active",
    ".ad_label",
    "[id^='ad_']",
    ".rate_container",
    "#userreview",
    "#ur_mobile",
    ".section.testyourknowledge",
    ".section.quiz_cta",
    ".section.sample",
    ".section.expertqa",
    "#hp_bottom_banner",
    ".social_share",
    "#sharing_buttons",
    ".altblock",
    ".unnabbed_alert",
    "#pin_this",
    "#methodtoc",
    "#newsletter_signup",
    ".coauthor_byline",
    "#article_info_section",
    ".section.ask_question",
    "#searchresults_footer",
    "#trustcheck_container",
];

// Videos
pub const YOUTUBE_IFRAMES: &str = r#"iframe[src*="youtube"], iframe[data-src*="youtube"]"#;
pub const YOUTUBE_SECTIONS: &str = ".section.video, #video";
pub const SUMMARY_VIDEOS: &str =
    "#quick_summary_video_section video, .summary_with_video video, #summary_wrapper video";
pub const VIDEOS: &str = "video";

/// A link whose removal, when it targets hidden content, takes some
/// surrounding structure with it.
#[derive(Debug, Clone, Copy)]
pub struct LinkRemoval {
    pub selector: &'static str,
    /// Target is a category (otherwise an article).
    pub for_category: bool,
    /// Remove the link's parent instead of the link.
    pub target_is_parent: bool,
    /// Also remove the node right before the link's parent.
    pub clear_parent_previous_sibling: bool,
}

pub const LINK_REMOVALS: &[LinkRemoval] = &[
    LinkRemoval {
        selector: "#relatedwikihows > a.related-wh[href]",
        for_category: false,
        target_is_parent: false,
        clear_parent_previous_sibling: false,
    },
    LinkRemoval {
        selector: "#cat_all div.responsive_thumb > a[href]",
        for_category: false,
        target_is_parent: true,
        clear_parent_previous_sibling: false,
    },
    LinkRemoval {
        selector: "#subcats > ul a[href]",
        for_category: true,
        target_is_parent: true,
        clear_parent_previous_sibling: false,
    },
    LinkRemoval {
        selector: ".cat_container a[href]",
        for_category: true,
        target_is_parent: true,
        clear_parent_previous_sibling: false,
    },
    LinkRemoval {
        selector: "#catlist_container #catlist a[href]",
        for_category: true,
        target_is_parent: true,
        clear_parent_previous_sibling: false,
    },
    LinkRemoval {
        selector: ".breadcrumbs a[href]",
        for_category: true,
        target_is_parent: true,
        clear_parent_previous_sibling: false,
    },
    LinkRemoval {
        selector: ".sp_box.sp_fullbox a[href]",
        for_category: true,
        target_is_parent: true,
        clear_parent_previous_sibling: true,
    },
];

/// What a DOM integrity check fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckTarget {
    CategoryListing,
    FirstCategory,
    FirstArticle,
}

/// A selector that must match on a known page.
#[derive(Debug, Clone, Copy)]
pub struct DomCheck {
    pub target: CheckTarget,
    pub selector: &'static str,
    pub description: &'static str,
}

pub const DOM_CHECKS: &[DomCheck] = &[
    DomCheck {
        target: CheckTarget::CategoryListing,
        selector: CATEGORY_LISTING_LINKS,
        description: "category listing links",
    },
    DomCheck {
        target: CheckTarget::FirstCategory,
        selector: CATEGORY_ARTICLE_LINKS,
        description: "category article links",
    },
    DomCheck {
        target: CheckTarget::FirstArticle,
        selector: PAGE_CONTENT,
        description: "article content",
    },
    DomCheck {
        target: CheckTarget::FirstArticle,
        selector: PAGE_TITLE,
        description: "article title",
    },
];
