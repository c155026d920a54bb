//! wikiHow offline archiver.
//!
//! Crawls a wikiHow edition (categories and articles), rewrites every page for
//! offline reading and packages pages, images and videos into one archive file.

pub mod archive;
pub mod cache;
pub mod cli;
pub mod config;
pub mod context;
pub mod crawler;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod filters;
pub mod http_client;
pub mod media;
pub mod rewriter;
pub mod site;
pub mod templates;
pub mod utils;

pub use error::{Result, ScrapeError};
