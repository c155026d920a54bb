//! Command-line interface.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use console::style;
use url::Url;

use crate::config::{ensure_dir, expand_path, Config, DEFAULT_CREATOR, DEFAULT_PUBLISHER};
use crate::context::RunContext;
use crate::crawler::Scraper;

#[derive(Parser, Debug)]
#[command(name = "wikihow-offline")]
#[command(about = "Crawl a wikiHow site into a single-file offline archive")]
#[command(version)]
pub struct Cli {
    /// wikiHow edition to crawl
    #[arg(long, default_value = "en")]
    language: String,

    /// Folder the archive is written to
    #[arg(long, default_value = "/output", env = "WIKIHOW_OUTPUT")]
    output: String,

    /// Archive name (default: wikihow_<lang>_<selection>)
    #[arg(long)]
    name: Option<String>,

    /// Archive title (default: the site's title)
    #[arg(long)]
    title: Option<String>,

    /// Archive description (default: the site's description)
    #[arg(long)]
    description: Option<String>,

    /// Illustration source, path or URL (default: the site's touch icon)
    #[arg(long)]
    icon: Option<String>,

    #[arg(long, default_value = DEFAULT_CREATOR)]
    creator: String,

    #[arg(long, default_value = DEFAULT_PUBLISHER)]
    publisher: String,

    /// Archive tags, `;` separated; may be repeated
    #[arg(long = "tag")]
    tags: Vec<String>,

    /// Archive file name (default: <name>_<YYYY-MM>.zip)
    #[arg(long = "zim-file")]
    zim_file: Option<String>,

    /// Only crawl these categories; a trailing `/` disables recursion
    #[arg(long = "category", value_delimiter = ',')]
    categories: Vec<String>,

    /// Crawl this single article only
    #[arg(long, conflicts_with = "categories")]
    single_article: Option<String>,

    /// List of categories and articles to leave out (path or URL)
    #[arg(long)]
    exclude: Option<String>,

    /// List of the only categories and articles to include (path or URL)
    #[arg(long)]
    only: Option<String>,

    /// Leave YouTube videos out of the archive
    #[arg(long)]
    without_videos: bool,

    /// Turn links to other sites into plain text
    #[arg(long)]
    without_external_links: bool,

    /// Lower quality, smaller videos
    #[arg(long)]
    low_quality: bool,

    /// S3 URL with credentials for the optimization cache
    #[arg(long, env = "OPTIMIZATION_CACHE")]
    optimization_cache: Option<String>,

    /// Percentage of expected articles allowed to be missing
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    missing_tolerance: Option<u8>,

    /// Seconds to wait before each page request
    #[arg(long, default_value = "0")]
    delay: f64,

    /// Folder for temporary files (default: $TMPDIR or .)
    #[arg(long)]
    tmp_dir: Option<String>,

    /// Keep the build folder after the run
    #[arg(long)]
    keep: bool,

    /// Build directly in --tmp-dir instead of a unique sub-folder
    #[arg(long)]
    build_in_tmp: bool,

    /// Don't verify the site's markup before crawling
    #[arg(long)]
    skip_dom_check: bool,

    /// Don't include the pages linked from the site footer
    #[arg(long)]
    skip_footer_links: bool,

    /// Don't follow related-article links
    #[arg(long)]
    skip_relateds: bool,

    /// Write crawl progress as JSON to this file
    #[arg(long)]
    stats_filename: Option<String>,

    /// Keep downloaded media in the build folder and reuse it
    #[arg(long)]
    devel_cache: bool,

    /// Verbose logging and full error chains
    #[arg(long)]
    debug: bool,

    #[arg(long, hide = true)]
    base_url: Option<String>,
}

/// Check if debug mode is enabled (for early logging setup).
pub fn is_debug() -> bool {
    std::env::args().any(|arg| arg == "--debug")
}

impl Cli {
    /// Turn parsed arguments into a run configuration.
    pub fn into_config(self) -> anyhow::Result<Config> {
        let mut config = Config::for_language(&self.language)?;
        if let Some(base_url) = &self.base_url {
            config.base_url =
                Url::parse(base_url).with_context(|| format!("invalid --base-url {}", base_url))?;
        }
        if !(self.delay >= 0.0 && self.delay.is_finite()) {
            anyhow::bail!("--delay must be a positive number of seconds");
        }

        config.output_dir = expand_path(&self.output);
        if let Some(tmp_dir) = &self.tmp_dir {
            config.tmp_dir = expand_path(tmp_dir);
        }
        config.build_in_tmp = self.build_in_tmp;
        config.keep_build_dir = self.keep;

        config.name = self.name;
        config.title = self.title;
        config.description = self.description;
        config.icon = self.icon;
        config.creator = self.creator;
        config.publisher = self.publisher;
        config.tags = self.tags;
        config.fname = self.zim_file;

        config.categories = self
            .categories
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        config.single_article = self.single_article;
        config.exclude = self.exclude;
        config.only = self.only;

        config.without_videos = self.without_videos;
        config.without_external_links = self.without_external_links;
        config.low_quality = self.low_quality;
        config.optimization_cache = self.optimization_cache;
        config.devel_cache = self.devel_cache;
        config.missing_tolerance = self.missing_tolerance;
        config.delay = Duration::from_secs_f64(self.delay);

        config.skip_dom_check = self.skip_dom_check;
        config.skip_footer_links = self.skip_footer_links;
        config.skip_relateds = self.skip_relateds;
        config.stats_filename = self.stats_filename.as_deref().map(expand_path);
        config.debug = self.debug;
        Ok(config)
    }
}

/// Parse arguments and run one crawl.
pub async fn run() -> anyhow::Result<()> {
    let config = Cli::parse().into_config()?;
    ensure_dir(&config.output_dir)?;
    ensure_dir(&config.tmp_dir)?;
    if let Some(parent) = config.stats_filename.as_ref().and_then(|p| p.parent()) {
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent)?;
        }
    }

    let ctx = RunContext::from_config(config).await?;
    let output: PathBuf = ctx.config.archive_path(ctx.today);
    let summary = Scraper::new(ctx).run().await?;

    println!(
        "{} {} ({} articles, {} categories, {} images, {} videos)",
        style("✓").green(),
        output.display(),
        summary.articles,
        summary.categories,
        summary.images,
        summary.videos
    );
    if summary.missing > 0 {
        println!(
            "  {} {} pages were missing",
            style("!").yellow(),
            summary.missing
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["wikihow-offline"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().into_config().unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert_eq!(config.language.code, "en");
        assert_eq!(config.output_dir, PathBuf::from("/output"));
        assert_eq!(config.creator, DEFAULT_CREATOR);
        assert!(config.categories.is_empty());
        assert_eq!(config.missing_tolerance, None);
        assert_eq!(config.delay, Duration::ZERO);
    }

    #[test]
    fn test_selection_and_flags() {
        let config = parse(&[
            "--language",
            "fr",
            "--category",
            "Arts,Cuisine/",
            "--without-videos",
            "--missing-tolerance",
            "5",
            "--delay",
            "1.5",
            "--tag",
            "a;b",
        ]);
        assert_eq!(config.base_url.as_str(), "https://fr.wikihow.com/");
        assert_eq!(config.categories, vec!["Arts", "Cuisine/"]);
        assert!(config.without_videos);
        assert_eq!(config.video_workers(), 10);
        assert_eq!(config.missing_tolerance, Some(5));
        assert_eq!(config.delay, Duration::from_millis(1500));
        assert_eq!(config.archive_name(), "wikihow_fr_arts_cuisine");
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Cli::try_parse_from(["wikihow-offline", "--missing-tolerance", "101"]).is_err());
        assert!(Cli::try_parse_from([
            "wikihow-offline",
            "--category",
            "Arts",
            "--single-article",
            "Knit"
        ])
        .is_err());
        let cli = Cli::try_parse_from(["wikihow-offline", "--language", "xx"]).unwrap();
        assert!(cli.into_config().is_err());
    }
}
