//! wikihow-offline - crawl a wikiHow site into an offline archive.

use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wikihow_offline::cli;

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    let debug = cli::is_debug();
    let default_filter = if debug {
        "wikihow_offline=debug"
    } else {
        "wikihow_offline=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = cli::run().await {
        eprintln!("{} An error occurred: {}", style("FAILED.").red().bold(), e);
        if debug {
            eprintln!("{:?}", e);
        }
        std::process::exit(1);
    }
}
