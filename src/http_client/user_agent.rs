//! User agent handling for HTTP requests.

pub const USER_AGENT: &str = concat!(
    "wikihow-offline/",
    env!("CARGO_PKG_VERSION"),
    " (offline archive builder)"
);

/// Resolve user agent from config value.
/// - None => default user agent
/// - other => custom user agent string
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config {
        None => USER_AGENT.to_string(),
        Some(custom) if custom.trim().is_empty() => USER_AGENT.to_string(),
        Some(custom) => custom.to_string(),
    }
}
