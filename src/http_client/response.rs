//! Status and header handling shared by page, resource and header requests.

use std::collections::HashMap;

use reqwest::header::HeaderMap;
use reqwest::StatusCode;

use crate::fetch::FetchError;

/// Collect response headers into a lowercase-keyed map.
///
/// Values that are not valid visible ASCII are dropped.
pub(crate) fn collect_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            Some((name.as_str().to_ascii_lowercase(), value.to_string()))
        })
        .collect()
}

/// Turn a non-success status into a fetch error. 404 stays distinguishable.
pub(crate) fn check_status(url: &str, status: StatusCode) -> Result<(), FetchError> {
    if status == StatusCode::NOT_FOUND {
        return Err(FetchError::NotFound {
            url: url.to_string(),
        });
    }
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(())
}
