// src/utils/url.rs

//! URL construction for the two remote services.

use url::Url;

use crate::error::Result;

/// Build the SODA resource URL for a dataset, e.g. `.../resource/xqx5-8hwx.json`.
///
/// # Examples
/// ```
/// use restaurant_bot::utils::url::dataset_url;
///
/// assert_eq!(
///     dataset_url("https://data.cityofchicago.org/resource", "xqx5-8hwx")
///         .unwrap()
///         .as_str(),
///     "https://data.cityofchicago.org/resource/xqx5-8hwx.json"
/// );
/// ```
pub fn dataset_url(base: &str, dataset: &str) -> Result<Url> {
    let base = Url::parse(&with_trailing_slash(base))?;
    Ok(base.join(&format!("{}.json", dataset.trim_matches('/')))?)
}

/// Build an XRPC endpoint URL on a PDS,
/// e.g. `https://bsky.social/xrpc/com.atproto.server.createSession`.
pub fn xrpc_url(service: &str, method: &str) -> Result<Url> {
    let base = Url::parse(&with_trailing_slash(service))?;
    Ok(base.join(&format!("xrpc/{method}"))?)
}

fn with_trailing_slash(base: &str) -> String {
    let trimmed = base.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}
