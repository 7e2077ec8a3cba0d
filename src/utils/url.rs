//! URL utilities for consistent URL handling
//!
//! Normalizes base URLs before endpoint construction and fills in a scheme
//! for bare hostnames typed by the user.

/// Normalize a base URL by removing trailing slashes.
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Construct a complete API endpoint URL from a base URL and endpoint path,
/// avoiding double slashes in the result.
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

/// Prefix a URL with `https://` unless it already carries a scheme.
///
/// Users routinely type bare hostnames ("bbc.co.uk"); the HTTP client
/// rejects those without a scheme.
pub fn ensure_scheme(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}
