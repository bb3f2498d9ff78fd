//! URL helpers for building provider endpoints.
//!
//! Base URLs come from user configuration and the built-in catalogue, so they
//! may or may not carry trailing slashes or an API version segment.

/// Normalize a base URL by removing trailing slashes
///
/// # Examples
///
/// ```
/// use llmux::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://api.example.com/v1/"), "https://api.example.com/v1");
/// assert_eq!(normalize_base_url("https://api.example.com///"), "https://api.example.com");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path with exactly one slash between them.
///
/// # Examples
///
/// ```
/// use llmux::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.example.com/", "/v1/chat/completions"),
///     "https://api.example.com/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

/// True when the URL path already pins an API version such as `/v1` or
/// `/v1beta/openai`.
fn has_version_segment(base_url: &str) -> bool {
    let without_scheme = base_url.split_once("://").map_or(base_url, |(_, rest)| rest);
    without_scheme.split('/').skip(1).any(|segment| {
        let mut chars = segment.chars();
        chars.next() == Some('v') && chars.next().is_some_and(|c| c.is_ascii_digit())
    })
}

/// Like [`construct_api_url`], but drops a leading `v1/` from the endpoint
/// when the base URL already carries a version segment.
pub fn join_api_path(base_url: &str, endpoint: &str) -> String {
    let endpoint = endpoint.trim_start_matches('/');
    let endpoint = match endpoint.strip_prefix("v1/") {
        Some(rest) if has_version_segment(base_url) => rest,
        _ => endpoint,
    };
    construct_api_url(base_url, endpoint)
}

/// Azure's deployment-scoped form of an OpenAI path.
pub fn azure_deployment_path(deployment: &str, endpoint: &str, api_version: &str) -> String {
    let endpoint = endpoint.trim_start_matches('/');
    let endpoint = endpoint.strip_prefix("v1/").unwrap_or(endpoint);
    with_query(
        &format!("deployments/{deployment}/{endpoint}"),
        "api-version",
        api_version,
    )
}

pub fn with_query(url: &str, key: &str, value: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{key}={value}")
}
