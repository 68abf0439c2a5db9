//! Service URL builders

/// Keystone token issuing endpoint
pub fn auth_tokens_url(base_url: &str) -> String {
    format!("{}/v3/auth/tokens", trim(base_url))
}

/// Context broker entity listing, with optional `options` flags
pub fn entities_url(base_url: &str, options: &[String]) -> String {
    with_options(format!("{}/v2/entities", trim(base_url)), options)
}

/// Context broker batch update, with optional `options` flags
pub fn batch_update_url(base_url: &str, options: &[String]) -> String {
    with_options(format!("{}/v2/op/update", trim(base_url)), options)
}

fn trim(base_url: &str) -> &str {
    base_url.trim_end_matches('/')
}

fn with_options(mut url: String, options: &[String]) -> String {
    if !options.is_empty() {
        url.push_str("?options=");
        url.push_str(&options.join(","));
    }
    url
}
