//! Spoken-URL normalization

use crate::{Error, Result};

/// Turn a spoken or typed URL into something a browser will open
///
/// Lowercases, strips all whitespace, defaults the scheme to `https://` and
/// appends `.com` to a bare host.
///
/// # Errors
///
/// Returns [`Error::Tool`] if nothing usable remains
pub fn normalize_url(raw: &str) -> Result<String> {
    let mut url: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();

    if url.is_empty() {
        return Err(Error::Tool("empty url".to_string()));
    }

    if !url.contains("://") {
        url.insert_str(0, "https://");
    }

    let host_start = url.find("://").map_or(0, |i| i + 3);
    let host_end = url[host_start..]
        .find(['/', '?', '#'])
        .map_or(url.len(), |i| host_start + i);
    let host = &url[host_start..host_end];
    // Port stays after the appended suffix
    let name_end = host.find(':').map_or(host_end, |i| host_start + i);

    if host_start == name_end {
        return Err(Error::Tool(format!("no host in url: {raw}")));
    }
    if !url[host_start..name_end].contains('.') {
        url.insert_str(name_end, ".com");
    }

    url::Url::parse(&url).map_err(|e| Error::Tool(format!("invalid url {url}: {e}")))?;
    Ok(url)
}

/// Google search URL for `query`
#[must_use]
pub fn search_url(query: &str) -> String {
    format!(
        "https://www.google.com/search?q={}",
        urlencoding::encode(query.trim())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_word_gets_scheme_and_tld() {
        assert_eq!(normalize_url("REDDIT").unwrap(), "https://reddit.com");
    }

    #[test]
    fn spoken_spacing_is_removed() {
        assert_eq!(normalize_url("face book . com").unwrap(), "https://facebook.com");
    }

    #[test]
    fn existing_scheme_and_path_are_kept() {
        assert_eq!(
            normalize_url("http://Example.org/Path").unwrap(),
            "http://example.org/path"
        );
        assert_eq!(normalize_url("github/rust-lang").unwrap(), "https://github.com/rust-lang");
    }

    #[test]
    fn port_follows_suffix() {
        assert_eq!(normalize_url("localhost:8080").unwrap(), "https://localhost.com:8080");
    }

    #[test]
    fn empty_is_rejected() {
        assert!(normalize_url("   ").is_err());
        assert!(normalize_url("https://").is_err());
    }

    #[test]
    fn search_query_is_encoded() {
        assert_eq!(
            search_url("rust async book"),
            "https://www.google.com/search?q=rust%20async%20book"
        );
    }
}
