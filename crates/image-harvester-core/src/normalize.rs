//! URL canonicalization helpers.
//!
//! Every function here is total: a URL that fails to parse degrades to plain
//! string splitting on `#` and `?` instead of producing an error.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::config::IdentityMode;

static TRAILING_EXTENSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.([A-Za-z0-9]{2,5})$").expect("valid extension pattern"));

/// Canonicalize a URL to a comparison key under the given mode
pub fn normalize(url: &str, mode: IdentityMode) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            if mode == IdentityMode::StripQuery {
                parsed.set_query(None);
            }
            parsed.to_string()
        }
        Err(_) => {
            let (path, query) = split_naive(url);
            match (mode, query) {
                (IdentityMode::KeepQuery, Some(query)) => format!("{}?{}", path, query),
                _ => path.to_string(),
            }
        }
    }
}

/// Key grouping URLs believed to depict the same picture.
///
/// This is `normalize` with the file extension of the last path segment
/// removed, so `a.png` and `a.jpg` land in one group.
pub fn identity_key(url: &str, mode: IdentityMode) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            if mode == IdentityMode::StripQuery {
                parsed.set_query(None);
            }
            let path = strip_extension(parsed.path()).to_string();
            parsed.set_path(&path);
            parsed.to_string()
        }
        Err(_) => {
            let (path, query) = split_naive(url);
            let path = strip_extension(path);
            match (mode, query) {
                (IdentityMode::KeepQuery, Some(query)) => format!("{}?{}", path, query),
                _ => path.to_string(),
            }
        }
    }
}

/// Drop query and fragment
pub fn strip_query_hash(url: &str) -> String {
    normalize(url, IdentityMode::StripQuery)
}

/// Lowercase file extension of the URL path, or an empty string
pub fn extension_of(url: &str) -> String {
    let clean = strip_query_hash(url);
    TRAILING_EXTENSION
        .captures(&clean)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Two-label base domain used to key the allow-list
pub fn base_domain(host: &str) -> String {
    let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() {
        return String::new();
    }

    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() <= 2 {
        host
    } else {
        parts[parts.len() - 2..].join(".")
    }
}

/// Host of a URL, if it has one
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
}

fn split_naive(url: &str) -> (&str, Option<&str>) {
    let without_hash = url.split('#').next().unwrap_or("");
    match without_hash.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (without_hash, None),
    }
}

fn strip_extension(path: &str) -> &str {
    let segment_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match TRAILING_EXTENSION.find(&path[segment_start..]) {
        Some(m) => &path[..segment_start + m.start()],
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_modes() {
        let url = "https://cdn.example.com/img/shoe.jpg?w=300#zoom";
        assert_eq!(
            normalize(url, IdentityMode::StripQuery),
            "https://cdn.example.com/img/shoe.jpg"
        );
        assert_eq!(
            normalize(url, IdentityMode::KeepQuery),
            "https://cdn.example.com/img/shoe.jpg?w=300"
        );
    }

    #[test]
    fn test_normalize_falls_back_on_unparseable_input() {
        assert_eq!(
            normalize("/relative/shoe.png?v=2#top", IdentityMode::StripQuery),
            "/relative/shoe.png"
        );
        assert_eq!(
            normalize("/relative/shoe.png?v=2#top", IdentityMode::KeepQuery),
            "/relative/shoe.png?v=2"
        );
        assert_eq!(normalize("", IdentityMode::StripQuery), "");
    }

    #[test]
    fn test_identity_key_ignores_extension() {
        let png = identity_key("https://x.com/p/shoe.png", IdentityMode::StripQuery);
        let jpg = identity_key("https://x.com/p/shoe.jpg?fmt=small", IdentityMode::StripQuery);
        assert_eq!(png, jpg);
        assert_eq!(png, "https://x.com/p/shoe");

        let a = identity_key("https://x.com/p/shoe.jpg?v=1", IdentityMode::KeepQuery);
        let b = identity_key("https://x.com/p/shoe.jpg?v=2", IdentityMode::KeepQuery);
        assert_ne!(a, b);
    }

    #[test]
    fn test_identity_key_only_touches_last_segment() {
        let key = identity_key("https://x.com/v1.2/images/front", IdentityMode::StripQuery);
        assert_eq!(key, "https://x.com/v1.2/images/front");
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("https://x.com/a/B.JPG?x=1"), "jpg");
        assert_eq!(extension_of("https://x.com/a/b.webp#frag"), "webp");
        assert_eq!(extension_of("https://x.com/a/b"), "");
        assert_eq!(extension_of("https://x.com/a/b.verylongext"), "");
        assert_eq!(extension_of("not a url/pic.avif?x"), "avif");
    }

    #[test]
    fn test_base_domain() {
        assert_eq!(base_domain("shop.example.com"), "example.com");
        assert_eq!(base_domain("a.b.example.com"), "example.com");
        assert_eq!(base_domain("example.com"), "example.com");
        assert_eq!(base_domain("localhost"), "localhost");
        assert_eq!(base_domain(""), "");
    }
}
