//! Cheap URL and size heuristics that decide what is worth looking at.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Config;
use crate::normalize::extension_of;
use crate::types::Dimensions;

/// Extensions accepted for emission
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "avif"];

/// Additional extensions accepted when `extended_formats` is on
pub const EXTENDED_EXTENSIONS: &[&str] = &["tiff", "tif", "heic", "gif"];

/// Lowercase substrings that mark a URL as a non-product asset
pub const URL_BLOCKLIST: &[&str] = &[
    "klarna",
    "trygg",
    "trustly",
    "facebook",
    "google",
    "doubleclick",
    "avatar",
    "icon",
    "logo",
    "placeholder",
    "sprite",
    "analytics",
    "badge",
    "tracking",
];

static STANDARD_EXTENSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.(?:jpe?g|png|webp|avif)(?:$|[?#])").expect("valid pattern"));

static DECORATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"sprite|icon|logo|svg").expect("valid pattern"));

static SIZE_IN_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_(\d{1,3})x(\d{1,3})\.").expect("valid pattern"));

static THIRD_PARTY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"klarna|trygg|facebook|google|doubleclick|analytics").expect("valid pattern")
});

/// Harvest-time filter applied to every discovered URL
pub fn is_allowed_candidate(url: &str, allow_no_extension: bool) -> bool {
    if url.is_empty() {
        return false;
    }
    let lower = url.to_lowercase();
    if lower.starts_with("data:") {
        return false;
    }

    if !allow_no_extension && !STANDARD_EXTENSION.is_match(&lower) {
        return false;
    }

    if DECORATION.is_match(&lower) {
        return false;
    }

    // Filenames that announce a thumbnail size such as _150x150.
    if let Some(caps) = SIZE_IN_NAME.captures(&lower) {
        let width: u32 = caps[1].parse().unwrap_or(0);
        let height: u32 = caps[2].parse().unwrap_or(0);
        if width <= 300 && height <= 300 {
            return false;
        }
    }

    !THIRD_PARTY.is_match(&lower)
}

/// Emission-time filter on the source URL
pub fn is_allowed_source(url: &str, config: &Config) -> bool {
    let ext = extension_of(url);
    let known = ALLOWED_EXTENSIONS.contains(&ext.as_str())
        || (config.extended_formats && EXTENDED_EXTENSIONS.contains(&ext.as_str()));
    if !known {
        return false;
    }

    let lower = url.to_lowercase();
    !URL_BLOCKLIST.iter().any(|s| lower.contains(s))
}

/// Is the image big enough to be a product photo
pub fn is_big(dims: Dimensions) -> bool {
    let (w, h) = (dims.width, dims.height);
    if w == 0 || h == 0 {
        return false;
    }
    if w >= 650 && h >= 650 {
        return true;
    }
    if (w >= 1000 && h >= 350) || (h >= 1000 && w >= 350) {
        return true;
    }
    dims.area() >= 280_000
}
