//! Candidate harvesting from a rendered HTML document.
//!
//! The harvester walks the element tree once, numbering every element in
//! document order. Each element that references an image becomes the
//! provenance node of the URLs it is the first to mention, including
//! backgrounds assigned to it by `<style>` rules. Document-level
//! signals (meta tags, link hints, JSON-LD, noscript fallbacks and script
//! literals) are collected separately and carry no provenance node.

pub mod metadata;

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

use crate::types::ProvenanceRef;

/// Attributes that lazy-loading scripts use to hold the real source
pub const LAZY_ATTRIBUTES: &[&str] = &[
    "data-desktop-src",
    "data-full-img",
    "data-src",
    "data-original",
    "data-lazy",
    "data-zoom",
    "data-large",
    "data-full",
    "data-fancybox",
    "data-image",
    "data-img",
    "data-photo",
];

static CSS_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"url\(\s*(?:"([^"]+)"|'([^']+)'|([^)]+))\s*\)"#).expect("valid pattern")
});

static CSS_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([^{}]+)\{([^{}]*)\}").expect("valid pattern"));

static IMAGE_HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\.(?:jpe?g|png|webp|avif)(?:$|[?#])").expect("valid pattern")
});

/// Flat table of the elements visited by the walk, indexed by document order.
///
/// It borrows the parsed document, so it cannot outlive a discovery pass.
pub struct NodeTable<'a> {
    nodes: Vec<ElementRef<'a>>,
}

impl<'a> NodeTable<'a> {
    pub fn get(&self, node: ProvenanceRef) -> Option<ElementRef<'a>> {
        self.nodes.get(node.0).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A URL together with the element that first referenced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sighting {
    pub url: String,

    /// `None` for document-level signals
    pub provenance: Option<ProvenanceRef>,
}

/// Everything a single walk over the document produced
pub struct Harvest<'a> {
    pub nodes: NodeTable<'a>,

    /// Element-referenced URLs in walk order, then document-level URLs
    pub sightings: Vec<Sighting>,

    /// Best guess at the product name
    pub product_name: String,
}

impl Harvest<'_> {
    pub fn urls(&self) -> Vec<String> {
        self.sightings.iter().map(|s| s.url.clone()).collect()
    }
}

/// Resolves raw attribute values against the document base
#[derive(Debug, Clone)]
pub struct Resolver {
    base: Option<Url>,
}

impl Resolver {
    /// Base from `<base href>` when present, otherwise the page URL
    pub fn for_document(doc: &Html, page_url: &str) -> Self {
        let mut base = Url::parse(page_url).ok();
        if let Ok(sel) = Selector::parse("base[href]") {
            if let Some(href) = doc.select(&sel).next().and_then(|el| el.value().attr("href")) {
                let declared = match &base {
                    Some(page) => page.join(href.trim()).ok(),
                    None => Url::parse(href.trim()).ok(),
                };
                if declared.is_some() {
                    base = declared;
                }
            }
        }
        Self { base }
    }

    /// Absolute http(s) URL for a raw value, or `None`
    pub fn resolve(&self, raw: &str) -> Option<String> {
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with("data:") {
            return None;
        }

        // Protocol-relative URLs are completed to https.
        let completed;
        let raw = if raw.starts_with("//") {
            completed = format!("https:{}", raw);
            completed.as_str()
        } else {
            raw
        };

        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(_) => self.base.as_ref()?.join(raw).ok()?,
        };

        match url.scheme() {
            "http" | "https" => Some(url.to_string()),
            _ => None,
        }
    }
}

/// Walk `doc` and collect every image URL it references
pub fn harvest<'a>(doc: &'a Html, page_url: &str) -> Harvest<'a> {
    let resolver = Resolver::for_document(doc, page_url);
    let styled = stylesheet_backgrounds(doc);
    let mut nodes = Vec::new();
    let mut sightings: Vec<Sighting> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for node in doc.root_element().descendants() {
        let Some(el) = ElementRef::wrap(node) else {
            continue;
        };
        let order = nodes.len();
        nodes.push(el);

        let mut sources = element_sources(&el);
        for (selector, urls) in &styled {
            if selector.matches(&el) {
                sources.extend(urls.iter().cloned());
            }
        }

        for raw in sources {
            let Some(url) = resolver.resolve(&raw) else {
                continue;
            };
            if seen.insert(url.clone()) {
                sightings.push(Sighting {
                    url,
                    provenance: Some(ProvenanceRef(order)),
                });
            }
        }
    }

    let element_count = sightings.len();
    for raw in metadata::document_sources(doc) {
        let Some(url) = resolver.resolve(&raw) else {
            continue;
        };
        if seen.insert(url.clone()) {
            sightings.push(Sighting {
                url,
                provenance: None,
            });
        }
    }

    debug!(
        "Harvested {} element URLs and {} document-level URLs from {} elements",
        element_count,
        sightings.len() - element_count,
        nodes.len()
    );

    Harvest {
        nodes: NodeTable { nodes },
        sightings,
        product_name: metadata::product_name(doc),
    }
}

/// Raw URL values referenced by one element
fn element_sources(el: &ElementRef<'_>) -> Vec<String> {
    let mut out = Vec::new();
    let value = el.value();

    for attr in LAZY_ATTRIBUTES {
        if let Some(v) = value.attr(attr) {
            out.push(v.to_string());
        }
    }

    match value.name() {
        "img" => push_img_sources(el, &mut out),
        "source" => {
            if let Some(srcset) = value.attr("srcset") {
                out.extend(parse_srcset(srcset));
            }
            if let Some(src) = value.attr("src") {
                out.push(src.to_string());
            }
        }
        "a" => {
            if let Some(href) = value.attr("href") {
                if IMAGE_HREF.is_match(href) {
                    out.push(href.to_string());
                }
            }
        }
        "picture" => {
            if let Ok(sel) = Selector::parse("img") {
                if let Some(img) = el.select(&sel).next() {
                    push_img_sources(&img, &mut out);
                }
            }
        }
        _ => {}
    }

    if let Some(style) = value.attr("style") {
        out.extend(background_urls(style));
    }

    out
}

fn push_img_sources(img: &ElementRef<'_>, out: &mut Vec<String>) {
    if let Some(src) = img.value().attr("src") {
        out.push(src.to_string());
    }
    if let Some(srcset) = img.value().attr("srcset") {
        out.extend(parse_srcset(srcset));
    }
}

/// First token of every entry in a responsive source set
pub fn parse_srcset(srcset: &str) -> Vec<String> {
    srcset
        .split(',')
        .filter_map(|entry| entry.split_whitespace().next())
        .map(|url| url.to_string())
        .collect()
}

/// Background images declared by `<style>` rules, keyed by rule selector
fn stylesheet_backgrounds(doc: &Html) -> Vec<(Selector, Vec<String>)> {
    let Ok(style) = Selector::parse("style") else {
        return Vec::new();
    };

    let mut rules = Vec::new();
    for sheet in doc.select(&style) {
        let css: String = sheet.text().collect();
        for caps in CSS_RULE.captures_iter(&css) {
            let urls = background_urls(&caps[2]);
            if urls.is_empty() {
                continue;
            }
            // Pseudo-elements and at-rules do not parse; they are skipped.
            if let Ok(selector) = Selector::parse(caps[1].trim()) {
                rules.push((selector, urls));
            }
        }
    }
    rules
}

/// `url(...)` tokens of the background declarations in an inline style
pub fn background_urls(style: &str) -> Vec<String> {
    if !style.to_ascii_lowercase().contains("background") {
        return Vec::new();
    }

    CSS_URL
        .captures_iter(style)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .map(|m| m.as_str().trim().to_string())
        .filter(|u| !u.is_empty() && !u.starts_with("data:"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "https://shop.example.com/p/red-shoe";

    fn urls_of(html: &str) -> Vec<String> {
        let doc = Html::parse_document(html);
        harvest(&doc, PAGE).urls()
    }

    #[test]
    fn test_parse_srcset() {
        let entries = parse_srcset("a-320.jpg 320w, b-640.jpg 640w,c.jpg 2x, ");
        assert_eq!(entries, vec!["a-320.jpg", "b-640.jpg", "c.jpg"]);
    }

    #[test]
    fn test_background_urls() {
        let style = r#"color: red; background-image: url("/a.jpg"), url('b.png'), url(c.webp), url(data:image/png;base64,xx)"#;
        assert_eq!(background_urls(style), vec!["/a.jpg", "b.png", "c.webp"]);
        assert!(background_urls("mask: url(/m.png)").is_empty());
    }

    #[test]
    fn test_resolver() {
        let doc = Html::parse_document("<html><head></head><body></body></html>");
        let resolver = Resolver::for_document(&doc, PAGE);
        assert_eq!(
            resolver.resolve("//cdn.example.com/a.jpg").as_deref(),
            Some("https://cdn.example.com/a.jpg")
        );
        assert_eq!(
            resolver.resolve(" ../img/a.jpg ").as_deref(),
            Some("https://shop.example.com/img/a.jpg")
        );
        assert_eq!(resolver.resolve("data:image/gif;base64,R0lG"), None);
        assert_eq!(resolver.resolve("javascript:void(0)"), None);
        assert_eq!(resolver.resolve(""), None);
    }

    #[test]
    fn test_base_href_overrides_page_url() {
        let doc = Html::parse_document(
            r#"<html><head><base href="https://static.example.com/assets/"></head><body></body></html>"#,
        );
        let resolver = Resolver::for_document(&doc, PAGE);
        assert_eq!(
            resolver.resolve("a.jpg").as_deref(),
            Some("https://static.example.com/assets/a.jpg")
        );
    }

    #[test]
    fn test_element_sources() {
        let urls = urls_of(
            r#"<html><body>
                <img src="/img/a.jpg" srcset="/img/a-2x.jpg 2x, /img/a-3x.jpg 3x">
                <div data-zoom="/img/zoom.jpg" data-src="/img/lazy.jpg"></div>
                <picture><source srcset="/img/p.webp 1x"><img src="/img/p.jpg"></picture>
                <a href="/img/full.png?v=2">full</a>
                <a href="/checkout">checkout</a>
                <div style="background-image: url('/img/bg.jpg')"></div>
            </body></html>"#,
        );

        let expected = [
            "https://shop.example.com/img/a.jpg",
            "https://shop.example.com/img/a-2x.jpg",
            "https://shop.example.com/img/a-3x.jpg",
            "https://shop.example.com/img/zoom.jpg",
            "https://shop.example.com/img/lazy.jpg",
            "https://shop.example.com/img/p.jpg",
            "https://shop.example.com/img/p.webp",
            "https://shop.example.com/img/full.png?v=2",
            "https://shop.example.com/img/bg.jpg",
        ];
        for url in expected {
            assert!(urls.contains(&url.to_string()), "missing {url}");
        }
        assert!(!urls.iter().any(|u| u.ends_with("/checkout")));
    }

    #[test]
    fn test_stylesheet_backgrounds_attach_to_matching_elements() {
        let html = r#"<html><head><style>
            @media (min-width: 600px) { .hero { background: url("/img/hero.jpg") no-repeat; } }
            .swatch::before { background-image: url(/img/ignored.jpg); }
            p { color: red; }
        </style></head><body><div id="x" class="hero"></div></body></html>"#;
        let doc = Html::parse_document(html);
        let harvest = harvest(&doc, PAGE);

        let hero = harvest
            .sightings
            .iter()
            .find(|s| s.url == "https://shop.example.com/img/hero.jpg")
            .unwrap();
        let node = harvest.nodes.get(hero.provenance.unwrap()).unwrap();
        assert_eq!(node.value().id(), Some("x"));
        assert!(!harvest.urls().iter().any(|u| u.ends_with("ignored.jpg")));
    }

    #[test]
    fn test_provenance_is_first_referencing_element() {
        let html = r#"<html><body>
            <div id="first"><img src="/a.jpg"></div>
            <div id="second"><img src="/a.jpg"><img src="/b.jpg"></div>
        </body></html>"#;
        let doc = Html::parse_document(html);
        let harvest = harvest(&doc, PAGE);

        assert_eq!(harvest.sightings.len(), 2);
        let first = &harvest.sightings[0];
        let second = &harvest.sightings[1];
        assert!(first.url.ends_with("/a.jpg"));
        assert!(second.url.ends_with("/b.jpg"));

        let a_node = harvest.nodes.get(first.provenance.unwrap()).unwrap();
        let parent = ElementRef::wrap(a_node.parent().unwrap()).unwrap();
        assert_eq!(parent.value().id(), Some("first"));
        assert!(first.provenance.unwrap().0 < second.provenance.unwrap().0);
    }

    #[test]
    fn test_document_level_sources_have_no_provenance() {
        let html = r#"<html><head>
            <meta property="og:image" content="https://cdn.example.com/og.jpg">
        </head><body><img src="/a.jpg"></body></html>"#;
        let doc = Html::parse_document(html);
        let harvest = harvest(&doc, PAGE);

        let og = harvest
            .sightings
            .iter()
            .find(|s| s.url == "https://cdn.example.com/og.jpg")
            .unwrap();
        assert_eq!(og.provenance, None);
        assert_eq!(harvest.sightings.last().unwrap().url, og.url);
    }
}
