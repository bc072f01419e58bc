//! Document-level image signals that are not tied to a single element.

use log::{debug, trace};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

static NOSCRIPT_IMG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<img[^>]+src=["']([^"']+)["']"#).expect("valid pattern")
});

static SCRIPT_IMAGE_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)https?://[^"'\s<>]+\.(?:jpe?g|png|webp|avif)"#).expect("valid pattern")
});

/// Scripts shorter than this are not worth scanning
const MIN_SCRIPT_LEN: usize = 100;

fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(sel) => Some(sel),
        Err(e) => {
            debug!("Skipping selector {}: {:?}", css, e);
            None
        }
    }
}

/// Raw values of every document-level signal, in a fixed source order
pub fn document_sources(doc: &Html) -> Vec<String> {
    let mut out = Vec::new();
    out.extend(meta_images(doc));
    out.extend(link_hints(doc));
    out.extend(json_ld_images(doc));
    out.extend(noscript_images(doc));
    out.extend(script_literals(doc));
    out
}

/// og:image, twitter:image and itemprop=image meta tags
pub fn meta_images(doc: &Html) -> Vec<String> {
    let Some(sel) = selector(
        r#"meta[property="og:image"], meta[name="og:image"], meta[property="twitter:image"], meta[name="twitter:image"], meta[itemprop="image"]"#,
    ) else {
        return Vec::new();
    };

    doc.select(&sel)
        .filter_map(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

/// Preloaded images and `image_src` link hints
pub fn link_hints(doc: &Html) -> Vec<String> {
    let Some(sel) = selector(r#"link[rel~="preload"][as="image"], link[rel~="image_src"]"#) else {
        return Vec::new();
    };

    doc.select(&sel)
        .filter_map(|el| el.value().attr("href"))
        .map(|h| h.to_string())
        .collect()
}

/// `image` and `offers.image` values of every JSON-LD block
pub fn json_ld_images(doc: &Html) -> Vec<String> {
    let mut out = Vec::new();
    for value in json_ld_blocks(doc) {
        walk_json_ld(&value, &mut |obj| {
            if let Some(image) = obj.get("image") {
                collect_image_values(image, &mut out);
            }
            match obj.get("offers") {
                Some(Value::Object(offer)) => {
                    if let Some(image) = offer.get("image") {
                        collect_image_values(image, &mut out);
                    }
                }
                Some(Value::Array(offers)) => {
                    for offer in offers {
                        if let Some(image) = offer.get("image") {
                            collect_image_values(image, &mut out);
                        }
                    }
                }
                _ => {}
            }
        });
    }
    out
}

/// First `<img src>` of each noscript fallback
pub fn noscript_images(doc: &Html) -> Vec<String> {
    let Some(noscript) = selector("noscript") else {
        return Vec::new();
    };
    let img = selector("img[src]");

    let mut out = Vec::new();
    for el in doc.select(&noscript) {
        // With scripting on, the fallback body is kept as raw text.
        let text: String = el.text().collect();
        if let Some(caps) = NOSCRIPT_IMG.captures(&text) {
            out.push(caps[1].to_string());
            continue;
        }

        if let Some(src) = img
            .as_ref()
            .and_then(|sel| el.select(sel).next())
            .and_then(|i| i.value().attr("src"))
        {
            out.push(src.to_string());
        }
    }
    out
}

/// Bare image URL literals inside inline scripts
pub fn script_literals(doc: &Html) -> Vec<String> {
    let Some(sel) = selector("script") else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for script in doc.select(&sel) {
        if script.value().attr("src").is_some() {
            continue;
        }
        let text: String = script.text().collect();
        if text.chars().count() <= MIN_SCRIPT_LEN {
            continue;
        }
        out.extend(
            SCRIPT_IMAGE_LITERAL
                .find_iter(&text)
                .map(|m| m.as_str().to_string()),
        );
    }
    trace!("Found {} script image literals", out.len());
    out
}

/// Product name from JSON-LD, then the first heading, then the title
pub fn product_name(doc: &Html) -> String {
    let mut from_ld: Option<String> = None;
    for value in json_ld_blocks(doc) {
        walk_json_ld(&value, &mut |obj| {
            if from_ld.is_some() || !is_product(obj.get("@type")) {
                return;
            }
            if let Some(Value::String(name)) = obj.get("name") {
                let name = name.trim();
                if !name.is_empty() {
                    from_ld = Some(name.to_string());
                }
            }
        });
        if from_ld.is_some() {
            break;
        }
    }
    if let Some(name) = from_ld {
        return name;
    }

    for css in ["h1", "title"] {
        if let Some(sel) = selector(css) {
            if let Some(el) = doc.select(&sel).next() {
                let text = el.text().collect::<Vec<_>>().join(" ");
                let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
                if !text.is_empty() {
                    return text;
                }
            }
        }
    }

    String::new()
}

fn json_ld_blocks(doc: &Html) -> Vec<Value> {
    let Some(sel) = selector(r#"script[type="application/ld+json"]"#) else {
        return Vec::new();
    };

    doc.select(&sel)
        .filter_map(|el| {
            let text: String = el.text().collect();
            match serde_json::from_str::<Value>(text.trim()) {
                Ok(value) => Some(value),
                Err(e) => {
                    debug!("Ignoring malformed JSON-LD block: {}", e);
                    None
                }
            }
        })
        .collect()
}

/// Visit every object of a JSON-LD value, descending into arrays and `@graph`
fn walk_json_ld(value: &Value, visit: &mut dyn FnMut(&serde_json::Map<String, Value>)) {
    match value {
        Value::Array(items) => {
            for item in items {
                walk_json_ld(item, visit);
            }
        }
        Value::Object(obj) => {
            visit(obj);
            if let Some(graph) = obj.get("@graph") {
                walk_json_ld(graph, visit);
            }
        }
        _ => {}
    }
}

fn collect_image_values(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => {
            for item in items {
                collect_image_values(item, out);
            }
        }
        Value::Object(obj) => {
            if let Some(Value::String(url)) = obj.get("url").or_else(|| obj.get("contentUrl")) {
                out.push(url.clone());
            }
        }
        _ => {}
    }
}

fn is_product(kind: Option<&Value>) -> bool {
    match kind {
        Some(Value::String(s)) => s == "Product",
        Some(Value::Array(items)) => items.iter().any(|v| v.as_str() == Some("Product")),
        _ => false,
    }
}
