//! Rewrite rules that guess a higher-resolution variant of a harvested URL.
//!
//! Rules run in order on a working copy of each URL, so a later rule sees the
//! output of an earlier one. The engine only ever adds URLs; the inputs are
//! always part of the output.

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::error::{Error, Result};

/// Query appended when a size-stripping rule left other parameters behind
pub const HIGH_RES_QUERY: &str = "?w=2000&h=2000&quality=100";

/// A single pattern -> replacement rule
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pattern: Regex,
    replacement: String,

    /// Rule removes size parameters rather than substituting them
    strips: bool,
}

impl RewriteRule {
    /// Substituting rule; `replacement` uses `${n}` group references
    pub fn new(pattern: &str, replacement: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| Error::Configuration(format!("Invalid rewrite pattern: {}", e)))?;
        Ok(Self {
            pattern,
            replacement: replacement.to_string(),
            strips: false,
        })
    }

    /// Rule that deletes every match
    pub fn stripping(pattern: &str) -> Result<Self> {
        let mut rule = Self::new(pattern, "")?;
        rule.strips = true;
        Ok(rule)
    }

    /// Apply the rule, returning `None` when the pattern does not match
    fn apply(&self, url: &str) -> Option<String> {
        if !self.pattern.is_match(url) {
            return None;
        }
        Some(
            self.pattern
                .replace_all(url, self.replacement.as_str())
                .into_owned(),
        )
    }
}

static DEFAULT_RULES: Lazy<Vec<RewriteRule>> = Lazy::new(|| {
    let rules = [
        // Vendor size token at the end of the query, e.g. ?$684_547_PNG$
        RewriteRule::new(r"\?\$[^$]+\$$", "?$$Q90_2052_1641_JPG$$"),
        // /product/112x63/ path segment
        RewriteRule::new(r"/product/\d+x\d+/", "/product/1600x900/"),
        // name_100x100.jpg
        RewriteRule::new(r"_\d+x\d+\.(jpe?g|png|webp|avif)", ".${1}"),
        // name-small.jpg, name-300w.jpg
        RewriteRule::new(
            r"-(small|thumb|thumbnail|150w|300w)\.(jpe?g|png|webp|avif)",
            "-large.${2}",
        ),
        RewriteRule::new(r"/thumb/", "/original/"),
        // ?w=150&h=150
        RewriteRule::stripping(r"[?&](w|width|h|height)=\d+"),
    ];
    rules
        .into_iter()
        .map(|rule| rule.expect("built-in rewrite rules are valid"))
        .collect()
});

/// Result of running every rule over one URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    /// Working copy after all rules
    pub rewritten: String,

    /// Extra variant carrying `HIGH_RES_QUERY`, if a stripping rule fired
    pub high_res: Option<String>,
}

/// A URL produced by `expand_tagged`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    pub url: String,

    /// Not among the inputs: a guessed higher-resolution variant
    pub derived: bool,
}

/// Ordered rule list
#[derive(Debug, Clone)]
pub struct RewriteEngine {
    rules: Vec<RewriteRule>,
}

impl Default for RewriteEngine {
    fn default() -> Self {
        Self {
            rules: DEFAULT_RULES.clone(),
        }
    }
}

impl RewriteEngine {
    pub fn new(rules: Vec<RewriteRule>) -> Self {
        Self { rules }
    }

    /// Run every rule over `url`
    pub fn rewrite(&self, url: &str) -> Rewrite {
        let mut current = url.to_string();
        let mut stripped = false;

        for rule in &self.rules {
            if let Some(next) = rule.apply(&current) {
                stripped |= rule.strips;
                current = next;
            }
        }

        if stripped {
            current = repair_query(current);
        }

        let high_res = match current.split_once('?') {
            Some((base, _)) if stripped => Some(format!("{}{}", base, HIGH_RES_QUERY)),
            _ => None,
        };

        Rewrite {
            rewritten: current,
            high_res,
        }
    }

    /// Union of the inputs and every derived variant, first-seen order
    pub fn expand(&self, urls: &[String]) -> Vec<String> {
        self.expand_tagged(urls).into_iter().map(|e| e.url).collect()
    }

    /// Like `expand`, marking which URLs were not part of the input
    pub fn expand_tagged(&self, urls: &[String]) -> Vec<Expansion> {
        let inputs: HashSet<&str> = urls.iter().map(String::as_str).collect();
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();

        let mut push = |url: String, out: &mut Vec<Expansion>| {
            if seen.insert(url.clone()) {
                let derived = !inputs.contains(url.as_str());
                out.push(Expansion { url, derived });
            }
        };

        for url in urls {
            push(url.clone(), &mut out);

            let rewrite = self.rewrite(url);
            if rewrite.rewritten != *url {
                debug!("Rewrote {} -> {}", url, rewrite.rewritten);
            }
            push(rewrite.rewritten, &mut out);
            if let Some(high_res) = rewrite.high_res {
                push(high_res, &mut out);
            }
        }

        out
    }
}

/// Turn `a.jpg&q=80` (left behind by removing `?w=..`) back into `a.jpg?q=80`
fn repair_query(url: String) -> String {
    if url.contains('?') {
        return url;
    }
    match url.find('&') {
        Some(i) => format!("{}?{}", &url[..i], &url[i + 1..]),
        None => url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> RewriteEngine {
        RewriteEngine::default()
    }

    #[test]
    fn test_vendor_size_token() {
        let r = engine().rewrite("https://img.example.com/is/image/p/front?$684_547_PNG$");
        assert_eq!(
            r.rewritten,
            "https://img.example.com/is/image/p/front?$Q90_2052_1641_JPG$"
        );
        assert_eq!(r.high_res, None);
    }

    #[test]
    fn test_path_size_segment() {
        let r = engine().rewrite("https://cdn.example.se/product/112x63/abc.jpg");
        assert_eq!(r.rewritten, "https://cdn.example.se/product/1600x900/abc.jpg");
    }

    #[test]
    fn test_rules_are_cumulative() {
        let r = engine().rewrite("https://x.com/thumb/shoe_100x100.png");
        assert_eq!(r.rewritten, "https://x.com/original/shoe.png");

        let r = engine().rewrite("https://x.com/thumb/shoe-small.webp");
        assert_eq!(r.rewritten, "https://x.com/original/shoe-large.webp");
    }

    #[test]
    fn test_strip_size_parameters() {
        let r = engine().rewrite("https://x.com/a.jpg?w=150&h=150");
        assert_eq!(r.rewritten, "https://x.com/a.jpg");
        assert_eq!(r.high_res, None);
    }

    #[test]
    fn test_strip_keeps_other_parameters_and_adds_high_res() {
        let r = engine().rewrite("https://x.com/a.jpg?w=150&q=80");
        assert_eq!(r.rewritten, "https://x.com/a.jpg?q=80");
        assert_eq!(
            r.high_res.as_deref(),
            Some("https://x.com/a.jpg?w=2000&h=2000&quality=100")
        );
    }

    #[test]
    fn test_untouched_url() {
        let url = "https://x.com/gallery/main.jpg";
        let r = engine().rewrite(url);
        assert_eq!(r.rewritten, url);
        assert_eq!(r.high_res, None);
    }

    #[test]
    fn test_expand_is_inclusive() {
        let inputs: Vec<String> = vec![
            "https://x.com/a_200x200.jpg".into(),
            "https://x.com/b.png".into(),
            "https://x.com/c.jpg?width=90&v=3".into(),
        ];
        let out = engine().expand(&inputs);
        for input in &inputs {
            assert!(out.contains(input), "missing {input}");
        }
        assert!(out.contains(&"https://x.com/a.jpg".to_string()));
        assert!(out.contains(&"https://x.com/c.jpg?v=3".to_string()));
        assert!(out.contains(&"https://x.com/c.jpg?w=2000&h=2000&quality=100".to_string()));
        assert_eq!(out.len(), 6);
    }

    #[test]
    fn test_expand_is_stable_on_its_own_output() {
        let inputs: Vec<String> = vec!["https://x.com/thumb/a-small.jpg".into()];
        let once = engine().expand(&inputs);
        let twice = engine().expand(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_expand_tagged_marks_derived() {
        let inputs: Vec<String> = vec![
            "https://x.com/thumb/a.jpg".into(),
            "https://x.com/original/a.jpg".into(),
        ];
        let out = engine().expand_tagged(&inputs);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|e| !e.derived));

        let out = engine().expand_tagged(&inputs[..1]);
        assert_eq!(out.len(), 2);
        assert!(out[1].derived);
        assert_eq!(out[1].url, "https://x.com/original/a.jpg");
    }

    #[test]
    fn test_custom_rule_validation() {
        assert!(RewriteRule::new("(unclosed", "x").is_err());
        let engine = RewriteEngine::new(vec![RewriteRule::new("/s/", "/l/").unwrap()]);
        assert_eq!(engine.rewrite("https://x.com/s/a.jpg").rewritten, "https://x.com/l/a.jpg");
    }
}
