//! Collapse URLs that point at the same picture in different shapes.
//!
//! URLs are grouped by identity key. Within a group the URL with the best
//! format rank survives; the output keeps the position where each group was
//! first seen.

use std::collections::HashMap;

use crate::config::IdentityMode;
use crate::normalize::{extension_of, identity_key, normalize};
use crate::types::{Candidate, ImageFormat};

fn format_rank(url: &str) -> u8 {
    ImageFormat::from_extension(&extension_of(url)).rank()
}

/// Keep one URL per identity key; equal ranks keep the first seen
pub fn dedupe_urls(urls: &[String], mode: IdentityMode) -> Vec<String> {
    collapse_by(urls, |url| identity_key(url, mode))
}

/// Keep one URL per normalized address.
///
/// Unlike [`dedupe_urls`] the extension is part of the key, so a user who
/// picked both `a.jpg` and `a.png` gets both.
pub fn dedupe_selection(urls: &[String], mode: IdentityMode) -> Vec<String> {
    collapse_by(urls, |url| normalize(url, mode))
}

fn collapse_by<F>(urls: &[String], key_of: F) -> Vec<String>
where
    F: Fn(&str) -> String,
{
    let mut slots: Vec<&String> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for url in urls {
        let key = key_of(url);
        match by_key.get(&key) {
            Some(&slot) => {
                if format_rank(url) > format_rank(slots[slot]) {
                    slots[slot] = url;
                }
            }
            None => {
                by_key.insert(key, slots.len());
                slots.push(url);
            }
        }
    }

    slots.into_iter().cloned().collect()
}

/// Keep one candidate per identity key.
///
/// Equal ranks prefer the larger measured area, then the smaller URL.
pub fn dedupe_candidates(candidates: &[Candidate], mode: IdentityMode) -> Vec<Candidate> {
    let mut slots: Vec<&Candidate> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for candidate in candidates {
        let key = identity_key(&candidate.url, mode);
        match by_key.get(&key) {
            Some(&slot) => {
                if beats(candidate, slots[slot]) {
                    slots[slot] = candidate;
                }
            }
            None => {
                by_key.insert(key, slots.len());
                slots.push(candidate);
            }
        }
    }

    slots.into_iter().cloned().collect()
}

fn beats(challenger: &Candidate, incumbent: &Candidate) -> bool {
    let (a, b) = (format_rank(&challenger.url), format_rank(&incumbent.url));
    if a != b {
        return a > b;
    }
    let (a, b) = (challenger.dimensions.area(), incumbent.dimensions.area());
    if a != b {
        return a > b;
    }
    challenger.url < incumbent.url
}
