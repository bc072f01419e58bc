//! The ranked view handed to whoever picks the images.

use std::cmp::Reverse;

use crate::config::Config;
use crate::dedup::dedupe_candidates;
use crate::filters::is_big;
use crate::types::Candidate;

/// Apply the view toggles and sort best-first
pub fn present(candidates: &[Candidate], config: &Config) -> Vec<Candidate> {
    let subset: Vec<Candidate> = if config.only_large {
        candidates
            .iter()
            .filter(|c| is_big(c.dimensions))
            .cloned()
            .collect()
    } else {
        candidates.to_vec()
    };

    let mut view = if config.hide_duplicates {
        dedupe_candidates(&subset, config.identity_mode)
    } else {
        subset
    };

    view.sort_by(|a, b| {
        (a.priority, a.document_order, Reverse(a.dimensions.area()), &a.url).cmp(&(
            b.priority,
            b.document_order,
            Reverse(b.dimensions.area()),
            &b.url,
        ))
    });
    view
}
