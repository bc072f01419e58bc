//! Provenance-based priority assignment.

use log::{debug, warn};
use scraper::{ElementRef, Selector};

use crate::config::Config;
use crate::measure::Prober;
use crate::types::{Candidate, DEFAULT_PRIORITY};

/// Priority for URLs inside the product gallery
pub const GALLERY_PRIORITY: u8 = 1;

/// Priority for URLs inside description or content areas
pub const CONTENT_PRIORITY: u8 = 2;

/// Priority for sidebars and recommendation blocks
pub const SIDEBAR_PRIORITY: u8 = 3;

/// Priority of a validated high-resolution guess
pub const VALIDATED_PRIORITY: u8 = 0;

/// Minimum area (1200 x 400) for a guess to be trusted
pub const VALIDATED_MIN_AREA: u64 = 1200 * 400;

/// Compiled region matchers
#[derive(Debug, Clone)]
pub struct RegionRanker {
    gallery: Vec<Selector>,
    content: Vec<Selector>,
    sidebar: Vec<Selector>,
}

impl RegionRanker {
    pub fn from_config(config: &Config) -> Self {
        Self {
            gallery: compile(&config.gallery_selectors),
            content: compile(&config.content_selectors),
            sidebar: compile(&config.sidebar_selectors),
        }
    }

    /// Priority of a URL first referenced by `node`
    pub fn assign(&self, node: Option<ElementRef<'_>>) -> u8 {
        let Some(node) = node else {
            return DEFAULT_PRIORITY;
        };

        if within(node, &self.gallery) {
            GALLERY_PRIORITY
        } else if within(node, &self.content) {
            CONTENT_PRIORITY
        } else if within(node, &self.sidebar) {
            SIDEBAR_PRIORITY
        } else {
            DEFAULT_PRIORITY
        }
    }

    /// Apply the region priority to a candidate
    pub fn rank(&self, candidate: &mut Candidate, node: Option<ElementRef<'_>>) {
        candidate.improve_priority(self.assign(node));
    }
}

fn compile(selectors: &[String]) -> Vec<Selector> {
    selectors
        .iter()
        .filter(|css| !css.trim().is_empty())
        .filter_map(|css| match Selector::parse(css) {
            Ok(sel) => Some(sel),
            Err(e) => {
                warn!("Ignoring invalid region selector {:?}: {:?}", css, e);
                None
            }
        })
        .collect()
}

/// Does `node` or any of its ancestors match one of `selectors`
fn within(node: ElementRef<'_>, selectors: &[Selector]) -> bool {
    if selectors.is_empty() {
        return false;
    }

    let mut current = Some(node);
    while let Some(el) = current {
        if selectors.iter().any(|sel| sel.matches(&el)) {
            return true;
        }
        current = el.parent().and_then(ElementRef::wrap);
    }
    false
}

/// Promote a guessed URL to priority 0 if it exists and is large enough.
///
/// Returns whether the candidate was promoted.
pub fn validate_guess(candidate: &mut Candidate, prober: &dyn Prober) -> bool {
    // A measured size already proves the URL exists.
    if candidate.dimensions.area() == 0 {
        if !prober.exists(&candidate.url) {
            debug!("Guess {} does not exist", candidate.url);
            return false;
        }
        let dims = prober.measure(&candidate.url);
        candidate.record_dimensions(dims);
    }

    let dims = candidate.dimensions;
    if dims.area() >= VALIDATED_MIN_AREA {
        candidate.improve_priority(VALIDATED_PRIORITY);
        debug!("Validated guess {} ({}x{})", candidate.url, dims.width, dims.height);
        true
    } else {
        false
    }
}
