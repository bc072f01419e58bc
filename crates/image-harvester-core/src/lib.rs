//! Core functionality for harvesting product images from a rendered page.
//!
//! This library provides the components of the harvesting pipeline:
//! - Candidate discovery from element, metadata and script signals
//! - High-resolution URL guessing and priority ranking
//! - Measurement and same-picture deduplication
//! - Rendering onto a uniform square canvas and sequential emission

// -- External Dependencies --
use log::{debug, info};
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::time::Instant;

// -- Internal Modules --
mod error;

// -- Public Re-exports --
pub use config::*;
pub use error::{Error, Result};
pub use types::*;

// -- Public Modules --
pub mod config;
pub mod context;
pub mod dedup;
pub mod emit;
pub mod filters;
pub mod harvest;
pub mod heif;
pub mod logging;
pub mod measure;
pub mod net;
pub mod normalize;
pub mod presentation;
pub mod ranking;
pub mod render;
pub mod rewrite;
pub mod sink;
pub mod types;

use context::RunContext;
use emit::{EmitReport, EmitRequest, Emitter, Fetcher};
use measure::Prober;
use ranking::RegionRanker;
use rewrite::RewriteEngine;
use sink::Sink;

/// Candidates found in one or more documents of a page
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Discovery {
    pub candidates: Vec<Candidate>,
    pub product_name: String,
}

impl Discovery {
    /// Fold in the result of another frame; the first non-empty name wins
    pub fn merge(&mut self, other: Discovery) {
        let mut set: CandidateSet = std::mem::take(&mut self.candidates).into_iter().collect();
        set.merge(other.candidates.into_iter().collect());
        self.candidates = set.into_vec();

        if self.product_name.is_empty() {
            self.product_name = other.product_name;
        }
    }
}

/// Main entry point for the harvesting pipeline
pub struct ImageHarvester {
    context: RunContext,
    rewrite: RewriteEngine,
    ranker: RegionRanker,
}

impl ImageHarvester {
    /// Create a new ImageHarvester for an initialized run
    pub fn new(context: RunContext) -> Self {
        let ranker = RegionRanker::from_config(context.config());
        Self {
            context,
            rewrite: RewriteEngine::default(),
            ranker,
        }
    }

    pub fn with_rewrite_engine(mut self, engine: RewriteEngine) -> Self {
        self.rewrite = engine;
        self
    }

    pub fn context(&self) -> &RunContext {
        &self.context
    }

    pub fn config(&self) -> &Config {
        self.context.config()
    }

    /// Harvest, expand, rank and measure the candidates of one document
    pub fn discover(&self, html: &str, page_url: &str, prober: &dyn Prober) -> Result<Discovery> {
        if !self.context.is_active() {
            info!("Harvesting is not enabled for {}", page_url);
            return Ok(Discovery::default());
        }

        let start = Instant::now();
        let config = self.config();
        let doc = Html::parse_document(html);
        let harvest = harvest::harvest(&doc, page_url);

        // Harvest filter
        let sightings: Vec<_> = harvest
            .sightings
            .iter()
            .filter(|s| filters::is_allowed_candidate(&s.url, config.allow_no_extension))
            .collect();
        let provenance: HashMap<&str, Option<ProvenanceRef>> = sightings
            .iter()
            .map(|s| (s.url.as_str(), s.provenance))
            .collect();
        let urls: Vec<String> = sightings.iter().map(|s| s.url.clone()).collect();
        info!(
            "Harvested {} candidates ({} filtered out)",
            urls.len(),
            harvest.sightings.len() - urls.len()
        );

        // Expand with guessed high-resolution variants
        let mut set = CandidateSet::new();
        let mut derived = Vec::new();
        for expansion in self.rewrite.expand_tagged(&urls) {
            let mut candidate = Candidate::new(expansion.url.clone());
            if expansion.derived {
                derived.push(expansion.url);
            } else if let Some(node) = provenance.get(expansion.url.as_str()).copied().flatten() {
                candidate.provenance = Some(node);
                candidate.record_order(node.0);
            }

            let element = candidate.provenance.and_then(|p| harvest.nodes.get(p));
            self.ranker.rank(&mut candidate, element);
            set.observe(candidate);
        }
        debug!("{} candidates after expansion, {} derived", set.len(), derived.len());

        // Measure
        let cancel = self.context.cancel_flag();
        let all_urls: Vec<String> = set.iter().map(|c| c.url.clone()).collect();
        let dims = measure::measure_all(
            &all_urls,
            prober,
            config.measure_limit,
            config.effective_probe_threads(),
            &cancel,
        )?;
        for (url, dims) in all_urls.iter().zip(dims) {
            if let Some(candidate) = set.get_mut(url) {
                candidate.record_dimensions(dims);
            }
        }

        // Trust guesses that turn out to exist and be large
        let mut validated = 0;
        for url in &derived {
            if cancel.load(Ordering::SeqCst) {
                break;
            }
            if let Some(candidate) = set.get_mut(url) {
                if ranking::validate_guess(candidate, prober) {
                    validated += 1;
                }
            }
        }

        info!(
            "Discovered {} candidates ({} validated guesses) in {:.2?}",
            set.len(),
            validated,
            start.elapsed()
        );

        Ok(Discovery {
            candidates: set.into_vec(),
            product_name: harvest.product_name,
        })
    }

    /// Ranked, filtered view of `candidates`
    pub fn present(&self, candidates: &[Candidate]) -> Vec<Candidate> {
        presentation::present(candidates, self.config())
    }

    /// Emit the selected sources in order
    pub fn emit(
        &self,
        request: &EmitRequest,
        fetcher: &dyn Fetcher,
        sink: &mut dyn Sink,
        show_progress: bool,
    ) -> EmitReport {
        Emitter::new(self.config().clone(), self.context.cancel_flag())
            .show_progress(show_progress)
            .emit(request, fetcher, sink)
    }
}
