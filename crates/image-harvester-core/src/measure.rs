//! Bounded parallel measurement of candidate images.

use log::{debug, info};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use crate::error::{Error, Result};
use crate::types::Dimensions;

/// Something that can look at an image URL without downloading it for keeps
pub trait Prober: Send + Sync {
    /// Natural size of the image; any failure yields zero dimensions
    fn measure(&self, url: &str) -> Dimensions;

    /// Whether the resource answers with a success status
    fn exists(&self, url: &str) -> bool;
}

/// Measure `urls`, probing at most `limit` of them on `threads` workers.
///
/// The returned vector is parallel to `urls`. URLs past the limit, and URLs
/// reached after `cancel` was raised, get zero dimensions without a request.
pub fn measure_all(
    urls: &[String],
    prober: &dyn Prober,
    limit: usize,
    threads: usize,
    cancel: &AtomicBool,
) -> Result<Vec<Dimensions>> {
    if urls.is_empty() {
        return Ok(Vec::new());
    }

    let probed = urls.len().min(limit);
    let start = Instant::now();
    let measured_counter = AtomicUsize::new(0);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .map_err(|e| Error::Unknown(format!("Failed to set up probe pool: {}", e)))?;

    let mut results: Vec<Dimensions> = pool.install(|| {
        urls[..probed]
            .par_iter()
            .map(|url| {
                if cancel.load(Ordering::Relaxed) {
                    return Dimensions::default();
                }
                let dims = prober.measure(url);
                if dims.is_known() {
                    measured_counter.fetch_add(1, Ordering::Relaxed);
                }
                dims
            })
            .collect()
    });

    // Overflow is never probed.
    results.resize(urls.len(), Dimensions::default());

    if urls.len() > probed {
        debug!("Skipped measuring {} candidates over the limit", urls.len() - probed);
    }
    info!(
        "Measured {}/{} candidates in {:.2?}",
        measured_counter.load(Ordering::Relaxed),
        probed,
        start.elapsed()
    );

    Ok(results)
}
