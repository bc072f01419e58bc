//! Sequential fetch, render, dedup and store of the selected sources.
//!
//! Exactly one source is in flight at a time. Files are numbered in the order
//! they reach the sink, so the names stay gap-free when an item fails.

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::dedup::dedupe_selection;
use crate::error::Result;
use crate::filters::is_allowed_source;
use crate::logging::{log_emission, log_fetch_error, log_render_error, log_sink_error};
use crate::render::Renderer;
use crate::sink::{ConflictPolicy, Sink};
use crate::types::OutputFile;

/// Characters that may not appear in a folder or file name
const FORBIDDEN_NAME_CHARS: &[char] = &['/', ':', '*', '?', '"', '<', '>', '|', '\n', '\r', '\t'];

/// Longest name kept, in characters
const MAX_NAME_LEN: usize = 100;

/// Name used when nothing usable is left
const FALLBACK_NAME: &str = "product";

/// Downloads the raw bytes of a source image
pub trait Fetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// The user's ordered selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitRequest {
    pub urls: Vec<String>,

    #[serde(default)]
    pub product_name: String,
}

/// A file that reached the sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedFile {
    pub source_url: String,

    /// Path requested from the sink
    pub relative_path: PathBuf,

    /// Where the sink actually put it
    pub stored_at: PathBuf,

    pub content_hash: String,
}

/// Aggregate outcome of an emission run
#[derive(Debug, Clone, Default)]
pub struct EmitReport {
    pub emitted: Vec<EmittedFile>,

    /// Sources whose render matched an earlier one
    pub skipped_duplicates: usize,

    /// Sources lost to fetch, render or sink failures
    pub failed: usize,

    /// Run stopped early on request
    pub cancelled: bool,
}

/// Folder and file stem for a product name
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;
    for ch in name.trim().chars() {
        if FORBIDDEN_NAME_CHARS.contains(&ch) {
            if !in_run {
                out.push('_');
            }
            in_run = true;
        } else {
            out.push(ch);
            in_run = false;
        }
    }

    let out: String = out.chars().take(MAX_NAME_LEN).collect();
    if out.is_empty() || out == "." || out == ".." {
        FALLBACK_NAME.to_string()
    } else {
        out
    }
}

/// Runs the emit stage for one request
pub struct Emitter {
    config: Config,
    renderer: Renderer,
    cancel: Arc<AtomicBool>,
    show_progress: bool,
}

impl Emitter {
    pub fn new(config: Config, cancel: Arc<AtomicBool>) -> Self {
        Self {
            config,
            renderer: Renderer::default(),
            cancel,
            show_progress: true,
        }
    }

    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Drop disallowed sources and collapse repeated addresses, keeping order
    pub fn prepare(&self, urls: &[String]) -> Vec<String> {
        let allowed: Vec<String> = urls
            .iter()
            .filter(|url| {
                let ok = is_allowed_source(url, &self.config);
                if !ok {
                    debug!("Source not allowed for emission: {}", url);
                }
                ok
            })
            .cloned()
            .collect();
        dedupe_selection(&allowed, self.config.identity_mode)
    }

    fn create_progress_bar(&self, total: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let progress = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} - {msg}")
        {
            progress.set_style(style.progress_chars("#>-"));
        }
        progress
    }

    fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }

    /// Fetch, render and store every prepared source in order
    pub fn emit(
        &self,
        request: &EmitRequest,
        fetcher: &dyn Fetcher,
        sink: &mut dyn Sink,
    ) -> EmitReport {
        let mut report = EmitReport::default();
        let urls = self.prepare(&request.urls);
        if urls.is_empty() {
            info!("Nothing to emit");
            return report;
        }

        let name = sanitize_name(&request.product_name);
        let width = urls.len().to_string().len();
        let mut seen_hashes: HashSet<String> = HashSet::new();
        let mut counter = 0usize;

        info!("Emitting up to {} files for {:?}", urls.len(), name);
        let progress = self.create_progress_bar(urls.len());

        for url in &urls {
            if self.cancel.load(Ordering::SeqCst) {
                warn!("Emission cancelled after {} files", counter);
                report.cancelled = true;
                break;
            }
            progress.set_message(url.clone());

            let bytes = match fetcher.fetch(url) {
                Ok(bytes) => bytes,
                Err(e) => {
                    log_fetch_error(url, &e);
                    report.failed += 1;
                    progress.inc(1);
                    self.pause(self.config.failure_delay());
                    continue;
                }
            };

            let asset = match self.renderer.render(&bytes, self.config.remove_bg_heuristic) {
                Ok(asset) => asset,
                Err(e) => {
                    log_render_error(url, &e);
                    report.failed += 1;
                    progress.inc(1);
                    self.pause(self.config.failure_delay());
                    continue;
                }
            };

            if seen_hashes.contains(&asset.content_hash) {
                debug!("Skipping {}: identical render already emitted", url);
                report.skipped_duplicates += 1;
                progress.inc(1);
                self.pause(self.config.skip_delay());
                continue;
            }

            let output = OutputFile {
                relative_path: PathBuf::from(&name)
                    .join(format!("{:0width$}_{}.jpg", counter + 1, name, width = width)),
                bytes: asset.bytes,
            };

            match sink.store(
                &output.bytes,
                &output.relative_path,
                self.config.ask_where,
                ConflictPolicy::Uniquify,
            ) {
                Ok(id) => {
                    counter += 1;
                    seen_hashes.insert(asset.content_hash.clone());
                    log_emission(url, &id.0, None);
                    report.emitted.push(EmittedFile {
                        source_url: url.clone(),
                        relative_path: output.relative_path,
                        stored_at: id.0,
                        content_hash: asset.content_hash,
                    });
                }
                Err(e) => {
                    log_sink_error(&output.relative_path, &e);
                    report.failed += 1;
                    progress.inc(1);
                    self.pause(self.config.failure_delay());
                    continue;
                }
            }

            progress.inc(1);
            self.pause(self.config.emit_delay());
        }

        progress.finish_with_message(format!("{} files emitted", report.emitted.len()));
        info!(
            "Emission finished: {} emitted, {} duplicates, {} failed",
            report.emitted.len(),
            report.skipped_duplicates,
            report.failed
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("  Red Shoe  "), "Red Shoe");
        assert_eq!(sanitize_name("A/B: C"), "A_B_ C");
        assert_eq!(sanitize_name("a//::b"), "a_b");
        assert_eq!(sanitize_name("x\r\n\ty"), "x_y");
        assert_eq!(sanitize_name("   "), FALLBACK_NAME);
        assert_eq!(sanitize_name(".."), FALLBACK_NAME);
        assert_eq!(sanitize_name(" . "), FALLBACK_NAME);
        assert_eq!(sanitize_name("..."), "...");
        assert_eq!(sanitize_name(&"é".repeat(150)).chars().count(), MAX_NAME_LEN);
    }

    #[test]
    fn test_prepare_filters_and_collapses() {
        let emitter = Emitter::new(Config::default(), Arc::new(AtomicBool::new(false)));
        let urls: Vec<String> = [
            "https://x.com/a.jpg",
            "https://x.com/logo.png",
            "https://x.com/b.gif",
            "https://x.com/a.png",
            "https://x.com/a.jpg?w=200",
            "https://x.com/c.webp",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        assert_eq!(
            emitter.prepare(&urls),
            vec![
                "https://x.com/a.jpg".to_string(),
                "https://x.com/a.png".to_string(),
                "https://x.com/c.webp".to_string()
            ]
        );
    }

    #[test]
    fn test_request_deserializes_without_name() {
        let request: EmitRequest =
            serde_json::from_str(r#"{ "urls": ["https://x.com/a.jpg"] }"#).unwrap();
        assert_eq!(request.urls.len(), 1);
        assert_eq!(request.product_name, "");
    }
}
