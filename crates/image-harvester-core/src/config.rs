use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::normalize::base_domain;

/// Selectors whose subtree is treated as the product gallery (priority 1)
pub const DEFAULT_GALLERY_SELECTORS: &[&str] = &[
    "#pd-header-gallery",
    ".product-gallery",
    ".gallery",
    "[role=\"main\"]",
    "main",
    ".pdp-image-gallery",
    "media-gallery",
    "[aria-label=\"Galleri\"]",
    ".c-imageslider",
    "#lightbox",
    "#ivImagesTab",
];

/// Selectors for product description / content areas (priority 2)
pub const DEFAULT_CONTENT_SELECTORS: &[&str] = &[
    "article",
    "[itemprop=\"description\"]",
    ".product-description",
    "#description",
    ".description",
];

/// Selectors for sidebars, recommendations and accessories (priority 3)
pub const DEFAULT_SIDEBAR_SELECTORS: &[&str] = &[
    "aside",
    ".sidebar",
    "[class*=\"related\"]",
    "[class*=\"recommend\"]",
    ".accessories",
];

/// How candidate URLs are grouped when looking for the same underlying picture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityMode {
    /// Drop query and fragment: query variants are size/format tiers of one image
    StripQuery,

    /// Drop the fragment only: query variants are distinct images
    KeepQuery,
}

/// Log level for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Filter string understood by env_logger and log4rs
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Configuration for a harvesting run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ask the sink to prompt for a save location per file
    pub ask_where: bool,

    /// Strip near-white backgrounds before compositing
    pub remove_bg_heuristic: bool,

    /// Only present candidates that pass the size heuristic
    pub only_large: bool,

    /// Collapse same-picture candidates at presentation time
    pub hide_duplicates: bool,

    /// Accept harvested URLs that carry no recognised image extension
    pub allow_no_extension: bool,

    /// Also accept tiff, tif, heic and gif sources for emission
    pub extended_formats: bool,

    /// Region matchers for the gallery tier
    pub gallery_selectors: Vec<String>,

    /// Region matchers for the content tier
    pub content_selectors: Vec<String>,

    /// Region matchers for the sidebar tier
    pub sidebar_selectors: Vec<String>,

    /// Enabled documents, keyed by two-label base domain
    pub allowed_domains: BTreeMap<String, bool>,

    /// Identity key derivation used by the URL-shape deduplicator
    pub identity_mode: IdentityMode,

    /// Maximum number of candidates measured per run
    pub measure_limit: usize,

    /// Number of probes in flight at once (0 = auto)
    pub probe_threads: usize,

    /// Pause after each emitted file
    pub emit_delay_ms: u64,

    /// Pause after skipping a duplicate render
    pub skip_delay_ms: u64,

    /// Pause after a failed fetch, render or store
    pub failure_delay_ms: u64,

    /// Per-request timeout for probes and fetches
    pub request_timeout_secs: u64,

    /// User agent sent with every request
    pub user_agent: String,

    /// Log level
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ask_where: false,
            remove_bg_heuristic: true,
            only_large: true,
            hide_duplicates: true,
            allow_no_extension: false,
            extended_formats: false,
            gallery_selectors: to_strings(DEFAULT_GALLERY_SELECTORS),
            content_selectors: to_strings(DEFAULT_CONTENT_SELECTORS),
            sidebar_selectors: to_strings(DEFAULT_SIDEBAR_SELECTORS),
            allowed_domains: BTreeMap::new(),
            identity_mode: IdentityMode::StripQuery,
            measure_limit: 500,
            probe_threads: 16,
            emit_delay_ms: 400,
            skip_delay_ms: 40,
            failure_delay_ms: 120,
            request_timeout_secs: 30,
            user_agent: format!("image-harvester/{}", env!("CARGO_PKG_VERSION")),
            log_level: LogLevel::Info,
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Config {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())
            .map_err(|e| Error::Configuration(format!("Failed to open config file: {}", e)))?;

        let config: Config = serde_json::from_reader(file)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())
            .map_err(|e| Error::Configuration(format!("Failed to create config file: {}", e)))?;

        serde_json::to_writer_pretty(file, self)
            .map_err(|e| Error::Configuration(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.gallery_selectors.iter().all(|s| s.trim().is_empty()) {
            return Err(Error::Configuration(
                "At least one gallery selector is required".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(Error::Configuration(
                "Request timeout must be at least one second".to_string(),
            ));
        }

        if self.allowed_domains.keys().any(|k| k.trim().is_empty()) {
            return Err(Error::Configuration(
                "Allowed domain keys must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether harvesting is enabled for documents served from `host`
    pub fn is_domain_enabled(&self, host: &str) -> bool {
        self.allowed_domains
            .get(&base_domain(host))
            .copied()
            .unwrap_or(false)
    }

    /// Enable or disable harvesting for the base domain of `host`
    pub fn set_domain_enabled(&mut self, host: &str, enabled: bool) {
        self.allowed_domains.insert(base_domain(host), enabled);
    }

    /// Number of probe threads, resolving 0 to the CPU count
    pub fn effective_probe_threads(&self) -> usize {
        if self.probe_threads == 0 {
            num_cpus::get()
        } else {
            self.probe_threads
        }
    }

    pub fn emit_delay(&self) -> Duration {
        Duration::from_millis(self.emit_delay_ms)
    }

    pub fn skip_delay(&self) -> Duration {
        Duration::from_millis(self.skip_delay_ms)
    }

    pub fn failure_delay(&self) -> Duration {
        Duration::from_millis(self.failure_delay_ms)
    }

    /// Configuration with every pacing delay set to zero
    pub fn without_delays(mut self) -> Self {
        self.emit_delay_ms = 0;
        self.skip_delay_ms = 0;
        self.failure_delay_ms = 0;
        self
    }
}
