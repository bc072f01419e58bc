use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::normalize::{base_domain, host_of};

/// Per-run state: configuration read once, domain activation and cancellation
#[derive(Debug, Clone)]
pub struct RunContext {
    config: Config,
    active: bool,
    base_domain: String,
    cancel: Arc<AtomicBool>,
}

impl RunContext {
    /// Validate `config` and decide whether harvesting is enabled for `page_url`
    pub fn init(config: Config, page_url: &str) -> Result<Self> {
        config.validate()?;

        let host = host_of(page_url).unwrap_or_default();
        let base = base_domain(&host);
        let active = !base.is_empty() && config.is_domain_enabled(&host);
        info!(
            "Run context for {} ({}): {}",
            page_url,
            base,
            if active { "active" } else { "inactive" }
        );

        Ok(Self {
            config,
            active,
            base_domain: base,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Treat the document as enabled regardless of the allow-list
    pub fn force_active(mut self) -> Self {
        self.active = true;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn base_domain(&self) -> &str {
        &self.base_domain
    }

    /// Flag shared with whoever may stop the run
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inactive_until_enabled() {
        let ctx = RunContext::init(Config::default(), "https://shop.example.com/p/1").unwrap();
        assert!(!ctx.is_active());
        assert_eq!(ctx.base_domain(), "example.com");

        let mut config = Config::default();
        config.set_domain_enabled("www.example.com", true);
        let ctx = RunContext::init(config, "https://shop.example.com/p/1").unwrap();
        assert!(ctx.is_active());
    }

    #[test]
    fn test_unparseable_page_is_inactive() {
        let mut config = Config::default();
        config.set_domain_enabled("example.com", true);
        let ctx = RunContext::init(config, "not a url").unwrap();
        assert!(!ctx.is_active());
        assert!(ctx.force_active().is_active());
    }

    #[test]
    fn test_cancel_is_shared() {
        let ctx = RunContext::init(Config::default(), "https://x.com/").unwrap();
        let flag = ctx.cancel_flag();
        assert!(!ctx.is_cancelled());
        flag.store(true, Ordering::SeqCst);
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.request_timeout_secs = 0;
        assert!(RunContext::init(config, "https://x.com/").is_err());
    }
}
