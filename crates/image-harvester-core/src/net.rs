//! HTTP transport for probing, fetching sources and loading pages.

use image::io::Reader as ImageReader;
use log::{debug, trace};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, PRAGMA};
use std::io::Cursor;
use std::time::Duration;

use crate::config::Config;
use crate::emit::Fetcher;
use crate::error::{Error, Result};
use crate::heif;
use crate::measure::Prober;
use crate::types::Dimensions;

/// Blocking HTTP client shared by every stage of a run
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Anonymous client that bypasses caches
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()?;

        Ok(Self { client })
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes()?.to_vec())
    }

    /// Body of an HTML page
    pub fn fetch_page(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text()?)
    }
}

/// Read the dimensions from an image header
pub fn dimensions_of(bytes: &[u8]) -> Option<Dimensions> {
    if heif::is_heif(bytes) {
        return heif::dimensions(bytes);
    }
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?;
    reader
        .into_dimensions()
        .ok()
        .map(|(w, h)| Dimensions::new(w, h))
}

impl Prober for HttpClient {
    fn measure(&self, url: &str) -> Dimensions {
        match self.get_bytes(url) {
            Ok(bytes) => {
                let dims = dimensions_of(&bytes).unwrap_or_default();
                trace!("Measured {} as {}x{}", url, dims.width, dims.height);
                dims
            }
            Err(e) => {
                debug!("Probe failed for {}: {}", url, e);
                Dimensions::default()
            }
        }
    }

    fn exists(&self, url: &str) -> bool {
        match self.client.head(url).send() {
            Ok(response) if response.status().is_success() => true,
            Ok(response) if response.status().as_u16() == 405 => self
                .client
                .get(url)
                .send()
                .map(|r| r.status().is_success())
                .unwrap_or(false),
            Ok(response) => {
                debug!("{} answered {}", url, response.status());
                false
            }
            Err(e) => {
                debug!("Existence check failed for {}: {}", url, e);
                false
            }
        }
    }
}

impl Fetcher for HttpClient {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.get_bytes(url)
    }
}
