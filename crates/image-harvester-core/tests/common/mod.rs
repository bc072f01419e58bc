#![allow(dead_code)]

use image::{ImageOutputFormat, Rgb, RgbImage};
use libheif_rs::{Channel, ColorSpace, CompressionFormat, EncoderQuality, HeifContext, Image, RgbChroma};
use image_harvester_core::emit::Fetcher;
use image_harvester_core::measure::Prober;
use image_harvester_core::sink::{ConflictPolicy, Sink, SinkId};
use image_harvester_core::{Dimensions, Error, Result};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Encode a solid image in the given format
pub fn solid_image(width: u32, height: u32, color: [u8; 3], format: ImageOutputFormat) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb(color));
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, format)
        .expect("in-memory encode should succeed");
    bytes.into_inner()
}

pub fn solid_png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    solid_image(width, height, color, ImageOutputFormat::Png)
}

/// Encode a solid image as AVIF through libheif's AV1 encoder
pub fn solid_avif(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let mut image = Image::new(width, height, ColorSpace::Rgb(RgbChroma::C444))
        .expect("HEIF image should be created");
    for channel in [Channel::R, Channel::G, Channel::B] {
        image
            .create_plane(channel, width, height, 8)
            .expect("plane should be created");
    }

    let planes = image.planes_mut();
    let channels = [planes.r, planes.g, planes.b];
    for (plane, value) in channels.into_iter().zip(color) {
        let plane = plane.expect("plane should exist");
        let stride = plane.stride;
        let data = plane.data;
        for y in 0..height as usize {
            data[y * stride..y * stride + width as usize].fill(value);
        }
    }

    let mut context = HeifContext::new().expect("HEIF context should be created");
    let mut encoder = context
        .encoder_for_format(CompressionFormat::Av1)
        .expect("libheif should have an AV1 encoder");
    encoder
        .set_quality(EncoderQuality::LossLess)
        .expect("lossless quality should be accepted");
    context
        .encode_image(&image, &mut encoder, None)
        .expect("AVIF encode should succeed");
    context.write_to_bytes().expect("AVIF should serialize")
}

/// Red product on a white border
pub fn product_on_white(width: u32, height: u32) -> Vec<u8> {
    let mut img = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    for y in height / 4..height * 3 / 4 {
        for x in width / 4..width * 3 / 4 {
            img.put_pixel(x, y, Rgb([200, 20, 20]));
        }
    }
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageOutputFormat::Png)
        .expect("in-memory encode should succeed");
    bytes.into_inner()
}

/// Prober answering from a fixed table; unknown URLs do not exist
#[derive(Default)]
pub struct ScriptedProber {
    sizes: HashMap<String, Dimensions>,
    pub measured: Mutex<Vec<String>>,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, width: u32, height: u32) -> Self {
        self.sizes
            .insert(url.to_string(), Dimensions::new(width, height));
        self
    }
}

impl Prober for ScriptedProber {
    fn measure(&self, url: &str) -> Dimensions {
        self.measured.lock().unwrap().push(url.to_string());
        self.sizes.get(url).copied().unwrap_or_default()
    }

    fn exists(&self, url: &str) -> bool {
        self.sizes.contains_key(url)
    }
}

/// Fetcher serving canned bodies; unknown URLs answer 404
#[derive(Default)]
pub struct ScriptedFetcher {
    bodies: HashMap<String, Vec<u8>>,
    pub requested: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, body: Vec<u8>) -> Self {
        self.bodies.insert(url.to_string(), body);
        self
    }
}

impl Fetcher for ScriptedFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.requested.lock().unwrap().push(url.to_string());
        self.bodies.get(url).cloned().ok_or(Error::Fetch {
            url: url.to_string(),
            status: 404,
        })
    }
}

/// Sink that keeps every stored file in memory
#[derive(Default)]
pub struct RecordingSink {
    pub files: Vec<(PathBuf, Vec<u8>)>,

    /// Refuse the n-th store call (0-based)
    pub fail_on: Option<usize>,
    calls: usize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on: Some(call),
            ..Self::default()
        }
    }

    pub fn paths(&self) -> Vec<String> {
        self.files
            .iter()
            .map(|(p, _)| p.to_string_lossy().replace('\\', "/"))
            .collect()
    }
}

impl Sink for RecordingSink {
    fn store(
        &mut self,
        bytes: &[u8],
        relative_path: &Path,
        _prompt_user: bool,
        _policy: ConflictPolicy,
    ) -> Result<SinkId> {
        let call = self.calls;
        self.calls += 1;
        if self.fail_on == Some(call) {
            return Err(Error::Sink {
                path: relative_path.to_path_buf(),
                reason: "disk full".to_string(),
            });
        }
        self.files.push((relative_path.to_path_buf(), bytes.to_vec()));
        Ok(SinkId(relative_path.to_path_buf()))
    }
}
