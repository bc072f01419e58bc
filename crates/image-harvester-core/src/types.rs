use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Document order given to candidates that have no provenance node
pub const UNORDERED: usize = usize::MAX;

/// Priority given when no region matcher applies
pub const DEFAULT_PRIORITY: u8 = 3;

/// Source image formats, ordered by how much we prefer them
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    Tiff,
    Png,
    Heic,
    Avif,
    Jpeg,
    Webp,
    Gif,
    Other(String),
}

impl ImageFormat {
    /// Determine format from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "tif" | "tiff" => Self::Tiff,
            "png" => Self::Png,
            "heic" => Self::Heic,
            "avif" => Self::Avif,
            "jpg" | "jpeg" => Self::Jpeg,
            "webp" => Self::Webp,
            "gif" => Self::Gif,
            other => Self::Other(other.to_string()),
        }
    }

    /// Preference rank used by the URL-shape deduplicator (higher wins)
    pub fn rank(&self) -> u8 {
        match self {
            Self::Tiff => 10,
            Self::Png => 9,
            Self::Heic | Self::Avif => 8,
            Self::Jpeg => 7,
            Self::Webp => 6,
            Self::Gif => 5,
            Self::Other(_) => 0,
        }
    }
}

/// Natural pixel dimensions; zero means unknown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_known(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Index of the originating element in the harvesting pass's node table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProvenanceRef(pub usize);

/// A harvested, not-yet-rendered image URL with its ranking metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Absolute resource URL
    pub url: String,

    /// First element observed referencing the URL
    #[serde(skip)]
    pub provenance: Option<ProvenanceRef>,

    /// Walk index of the provenance node, `UNORDERED` if none
    pub document_order: usize,

    /// Best-known natural size
    pub dimensions: Dimensions,

    /// Lower is better; only ever decreases
    pub priority: u8,
}

impl Candidate {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            provenance: None,
            document_order: UNORDERED,
            dimensions: Dimensions::default(),
            priority: DEFAULT_PRIORITY,
        }
    }

    /// Record a proposed priority, keeping the best one seen
    pub fn improve_priority(&mut self, proposed: u8) {
        self.priority = self.priority.min(proposed);
    }

    /// Record a measurement, keeping the largest value per axis
    pub fn record_dimensions(&mut self, dims: Dimensions) {
        self.dimensions.width = self.dimensions.width.max(dims.width);
        self.dimensions.height = self.dimensions.height.max(dims.height);
    }

    /// Record a sighting position, keeping the earliest
    pub fn record_order(&mut self, order: usize) {
        self.document_order = self.document_order.min(order);
    }

    /// Fold another sighting of the same URL into this one
    pub fn absorb(&mut self, other: &Candidate) {
        let earlier = other.document_order < self.document_order;
        if other.provenance.is_some() && (self.provenance.is_none() || earlier) {
            self.provenance = other.provenance;
        }
        self.improve_priority(other.priority);
        self.record_dimensions(other.dimensions);
        self.record_order(other.document_order);
    }

    pub fn format(&self) -> ImageFormat {
        ImageFormat::from_extension(&crate::normalize::extension_of(&self.url))
    }
}

/// Candidates keyed by URL, in first-seen order
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    items: Vec<Candidate>,
    index: HashMap<String, usize>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sighting, merging with an existing entry for the same URL
    pub fn observe(&mut self, candidate: Candidate) {
        match self.index.get(&candidate.url) {
            Some(&i) => self.items[i].absorb(&candidate),
            None => {
                self.index.insert(candidate.url.clone(), self.items.len());
                self.items.push(candidate);
            }
        }
    }

    /// Merge every candidate of another set (e.g. another frame of the page)
    pub fn merge(&mut self, other: CandidateSet) {
        for candidate in other.items {
            self.observe(candidate);
        }
    }

    pub fn get(&self, url: &str) -> Option<&Candidate> {
        self.index.get(url).map(|&i| &self.items[i])
    }

    pub fn get_mut(&mut self, url: &str) -> Option<&mut Candidate> {
        match self.index.get(url) {
            Some(&i) => Some(&mut self.items[i]),
            None => None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<Candidate> {
        self.items
    }
}

impl FromIterator<Candidate> for CandidateSet {
    fn from_iter<I: IntoIterator<Item = Candidate>>(iter: I) -> Self {
        let mut set = CandidateSet::new();
        for candidate in iter {
            set.observe(candidate);
        }
        set
    }
}

/// Encoded output of the render pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedAsset {
    /// Encoded JPEG bytes
    pub bytes: Vec<u8>,

    /// Hex digest of `bytes`
    pub content_hash: String,
}

/// A finished file on its way to the sink
#[derive(Debug, Clone)]
pub struct OutputFile {
    /// `{name}/{counter}_{name}.jpg`
    pub relative_path: PathBuf,

    pub bytes: Vec<u8>,
}
