//! Label configuration and identity caching
//!
//! Maps transient per-instance render identifiers to stable label entries so
//! the expensive descriptor-matching step runs once per object instead of
//! once per frame.

pub mod cache;
pub mod registry;

pub use cache::LabelCache;
pub use registry::CacheRegistry;

use serde::{Deserialize, Serialize};

/// Result type for labeling operations
pub type LabelingResult<T> = Result<T, LabelingError>;

/// Errors that can occur while building label configuration
#[derive(Debug)]
pub enum LabelingError {
    EmptyConfig,
    DuplicateLabel(String),
}

impl std::fmt::Display for LabelingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LabelingError::EmptyConfig => {
                write!(f, "label configuration must contain at least one entry")
            }
            LabelingError::DuplicateLabel(label) => {
                write!(f, "duplicate label in configuration: {}", label)
            }
        }
    }
}

impl std::error::Error for LabelingError {}

/// RGBA color assigned to a label in the ground-truth output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Raw RGBA bytes in output-buffer order
    pub const fn to_bytes(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// One entry in the ordered label-definition list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEntry {
    pub label: String,
    pub color: Color,
}

/// Labels attached to a renderable object by the host application.
///
/// An object may carry several candidate labels; the first one that appears
/// in the configuration wins.
#[derive(Debug, Clone, Default)]
pub struct LabelingDescriptor {
    pub labels: Vec<String>,
}

impl LabelingDescriptor {
    pub fn new(labels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }
}

/// Ordered, stable list of label definitions shared across the pipeline.
///
/// The entry order is fixed for the lifetime of the config; cached indices
/// stay valid as long as the config is alive.
#[derive(Debug)]
pub struct LabelConfig {
    entries: Vec<LabelEntry>,
}

impl LabelConfig {
    pub fn new(entries: Vec<LabelEntry>) -> LabelingResult<Self> {
        if entries.is_empty() {
            return Err(LabelingError::EmptyConfig);
        }
        for (i, entry) in entries.iter().enumerate() {
            if entries[..i].iter().any(|e| e.label == entry.label) {
                return Err(LabelingError::DuplicateLabel(entry.label.clone()));
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[LabelEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Matches a descriptor against the configuration.
    ///
    /// Linear scan over entries and descriptor labels; this is the expensive
    /// comparison the [`LabelCache`] exists to amortize.
    pub fn match_descriptor(&self, descriptor: &LabelingDescriptor) -> Option<(u16, &LabelEntry)> {
        for (index, entry) in self.entries.iter().enumerate() {
            if descriptor.labels.iter().any(|l| *l == entry.label) {
                return Some((index as u16, entry));
            }
        }
        None
    }
}
