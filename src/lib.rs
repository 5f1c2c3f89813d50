//! Ground-truth annotation capture pipeline
//!
//! Renders per-frame annotations from a 3D scene, reads them back from the
//! GPU without stalling the render loop, encodes them losslessly, and writes
//! them to a dataset. The label identity cache keeps per-object label
//! matching off the per-frame hot path.

pub mod capture;
pub mod dataset;
pub mod gpu;
pub mod labeling;
pub mod persistence;

use std::path::PathBuf;

pub use capture::{
    frame_relative_path, CaptureError, CaptureResult, FrameCount, PendingAnnotations,
    ReadbackBackend, ReadbackScheduler, SegmentationLabeler, SEGMENTATION_ANNOTATION_ID,
};
pub use dataset::{AnnotationDefinition, AnnotationHandle, DatasetSink, LabelSpec};
pub use labeling::{
    CacheRegistry, Color, LabelCache, LabelConfig, LabelEntry, LabelingDescriptor,
};
pub use persistence::{AsyncWriteRequest, ImageWriterPool, WriteOutcome, WriterStats};

/// Capture pipeline configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Render-target width in pixels.
    pub width: u32,
    /// Render-target height in pixels.
    pub height: u32,
    /// Dataset root; annotation files land in subdirectories below it.
    pub output_root: PathBuf,
    /// Writer pool size; 0 picks a default from the core count.
    pub writer_threads: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            output_root: PathBuf::from("dataset"),
            writer_threads: 0,
        }
    }
}
