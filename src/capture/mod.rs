//! Asynchronous ground-truth capture pipeline
//!
//! One logical frame moves through four states: an annotation handle is
//! opened at frame begin, the rendered image goes in flight through the GPU
//! readback, the completion pairs pixels with the pending handle by frame
//! number, and the encoded file lands on disk via the persistence pool.
//! Frame numbers strictly increase and are never reused, which is what makes
//! the frame-keyed join safe across the multi-frame readback latency.

pub mod labeler;
pub mod pending;
pub mod readback;

pub use labeler::{LabelerStats, SegmentationLabeler};
pub use pending::PendingAnnotations;
pub use readback::{ReadbackBackend, ReadbackScheduler};

use std::path::PathBuf;

use crate::dataset::DatasetError;

/// Monotonically increasing render-frame counter, never reused within a
/// process lifetime.
pub type FrameCount = u64;

/// Stable identifier for the semantic-segmentation annotation definition in
/// the dataset manifest.
pub const SEGMENTATION_ANNOTATION_ID: &str = "12f94d8d-5425-4deb-9b21-5e53ad957d66";

/// Subdirectory (relative to the dataset root) receiving segmentation images.
pub const SEGMENTATION_DIR: &str = "segmentation";

/// File-name prefix for per-frame segmentation images.
pub const SEGMENTATION_FILE_PREFIX: &str = "segmentation_";

/// Dataset-relative output path for a frame's segmentation image.
///
/// Deterministic, so the annotation handle can be told the path before the
/// image is encoded.
pub fn frame_relative_path(frame: FrameCount) -> PathBuf {
    PathBuf::from(SEGMENTATION_DIR).join(format!("{}{}.png", SEGMENTATION_FILE_PREFIX, frame))
}

/// Result type for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Errors that can abort pipeline setup.
///
/// Per-frame conditions (cache misses, orphan readbacks, write failures) are
/// absorbed locally and never surface through this enum.
#[derive(Debug)]
pub enum CaptureError {
    MissingLabelConfig,
    Dataset(DatasetError),
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::MissingLabelConfig => {
                write!(f, "semantic segmentation requires a label configuration")
            }
            CaptureError::Dataset(e) => write!(f, "dataset error: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<DatasetError> for CaptureError {
    fn from(err: DatasetError) -> Self {
        CaptureError::Dataset(err)
    }
}
