//! Frame-indexed pending-annotation table

use log::warn;
use rustc_hash::FxHashMap;

use crate::dataset::AnnotationHandle;

use super::FrameCount;

/// Annotation handles awaiting their frame's pixel data.
///
/// An entry is inserted when the frame begins rendering and taken exactly
/// once when the readback for that frame completes. A readback with no
/// matching entry means no annotation was requested for that frame; the
/// caller drops it.
#[derive(Default)]
pub struct PendingAnnotations {
    entries: FxHashMap<FrameCount, Box<dyn AnnotationHandle>>,
}

impl PendingAnnotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, frame: FrameCount, handle: Box<dyn AnnotationHandle>) {
        if self.entries.insert(frame, handle).is_some() {
            // Frame counters are monotonic; a replaced entry means the caller
            // requested two annotations for one frame.
            warn!("pending annotation for frame {} was replaced", frame);
        }
    }

    /// Removes and returns the handle for `frame`, if one is pending.
    pub fn take(&mut self, frame: FrameCount) -> Option<Box<dyn AnnotationHandle>> {
        self.entries.remove(&frame)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandle(Arc<AtomicUsize>);

    impl AnnotationHandle for CountingHandle {
        fn report_file(&self, _relative_path: &Path) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn entry_is_taken_exactly_once() {
        let reported = Arc::new(AtomicUsize::new(0));
        let mut pending = PendingAnnotations::new();
        pending.insert(7, Box::new(CountingHandle(reported.clone())));

        let handle = pending.take(7).expect("entry pending for frame 7");
        handle.report_file(Path::new("segmentation/segmentation_7.png"));
        assert_eq!(reported.load(Ordering::SeqCst), 1);

        assert!(pending.take(7).is_none());
        assert!(pending.is_empty());
    }

    #[test]
    fn unrelated_frames_do_not_alias() {
        let reported = Arc::new(AtomicUsize::new(0));
        let mut pending = PendingAnnotations::new();
        pending.insert(10, Box::new(CountingHandle(reported.clone())));

        assert!(pending.take(11).is_none());
        assert_eq!(pending.len(), 1);
    }
}
