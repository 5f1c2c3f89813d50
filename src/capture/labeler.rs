//! Labeler lifecycle controller
//!
//! Owns the per-camera capture state: the label cache, the pending-annotation
//! table, the readback scheduler, and the image writer pool. The host drives
//! it from the render loop:
//!
//! 1. `begin_frame` before the frame renders (opens the annotation record),
//! 2. `resolve_or_queue` per labeled object, then `run_matching_pass` once,
//! 3. `on_render_complete` when the frame's image is in the render target,
//! 4. `update` each frame to pump completed readbacks,
//! 5. `cleanup` at teardown to drain in-flight work before resources go away.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{error, info, trace};
use parking_lot::Mutex;

use crate::dataset::{AnnotationDefinition, DatasetSink};
use crate::labeling::cache::InstanceId;
use crate::labeling::{CacheRegistry, LabelCache, LabelConfig, LabelEntry, LabelingDescriptor};
use crate::persistence::{AsyncWriteRequest, ImageWriteQueue, ImageWriterPool, WriterStats};
use crate::CaptureConfig;

use super::pending::PendingAnnotations;
use super::readback::{ReadbackBackend, ReadbackScheduler};
use super::{frame_relative_path, CaptureError, CaptureResult, FrameCount};

/// Callback observing raw pixel data for each resolved frame, before
/// encoding. The slice is valid only for the duration of the call.
pub type ImageObserver = Box<dyn FnMut(FrameCount, u32, u32, &[u8]) + Send>;

/// Counters reported by [`SegmentationLabeler::cleanup`].
#[derive(Debug, Default, Clone, Copy)]
pub struct LabelerStats {
    pub frames_resolved: u64,
    pub orphan_readbacks: u64,
    pub writer: WriterStats,
}

/// State shared with readback completion callbacks.
struct ResolveCtx {
    pending: Mutex<PendingAnnotations>,
    queue: Mutex<Option<ImageWriteQueue>>,
    observer: Mutex<Option<ImageObserver>>,
    width: u32,
    height: u32,
    output_root: PathBuf,
    frames_resolved: AtomicU64,
    orphan_readbacks: AtomicU64,
}

impl ResolveCtx {
    fn resolve(&self, frame: FrameCount, pixels: &[u8]) {
        let handle = self.pending.lock().take(frame);
        let Some(handle) = handle else {
            // Not an error: the frame was rendered without an annotation
            // request. Counted so the rate stays observable.
            trace!("dropping orphan readback for frame {}", frame);
            self.orphan_readbacks.fetch_add(1, Ordering::Relaxed);
            return;
        };

        if let Some(observer) = self.observer.lock().as_mut() {
            observer(frame, self.width, self.height, pixels);
        }

        // The output path is deterministic; report it before encoding runs.
        let relative = frame_relative_path(frame);
        handle.report_file(&relative);

        let request = AsyncWriteRequest {
            pixels: pixels.to_vec(),
            width: self.width,
            height: self.height,
            path: self.output_root.join(&relative),
        };
        match self.queue.lock().as_ref() {
            Some(queue) => {
                if let Err(e) = queue.write(request) {
                    error!("failed to enqueue annotation write for frame {}: {}", frame, e);
                }
            }
            None => error!("annotation write for frame {} arrived after shutdown", frame),
        }
        self.frames_resolved.fetch_add(1, Ordering::Relaxed);
    }
}

/// Per-camera semantic-segmentation labeler.
pub struct SegmentationLabeler<B: ReadbackBackend> {
    scheduler: ReadbackScheduler<B>,
    ctx: Arc<ResolveCtx>,
    cache: LabelCache,
    label_config: Arc<LabelConfig>,
    registry: Arc<CacheRegistry>,
    sink: Arc<dyn DatasetSink>,
    writer: Option<ImageWriterPool>,
    misses: Vec<(InstanceId, LabelingDescriptor)>,
    definition_id: String,
}

impl<B: ReadbackBackend> SegmentationLabeler<B> {
    /// Sets up the labeler: validates configuration, registers the
    /// annotation definition with the dataset sink, activates the label
    /// cache, and starts the writer pool.
    ///
    /// A missing label configuration aborts construction; it is the only
    /// fatal condition in the pipeline.
    pub fn new(
        backend: B,
        config: CaptureConfig,
        label_config: Option<Arc<LabelConfig>>,
        registry: Arc<CacheRegistry>,
        sink: Arc<dyn DatasetSink>,
    ) -> CaptureResult<Self> {
        let label_config = label_config.ok_or(CaptureError::MissingLabelConfig)?;

        let definition = AnnotationDefinition::semantic_segmentation(&label_config);
        sink.register_annotation_definition(&definition)?;

        let writer = if config.writer_threads == 0 {
            ImageWriterPool::new()
        } else {
            ImageWriterPool::with_workers(config.writer_threads)
        };
        let ctx = Arc::new(ResolveCtx {
            pending: Mutex::new(PendingAnnotations::new()),
            queue: Mutex::new(Some(writer.queue())),
            observer: Mutex::new(None),
            width: config.width,
            height: config.height,
            output_root: config.output_root.clone(),
            frames_resolved: AtomicU64::new(0),
            orphan_readbacks: AtomicU64::new(0),
        });
        let cache = LabelCache::new(label_config.clone(), registry.clone());

        info!(
            "segmentation labeler ready: {}x{}, {} labels, output {}",
            config.width,
            config.height,
            label_config.len(),
            config.output_root.display()
        );
        Ok(Self {
            scheduler: ReadbackScheduler::new(backend),
            ctx,
            cache,
            label_config,
            registry,
            sink,
            writer: Some(writer),
            misses: Vec::new(),
            definition_id: definition.id,
        })
    }

    /// Opens the annotation record for the frame about to render and keys it
    /// by the frame counter for the later readback join.
    pub fn begin_frame(&mut self, frame: FrameCount) {
        let handle = self.sink.report_annotation_async(&self.definition_id);
        self.ctx.pending.lock().insert(frame, handle);
    }

    /// Hot path, called per labeled object per frame. Cache hits return the
    /// stable label entry; misses are queued for this frame's batched
    /// matching pass and resolve from the next frame on.
    pub fn resolve_or_queue(
        &mut self,
        id: InstanceId,
        descriptor: &LabelingDescriptor,
    ) -> Option<(u16, LabelEntry)> {
        if let Some((index, entry)) = self.cache.try_resolve(id) {
            return Some((index, entry.clone()));
        }
        self.misses.push((id, descriptor.clone()));
        None
    }

    /// Runs the shared matching pass over this frame's accumulated misses,
    /// populating every cache active for the same label config.
    pub fn run_matching_pass(&mut self) -> usize {
        let misses = std::mem::take(&mut self.misses);
        self.registry.populate_active(&self.label_config, &misses)
    }

    /// Issues the readback for a frame whose image now sits in the render
    /// target. Fire-and-forget; the completion pairs itself with the pending
    /// annotation by frame number.
    pub fn on_render_complete(&mut self, frame: FrameCount) {
        let ctx = self.ctx.clone();
        self.scheduler
            .request_readback(frame, move |frame, pixels| ctx.resolve(frame, pixels));
    }

    /// Pumps completed readbacks; call once per frame from the producer
    /// thread. Returns the number of frames resolved this call.
    pub fn update(&mut self) -> usize {
        self.scheduler.poll_completions()
    }

    pub fn set_image_observer(&self, observer: ImageObserver) {
        *self.ctx.observer.lock() = Some(observer);
    }

    pub fn cache(&self) -> &LabelCache {
        &self.cache
    }

    pub fn pending_annotations(&self) -> usize {
        self.ctx.pending.lock().len()
    }

    pub fn in_flight_readbacks(&self) -> usize {
        self.scheduler.in_flight()
    }

    pub fn orphan_readbacks(&self) -> u64 {
        self.ctx.orphan_readbacks.load(Ordering::Relaxed)
    }

    /// Drains all in-flight readbacks, then shuts down the writer pool after
    /// it finishes the queued encodes. The drain runs before anything is
    /// released, so no completion can fire against a freed render target.
    ///
    /// Idempotent; also invoked from `Drop`.
    pub fn cleanup(&mut self) -> LabelerStats {
        self.scheduler.drain();

        // Workers only observe a closed intake once every queue clone is
        // gone, including the one held by the resolve context.
        self.ctx.queue.lock().take();
        let writer = match self.writer.take() {
            Some(pool) => pool.shutdown(),
            None => WriterStats::default(),
        };
        LabelerStats {
            frames_resolved: self.ctx.frames_resolved.load(Ordering::Relaxed),
            orphan_readbacks: self.ctx.orphan_readbacks.load(Ordering::Relaxed),
            writer,
        }
    }
}

impl<B: ReadbackBackend> Drop for SegmentationLabeler<B> {
    fn drop(&mut self) {
        if self.writer.is_some() {
            self.cleanup();
        }
    }
}
