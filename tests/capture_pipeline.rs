//! Integration tests for the asynchronous capture pipeline
//!
//! A scripted readback backend stands in for the GPU so tests control
//! exactly when each transfer completes, including out of order.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crossbeam_channel::Sender;
use tempfile::TempDir;

use percept_engine::capture::readback::{ReadbackBackend, ReadbackScheduler, TransferResult};
use percept_engine::dataset::{
    AnnotationDefinition, AnnotationHandle, DatasetResult, DatasetSink,
};
use percept_engine::{
    CacheRegistry, CaptureConfig, CaptureError, Color, FrameCount, LabelConfig, LabelEntry,
    LabelingDescriptor, SegmentationLabeler, SEGMENTATION_ANNOTATION_ID,
};

const WIDTH: u32 = 4;
const HEIGHT: u32 = 2;

fn solid_pixels(value: u8) -> Vec<u8> {
    vec![value; (WIDTH * HEIGHT * 4) as usize]
}

/// Backend whose transfers complete only when the test says so.
#[derive(Clone, Default)]
struct ScriptedBackend {
    inner: Arc<Mutex<ScriptedInner>>,
}

#[derive(Default)]
struct ScriptedInner {
    submissions: Vec<Option<(Sender<TransferResult>, Vec<u8>)>>,
    scripted_pixels: VecDeque<Vec<u8>>,
}

impl ScriptedBackend {
    /// Pixel data the next submission will carry.
    fn script_pixels(&self, pixels: Vec<u8>) {
        self.inner
            .lock()
            .expect("backend lock")
            .scripted_pixels
            .push_back(pixels);
    }

    fn submitted(&self) -> usize {
        self.inner.lock().expect("backend lock").submissions.len()
    }

    /// Completes the transfer for submission `index` (request order).
    fn complete(&self, index: usize) {
        let mut inner = self.inner.lock().expect("backend lock");
        if let Some((done, pixels)) = inner.submissions[index].take() {
            done.send(Ok(pixels)).expect("completion channel open");
        }
    }
}

impl ReadbackBackend for ScriptedBackend {
    fn submit(&mut self, done: Sender<TransferResult>) {
        let mut inner = self.inner.lock().expect("backend lock");
        let pixels = inner
            .scripted_pixels
            .pop_front()
            .unwrap_or_else(|| solid_pixels(0));
        inner.submissions.push(Some((done, pixels)));
    }

    fn poll(&mut self) {}

    fn wait_idle(&mut self) {
        let mut inner = self.inner.lock().expect("backend lock");
        for submission in inner.submissions.iter_mut() {
            if let Some((done, pixels)) = submission.take() {
                done.send(Ok(pixels)).expect("completion channel open");
            }
        }
    }
}

/// Dataset sink recording definitions and reported files.
#[derive(Default)]
struct RecordingSink {
    definitions: Mutex<Vec<AnnotationDefinition>>,
    reported_files: Arc<Mutex<Vec<PathBuf>>>,
}

struct RecordingHandle {
    reported_files: Arc<Mutex<Vec<PathBuf>>>,
}

impl AnnotationHandle for RecordingHandle {
    fn report_file(&self, relative_path: &Path) {
        self.reported_files
            .lock()
            .expect("sink lock")
            .push(relative_path.to_path_buf());
    }
}

impl DatasetSink for RecordingSink {
    fn register_annotation_definition(
        &self,
        definition: &AnnotationDefinition,
    ) -> DatasetResult<()> {
        self.definitions
            .lock()
            .expect("sink lock")
            .push(definition.clone());
        Ok(())
    }

    fn report_annotation_async(&self, _definition_id: &str) -> Box<dyn AnnotationHandle> {
        Box::new(RecordingHandle {
            reported_files: self.reported_files.clone(),
        })
    }
}

fn label_config() -> Arc<LabelConfig> {
    Arc::new(
        LabelConfig::new(vec![
            LabelEntry {
                label: "car".to_string(),
                color: Color::rgb(255, 0, 0),
            },
            LabelEntry {
                label: "tree".to_string(),
                color: Color::rgb(0, 255, 0),
            },
        ])
        .expect("valid config"),
    )
}

fn labeler(
    backend: ScriptedBackend,
    output_root: &Path,
    sink: Arc<RecordingSink>,
) -> SegmentationLabeler<ScriptedBackend> {
    let config = CaptureConfig {
        width: WIDTH,
        height: HEIGHT,
        output_root: output_root.to_path_buf(),
        writer_threads: 1,
    };
    SegmentationLabeler::new(
        backend,
        config,
        Some(label_config()),
        Arc::new(CacheRegistry::new()),
        sink,
    )
    .expect("labeler setup")
}

#[test]
fn completions_are_delivered_in_request_order() {
    let backend = ScriptedBackend::default();
    let mut scheduler = ReadbackScheduler::new(backend.clone());
    let delivered = Arc::new(Mutex::new(Vec::<FrameCount>::new()));

    for frame in [10u64, 11, 12] {
        let delivered = delivered.clone();
        scheduler.request_readback(frame, move |frame, _pixels| {
            delivered.lock().expect("order lock").push(frame);
        });
    }
    assert_eq!(backend.submitted(), 3);

    // Frame 12's transfer finishes first; nothing may be delivered because
    // the head of the queue (frame 10) is still in flight.
    backend.complete(2);
    assert_eq!(scheduler.poll_completions(), 0);
    assert!(delivered.lock().expect("order lock").is_empty());

    // Completing frame 10 releases both ready completions, in order.
    backend.complete(0);
    assert_eq!(scheduler.poll_completions(), 1);
    assert_eq!(*delivered.lock().expect("order lock"), vec![10]);

    backend.complete(1);
    assert_eq!(scheduler.poll_completions(), 2);
    assert_eq!(*delivered.lock().expect("order lock"), vec![10, 11, 12]);
}

#[test]
fn drain_runs_every_outstanding_callback_before_returning() {
    let backend = ScriptedBackend::default();
    let mut scheduler = ReadbackScheduler::new(backend.clone());
    let delivered = Arc::new(Mutex::new(Vec::<FrameCount>::new()));

    let n = 5u64;
    for frame in 0..n {
        let delivered = delivered.clone();
        scheduler.request_readback(frame, move |frame, _pixels| {
            delivered.lock().expect("order lock").push(frame);
        });
    }

    scheduler.drain();
    assert_eq!(scheduler.in_flight(), 0);
    assert_eq!(
        *delivered.lock().expect("order lock"),
        (0..n).collect::<Vec<_>>()
    );
}

#[test]
fn end_to_end_capture_writes_and_registers_one_file_per_frame() {
    let dir = TempDir::new().expect("temp dir");
    let backend = ScriptedBackend::default();
    let sink = Arc::new(RecordingSink::default());
    let mut labeler = labeler(backend.clone(), dir.path(), sink.clone());

    // Setup registered the segmentation definition with its fixed id and
    // per-label colors.
    {
        let definitions = sink.definitions.lock().expect("sink lock");
        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].id, SEGMENTATION_ANNOTATION_ID);
        assert_eq!(definitions[0].spec[1].pixel_value, Color::rgb(0, 255, 0));
    }

    // Label identity: instance 5 matches "car" after one matching pass.
    let car = LabelingDescriptor::new(["car"]);
    assert!(labeler.resolve_or_queue(5, &car).is_none());
    labeler.run_matching_pass();
    let (index, entry) = labeler.resolve_or_queue(5, &car).expect("instance 5 cached");
    assert_eq!(index, 0);
    assert_eq!(entry.label, "car");
    assert!(labeler.cache().try_resolve(6).is_none());

    // Two annotated frames with distinct pixel content.
    backend.script_pixels(solid_pixels(1));
    backend.script_pixels(solid_pixels(2));
    for frame in [0u64, 1] {
        labeler.begin_frame(frame);
        labeler.on_render_complete(frame);
    }
    assert_eq!(labeler.pending_annotations(), 2);

    let stats = labeler.cleanup();
    assert_eq!(stats.frames_resolved, 2);
    assert_eq!(stats.orphan_readbacks, 0);
    assert_eq!(stats.writer.files_written, 2);
    assert_eq!(stats.writer.failures, 0);
    assert_eq!(labeler.pending_annotations(), 0);

    let reported = sink.reported_files.lock().expect("sink lock");
    assert_eq!(
        *reported,
        vec![
            PathBuf::from("segmentation/segmentation_0.png"),
            PathBuf::from("segmentation/segmentation_1.png"),
        ]
    );
    for (frame, value) in [(0u64, 1u8), (1, 2)] {
        let path = dir
            .path()
            .join(format!("segmentation/segmentation_{}.png", frame));
        let decoded = image::open(&path).expect("readable png").to_rgba8();
        assert_eq!(decoded.as_raw(), &solid_pixels(value));
    }
}

#[test]
fn orphan_readback_is_dropped_without_writing_or_reporting() {
    let dir = TempDir::new().expect("temp dir");
    let backend = ScriptedBackend::default();
    let sink = Arc::new(RecordingSink::default());
    let mut labeler = labeler(backend.clone(), dir.path(), sink.clone());

    // Readback for frame 100 with no pending annotation.
    labeler.on_render_complete(100);
    let stats = labeler.cleanup();

    assert_eq!(stats.orphan_readbacks, 1);
    assert_eq!(stats.frames_resolved, 0);
    assert_eq!(stats.writer.files_written, 0);
    assert!(sink.reported_files.lock().expect("sink lock").is_empty());
    assert!(!dir.path().join("segmentation").exists());
}

#[test]
fn pending_entry_resolves_at_most_once() {
    let dir = TempDir::new().expect("temp dir");
    let backend = ScriptedBackend::default();
    let sink = Arc::new(RecordingSink::default());
    let mut labeler = labeler(backend.clone(), dir.path(), sink.clone());

    // Two readbacks arrive for the same frame; only the first may resolve
    // the pending annotation, the second is an orphan.
    labeler.begin_frame(7);
    labeler.on_render_complete(7);
    labeler.on_render_complete(7);

    let stats = labeler.cleanup();
    assert_eq!(stats.frames_resolved, 1);
    assert_eq!(stats.orphan_readbacks, 1);
    assert_eq!(sink.reported_files.lock().expect("sink lock").len(), 1);
}

#[test]
fn observer_sees_raw_pixels_before_encoding() {
    let dir = TempDir::new().expect("temp dir");
    let backend = ScriptedBackend::default();
    let sink = Arc::new(RecordingSink::default());
    let mut labeler = labeler(backend.clone(), dir.path(), sink);

    let observed = Arc::new(Mutex::new(Vec::<(FrameCount, Vec<u8>)>::new()));
    let observer_log = observed.clone();
    labeler.set_image_observer(Box::new(move |frame, width, height, pixels| {
        assert_eq!((width, height), (WIDTH, HEIGHT));
        observer_log
            .lock()
            .expect("observer lock")
            .push((frame, pixels.to_vec()));
    }));

    backend.script_pixels(solid_pixels(9));
    labeler.begin_frame(3);
    labeler.on_render_complete(3);
    backend.complete(0);
    assert_eq!(labeler.update(), 1);
    labeler.cleanup();

    let observed = observed.lock().expect("observer lock");
    assert_eq!(observed.len(), 1);
    assert_eq!(observed[0].0, 3);
    assert_eq!(observed[0].1, solid_pixels(9));
}

#[test]
fn missing_label_config_aborts_setup() {
    let dir = TempDir::new().expect("temp dir");
    let result = SegmentationLabeler::new(
        ScriptedBackend::default(),
        CaptureConfig {
            width: WIDTH,
            height: HEIGHT,
            output_root: dir.path().to_path_buf(),
            writer_threads: 1,
        },
        None,
        Arc::new(CacheRegistry::new()),
        Arc::new(RecordingSink::default()),
    );
    assert!(matches!(result, Err(CaptureError::MissingLabelConfig)));
}
