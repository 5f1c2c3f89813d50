//! Runs the capture pipeline against a synthetic backend and writes a small
//! segmentation dataset to ./demo_dataset. Useful for eyeballing output
//! without a GPU.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use crossbeam_channel::Sender;
use log::info;

use percept_engine::capture::readback::{ReadbackBackend, TransferResult};
use percept_engine::dataset::{
    AnnotationDefinition, AnnotationHandle, DatasetResult, DatasetSink,
};
use percept_engine::{
    CacheRegistry, CaptureConfig, Color, LabelConfig, LabelEntry, LabelingDescriptor,
    SegmentationLabeler,
};

const WIDTH: u32 = 128;
const HEIGHT: u32 = 96;
const FRAMES: u64 = 10;

/// Completes every transfer immediately with a scene rendered on the CPU:
/// a "car" rectangle over a "tree" background, drifting right each frame.
struct SyntheticBackend {
    frame: u64,
}

impl SyntheticBackend {
    fn render(&self) -> Vec<u8> {
        let car = Color::rgb(255, 0, 0).to_bytes();
        let tree = Color::rgb(0, 255, 0).to_bytes();
        let left = (self.frame * 4) as u32 % WIDTH;
        let mut pixels = Vec::with_capacity((WIDTH * HEIGHT * 4) as usize);
        for y in 0..HEIGHT {
            for x in 0..WIDTH {
                let in_car = x >= left && x < (left + 32).min(WIDTH) && y >= 32 && y < 64;
                pixels.extend_from_slice(if in_car { &car } else { &tree });
            }
        }
        pixels
    }
}

impl ReadbackBackend for SyntheticBackend {
    fn submit(&mut self, done: Sender<TransferResult>) {
        let _ = done.send(Ok(self.render()));
        self.frame += 1;
    }

    fn poll(&mut self) {}

    fn wait_idle(&mut self) {}
}

/// Logs manifest events and persists the annotation schema next to the data.
struct LoggingSink {
    output_root: PathBuf,
    open_annotations: AtomicU64,
}

struct LoggingHandle;

impl AnnotationHandle for LoggingHandle {
    fn report_file(&self, relative_path: &Path) {
        info!("manifest: annotation file {}", relative_path.display());
    }
}

impl DatasetSink for LoggingSink {
    fn register_annotation_definition(
        &self,
        definition: &AnnotationDefinition,
    ) -> DatasetResult<()> {
        info!("manifest: registered definition {} ({})", definition.id, definition.kind);
        std::fs::create_dir_all(&self.output_root).ok();
        if let Ok(json) = serde_json::to_string_pretty(&definition.schema_json()) {
            let _ = std::fs::write(self.output_root.join("annotation_definitions.json"), json);
        }
        Ok(())
    }

    fn report_annotation_async(&self, _definition_id: &str) -> Box<dyn AnnotationHandle> {
        self.open_annotations.fetch_add(1, Ordering::Relaxed);
        Box::new(LoggingHandle)
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let output_root = PathBuf::from("demo_dataset");
    let label_config = Arc::new(LabelConfig::new(vec![
        LabelEntry {
            label: "car".to_string(),
            color: Color::rgb(255, 0, 0),
        },
        LabelEntry {
            label: "tree".to_string(),
            color: Color::rgb(0, 255, 0),
        },
    ])?);
    let sink = Arc::new(LoggingSink {
        output_root: output_root.clone(),
        open_annotations: AtomicU64::new(0),
    });

    let mut labeler = SegmentationLabeler::new(
        SyntheticBackend { frame: 0 },
        CaptureConfig {
            width: WIDTH,
            height: HEIGHT,
            output_root: output_root.clone(),
            writer_threads: 0,
        },
        Some(label_config),
        Arc::new(CacheRegistry::new()),
        sink.clone(),
    )?;

    // Two scene objects; their identities resolve from the cache after the
    // first frame's matching pass.
    let car = LabelingDescriptor::new(["car"]);
    let tree = LabelingDescriptor::new(["tree"]);
    for frame in 0..FRAMES {
        labeler.begin_frame(frame);
        let _ = labeler.resolve_or_queue(1, &car);
        let _ = labeler.resolve_or_queue(2, &tree);
        labeler.run_matching_pass();
        labeler.on_render_complete(frame);
        labeler.update();
    }

    let stats = labeler.cleanup();
    info!(
        "captured {} frames, {} annotations opened, {} files written ({} failures) into {}",
        stats.frames_resolved,
        sink.open_annotations.load(Ordering::Relaxed),
        stats.writer.files_written,
        stats.writer.failures,
        output_root.display()
    );
    Ok(())
}
