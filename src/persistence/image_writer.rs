//! Encode-and-persist worker pool
//!
//! Lossless PNG encoding keeps semantic segmentation colors exact; a lossy
//! format would corrupt the label round-trip.

use std::fs;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use image::{ImageBuffer, ImageFormat, Rgba};
use log::{debug, error, info};

use super::{AsyncWriteRequest, PersistenceError, PersistenceResult};

/// Outcome of one write request, delivered on the pool's outcome channel.
#[derive(Debug)]
pub enum WriteOutcome {
    Written { path: PathBuf, bytes: u64 },
    Failed { path: PathBuf, error: PersistenceError },
}

/// Totals collected when the pool shuts down.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriterStats {
    pub files_written: u64,
    pub failures: u64,
}

/// Cloneable intake handle; completion callbacks hold one of these instead
/// of the pool itself.
#[derive(Clone)]
pub struct ImageWriteQueue {
    intake: Sender<AsyncWriteRequest>,
}

impl ImageWriteQueue {
    /// Enqueues a write without blocking the producer thread.
    pub fn write(&self, request: AsyncWriteRequest) -> PersistenceResult<()> {
        self.intake
            .send(request)
            .map_err(|_| PersistenceError::QueueClosed)
    }
}

/// Worker pool that encodes pixel buffers to PNG and writes them to disk.
pub struct ImageWriterPool {
    intake: Option<Sender<AsyncWriteRequest>>,
    outcomes: Receiver<WriteOutcome>,
    workers: Vec<JoinHandle<()>>,
}

impl ImageWriterPool {
    /// Pool sized for background I/O: half the cores, at least one.
    pub fn new() -> Self {
        Self::with_workers((num_cpus::get() / 2).max(1))
    }

    pub fn with_workers(count: usize) -> Self {
        let count = count.max(1);
        let (intake_tx, intake_rx) = crossbeam_channel::unbounded::<AsyncWriteRequest>();
        let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded::<WriteOutcome>();

        let workers = (0..count)
            .map(|i| {
                let intake = intake_rx.clone();
                let outcomes = outcome_tx.clone();
                thread::Builder::new()
                    .name(format!("image-writer-{}", i))
                    .spawn(move || worker_loop(intake, outcomes))
                    .expect("failed to spawn image writer thread")
            })
            .collect();

        debug!("image writer pool started with {} workers", count);
        Self {
            intake: Some(intake_tx),
            outcomes: outcome_rx,
            workers,
        }
    }

    /// Enqueues a write; see [`ImageWriteQueue::write`].
    pub fn write(&self, request: AsyncWriteRequest) -> PersistenceResult<()> {
        match &self.intake {
            Some(intake) => intake
                .send(request)
                .map_err(|_| PersistenceError::QueueClosed),
            None => Err(PersistenceError::QueueClosed),
        }
    }

    /// Intake handle for completion callbacks.
    pub fn queue(&self) -> ImageWriteQueue {
        ImageWriteQueue {
            intake: self
                .intake
                .clone()
                .expect("pool intake already closed"),
        }
    }

    /// Outcome channel carrying per-file results, including asynchronous
    /// failures.
    pub fn outcomes(&self) -> &Receiver<WriteOutcome> {
        &self.outcomes
    }

    /// Closes intake, completes all queued writes, joins the workers, and
    /// drains whatever is left on the outcome channel into totals.
    ///
    /// All external [`ImageWriteQueue`] clones must be dropped first or the
    /// workers never observe a closed channel.
    pub fn shutdown(mut self) -> WriterStats {
        self.intake.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("image writer thread panicked during shutdown");
            }
        }
        let mut stats = WriterStats::default();
        while let Ok(outcome) = self.outcomes.try_recv() {
            match outcome {
                WriteOutcome::Written { .. } => stats.files_written += 1,
                WriteOutcome::Failed { .. } => stats.failures += 1,
            }
        }
        info!(
            "image writer pool shut down: {} written, {} failed",
            stats.files_written, stats.failures
        );
        stats
    }
}

impl Default for ImageWriterPool {
    fn default() -> Self {
        Self::new()
    }
}

fn worker_loop(intake: Receiver<AsyncWriteRequest>, outcomes: Sender<WriteOutcome>) {
    for request in intake.iter() {
        let path = request.path.clone();
        match encode_and_write(request) {
            Ok(bytes) => {
                debug!("wrote annotation image {} ({} bytes)", path.display(), bytes);
                let _ = outcomes.send(WriteOutcome::Written { path, bytes });
            }
            Err(error) => {
                error!(
                    "failed to write annotation image {}: {}",
                    path.display(),
                    error
                );
                let _ = outcomes.send(WriteOutcome::Failed { path, error });
            }
        }
    }
}

fn encode_and_write(request: AsyncWriteRequest) -> PersistenceResult<u64> {
    if let Some(parent) = request.path.parent() {
        fs::create_dir_all(parent)?;
    }
    let AsyncWriteRequest {
        pixels,
        width,
        height,
        path,
    } = request;
    let image: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::from_raw(width, height, pixels)
        .ok_or_else(|| {
            PersistenceError::EncodeError(format!(
                "pixel buffer does not match {}x{} RGBA dimensions",
                width, height
            ))
        })?;
    image.save_with_format(&path, ImageFormat::Png)?;
    Ok(fs::metadata(&path)?.len())
}
