//! Asynchronous GPU readback scheduling
//!
//! Requests never block the producer thread; completions are delivered in
//! request order even when the backend finishes transfers out of order.

use std::collections::VecDeque;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use log::{error, warn};

use super::FrameCount;

/// Result of one GPU-to-host transfer: tightly packed pixel bytes, or a
/// backend-specific failure description.
pub type TransferResult = Result<Vec<u8>, String>;

/// The rendering backend's side of a readback.
///
/// `submit` must not block; the backend sends the transfer result on `done`
/// whenever it completes, typically a small number of frames later.
pub trait ReadbackBackend {
    /// Begins an async copy of the current render-target contents.
    fn submit(&mut self, done: Sender<TransferResult>);

    /// Makes progress on outstanding transfers without blocking.
    fn poll(&mut self);

    /// Blocks until every submitted transfer has signalled its channel.
    fn wait_idle(&mut self);
}

type CompletionFn = Box<dyn FnOnce(FrameCount, &[u8]) + Send>;

struct InFlight {
    frame: FrameCount,
    done: Receiver<TransferResult>,
    on_complete: CompletionFn,
}

/// FIFO scheduler pairing readback requests with their completion callbacks.
///
/// Only the queue head is ever delivered, so a completion for frame N+1 can
/// never run before the completion for frame N. The pixel view handed to a
/// callback is valid only for the duration of the call.
pub struct ReadbackScheduler<B: ReadbackBackend> {
    backend: B,
    in_flight: VecDeque<InFlight>,
}

impl<B: ReadbackBackend> ReadbackScheduler<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            in_flight: VecDeque::new(),
        }
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Number of requests whose callbacks have not yet run.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Enqueues a readback of the current frame's image. Never blocks.
    pub fn request_readback(
        &mut self,
        frame: FrameCount,
        on_complete: impl FnOnce(FrameCount, &[u8]) + Send + 'static,
    ) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.backend.submit(tx);
        self.in_flight.push_back(InFlight {
            frame,
            done: rx,
            on_complete: Box::new(on_complete),
        });
    }

    /// Pumps the backend and delivers every completion that is ready at the
    /// queue head. Returns the number of callbacks invoked.
    pub fn poll_completions(&mut self) -> usize {
        self.backend.poll();
        let mut delivered = 0;
        while let Some(entry) = self.in_flight.pop_front() {
            match entry.done.try_recv() {
                Ok(result) => {
                    deliver(entry, result);
                    delivered += 1;
                }
                // Head not ready: later completions wait their turn.
                Err(TryRecvError::Empty) => {
                    self.in_flight.push_front(entry);
                    break;
                }
                Err(TryRecvError::Disconnected) => {
                    warn!("readback for frame {} abandoned by backend", entry.frame);
                }
            }
        }
        delivered
    }

    /// Blocks until all outstanding requests have completed and their
    /// callbacks have run. Used during teardown so no callback can fire
    /// against released resources afterwards.
    pub fn drain(&mut self) {
        if self.in_flight.is_empty() {
            return;
        }
        self.backend.wait_idle();
        while let Some(entry) = self.in_flight.pop_front() {
            match entry.done.recv() {
                Ok(result) => deliver(entry, result),
                Err(_) => warn!("readback for frame {} abandoned during drain", entry.frame),
            }
        }
    }
}

fn deliver(entry: InFlight, result: TransferResult) {
    match result {
        Ok(pixels) => (entry.on_complete)(entry.frame, &pixels),
        Err(reason) => error!("readback for frame {} failed: {}", entry.frame, reason),
    }
}
