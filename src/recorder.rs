// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Depth recording controller.
//!
//! All compressor state (destination buffer, codec context, file handle,
//! counters) lives on one dedicated worker thread. Producers hand frames over
//! through a bounded queue and never block on compression or disk I/O; the
//! worker executes start, submit and finish strictly in submission order.
//!
//! Chunks rotate on a frame budget: when the open chunk already holds
//! `max_frames_per_chunk` frames, it is finalized, flushed and closed before
//! the next chunk is opened for the incoming frame. At most one chunk (and so
//! one compressor context) is alive at any time.

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::chunk::ChunkFile;
use crate::compressor::{chunk_capacity, CompressorFactory, DeflateFactory};
use crate::config::DepthConfig;
use crate::error::{FrameDropped, FrameError, RecorderError};
use crate::frame::{DepthFrame, FrameGeometry};
use crate::protocol::{ChunkDescriptor, DepthState, DepthSummary};

enum DepthCommand {
    Start {
        output_dir: PathBuf,
        reply: oneshot::Sender<Result<(), RecorderError>>,
    },
    Submit(DepthFrame),
    Finish {
        reply: oneshot::Sender<Result<DepthSummary, RecorderError>>,
    },
}

/// Counters shared between producers and the worker
#[derive(Default)]
struct SharedStats {
    state: AtomicU8,
    submitted: AtomicU64,
    accepted: AtomicU64,
    dropped: AtomicU64,
    compressed_bytes: AtomicU64,
    chunks_closed: AtomicU64,
}

impl SharedStats {
    fn reset(&self) {
        self.submitted.store(0, Ordering::Relaxed);
        self.accepted.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        self.compressed_bytes.store(0, Ordering::Relaxed);
        self.chunks_closed.store(0, Ordering::Relaxed);
    }

    fn set_state(&self, state: DepthState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn state(&self) -> DepthState {
        DepthState::from_u8(self.state.load(Ordering::Acquire))
    }
}

/// Point-in-time view of the depth recording
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct RecorderStats {
    pub state: DepthState,
    pub frames_submitted: u64,
    pub frames_accepted: u64,
    pub frames_dropped: u64,
    pub compressed_bytes: u64,
    pub chunks_closed: u64,
}

/// Handle to the depth worker
pub struct DepthRecorder {
    tx: Sender<DepthCommand>,
    stats: Arc<SharedStats>,
}

impl DepthRecorder {
    /// Spawn a worker compressing with raw deflate at the configured level
    pub fn new(config: &DepthConfig) -> Result<Self, RecorderError> {
        Self::with_factory(config, DeflateFactory::new(config.level().to_flate2()))
    }

    /// Spawn a worker that opens its compressors from `factory`
    pub fn with_factory<F: CompressorFactory>(
        config: &DepthConfig,
        factory: F,
    ) -> Result<Self, RecorderError> {
        let (tx, rx) = channel::bounded(config.queue_capacity.max(1));
        let stats = Arc::new(SharedStats::default());

        let worker = Worker {
            factory,
            max_frames_per_chunk: config.max_frames_per_chunk.max(1),
            config: config.clone(),
            stats: stats.clone(),
            session: None,
        };

        thread::Builder::new()
            .name("depth-recorder".to_string())
            .spawn(move || worker.run(rx))
            .map_err(|e| RecorderError::io("depth-recorder worker", e))?;

        Ok(Self { tx, stats })
    }

    /// Open a new depth recording writing chunks into `output_dir`
    pub async fn start(&self, output_dir: impl Into<PathBuf>) -> Result<(), RecorderError> {
        let (reply, rx) = oneshot::channel();
        self.send(DepthCommand::Start {
            output_dir: output_dir.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| RecorderError::WorkerGone)?
    }

    /// Hand a frame to the worker without waiting for it to be compressed.
    ///
    /// Only queue-level failures surface here; frames rejected by the worker
    /// are counted in [`stats`](Self::stats) as dropped.
    pub fn submit(&self, frame: DepthFrame) -> Result<(), FrameDropped> {
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);

        match self.tx.try_send(DepthCommand::Submit(frame)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Depth queue full, dropping frame");
                Err(FrameDropped::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                Err(FrameDropped::WorkerGone)
            }
        }
    }

    /// Close the recording after every previously submitted frame is handled
    pub async fn finish(&self) -> Result<DepthSummary, RecorderError> {
        let (reply, rx) = oneshot::channel();
        self.send(DepthCommand::Finish { reply }).await?;
        rx.await.map_err(|_| RecorderError::WorkerGone)?
    }

    pub fn state(&self) -> DepthState {
        self.stats.state()
    }

    pub fn stats(&self) -> RecorderStats {
        RecorderStats {
            state: self.stats.state(),
            frames_submitted: self.stats.submitted.load(Ordering::Relaxed),
            frames_accepted: self.stats.accepted.load(Ordering::Relaxed),
            frames_dropped: self.stats.dropped.load(Ordering::Relaxed),
            compressed_bytes: self.stats.compressed_bytes.load(Ordering::Relaxed),
            chunks_closed: self.stats.chunks_closed.load(Ordering::Relaxed),
        }
    }

    // Control commands may wait for queue space; do that off the async executor
    async fn send(&self, command: DepthCommand) -> Result<(), RecorderError> {
        let tx = self.tx.clone();
        tokio::task::spawn_blocking(move || tx.send(command))
            .await
            .map_err(|_| RecorderError::WorkerGone)?
            .map_err(|_| RecorderError::WorkerGone)
    }
}

/// Session-scoped depth context owned by the worker
struct DepthSession<F: CompressorFactory> {
    output_dir: PathBuf,
    geometry: Option<FrameGeometry>,
    capacity: usize,
    next_index: u32,
    current: Option<ChunkFile<F::Compressor>>,
    closed: Vec<ChunkDescriptor>,
    failure: Option<RecorderError>,
}

struct Worker<F: CompressorFactory> {
    factory: F,
    max_frames_per_chunk: usize,
    config: DepthConfig,
    stats: Arc<SharedStats>,
    session: Option<DepthSession<F>>,
}

impl<F: CompressorFactory> Worker<F> {
    fn run(mut self, rx: Receiver<DepthCommand>) {
        debug!("Depth worker started");

        while let Ok(command) = rx.recv() {
            match command {
                DepthCommand::Start { output_dir, reply } => {
                    let _ = reply.send(self.start(output_dir));
                }
                DepthCommand::Submit(frame) => match self.submit(frame) {
                    Ok(()) => {
                        self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!("Dropping depth frame: {}", e);
                    }
                },
                DepthCommand::Finish { reply } => {
                    let _ = reply.send(self.finish());
                }
            }
        }

        if let Some(session) = &self.session {
            if session.current.is_some() {
                warn!(
                    "Depth worker shutting down with an open chunk in {}",
                    session.output_dir.display()
                );
            }
        }
        debug!("Depth worker stopped");
    }

    fn start(&mut self, output_dir: PathBuf) -> Result<(), RecorderError> {
        if self.session.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }

        fs::create_dir_all(&output_dir).map_err(|e| RecorderError::io(&output_dir, e))?;

        self.stats.reset();
        self.session = Some(DepthSession {
            output_dir,
            geometry: None,
            capacity: 0,
            next_index: 0,
            current: None,
            closed: Vec::new(),
            failure: None,
        });
        self.stats.set_state(DepthState::Open);

        info!(
            "Depth recording started ({} frames per chunk)",
            self.max_frames_per_chunk
        );
        Ok(())
    }

    fn submit(&mut self, frame: DepthFrame) -> Result<(), FrameDropped> {
        let max_frames = self.max_frames_per_chunk;
        let session = self.session.as_mut().ok_or(FrameDropped::NotRecording)?;
        if session.failure.is_some() {
            return Err(FrameDropped::NotRecording);
        }

        let geometry = frame.geometry();
        match session.geometry {
            Some(expected) if expected != geometry => {
                return Err(FrameError::GeometryMismatch {
                    expected: expected.to_string(),
                    actual: geometry.to_string(),
                }
                .into());
            }
            Some(_) => {}
            None => {
                if !self.config.accepts(&geometry) {
                    return Err(FrameError::GeometryMismatch {
                        expected: declared_geometry(&self.config),
                        actual: geometry.to_string(),
                    }
                    .into());
                }
                session.geometry = Some(geometry);
                session.capacity = chunk_capacity(geometry.frame_len(), max_frames);
                info!(
                    "Depth geometry locked at {}, {} byte chunk buffer",
                    geometry, session.capacity
                );
            }
        }

        let full = session
            .current
            .as_ref()
            .is_some_and(|chunk| chunk.frame_count() >= max_frames as u64);
        if full {
            self.stats.set_state(DepthState::RotatingOrFlushing);
            let rotated = close_current(session, &self.stats);
            self.stats.set_state(DepthState::Open);
            if let Err(e) = rotated {
                error!("Failed to close depth chunk during rotation: {}", e);
                session.failure = Some(e);
                self.stats.set_state(DepthState::Failed);
                return Err(FrameDropped::NotRecording);
            }
        }

        if session.current.is_none() {
            match ChunkFile::open(
                &session.output_dir,
                session.next_index,
                &self.factory,
                session.capacity,
            ) {
                Ok(chunk) => {
                    session.next_index += 1;
                    session.current = Some(chunk);
                }
                Err(e) => {
                    error!("Depth recording disabled for this session: {}", e);
                    session.failure = Some(e);
                    self.stats.set_state(DepthState::Failed);
                    return Err(FrameDropped::NotRecording);
                }
            }
        }

        let chunk = session.current.as_mut().ok_or(FrameDropped::NotRecording)?;
        chunk.compress(&frame)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<DepthSummary, RecorderError> {
        let mut session = self.session.take().ok_or(RecorderError::NotStarted)?;
        self.stats.set_state(DepthState::RotatingOrFlushing);

        let closing = match session.current.take() {
            Some(chunk) if chunk.frame_count() == 0 => {
                debug!("Discarding empty chunk {}", chunk.index());
                chunk.discard()
            }
            Some(chunk) => {
                session.current = Some(chunk);
                close_current(&mut session, &self.stats)
            }
            None => Ok(()),
        };

        // The first failure wins; a later close error is only logged
        let failure = match (session.failure.take(), closing) {
            (Some(failure), Err(e)) => {
                warn!("Failed to close final depth chunk: {}", e);
                Some(failure)
            }
            (Some(failure), Ok(())) => Some(failure),
            (None, Err(e)) => Some(e),
            (None, Ok(())) => None,
        };

        let summary = DepthSummary {
            frames_submitted: self.stats.submitted.load(Ordering::Relaxed),
            frames_accepted: self.stats.accepted.load(Ordering::Relaxed),
            frames_dropped: self.stats.dropped.load(Ordering::Relaxed),
            compressed_bytes: self.stats.compressed_bytes.load(Ordering::Relaxed),
            chunks: session.closed,
            error: failure.as_ref().map(|e| e.to_string()),
        };

        match failure {
            None => {
                self.stats.set_state(DepthState::Closed);
                info!(
                    "Depth recording finished: {} chunks, {} frames, {} dropped",
                    summary.chunks.len(),
                    summary.total_frames(),
                    summary.frames_dropped
                );
                Ok(summary)
            }
            // Nothing reached disk: the failure is the whole result
            Some(e) if summary.chunks.is_empty() => {
                self.stats.set_state(DepthState::Failed);
                error!("Depth recording finished with error: {}", e);
                Err(e)
            }
            // Closed chunks stay valid; report them alongside the failure
            Some(e) => {
                self.stats.set_state(DepthState::Failed);
                error!(
                    "Depth recording failed after {} closed chunks ({} frames): {}",
                    summary.chunks.len(),
                    summary.total_frames(),
                    e
                );
                Ok(summary)
            }
        }
    }
}

/// Finalize, flush and close the open chunk, recording its descriptor
fn close_current<F: CompressorFactory>(
    session: &mut DepthSession<F>,
    stats: &SharedStats,
) -> Result<(), RecorderError> {
    let Some(chunk) = session.current.take() else {
        return Ok(());
    };

    let descriptor = chunk.close()?;
    info!(
        "Closed {} ({} frames, {} bytes)",
        descriptor.name, descriptor.frame_count, descriptor.byte_size
    );
    stats
        .compressed_bytes
        .fetch_add(descriptor.byte_size, Ordering::Relaxed);
    stats.chunks_closed.fetch_add(1, Ordering::Relaxed);
    session.closed.push(descriptor);
    Ok(())
}

fn declared_geometry(config: &DepthConfig) -> String {
    let dim = |v: Option<usize>| v.map_or_else(|| "*".to_string(), |v| v.to_string());
    format!(
        "{}x{} ({} B/sample)",
        dim(config.width),
        dim(config.height),
        dim(config.bytes_per_sample)
    )
}

