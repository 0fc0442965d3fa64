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


// Shared helpers for integration tests

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use depth_recorder::compressor::{CompressorFactory, DeflateCompressor, StreamCompressor};
use depth_recorder::{
    ArtifactInfo, ColorFrame, CompressorError, DepthFrame, FrameGeometry, FrameRecord,
    VideoEncoder,
};
use flate2::read::DeflateDecoder;
use flate2::Compression;
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Counters shared between a test and the compressors its factory opened
#[derive(Default)]
pub struct CompressorProbe {
    pub open_attempts: AtomicUsize,
    pub opened: AtomicUsize,
    pub live: AtomicUsize,
    pub max_live: AtomicUsize,
    pub feeds: AtomicUsize,
}

/// Deflate factory with fault injection and live-context tracking
#[derive(Clone)]
pub struct TestFactory {
    pub probe: Arc<CompressorProbe>,
    fail_feeds: Arc<HashSet<usize>>,
    fail_opens: Arc<HashSet<usize>>,
    fail_every_open: bool,
    feed_delay: Option<Duration>,
}

impl TestFactory {
    pub fn new() -> Self {
        Self {
            probe: Arc::new(CompressorProbe::default()),
            fail_feeds: Arc::new(HashSet::new()),
            fail_opens: Arc::new(HashSet::new()),
            fail_every_open: false,
            feed_delay: None,
        }
    }

    /// Fail the feeds with these zero-based indices, counted across the session
    pub fn failing_feeds(feeds: &[usize]) -> Self {
        Self {
            fail_feeds: Arc::new(feeds.iter().copied().collect()),
            ..Self::new()
        }
    }

    pub fn failing_open() -> Self {
        Self {
            fail_every_open: true,
            ..Self::new()
        }
    }

    /// Fail the opens with these zero-based indices, counted across the session
    pub fn failing_opens(opens: &[usize]) -> Self {
        Self {
            fail_opens: Arc::new(opens.iter().copied().collect()),
            ..Self::new()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            feed_delay: Some(delay),
            ..Self::new()
        }
    }
}

pub struct TestCompressor {
    inner: DeflateCompressor,
    probe: Arc<CompressorProbe>,
    fail_feeds: Arc<HashSet<usize>>,
    feed_delay: Option<Duration>,
}

impl CompressorFactory for TestFactory {
    type Compressor = TestCompressor;

    fn open(&self, capacity: usize) -> Result<TestCompressor, CompressorError> {
        let attempt = self.probe.open_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_every_open || self.fail_opens.contains(&attempt) {
            return Err(CompressorError::Init {
                capacity,
                reason: "injected init failure".to_string(),
            });
        }
        let inner = DeflateCompressor::open(capacity, Compression::default())?;
        self.probe.opened.fetch_add(1, Ordering::SeqCst);
        let live = self.probe.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(TestCompressor {
            inner,
            probe: self.probe.clone(),
            fail_feeds: self.fail_feeds.clone(),
            feed_delay: self.feed_delay,
        })
    }
}

impl StreamCompressor for TestCompressor {
    fn feed(&mut self, payload: &[u8]) -> Result<(), CompressorError> {
        let index = self.probe.feeds.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.feed_delay {
            std::thread::sleep(delay);
        }
        if self.fail_feeds.contains(&index) {
            return Err(CompressorError::Codec(format!("injected failure on feed {}", index)));
        }
        self.inner.feed(payload)
    }

    fn finalize(&mut self) -> Result<u64, CompressorError> {
        self.inner.finalize()
    }

    fn output(&self) -> &[u8] {
        self.inner.output()
    }
}

impl Drop for TestCompressor {
    fn drop(&mut self) {
        self.probe.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Packed 16-bit frame of `len` bytes filled with `fill`
pub fn packed_frame(len: usize, fill: u8) -> DepthFrame {
    let geometry = FrameGeometry::packed(len / 2, 1, 2).unwrap();
    DepthFrame::new(geometry, vec![fill; len]).unwrap()
}

/// Frame whose rows carry `padding` extra bytes; payload bytes depend on `seed`
pub fn padded_frame(width: usize, height: usize, padding: usize, seed: u8) -> DepthFrame {
    let stride = width * 2 + padding;
    let geometry = FrameGeometry::new(width, height, stride, 2).unwrap();
    let data: Vec<u8> = (0..stride * height)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect();
    DepthFrame::new(geometry, data).unwrap()
}

/// Decompress a chunk file and split it into frames of `frame_len` bytes
pub fn read_chunk_frames(path: &Path, frame_len: usize) -> Vec<Vec<u8>> {
    let compressed = std::fs::read(path).unwrap();
    let mut raw = Vec::new();
    DeflateDecoder::new(&compressed[..])
        .read_to_end(&mut raw)
        .unwrap();
    assert_eq!(raw.len() % frame_len, 0, "chunk holds a partial frame");
    raw.chunks_exact(frame_len).map(|f| f.to_vec()).collect()
}

pub fn pose_record(i: usize) -> FrameRecord {
    let v = i as f32 * 0.1;
    FrameRecord {
        pose: [v, -v, 0.5, 0.0, 0.0, 0.70710677, 0.70710677],
        gripper_poses: [[v; 7], [1.0 - v; 7]],
        gripper_width: 0.08 - v / 100.0,
        timestamp: 1000.0 + i as f64 * 0.033,
    }
}

pub fn color_frame(i: usize) -> ColorFrame {
    ColorFrame {
        width: 8,
        height: 4,
        bytes_per_row: 32,
        timestamp: i as f64 * 0.033,
        data: bytes::Bytes::from(vec![i as u8; 128]),
    }
}

/// What a [`MockVideoEncoder`] observed
#[derive(Default)]
pub struct VideoProbe {
    pub frames: AtomicUsize,
    pub finished: AtomicUsize,
    pub path: Mutex<Option<PathBuf>>,
}

/// Encoder writing a fixed-size placeholder file; can be told to fail
pub struct MockVideoEncoder {
    pub probe: Arc<VideoProbe>,
    fail_start: bool,
    fail_finish: bool,
    path: Option<PathBuf>,
}

impl MockVideoEncoder {
    pub fn new() -> Self {
        Self {
            probe: Arc::new(VideoProbe::default()),
            fail_start: false,
            fail_finish: false,
            path: None,
        }
    }

    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::new()
        }
    }

    pub fn failing_finish() -> Self {
        Self {
            fail_finish: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl VideoEncoder for MockVideoEncoder {
    async fn start(&mut self, output_dir: &Path) -> Result<()> {
        if self.fail_start {
            bail!("mock encoder refused to start");
        }
        self.path = Some(output_dir.join("video.mp4"));
        Ok(())
    }

    fn append(&mut self, _frame: &ColorFrame) -> Result<()> {
        self.probe.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn finish(&mut self) -> Result<ArtifactInfo> {
        self.probe.finished.fetch_add(1, Ordering::SeqCst);
        if self.fail_finish {
            bail!("mock encoder failed to finish");
        }
        let Some(path) = self.path.take() else {
            bail!("mock encoder not started");
        };
        let frames = self.probe.frames.load(Ordering::SeqCst) as u64;
        let data = vec![0xABu8; 64 * frames as usize + 16];
        tokio::fs::write(&path, &data).await?;
        *self.probe.path.lock().unwrap() = Some(path.clone());
        Ok(ArtifactInfo {
            name: "video.mp4".to_string(),
            path,
            bytes: data.len() as u64,
            frame_count: Some(frames),
        })
    }
}
