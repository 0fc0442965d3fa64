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


// Depth chunk file: one output handle, one compressor and its destination buffer

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::compressor::{CompressorFactory, StreamCompressor};
use crate::error::{CompressorError, RecorderError};
use crate::frame::DepthFrame;
use crate::protocol::ChunkDescriptor;

/// File name of chunk `index`
pub fn chunk_file_name(index: u32) -> String {
    format!("depth_map_{}.depth", index)
}

/// The currently open chunk of a depth recording.
///
/// Opening acquires the compressor, its buffer and the file handle together;
/// [`close`](Self::close) or [`discard`](Self::discard) releases them. A chunk
/// dropped without either (worker torn down mid-session) loses its unflushed
/// bytes, which is logged.
pub struct ChunkFile<C: StreamCompressor> {
    index: u32,
    name: String,
    path: PathBuf,
    file: File,
    compressor: C,
    frame_count: u64,
    bytes_written: u64,
    flushed: usize,
    released: bool,
}

impl<C: StreamCompressor> ChunkFile<C> {
    pub fn open<F>(
        dir: &Path,
        index: u32,
        factory: &F,
        capacity: usize,
    ) -> Result<Self, RecorderError>
    where
        F: CompressorFactory<Compressor = C>,
    {
        let compressor = factory.open(capacity).map_err(RecorderError::CompressorInit)?;

        let name = chunk_file_name(index);
        let path = dir.join(&name);
        let file = File::create(&path).map_err(|e| RecorderError::io(&path, e))?;

        debug!(
            "Opened chunk {} at {} ({} byte destination)",
            index,
            path.display(),
            capacity
        );

        Ok(Self {
            index,
            name,
            path,
            file,
            compressor,
            frame_count: 0,
            bytes_written: 0,
            flushed: 0,
            released: false,
        })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Compress one frame; the frame counter only moves on success
    pub fn compress(&mut self, frame: &DepthFrame) -> Result<(), CompressorError> {
        self.compressor.feed(frame.payload())?;
        self.frame_count += 1;
        Ok(())
    }

    /// Write compressed bytes not yet on disk
    pub fn flush(&mut self) -> Result<usize, RecorderError> {
        let output = self.compressor.output();
        let pending = &output[self.flushed..];
        if pending.is_empty() {
            return Ok(0);
        }

        self.file
            .write_all(pending)
            .map_err(|e| RecorderError::io(&self.path, e))?;

        let written = pending.len();
        self.flushed += written;
        self.bytes_written += written as u64;
        Ok(written)
    }

    /// Finalize the stream, write the remaining bytes and close the file
    pub fn close(mut self) -> Result<ChunkDescriptor, RecorderError> {
        self.released = true;
        self.compressor.finalize()?;
        self.flush()?;
        self.file
            .sync_all()
            .map_err(|e| RecorderError::io(&self.path, e))?;

        Ok(ChunkDescriptor {
            index: self.index,
            name: self.name.clone(),
            path: self.path.clone(),
            frame_count: self.frame_count,
            byte_size: self.bytes_written,
        })
    }

    /// Release the chunk and delete its file
    pub fn discard(mut self) -> Result<(), RecorderError> {
        self.released = true;
        fs::remove_file(&self.path).map_err(|e| RecorderError::io(&self.path, e))
    }
}

impl<C: StreamCompressor> Drop for ChunkFile<C> {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                "Chunk {} dropped while open: {} frames, {} compressed bytes never flushed",
                self.name,
                self.frame_count,
                self.compressor.destination_bytes_written() - self.flushed
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::{chunk_capacity, DeflateFactory};
    use crate::frame::FrameGeometry;
    use flate2::read::DeflateDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    fn frame(fill: u8) -> DepthFrame {
        let geometry = FrameGeometry::packed(8, 4, 2).unwrap();
        DepthFrame::new(geometry, vec![fill; 64]).unwrap()
    }

    #[test]
    fn test_close_writes_complete_stream() {
        let dir = TempDir::new().unwrap();
        let mut chunk =
            ChunkFile::open(dir.path(), 3, &DeflateFactory::default(), chunk_capacity(64, 2))
                .unwrap();
        chunk.compress(&frame(1)).unwrap();
        chunk.compress(&frame(2)).unwrap();

        let descriptor = chunk.close().unwrap();
        assert_eq!(descriptor.name, "depth_map_3.depth");
        assert_eq!(descriptor.frame_count, 2);

        let on_disk = std::fs::read(&descriptor.path).unwrap();
        assert_eq!(on_disk.len() as u64, descriptor.byte_size);

        let mut raw = Vec::new();
        DeflateDecoder::new(&on_disk[..])
            .read_to_end(&mut raw)
            .unwrap();
        assert_eq!(raw, [vec![1u8; 64], vec![2u8; 64]].concat());
    }

    #[test]
    fn test_failed_compress_does_not_count() {
        let dir = TempDir::new().unwrap();
        let mut chunk =
            ChunkFile::open(dir.path(), 0, &DeflateFactory::default(), chunk_capacity(64, 1))
                .unwrap();
        chunk.compress(&frame(1)).unwrap();
        assert!(chunk.compress(&frame(2)).is_err());
        assert_eq!(chunk.frame_count(), 1);
        chunk.close().unwrap();
    }

    #[test]
    fn test_discard_removes_file() {
        let dir = TempDir::new().unwrap();
        let chunk = ChunkFile::open(dir.path(), 0, &DeflateFactory::default(), 128).unwrap();
        let path = chunk.path().to_path_buf();
        assert!(path.exists());
        chunk.discard().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_init_failure_creates_no_file() {
        let dir = TempDir::new().unwrap();
        let result = ChunkFile::open(dir.path(), 0, &DeflateFactory::default(), 0);
        assert!(matches!(result, Err(RecorderError::CompressorInit(_))));
        assert!(!dir.path().join(chunk_file_name(0)).exists());
    }
}
