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


/// Streaming deflate compressor writing into one fixed-capacity destination buffer
///
/// A compressor is opened per chunk. Raw frame payloads are fed one at a time
/// and the compressed bytes accumulate in the destination buffer until the
/// owning chunk finalizes the stream and writes the buffer out in one bulk
/// write.
///
/// # Byte Budget
///
/// The destination never grows. Before each feed the compressor checks that
/// the worst-case deflate output of everything fed so far plus the new payload
/// still fits, so the codec can always consume a whole payload in one call.
/// A feed that would break that budget fails with
/// [`CompressorError::Overrun`] without touching codec state.
use flate2::{Compress, Compression, FlushCompress, Status};
use tracing::trace;

use crate::error::CompressorError;

/// Largest deflate block the encoder emits before starting a new one
const BLOCK_LEN: usize = 16 * 1024;

/// Upper bound of the deflate output for `len` input bytes, at any level
///
/// The fast path can emit fixed-Huffman blocks for incompressible input, so
/// every literal may cost 9 bits. On top of that: a header per block and a
/// constant for the stream trailer and final flush. Saturates at
/// `usize::MAX`, which no destination buffer can be allocated for.
pub fn deflate_bound(len: usize) -> usize {
    let blocks = len / BLOCK_LEN + 1;
    len.saturating_add(len >> 3)
        .saturating_add(blocks.saturating_mul(5))
        .saturating_add(64)
}

/// Destination capacity needed for `max_frames` frames of `frame_len` raw bytes
pub fn chunk_capacity(frame_len: usize, max_frames: usize) -> usize {
    deflate_bound(frame_len.saturating_mul(max_frames))
}

/// One streaming compression context bound to its destination buffer
pub trait StreamCompressor: Send {
    /// Compress the whole payload, or fail without consuming it
    fn feed(&mut self, payload: &[u8]) -> Result<(), CompressorError>;

    /// End the stream and return the total compressed byte count
    fn finalize(&mut self) -> Result<u64, CompressorError>;

    /// Compressed bytes in the destination buffer since open
    fn output(&self) -> &[u8];

    fn destination_bytes_written(&self) -> usize {
        self.output().len()
    }
}

/// Opens compressors for new chunks
pub trait CompressorFactory: Send + 'static {
    type Compressor: StreamCompressor + 'static;

    fn open(&self, capacity: usize) -> Result<Self::Compressor, CompressorError>;
}

/// Raw deflate (RFC 1951) implementation backed by flate2
pub struct DeflateCompressor {
    codec: Compress,
    destination: Vec<u8>,
    capacity: usize,
    finalized: bool,
}

impl DeflateCompressor {
    pub fn open(capacity: usize, level: Compression) -> Result<Self, CompressorError> {
        if capacity == 0 {
            return Err(CompressorError::Init {
                capacity,
                reason: "destination capacity must be > 0".to_string(),
            });
        }

        let mut destination = Vec::new();
        destination
            .try_reserve_exact(capacity)
            .map_err(|e| CompressorError::Init {
                capacity,
                reason: e.to_string(),
            })?;

        Ok(Self {
            codec: Compress::new(level, false),
            destination,
            capacity,
            finalized: false,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn remaining(&self) -> usize {
        self.capacity - self.destination.len()
    }

    /// Run the codec over `input`, bounded by the destination capacity.
    /// Returns the number of input bytes consumed.
    fn run(&mut self, input: &[u8], flush: FlushCompress) -> Result<(usize, Status), CompressorError> {
        let before_in = self.codec.total_in();
        let before_out = self.codec.total_out();

        // compress_vec only writes into spare capacity; it never reallocates
        let status = self
            .codec
            .compress_vec(input, &mut self.destination, flush)
            .map_err(|e| CompressorError::Codec(e.to_string()))?;

        let consumed = (self.codec.total_in() - before_in) as usize;
        let produced = (self.codec.total_out() - before_out) as usize;
        trace!(consumed, produced, ?status, "deflate step");

        if consumed == 0 && produced == 0 && status != Status::StreamEnd {
            return Ok((0, Status::BufError));
        }
        let status = match status {
            Status::BufError => Status::Ok,
            other => other,
        };
        Ok((consumed, status))
    }
}

impl StreamCompressor for DeflateCompressor {
    fn feed(&mut self, payload: &[u8]) -> Result<(), CompressorError> {
        if self.finalized {
            return Err(CompressorError::Finalized);
        }

        let fed = self.codec.total_in() as usize;
        if deflate_bound(fed.saturating_add(payload.len())) > self.capacity {
            return Err(CompressorError::Overrun {
                payload: payload.len(),
                unconsumed: payload.len(),
                remaining: self.remaining(),
            });
        }

        let mut offset = 0;
        while offset < payload.len() {
            let (consumed, status) = self.run(&payload[offset..], FlushCompress::None)?;
            offset += consumed;
            if status == Status::BufError {
                return Err(CompressorError::Overrun {
                    payload: payload.len(),
                    unconsumed: payload.len() - offset,
                    remaining: self.remaining(),
                });
            }
        }

        Ok(())
    }

    fn finalize(&mut self) -> Result<u64, CompressorError> {
        if self.finalized {
            return Err(CompressorError::Finalized);
        }

        loop {
            let (_, status) = self.run(&[], FlushCompress::Finish)?;
            match status {
                Status::StreamEnd => break,
                Status::BufError => {
                    return Err(CompressorError::Overrun {
                        payload: 0,
                        unconsumed: 0,
                        remaining: self.remaining(),
                    })
                }
                Status::Ok => continue,
            }
        }

        self.finalized = true;
        Ok(self.codec.total_out())
    }

    fn output(&self) -> &[u8] {
        &self.destination
    }
}

/// Factory for [`DeflateCompressor`]s at a fixed level
#[derive(Debug, Clone, Copy)]
pub struct DeflateFactory {
    level: Compression,
}

impl DeflateFactory {
    pub fn new(level: Compression) -> Self {
        Self { level }
    }
}

impl Default for DeflateFactory {
    fn default() -> Self {
        Self::new(Compression::default())
    }
}

impl CompressorFactory for DeflateFactory {
    type Compressor = DeflateCompressor;

    fn open(&self, capacity: usize) -> Result<DeflateCompressor, CompressorError> {
        DeflateCompressor::open(capacity, self.level)
    }
}
