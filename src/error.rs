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


// Error taxonomy for the recording pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by a streaming compressor
#[derive(Debug, Error)]
pub enum CompressorError {
    /// Destination buffer allocation or codec context setup failed
    #[error("failed to initialize compressor with {capacity} byte destination: {reason}")]
    Init { capacity: usize, reason: String },

    /// The codec could not take the whole payload into the destination buffer
    #[error("compressor overrun: {unconsumed} of {payload} input bytes left unconsumed ({remaining} destination bytes free)")]
    Overrun {
        payload: usize,
        unconsumed: usize,
        remaining: usize,
    },

    /// `feed` or `finalize` called after the stream was finalized
    #[error("compressor already finalized")]
    Finalized,

    /// The underlying codec reported an error
    #[error("codec error: {0}")]
    Codec(String),
}

/// A depth frame that does not describe a valid buffer, or does not match the session geometry
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid frame dimensions {width}x{height} with {bytes_per_sample} bytes per sample")]
    InvalidDimensions {
        width: usize,
        height: usize,
        bytes_per_sample: usize,
    },

    #[error("row stride {stride} is smaller than packed row length {row_bytes}")]
    StrideTooSmall { stride: usize, row_bytes: usize },

    #[error("buffer holds {actual} bytes but stride x height requires {required}")]
    BufferTooShort { required: usize, actual: usize },

    #[error("frame geometry {actual} does not match session geometry {expected}")]
    GeometryMismatch { expected: String, actual: String },
}

/// Why a submitted depth frame did not end up in a chunk
#[derive(Debug, Error)]
pub enum FrameDropped {
    #[error("depth queue is full")]
    QueueFull,

    #[error("depth worker has shut down")]
    WorkerGone,

    #[error("depth recording is not open")]
    NotRecording,

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Compressor(#[from] CompressorError),
}

/// Errors from the depth recording controller
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("depth recording already open")]
    AlreadyRecording,

    #[error("depth recording was never started")]
    NotStarted,

    #[error("depth worker has shut down")]
    WorkerGone,

    #[error("depth recording failed to initialize its compressor: {0}")]
    CompressorInit(#[source] CompressorError),

    #[error(transparent)]
    Compressor(#[from] CompressorError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RecorderError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RecorderError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors from the session finalize chain
#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("session is {0}, expected recording")]
    InvalidState(String),

    #[error("failed to write frame data document {path}: {reason}")]
    FrameData { path: PathBuf, reason: String },

    #[error("failed to write manifest {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    #[error("failed to build archive {path}: {reason}")]
    Archive { path: PathBuf, reason: String },
}

/// Errors from the archive upload client
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no upload endpoint configured")]
    NoEndpoint,

    #[error("failed to read archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("upload transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("upload rejected with status {status}: {body}")]
    Status { status: u16, body: String },
}
