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


// Recording session pipeline for depth, video and pose capture
//
// This crate records a bounded capture session and packages it for transport:
// - Compresses the depth stream on the fly into rotated, frame-budgeted chunks
// - Owns all compressor state on a single ordered worker fed by a bounded queue
// - Drains video, depth and pose data in one partial-failure-tolerant chain
// - Writes a MessagePack pose document, a YAML manifest and a tar.gz archive
// - Uploads archives with a multipart HTTP POST

pub mod chunk;
pub mod compressor;
pub mod config;
pub mod error;
pub mod finalize;
pub mod frame;
pub mod packager;
pub mod protocol;
pub mod recorder;
pub mod session;
pub mod upload;
pub mod video;

// Re-export main types
pub use compressor::{CompressorFactory, DeflateCompressor, DeflateFactory, StreamCompressor};
pub use config::{load_config, load_config_with_env, RecorderConfig};
pub use error::{CompressorError, FinalizeError, FrameDropped, FrameError, RecorderError, UploadError};
pub use frame::{CapturedFrame, ColorFrame, DepthFrame, FrameGeometry, FrameRecord};
pub use packager::{FrameDataDocument, Manifest};
pub use protocol::{
    ArtifactInfo, ArtifactOutcome, ChunkDescriptor, CompressionLevel, DepthState, DepthSummary,
    SessionResult, SessionState, SessionStatus,
};
pub use recorder::{DepthRecorder, RecorderStats};
pub use session::RecordingSession;
pub use upload::ArchiveUploader;
pub use video::{RawVideoEncoder, VideoEncoder};
