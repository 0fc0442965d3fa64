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


use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Compression level (0-4)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum CompressionLevel {
    Fastest = 0,
    Fast = 1,
    #[default]
    Default = 2,
    Slow = 3,
    Slowest = 4,
}

impl CompressionLevel {
    pub fn from_u8(level: u8) -> Option<Self> {
        match level {
            0 => Some(CompressionLevel::Fastest),
            1 => Some(CompressionLevel::Fast),
            2 => Some(CompressionLevel::Default),
            3 => Some(CompressionLevel::Slow),
            4 => Some(CompressionLevel::Slowest),
            _ => None,
        }
    }

    /// Level for the depth chunk deflate stream and the gzip archive
    pub fn to_flate2(self) -> flate2::Compression {
        match self {
            CompressionLevel::Fastest => flate2::Compression::new(1),
            CompressionLevel::Fast => flate2::Compression::new(3),
            CompressionLevel::Default => flate2::Compression::new(6),
            CompressionLevel::Slow => flate2::Compression::new(8),
            CompressionLevel::Slowest => flate2::Compression::new(9),
        }
    }
}

/// Recording session state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Recording,
    Finalizing,
    Complete,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Recording => "recording",
            SessionState::Finalizing => "finalizing",
            SessionState::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Depth recording controller state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DepthState {
    NotStarted,
    Open,
    RotatingOrFlushing,
    Closed,
    /// Compressor initialization failed; no chunks can be produced this session
    Failed,
}

impl DepthState {
    pub(crate) fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => DepthState::Open,
            2 => DepthState::RotatingOrFlushing,
            3 => DepthState::Closed,
            4 => DepthState::Failed,
            _ => DepthState::NotStarted,
        }
    }
}

/// A closed, immutable depth chunk file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkDescriptor {
    pub index: u32,
    pub name: String,
    pub path: PathBuf,
    pub frame_count: u64,
    pub byte_size: u64,
}

/// Outcome of the depth recording for one session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DepthSummary {
    pub chunks: Vec<ChunkDescriptor>,
    pub frames_submitted: u64,
    pub frames_accepted: u64,
    pub frames_dropped: u64,
    pub compressed_bytes: u64,
    /// Set when the recording failed after some chunks were already closed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DepthSummary {
    pub fn total_frames(&self) -> u64 {
        self.chunks.iter().map(|c| c.frame_count).sum()
    }
}

/// A finalized file artifact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactInfo {
    pub name: String,
    pub path: PathBuf,
    pub bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<u64>,
}

/// Result of producing one artifact during finalize
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ArtifactOutcome<T> {
    Written(T),
    Failed { error: String },
}

impl<T> ArtifactOutcome<T> {
    pub fn failed(error: impl fmt::Display) -> Self {
        ArtifactOutcome::Failed {
            error: error.to_string(),
        }
    }

    pub fn as_written(&self) -> Option<&T> {
        match self {
            ArtifactOutcome::Written(value) => Some(value),
            ArtifactOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ArtifactOutcome::Written(_) => None,
            ArtifactOutcome::Failed { error } => Some(error),
        }
    }

    pub fn is_written(&self) -> bool {
        matches!(self, ArtifactOutcome::Written(_))
    }
}

impl<T, E: fmt::Display> From<Result<T, E>> for ArtifactOutcome<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => ArtifactOutcome::Written(value),
            Err(e) => ArtifactOutcome::failed(e),
        }
    }
}

/// Everything a finished session produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResult {
    pub session_id: String,
    pub output_dir: PathBuf,
    pub started_at: String,
    pub ended_at: String,
    pub duration_seconds: f64,
    pub pose_records: u64,
    pub video: ArtifactOutcome<ArtifactInfo>,
    pub depth: ArtifactOutcome<DepthSummary>,
    pub frame_data: ArtifactOutcome<ArtifactInfo>,
    pub manifest: ArtifactOutcome<ArtifactInfo>,
    pub archive: ArtifactOutcome<ArtifactInfo>,
}

impl SessionResult {
    /// True when every artifact was written without error
    pub fn is_complete(&self) -> bool {
        self.failures().is_empty()
    }

    /// (artifact, error) for every artifact that failed
    pub fn failures(&self) -> Vec<(&'static str, &str)> {
        [
            ("video", self.video.error()),
            (
                "depth",
                self.depth
                    .error()
                    .or_else(|| self.depth.as_written().and_then(|s| s.error.as_deref())),
            ),
            ("frame_data", self.frame_data.error()),
            ("manifest", self.manifest.error()),
            ("archive", self.archive.error()),
        ]
        .into_iter()
        .filter_map(|(name, error)| error.map(|e| (name, e)))
        .collect()
    }
}

/// Snapshot of a session in progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub frames_captured: u64,
    pub depth_frames_submitted: u64,
    pub depth_frames_dropped: u64,
    pub elapsed_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_level_range() {
        assert_eq!(CompressionLevel::from_u8(0), Some(CompressionLevel::Fastest));
        assert_eq!(CompressionLevel::from_u8(4), Some(CompressionLevel::Slowest));
        assert_eq!(CompressionLevel::from_u8(5), None);
        assert_eq!(CompressionLevel::Default.to_flate2().level(), 6);
    }

    #[test]
    fn test_depth_state_round_trip() {
        for state in [
            DepthState::NotStarted,
            DepthState::Open,
            DepthState::RotatingOrFlushing,
            DepthState::Closed,
            DepthState::Failed,
        ] {
            assert_eq!(DepthState::from_u8(state.as_u8()), state);
        }
    }

    #[test]
    fn test_artifact_outcome_serialization() {
        let failed: ArtifactOutcome<ArtifactInfo> = ArtifactOutcome::failed("disk full");
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "disk full");

        let written = ArtifactOutcome::Written(ArtifactInfo {
            name: "video.raw".to_string(),
            path: PathBuf::from("/tmp/video.raw"),
            bytes: 42,
            frame_count: Some(3),
        });
        let json = serde_json::to_value(&written).unwrap();
        assert_eq!(json["status"], "written");
        assert_eq!(json["bytes"], 42);
    }
}
