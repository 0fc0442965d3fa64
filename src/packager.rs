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


/// Session artifact packaging
///
/// This module turns a finished session directory into its final artifacts:
///
/// - `frame_data.msgpack`: the pose accumulator as a MessagePack document with
///   four named arrays (`poses` n×7, `gripper_poses` n×2×7, `gripper_widths` n,
///   `timestamps` n). Every value is widened to f64 on the wire.
/// - `recording_info.yaml`: the human-readable manifest. Sizes are read from
///   disk when the manifest is rendered, and an artifact that failed is written
///   with `size: unknown` plus its error instead of being left out.
/// - `<session-id>.tar.gz`: a tar of the session directory, gzip-compressed,
///   written next to the directory. The intermediate `.tar` is removed.
use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::DeviceDescriptor;
use crate::error::FinalizeError;
use crate::frame::FrameRecord;
use crate::protocol::{ArtifactInfo, ArtifactOutcome, CompressionLevel, DepthSummary};

pub const FRAME_DATA_FILE: &str = "frame_data.msgpack";
pub const MANIFEST_FILE: &str = "recording_info.yaml";

/// Wire form of the pose accumulator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameDataDocument {
    pub poses: Vec<[f64; 7]>,
    pub gripper_poses: Vec<[[f64; 7]; 2]>,
    pub gripper_widths: Vec<f64>,
    pub timestamps: Vec<f64>,
}

fn widen(values: &[f32; 7]) -> [f64; 7] {
    values.map(f64::from)
}

impl FrameDataDocument {
    pub fn from_records(records: &[FrameRecord]) -> Self {
        let mut document = Self {
            poses: Vec::with_capacity(records.len()),
            gripper_poses: Vec::with_capacity(records.len()),
            gripper_widths: Vec::with_capacity(records.len()),
            timestamps: Vec::with_capacity(records.len()),
        };

        for record in records {
            document.poses.push(widen(&record.pose));
            document
                .gripper_poses
                .push([widen(&record.gripper_poses[0]), widen(&record.gripper_poses[1])]);
            document.gripper_widths.push(f64::from(record.gripper_width));
            document.timestamps.push(record.timestamp);
        }

        document
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec_named(self)
    }

    pub fn from_msgpack(data: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(data)
    }
}

/// Serialize the pose accumulator into `dir/frame_data.msgpack`
pub fn write_frame_data(dir: &Path, records: &[FrameRecord]) -> Result<ArtifactInfo, FinalizeError> {
    let path = dir.join(FRAME_DATA_FILE);
    let fail = |reason: String| FinalizeError::FrameData {
        path: path.clone(),
        reason,
    };

    let document = FrameDataDocument::from_records(records);
    let encoded = document.to_msgpack().map_err(|e| fail(e.to_string()))?;
    write_file(&path, &encoded).map_err(|e| fail(e.to_string()))?;

    debug!(
        "Wrote {} frame records ({} bytes) to {}",
        document.len(),
        encoded.len(),
        path.display()
    );

    Ok(ArtifactInfo {
        name: FRAME_DATA_FILE.to_string(),
        path,
        bytes: encoded.len() as u64,
        frame_count: Some(document.len() as u64),
    })
}

fn write_file(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}

/// Format a byte count for humans, e.g. `1.46 MB`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["bytes", "KB", "MB", "GB", "TB"];
    if bytes < 1000 {
        return format!("{} bytes", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

const UNKNOWN_SIZE: &str = "unknown";

/// One artifact line of the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestArtifact {
    pub file: Option<String>,
    pub size: String,
    pub bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ManifestArtifact {
    fn unknown(file: Option<String>, error: impl Into<String>) -> Self {
        Self {
            file,
            size: UNKNOWN_SIZE.to_string(),
            bytes: None,
            frame_count: None,
            error: Some(error.into()),
        }
    }

    /// Describe `path` by its size on disk right now
    fn on_disk(path: &Path, frame_count: Option<u64>) -> Self {
        let file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        match fs::metadata(path) {
            Ok(metadata) => Self {
                file,
                size: format_bytes(metadata.len()),
                bytes: Some(metadata.len()),
                frame_count,
                error: None,
            },
            Err(e) => Self::unknown(file, format!("cannot stat file: {}", e)),
        }
    }

    fn from_outcome(outcome: &ArtifactOutcome<ArtifactInfo>, default_name: &str) -> Self {
        match outcome {
            ArtifactOutcome::Written(info) => Self::on_disk(&info.path, info.frame_count),
            ArtifactOutcome::Failed { error } => {
                Self::unknown(Some(default_name.to_string()), error.clone())
            }
        }
    }
}

/// One depth chunk row of the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestChunk {
    pub name: String,
    pub frame_count: u64,
    pub size: String,
    pub bytes: Option<u64>,
}

/// Depth section of the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestDepth {
    pub total_size: String,
    pub total_bytes: Option<u64>,
    pub frames_submitted: Option<u64>,
    pub frames_recorded: Option<u64>,
    pub frames_dropped: Option<u64>,
    pub chunks: Vec<ManifestChunk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ManifestDepth {
    fn from_outcome(outcome: &ArtifactOutcome<DepthSummary>) -> Self {
        let summary = match outcome {
            ArtifactOutcome::Written(summary) => summary,
            ArtifactOutcome::Failed { error } => {
                return Self {
                    total_size: UNKNOWN_SIZE.to_string(),
                    total_bytes: None,
                    frames_submitted: None,
                    frames_recorded: None,
                    frames_dropped: None,
                    chunks: Vec::new(),
                    error: Some(error.clone()),
                }
            }
        };

        let chunks: Vec<ManifestChunk> = summary
            .chunks
            .iter()
            .map(|chunk| {
                let bytes = fs::metadata(&chunk.path).ok().map(|m| m.len());
                ManifestChunk {
                    name: chunk.name.clone(),
                    frame_count: chunk.frame_count,
                    size: bytes.map_or_else(|| UNKNOWN_SIZE.to_string(), format_bytes),
                    bytes,
                }
            })
            .collect();

        let total_bytes = chunks
            .iter()
            .map(|c| c.bytes)
            .sum::<Option<u64>>();

        Self {
            total_size: total_bytes.map_or_else(|| UNKNOWN_SIZE.to_string(), format_bytes),
            total_bytes,
            frames_submitted: Some(summary.frames_submitted),
            frames_recorded: Some(summary.total_frames()),
            frames_dropped: Some(summary.frames_dropped),
            chunks,
            error: summary.error.clone(),
        }
    }
}

/// Human-readable description of a finished session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub session_id: String,
    pub recorder_version: String,
    pub device: DeviceDescriptor,
    pub start_time: String,
    pub end_time: String,
    pub duration_seconds: f64,
    pub pose_records: u64,
    pub video: ManifestArtifact,
    pub frame_data: ManifestArtifact,
    pub depth: ManifestDepth,
}

/// Inputs for rendering a manifest
pub struct ManifestContext<'a> {
    pub session_id: &'a str,
    pub device: &'a DeviceDescriptor,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub pose_records: u64,
    pub video: &'a ArtifactOutcome<ArtifactInfo>,
    pub depth: &'a ArtifactOutcome<DepthSummary>,
    pub frame_data: &'a ArtifactOutcome<ArtifactInfo>,
}

impl Manifest {
    pub fn build(context: &ManifestContext<'_>) -> Self {
        let duration = context.ended_at - context.started_at;
        Self {
            session_id: context.session_id.to_string(),
            recorder_version: env!("CARGO_PKG_VERSION").to_string(),
            device: context.device.clone(),
            start_time: context.started_at.to_rfc3339(),
            end_time: context.ended_at.to_rfc3339(),
            duration_seconds: duration.num_milliseconds() as f64 / 1000.0,
            pose_records: context.pose_records,
            video: ManifestArtifact::from_outcome(context.video, "video"),
            frame_data: ManifestArtifact::from_outcome(context.frame_data, FRAME_DATA_FILE),
            depth: ManifestDepth::from_outcome(context.depth),
        }
    }

    pub fn render(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Render the manifest into `dir/recording_info.yaml`
pub fn write_manifest(dir: &Path, manifest: &Manifest) -> Result<ArtifactInfo, FinalizeError> {
    let path = dir.join(MANIFEST_FILE);
    let fail = |reason: String| FinalizeError::Manifest {
        path: path.clone(),
        reason,
    };

    let text = manifest.render().map_err(|e| fail(e.to_string()))?;
    // Write-once: a manifest is never overwritten
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => fail("manifest already exists".to_string()),
            _ => fail(e.to_string()),
        })?;
    file.write_all(text.as_bytes())
        .and_then(|()| file.sync_all())
        .map_err(|e| fail(e.to_string()))?;

    Ok(ArtifactInfo {
        name: MANIFEST_FILE.to_string(),
        path,
        bytes: text.len() as u64,
        frame_count: None,
    })
}

/// Bundle `session_dir` into `<session-id>.tar.gz` next to it
pub fn build_archive(
    session_dir: &Path,
    level: CompressionLevel,
) -> Result<ArtifactInfo, FinalizeError> {
    let session_name = session_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "session".to_string());
    let parent = session_dir.parent().unwrap_or_else(|| Path::new("."));

    let tar_path = parent.join(format!("{}.tar", session_name));
    let archive_name = format!("{}.tar.gz", session_name);
    let archive_path = parent.join(&archive_name);

    let fail = |e: io::Error| FinalizeError::Archive {
        path: archive_path.clone(),
        reason: e.to_string(),
    };

    let entries = write_tar(session_dir, &session_name, &tar_path).map_err(|e| {
        let _ = fs::remove_file(&tar_path);
        fail(e)
    })?;

    gzip_file(&tar_path, &archive_path, level).map_err(|e| {
        let _ = fs::remove_file(&archive_path);
        fail(e)
    })?;
    fs::remove_file(&tar_path).map_err(fail)?;

    let bytes = fs::metadata(&archive_path).map_err(fail)?.len();
    info!(
        "Archived {} files from {} into {} ({})",
        entries,
        session_dir.display(),
        archive_path.display(),
        format_bytes(bytes)
    );

    Ok(ArtifactInfo {
        name: archive_name,
        path: archive_path,
        bytes,
        frame_count: None,
    })
}

/// Collect every file under `dir` (sorted, recursive) into an uncompressed tar
fn write_tar(dir: &Path, prefix: &str, tar_path: &Path) -> io::Result<usize> {
    let mut builder = tar::Builder::new(BufWriter::new(File::create(tar_path)?));
    let mut entries = 0;

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let name: PathBuf = Path::new(prefix).join(relative);
        builder.append_path_with_name(entry.path(), &name)?;
        entries += 1;
    }

    builder.into_inner()?.flush()?;
    Ok(entries)
}

fn gzip_file(source: &Path, destination: &Path, level: CompressionLevel) -> io::Result<()> {
    let mut input = File::open(source)?;
    let output = BufWriter::new(File::create(destination)?);
    let mut encoder = GzEncoder::new(output, level.to_flate2());
    io::copy(&mut input, &mut encoder)?;
    let mut output = encoder.finish()?;
    output.flush()?;
    output.get_ref().sync_all()
}
