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


// Configuration types for depth-recorder

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::frame::FrameGeometry;
use crate::protocol::CompressionLevel;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RecorderConfig {
    #[serde(default)]
    pub recorder: RecorderSettings,
    #[serde(default)]
    pub depth: DepthConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Session-wide settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecorderSettings {
    #[serde(default)]
    pub device: DeviceDescriptor,

    /// Parent directory; each session records into `<output_dir>/<session-id>/`
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            device: DeviceDescriptor::default(),
            output_dir: default_output_dir(),
        }
    }
}

impl RecorderSettings {
    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(&self.output_dir)
    }
}

/// Device descriptor embedded in the manifest
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DeviceDescriptor {
    #[serde(default = "default_device_id")]
    pub id: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub os_version: Option<String>,
}

impl Default for DeviceDescriptor {
    fn default() -> Self {
        Self {
            id: default_device_id(),
            model: None,
            name: None,
            os_version: None,
        }
    }
}

/// Depth chunking and compression
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DepthConfig {
    /// Frames per chunk file before rotation
    #[serde(default = "default_max_frames_per_chunk")]
    pub max_frames_per_chunk: usize,

    /// Capacity of the producer -> worker queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// 0-4
    #[serde(default = "default_compression_level")]
    pub compression_level: u8,

    /// Declared sensor resolution; observed frames must match when set
    #[serde(default)]
    pub width: Option<usize>,
    #[serde(default)]
    pub height: Option<usize>,
    #[serde(default)]
    pub bytes_per_sample: Option<usize>,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            max_frames_per_chunk: default_max_frames_per_chunk(),
            queue_capacity: default_queue_capacity(),
            compression_level: default_compression_level(),
            width: None,
            height: None,
            bytes_per_sample: None,
        }
    }
}

impl DepthConfig {
    pub fn level(&self) -> CompressionLevel {
        CompressionLevel::from_u8(self.compression_level).unwrap_or_default()
    }

    /// True if `geometry` agrees with every declared dimension
    pub fn accepts(&self, geometry: &FrameGeometry) -> bool {
        self.width.map_or(true, |w| w == geometry.width)
            && self.height.map_or(true, |h| h == geometry.height)
            && self
                .bytes_per_sample
                .map_or(true, |b| b == geometry.bytes_per_sample)
    }
}

/// Final archive settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArchiveConfig {
    /// 0-4
    #[serde(default = "default_compression_level")]
    pub compression_level: u8,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            compression_level: default_compression_level(),
        }
    }
}

impl ArchiveConfig {
    pub fn level(&self) -> CompressionLevel {
        CompressionLevel::from_u8(self.compression_level).unwrap_or_default()
    }
}

/// Archive upload endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Multipart form field carrying the archive
    #[serde(default = "default_field_name")]
    pub field_name: String,

    /// Accept any TLS certificate from the endpoint. Insecure.
    #[serde(default)]
    pub accept_invalid_certs: bool,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            field_name: default_field_name(),
            accept_invalid_certs: false,
            timeout_seconds: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,  // "trace", "debug", "info", "warn", "error"

    #[serde(default = "default_log_format")]
    pub format: String,  // "text", "json"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_output_dir() -> String { "recordings".to_string() }
fn default_device_id() -> String { "recorder-001".to_string() }
fn default_max_frames_per_chunk() -> usize { 30 }
fn default_queue_capacity() -> usize { 256 }
fn default_compression_level() -> u8 { 2 }
fn default_field_name() -> String { "file".to_string() }
fn default_timeout() -> u64 { 300 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "text".to_string() }
