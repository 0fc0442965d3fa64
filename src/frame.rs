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


//! Frame types delivered by the capture surface.
//!
//! Depth buffers always travel with an explicit (buffer, length, stride)
//! triple. The stride may exceed `width * bytes_per_sample` when rows are
//! padded, and every consumer honors it.

use bytes::Bytes;
use std::fmt;

use crate::error::FrameError;

/// Dimensions and row layout of a depth buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: usize,
    pub height: usize,
    /// Bytes per row, including padding
    pub stride: usize,
    pub bytes_per_sample: usize,
}

impl FrameGeometry {
    pub fn new(
        width: usize,
        height: usize,
        stride: usize,
        bytes_per_sample: usize,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 || bytes_per_sample == 0 {
            return Err(FrameError::InvalidDimensions {
                width,
                height,
                bytes_per_sample,
            });
        }
        let row_bytes = width
            .checked_mul(bytes_per_sample)
            .ok_or(FrameError::InvalidDimensions {
                width,
                height,
                bytes_per_sample,
            })?;
        if stride < row_bytes {
            return Err(FrameError::StrideTooSmall { stride, row_bytes });
        }
        if stride.checked_mul(height).is_none() {
            return Err(FrameError::InvalidDimensions {
                width,
                height,
                bytes_per_sample,
            });
        }
        Ok(Self {
            width,
            height,
            stride,
            bytes_per_sample,
        })
    }

    /// Geometry of a buffer without row padding
    pub fn packed(width: usize, height: usize, bytes_per_sample: usize) -> Result<Self, FrameError> {
        Self::new(
            width,
            height,
            width.saturating_mul(bytes_per_sample),
            bytes_per_sample,
        )
    }

    /// Number of bytes one frame contributes to a chunk stream
    pub fn frame_len(&self) -> usize {
        self.stride * self.height
    }

    pub fn is_packed(&self) -> bool {
        self.stride == self.width * self.bytes_per_sample
    }
}

impl fmt::Display for FrameGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} (stride {}, {} B/sample)",
            self.width, self.height, self.stride, self.bytes_per_sample
        )
    }
}

/// One dense depth map, row-major
#[derive(Debug, Clone)]
pub struct DepthFrame {
    geometry: FrameGeometry,
    data: Bytes,
}

impl DepthFrame {
    /// Wrap `data` as a depth frame, checking it covers `stride * height` bytes
    pub fn new(geometry: FrameGeometry, data: impl Into<Bytes>) -> Result<Self, FrameError> {
        let data = data.into();
        let required = geometry.frame_len();
        if data.len() < required {
            return Err(FrameError::BufferTooShort {
                required,
                actual: data.len(),
            });
        }
        Ok(Self { geometry, data })
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    /// The stride-aware byte span handed to the compressor
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.geometry.frame_len()]
    }

    /// Row `y` without its padding bytes
    pub fn row(&self, y: usize) -> Option<&[u8]> {
        if y >= self.geometry.height {
            return None;
        }
        let start = y * self.geometry.stride;
        Some(&self.data[start..start + self.geometry.width * self.geometry.bytes_per_sample])
    }
}

/// A color image handed to the video encoder
#[derive(Debug, Clone)]
pub struct ColorFrame {
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: usize,
    /// Seconds on the capture clock
    pub timestamp: f64,
    pub data: Bytes,
}

/// Pose sample correlated 1:1 with a captured video frame.
///
/// Poses are stored as translation followed by a unit quaternion
/// `[tx, ty, tz, qx, qy, qz, qw]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameRecord {
    pub pose: [f32; 7],
    pub gripper_poses: [[f32; 7]; 2],
    pub gripper_width: f32,
    /// Monotonic capture timestamp in seconds
    pub timestamp: f64,
}

/// Everything the capture surface delivers for one sensor tick
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub record: FrameRecord,
    pub color: Option<ColorFrame>,
    pub depth: Option<DepthFrame>,
}
