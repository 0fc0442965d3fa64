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


// Video encoder interface and a raw-frame file encoder

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::frame::ColorFrame;
use crate::protocol::ArtifactInfo;

/// Encoder turning color frames into a video artifact
///
/// `append` is called on the capture thread for every color frame and must
/// not stall it. `finish` drains the encoder and runs concurrently with the
/// depth recorder's finish.
#[async_trait]
pub trait VideoEncoder: Send {
    /// Open the output inside the session directory
    async fn start(&mut self, output_dir: &Path) -> Result<()>;

    /// Queue one color frame
    fn append(&mut self, frame: &ColorFrame) -> Result<()>;

    /// Flush everything and describe the finished artifact
    async fn finish(&mut self) -> Result<ArtifactInfo>;
}

/// Writes color frames uncompressed, each prefixed with a little-endian header:
///
/// ```text
/// width:u32 | height:u32 | bytes_per_row:u32 | timestamp:f64 | len:u32 | data
/// ```
pub struct RawVideoEncoder {
    file_name: String,
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
    frames: u64,
}

impl RawVideoEncoder {
    pub const FILE_NAME: &'static str = "video.raw";

    pub fn new() -> Self {
        Self {
            file_name: Self::FILE_NAME.to_string(),
            path: None,
            writer: None,
            frames: 0,
        }
    }
}

impl Default for RawVideoEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VideoEncoder for RawVideoEncoder {
    async fn start(&mut self, output_dir: &Path) -> Result<()> {
        let path = output_dir.join(&self.file_name);
        let file = File::create(&path)
            .with_context(|| format!("Failed to create video file: {}", path.display()))?;

        info!("Raw video encoder writing to {}", path.display());
        self.writer = Some(BufWriter::new(file));
        self.path = Some(path);
        self.frames = 0;
        Ok(())
    }

    fn append(&mut self, frame: &ColorFrame) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            bail!("video encoder not started");
        };

        writer.write_all(&frame.width.to_le_bytes())?;
        writer.write_all(&frame.height.to_le_bytes())?;
        writer.write_all(&(frame.bytes_per_row as u32).to_le_bytes())?;
        writer.write_all(&frame.timestamp.to_le_bytes())?;
        writer.write_all(&(frame.data.len() as u32).to_le_bytes())?;
        writer.write_all(&frame.data)?;

        self.frames += 1;
        debug!("Appended video frame {} ({} bytes)", self.frames, frame.data.len());
        Ok(())
    }

    async fn finish(&mut self) -> Result<ArtifactInfo> {
        let (Some(writer), Some(path)) = (self.writer.take(), self.path.take()) else {
            bail!("video encoder not started");
        };

        let file = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush video file: {}", e.error()))?;
        file.sync_all().context("Failed to sync video file")?;
        drop(file);

        let bytes = tokio::fs::metadata(&path)
            .await
            .context("Failed to stat video file")?
            .len();

        Ok(ArtifactInfo {
            name: self.file_name.clone(),
            path,
            bytes,
            frame_count: Some(self.frames),
        })
    }
}
