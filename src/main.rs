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


use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use depth_recorder::config::{apply_env_overrides, load_config_with_env, ConfigLoader};
use depth_recorder::{
    ArchiveUploader, CapturedFrame, ColorFrame, DepthFrame, FrameGeometry, FrameRecord,
    RawVideoEncoder, RecorderConfig, RecordingSession,
};

/// Depth Recorder - capture depth, video and pose sessions into archives
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device ID (overrides config file)
    #[arg(short, long)]
    device_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a session from a synthetic sensor and package it
    Synthetic {
        /// Number of sensor ticks to capture
        #[arg(long, default_value_t = 90)]
        frames: usize,

        #[arg(long, default_value_t = 256)]
        width: usize,

        #[arg(long, default_value_t = 192)]
        height: usize,

        /// Capture rate in frames per second
        #[arg(long, default_value_t = 30)]
        fps: u32,

        /// Upload the archive to the configured endpoint when done
        #[arg(long)]
        upload: bool,
    },

    /// Upload an existing archive
    Upload {
        archive: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    let mut recorder_config = match &args.config {
        Some(path) => load_config_with_env(path)?,
        None => {
            let mut config = RecorderConfig::default();
            apply_env_overrides(&mut config);
            ConfigLoader::validate(&config)?;
            config
        }
    };

    // Apply CLI overrides
    if let Some(device_id) = args.device_id {
        recorder_config.recorder.device.id = device_id;
    }

    init_tracing(&recorder_config)?;

    info!("Starting Depth Recorder");
    if let Some(path) = &args.config {
        info!("Loaded configuration from: {:?}", path);
    }
    info!("Device ID: {}", recorder_config.recorder.device.id);

    match args.command {
        Command::Synthetic {
            frames,
            width,
            height,
            fps,
            upload,
        } => {
            let config = recorder_config.clone();
            let result = record_synthetic(config, frames, width, height, fps).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);

            if upload {
                let archive = result
                    .archive
                    .as_written()
                    .context("Session produced no archive to upload")?;
                upload_archive(&recorder_config, &archive.path).await?;
            }
        }
        Command::Upload { archive } => {
            upload_archive(&recorder_config, &archive).await?;
        }
    }

    Ok(())
}

fn init_tracing(config: &RecorderConfig) -> Result<()> {
    // Initialize tracing with configured level
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr);
    if config.logging.format == "json" {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

async fn record_synthetic(
    config: RecorderConfig,
    frames: usize,
    width: usize,
    height: usize,
    fps: u32,
) -> Result<depth_recorder::SessionResult> {
    // Pad rows the way camera buffers usually are
    let geometry = FrameGeometry::new(width, height, width * 2 + 64, 2)?;
    let mut session = RecordingSession::new(config, Box::new(RawVideoEncoder::new()))?;
    let output_dir = session.start().await?.to_path_buf();
    info!("Recording {} synthetic frames into {}", frames, output_dir.display());

    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / f64::from(fps.max(1))));
    for i in 0..frames {
        ticker.tick().await;
        let frame = synthetic_frame(i, geometry)?;
        session.on_frame(frame);
    }

    let status = session.status();
    info!(
        "Captured {} frames in {:.1}s, stopping",
        status.frames_captured, status.elapsed_seconds
    );

    Ok(session.finalize().await?)
}

fn synthetic_frame(i: usize, geometry: FrameGeometry) -> Result<CapturedFrame> {
    let t = i as f64 / 30.0;
    let angle = t as f32;

    let mut depth = vec![0u8; geometry.frame_len()];
    for y in 0..geometry.height {
        let row = &mut depth[y * geometry.stride..y * geometry.stride + geometry.width * 2];
        for (x, sample) in row.chunks_exact_mut(2).enumerate() {
            let millimeters = (500 + ((x + y + i) % 1500)) as u16;
            sample.copy_from_slice(&millimeters.to_le_bytes());
        }
    }

    let color_width = geometry.width as u32;
    let color_height = geometry.height as u32;
    let color = vec![(i % 256) as u8; geometry.width * geometry.height * 4];

    Ok(CapturedFrame {
        record: FrameRecord {
            pose: [angle.cos(), angle.sin(), 0.0, 0.0, 0.0, 0.0, 1.0],
            gripper_poses: [[0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0], [-0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]],
            gripper_width: 0.04 + 0.02 * angle.sin(),
            timestamp: t,
        },
        color: Some(ColorFrame {
            width: color_width,
            height: color_height,
            bytes_per_row: geometry.width * 4,
            timestamp: t,
            data: Bytes::from(color),
        }),
        depth: Some(DepthFrame::new(geometry, depth)?),
    })
}

async fn upload_archive(config: &RecorderConfig, archive: &std::path::Path) -> Result<()> {
    let uploader = ArchiveUploader::new(&config.upload)?;
    let receipt = uploader
        .upload(archive)
        .await
        .with_context(|| format!("Failed to upload {}", archive.display()))?;
    info!(
        "Upload accepted with status {} ({} bytes)",
        receipt.status, receipt.bytes
    );
    Ok(())
}
