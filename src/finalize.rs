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


//! Session finalize chain.
//!
//! 1. Session enters Finalizing; frames are no longer accepted.
//! 2. Video encoder and depth recorder drain concurrently.
//! 3. The pose accumulator is written as the frame data document.
//! 4. The manifest is rendered from every artifact outcome.
//! 5. The session directory is archived.
//! 6. Session enters Complete.
//!
//! A failing artifact is recorded in the result (and in the manifest) and the
//! chain continues with everything that does not depend on it. Only calling
//! finalize outside Recording is an error.

use chrono::Utc;
use std::path::PathBuf;
use tracing::{error, info};

use crate::config::{ArchiveConfig, DeviceDescriptor};
use crate::error::FinalizeError;
use crate::frame::FrameRecord;
use crate::packager::{self, Manifest, ManifestContext};
use crate::protocol::{
    ArtifactInfo, ArtifactOutcome, DepthSummary, SessionResult, SessionState,
};
use crate::session::RecordingSession;

/// Drain and package `session`
pub async fn finalize_session(
    session: &mut RecordingSession,
) -> Result<SessionResult, FinalizeError> {
    if session.state != SessionState::Recording {
        return Err(FinalizeError::InvalidState(session.state.to_string()));
    }
    let (Some(session_id), Some(output_dir), Some(started_at)) = (
        session.session_id.clone(),
        session.output_dir.clone(),
        session.started_at,
    ) else {
        return Err(FinalizeError::InvalidState(session.state.to_string()));
    };

    session.state = SessionState::Finalizing;
    info!("Finalizing session {}", session_id);

    let video_error = session.video_error.take();
    let depth_error = session.depth_error.take();
    let video = &mut session.video;
    let depth = &session.depth;

    let video_drain = async {
        match video_error {
            Some(error) => ArtifactOutcome::Failed { error },
            None => ArtifactOutcome::from(video.finish().await.map_err(|e| format!("{:#}", e))),
        }
    };
    let depth_drain = async {
        match depth_error {
            Some(error) => ArtifactOutcome::Failed { error },
            None => ArtifactOutcome::from(depth.finish().await),
        }
    };
    let (video, depth) = tokio::join!(video_drain, depth_drain);
    let ended_at = Utc::now();

    log_outcome("video", &video);
    log_outcome("depth", &depth);

    let records = std::mem::take(&mut session.records);
    let pose_records = records.len() as u64;
    let job = PackageJob {
        session_id: session_id.clone(),
        output_dir: output_dir.clone(),
        device: session.config.recorder.device.clone(),
        archive: session.config.archive.clone(),
        started_at,
        ended_at,
        records,
        video: video.clone(),
        depth: depth.clone(),
    };

    // Steps 3-5 are strictly sequential; run them on one blocking thread
    let packaged = tokio::task::spawn_blocking(move || job.run()).await;
    let (records, frame_data, manifest, archive) = match packaged {
        Ok(result) => result,
        Err(e) => {
            let reason = format!("packaging task failed: {}", e);
            (
                Vec::new(),
                ArtifactOutcome::failed(&reason),
                ArtifactOutcome::failed(&reason),
                ArtifactOutcome::failed(&reason),
            )
        }
    };
    session.records = records;

    log_outcome("frame_data", &frame_data);
    log_outcome("manifest", &manifest);
    log_outcome("archive", &archive);

    session.state = SessionState::Complete;
    let duration = ended_at - started_at;
    let result = SessionResult {
        session_id,
        output_dir,
        started_at: started_at.to_rfc3339(),
        ended_at: ended_at.to_rfc3339(),
        duration_seconds: duration.num_milliseconds() as f64 / 1000.0,
        pose_records,
        video,
        depth,
        frame_data,
        manifest,
        archive,
    };

    if result.is_complete() {
        info!("Session {} complete", result.session_id);
    } else {
        error!(
            "Session {} complete with {} failed artifact(s)",
            result.session_id,
            result.failures().len()
        );
    }
    Ok(result)
}

type Packaged = (
    Vec<FrameRecord>,
    ArtifactOutcome<ArtifactInfo>,
    ArtifactOutcome<ArtifactInfo>,
    ArtifactOutcome<ArtifactInfo>,
);

struct PackageJob {
    session_id: String,
    output_dir: PathBuf,
    device: DeviceDescriptor,
    archive: ArchiveConfig,
    started_at: chrono::DateTime<Utc>,
    ended_at: chrono::DateTime<Utc>,
    records: Vec<FrameRecord>,
    video: ArtifactOutcome<ArtifactInfo>,
    depth: ArtifactOutcome<DepthSummary>,
}

impl PackageJob {
    fn run(self) -> Packaged {
        let frame_data: ArtifactOutcome<ArtifactInfo> =
            packager::write_frame_data(&self.output_dir, &self.records).into();

        let manifest = Manifest::build(&ManifestContext {
            session_id: &self.session_id,
            device: &self.device,
            started_at: self.started_at,
            ended_at: self.ended_at,
            pose_records: self.records.len() as u64,
            video: &self.video,
            depth: &self.depth,
            frame_data: &frame_data,
        });
        let manifest = packager::write_manifest(&self.output_dir, &manifest).into();

        let archive = packager::build_archive(&self.output_dir, self.archive.level()).into();

        (self.records, frame_data, manifest, archive)
    }
}

fn log_outcome<T>(artifact: &str, outcome: &ArtifactOutcome<T>) {
    if let ArtifactOutcome::Failed { error } = outcome {
        error!("Finalize step '{}' failed: {}", artifact, error);
    }
}
