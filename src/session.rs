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


//! Recording session: lifecycle state machine and capture fan-out.
//!
//! Each captured tick fans out to three independent consumers: the pose
//! accumulator (appended in capture order), the video encoder and the depth
//! recorder's queue. Stopping is terminal; [`RecordingSession::finalize`]
//! drains every consumer and produces the session's artifacts.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RecorderConfig;
use crate::error::{FinalizeError, RecorderError};
use crate::finalize;
use crate::frame::{CapturedFrame, FrameRecord};
use crate::protocol::{SessionResult, SessionState, SessionStatus};
use crate::recorder::DepthRecorder;
use crate::video::VideoEncoder;

pub struct RecordingSession {
    pub(crate) config: RecorderConfig,
    pub(crate) state: SessionState,
    pub(crate) session_id: Option<String>,
    pub(crate) output_dir: Option<PathBuf>,
    pub(crate) started_at: Option<DateTime<Utc>>,
    started_instant: Option<Instant>,
    pub(crate) records: Vec<FrameRecord>,
    pub(crate) video: Box<dyn VideoEncoder>,
    pub(crate) video_error: Option<String>,
    pub(crate) depth: DepthRecorder,
    pub(crate) depth_error: Option<String>,
}

impl RecordingSession {
    /// Create an idle session with its own depth worker
    pub fn new(config: RecorderConfig, video: Box<dyn VideoEncoder>) -> Result<Self, RecorderError> {
        let depth = DepthRecorder::new(&config.depth)?;
        Ok(Self::with_depth_recorder(config, video, depth))
    }

    /// Create an idle session around an existing depth recorder
    pub fn with_depth_recorder(
        config: RecorderConfig,
        video: Box<dyn VideoEncoder>,
        depth: DepthRecorder,
    ) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            session_id: None,
            output_dir: None,
            started_at: None,
            started_instant: None,
            records: Vec::new(),
            video,
            video_error: None,
            depth,
            depth_error: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Directory artifacts are written into, set once recording starts
    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    pub fn records(&self) -> &[FrameRecord] {
        &self.records
    }

    pub fn depth(&self) -> &DepthRecorder {
        &self.depth
    }

    /// Enter Recording with a fresh session id and output directory.
    ///
    /// A video or depth start failure does not abort the session: it is
    /// recorded and reported as that artifact's failure at finalize.
    pub async fn start(&mut self) -> Result<&Path> {
        match self.state {
            SessionState::Idle | SessionState::Complete => {}
            other => bail!("cannot start a session that is {}", other),
        }

        let session_id = Uuid::new_v4().to_string();
        let output_dir = self.config.recorder.output_path().join(&session_id);
        tokio::fs::create_dir_all(&output_dir)
            .await
            .with_context(|| format!("Failed to create session directory {}", output_dir.display()))?;

        self.records.clear();
        self.video_error = None;
        self.depth_error = None;

        if let Err(e) = self.video.start(&output_dir).await {
            warn!("Video encoder failed to start: {:#}", e);
            self.video_error = Some(format!("{:#}", e));
        }

        if let Err(e) = self.depth.start(&output_dir).await {
            warn!("Depth recorder failed to start: {}", e);
            self.depth_error = Some(e.to_string());
        }

        info!(
            "Session {} recording into {}",
            session_id,
            output_dir.display()
        );

        self.session_id = Some(session_id);
        self.started_at = Some(Utc::now());
        self.started_instant = Some(Instant::now());
        self.state = SessionState::Recording;
        let dir = self.output_dir.insert(output_dir);
        Ok(dir.as_path())
    }

    /// Fan one captured tick out to the accumulator, the encoder and the depth queue
    pub fn on_frame(&mut self, frame: CapturedFrame) {
        if self.state != SessionState::Recording {
            debug!("Ignoring frame while session is {}", self.state);
            return;
        }

        self.records.push(frame.record);

        if let Some(color) = &frame.color {
            if self.video_error.is_none() {
                if let Err(e) = self.video.append(color) {
                    warn!("Video encoder rejected frame: {:#}", e);
                }
            }
        }

        if let Some(depth) = frame.depth {
            if self.depth_error.is_none() {
                if let Err(e) = self.depth.submit(depth) {
                    debug!("Depth frame dropped at submit: {}", e);
                }
            }
        }
    }

    pub fn status(&self) -> SessionStatus {
        let stats = self.depth.stats();
        SessionStatus {
            state: self.state,
            session_id: self.session_id.clone(),
            frames_captured: self.records.len() as u64,
            depth_frames_submitted: stats.frames_submitted,
            depth_frames_dropped: stats.frames_dropped,
            elapsed_seconds: self
                .started_instant
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or_default(),
        }
    }

    /// Stop recording and produce every artifact; see [`finalize::finalize_session`]
    pub async fn finalize(&mut self) -> Result<SessionResult, FinalizeError> {
        finalize::finalize_session(self).await
    }
}
