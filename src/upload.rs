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


// Archive upload over multipart/form-data

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::UploadConfig;
use crate::error::UploadError;

/// What the endpoint answered for a successful upload
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub status: u16,
    pub body: String,
    pub bytes: u64,
}

/// HTTP client posting finished archives to the configured endpoint.
///
/// There is no built-in retry: a failed upload leaves the archive on disk and
/// the caller decides whether to try again.
pub struct ArchiveUploader {
    client: Client,
    endpoint: String,
    field_name: String,
}

impl ArchiveUploader {
    pub fn new(config: &UploadConfig) -> Result<Self, UploadError> {
        let endpoint = config.endpoint.clone().ok_or(UploadError::NoEndpoint)?;

        if config.accept_invalid_certs {
            warn!(
                "TLS certificate verification disabled for upload endpoint {}",
                endpoint
            );
        }

        let client = reqwest::ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(UploadError::Client)?;

        Ok(Self {
            client,
            endpoint,
            field_name: config.field_name.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST `archive` as a single file part; any 2xx is success
    pub async fn upload(&self, archive: &Path) -> Result<UploadReceipt, UploadError> {
        let data = tokio::fs::read(archive)
            .await
            .map_err(|source| UploadError::Archive {
                path: archive.to_path_buf(),
                source,
            })?;
        let bytes = data.len() as u64;

        let file_name = archive
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive.tar.gz".to_string());

        let part = Part::bytes(data)
            .file_name(file_name.clone())
            .mime_str("application/gzip")
            .map_err(UploadError::Transport)?;
        let form = Form::new().part(self.field_name.clone(), part);

        info!(
            "Uploading {} ({} bytes) to {}",
            file_name, bytes, self.endpoint
        );

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(UploadError::Transport)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            warn!("Upload of {} rejected with status {}", file_name, status);
            return Err(UploadError::Status {
                status: status.as_u16(),
                body,
            });
        }

        info!("Uploaded {} with status {}", file_name, status);
        Ok(UploadReceipt {
            status: status.as_u16(),
            body,
            bytes,
        })
    }
}
