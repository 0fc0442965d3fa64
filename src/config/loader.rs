// Configuration loader with environment variable substitution

use super::types::*;
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<RecorderConfig> {
        let content = std::fs::read_to_string(path.as_ref())
            .context("Failed to read config file")?;

        Self::parse(&content)
    }

    /// Parse YAML configuration text, substituting environment variables first
    pub fn parse(content: &str) -> Result<RecorderConfig> {
        let content = Self::substitute_env_vars(content)?;

        // An empty document means "all defaults"
        let config: RecorderConfig = if content.trim().is_empty() {
            RecorderConfig::default()
        } else {
            serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?
        };

        Self::validate(&config)?;

        Ok(config)
    }

    /// Substitute ${VAR} and ${VAR:-default} patterns with environment variables
    ///
    /// Examples:
    /// - ${HOME} -> /home/user
    /// - ${DEVICE_ID:-recorder-001} -> recorder-001 (if DEVICE_ID not set)
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]+))?\}")
            .context("Invalid substitution pattern")?;

        Ok(re
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                let default_value = caps.get(2).map(|m| m.as_str());

                match std::env::var(var_name) {
                    Ok(value) => value,
                    Err(_) => match default_value {
                        Some(default) => default.to_string(),
                        // Keep original if no default and var not found
                        None => format!("${{{}}}", var_name),
                    },
                }
            })
            .to_string())
    }

    /// Validate configuration
    pub fn validate(config: &RecorderConfig) -> Result<()> {
        if config.depth.max_frames_per_chunk == 0 {
            bail!("depth.max_frames_per_chunk must be > 0");
        }

        if config.depth.queue_capacity == 0 {
            bail!("depth.queue_capacity must be > 0");
        }

        if config.depth.compression_level > 4 {
            bail!("depth.compression_level must be 0-4");
        }

        if config.archive.compression_level > 4 {
            bail!("archive.compression_level must be 0-4");
        }

        for (name, value) in [
            ("depth.width", config.depth.width),
            ("depth.height", config.depth.height),
            ("depth.bytes_per_sample", config.depth.bytes_per_sample),
        ] {
            if value == Some(0) {
                bail!("{} must be > 0 when set", name);
            }
        }

        if config.recorder.device.id.is_empty() {
            bail!("recorder.device.id cannot be empty");
        }

        if config.recorder.output_dir.is_empty() {
            bail!("recorder.output_dir cannot be empty");
        }

        if let Some(endpoint) = &config.upload.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                bail!("upload.endpoint must be an http(s) URL, got '{}'", endpoint);
            }
        }

        match config.logging.format.as_str() {
            "text" | "json" => {}
            unknown => bail!("Unknown logging.format: '{}'. Supported: text, json", unknown),
        }

        Ok(())
    }
}
