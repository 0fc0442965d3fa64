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


// Configuration system integration tests

use depth_recorder::config::{load_config, load_config_with_env, ConfigLoader, RecorderConfig};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_load_default_config() {
    let config_path = PathBuf::from("config/default.yaml");

    if config_path.exists() {
        let result = load_config(&config_path);
        assert!(result.is_ok(), "Failed to load default config: {:?}", result.err());

        let config = result.unwrap();

        assert_eq!(config.depth.max_frames_per_chunk, 30);
        assert_eq!(config.depth.queue_capacity, 256);
        assert_eq!(config.depth.compression_level, 2);
        assert_eq!(config.upload.field_name, "file");
        assert!(config.upload.accept_invalid_certs);
        assert_eq!(config.logging.level, "info");
    }
}

#[test]
fn test_config_with_env_vars() {
    let temp_config = r#"
recorder:
  device:
    id: ${CFG_TEST_DEVICE:-test-device}
    model: ${CFG_TEST_MODEL}
  output_dir: ${CFG_TEST_OUTPUT:-/tmp/recordings}

depth:
  max_frames_per_chunk: 12
  queue_capacity: 64
  compression_level: 4
  width: 640
  height: 480
  bytes_per_sample: 2

upload:
  endpoint: ${CFG_TEST_ENDPOINT:-http://localhost:8080/upload}
  accept_invalid_certs: true

logging:
  level: debug
  format: json
"#;

    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path().join("config.yaml");
    fs::write(&temp_path, temp_config).expect("Failed to write temp config");

    std::env::set_var("CFG_TEST_DEVICE", "robot-123");
    std::env::remove_var("CFG_TEST_MODEL");

    let result = load_config(&temp_path);
    std::env::remove_var("CFG_TEST_DEVICE");
    assert!(result.is_ok(), "Failed to load config with env vars: {:?}", result.err());

    let config = result.unwrap();

    assert_eq!(config.recorder.device.id, "robot-123");
    // Unset without default keeps the placeholder
    assert_eq!(config.recorder.device.model.as_deref(), Some("${CFG_TEST_MODEL}"));
    assert_eq!(config.recorder.output_dir, "/tmp/recordings");
    assert_eq!(
        config.upload.endpoint.as_deref(),
        Some("http://localhost:8080/upload")
    );
    assert!(config.upload.accept_invalid_certs);

    assert_eq!(config.depth.max_frames_per_chunk, 12);
    assert_eq!(config.depth.width, Some(640));
    assert_eq!(config.depth.height, Some(480));
    assert_eq!(config.logging.format, "json");
}

#[test]
fn test_env_overrides_after_parse() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path().join("config.yaml");
    fs::write(
        &temp_path,
        "recorder:\n  device:\n    id: from-file\n  output_dir: /data/from-file\n",
    )
    .unwrap();

    std::env::set_var("DEVICE_ID", "from-env");
    std::env::set_var("RECORDER_OUTPUT_DIR", "/data/from-env");
    std::env::set_var("UPLOAD_ENDPOINT", "https://upload.example.com/archives");

    let result = load_config_with_env(&temp_path);

    std::env::remove_var("DEVICE_ID");
    std::env::remove_var("RECORDER_OUTPUT_DIR");
    std::env::remove_var("UPLOAD_ENDPOINT");

    let config = result.unwrap();
    assert_eq!(config.recorder.device.id, "from-env");
    assert_eq!(config.recorder.output_dir, "/data/from-env");
    assert_eq!(
        config.upload.endpoint.as_deref(),
        Some("https://upload.example.com/archives")
    );
}

#[test]
fn test_partial_config_fills_defaults() {
    let config = ConfigLoader::parse("depth:\n  max_frames_per_chunk: 5\n").unwrap();
    let defaults = RecorderConfig::default();

    assert_eq!(config.depth.max_frames_per_chunk, 5);
    assert_eq!(config.depth.queue_capacity, defaults.depth.queue_capacity);
    assert_eq!(config.archive.compression_level, defaults.archive.compression_level);
    assert_eq!(config.recorder.device, defaults.recorder.device);
    assert!(config.upload.endpoint.is_none());
}

#[test]
fn test_invalid_yaml() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path().join("invalid.yaml");
    fs::write(&temp_path, "depth: [not: valid: yaml").unwrap();

    assert!(load_config(&temp_path).is_err(), "Should fail to parse invalid YAML");
}

#[test]
fn test_missing_config_file() {
    let result = load_config("/nonexistent/path/config.yaml");
    assert!(result.is_err(), "Should fail when config file doesn't exist");
}

#[test]
fn test_validation_rejects_bad_values() {
    let cases = [
        "depth:\n  max_frames_per_chunk: 0\n",
        "depth:\n  queue_capacity: 0\n",
        "depth:\n  compression_level: 5\n",
        "depth:\n  width: 0\n",
        "archive:\n  compression_level: 9\n",
        "recorder:\n  device:\n    id: \"\"\n",
        "upload:\n  endpoint: ftp://example.com\n",
        "logging:\n  format: xml\n",
    ];

    for case in cases {
        assert!(ConfigLoader::parse(case).is_err(), "accepted: {}", case);
    }
}
