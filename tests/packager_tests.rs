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


// Integration tests for the frame data document, manifest and archive

use chrono::{TimeZone, Utc};
use depth_recorder::config::DeviceDescriptor;
use depth_recorder::packager::{
    build_archive, write_frame_data, write_manifest, FRAME_DATA_FILE, MANIFEST_FILE,
};
use depth_recorder::protocol::ChunkDescriptor;
use depth_recorder::{
    ArtifactInfo, ArtifactOutcome, CompressionLevel, DepthSummary, FinalizeError,
    FrameDataDocument, FrameRecord, Manifest,
};
use depth_recorder::packager::ManifestContext;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use tempfile::TempDir;

fn record(i: usize) -> FrameRecord {
    FrameRecord {
        pose: [i as f32; 7],
        gripper_poses: [[0.25; 7], [0.75; 7]],
        gripper_width: 0.04,
        timestamp: 1_700_000_000.0 + i as f64,
    }
}

fn session_dir(root: &Path, name: &str) -> std::path::PathBuf {
    let dir = root.join(name);
    fs::create_dir_all(dir.join("extra")).unwrap();
    fs::write(dir.join("b.bin"), vec![2u8; 300]).unwrap();
    fs::write(dir.join("a.bin"), vec![1u8; 100]).unwrap();
    fs::write(dir.join("extra").join("c.txt"), b"nested").unwrap();
    dir
}

#[test]
fn test_frame_data_document_on_disk() {
    let temp_dir = TempDir::new().unwrap();
    let records: Vec<FrameRecord> = (0..25).map(record).collect();

    let info = write_frame_data(temp_dir.path(), &records).unwrap();
    assert_eq!(info.name, FRAME_DATA_FILE);
    assert_eq!(info.frame_count, Some(25));
    assert_eq!(fs::metadata(&info.path).unwrap().len(), info.bytes);

    let document = FrameDataDocument::from_msgpack(&fs::read(&info.path).unwrap()).unwrap();
    assert_eq!(document.len(), 25);
    assert_eq!(document.poses[24], [24.0; 7]);
    assert_eq!(document.gripper_poses[3], [[0.25; 7], [0.75; 7]]);
    assert_eq!(document.gripper_widths[0], f64::from(0.04f32));
    assert_eq!(document.timestamps[10], 1_700_000_010.0);
}

#[test]
fn test_frame_data_uses_named_fields() {
    let document = FrameDataDocument::from_records(&[record(0)]);
    let encoded = document.to_msgpack().unwrap();

    // A map keyed by field name, readable without knowing the field order
    let value: serde_json::Value = rmp_serde::from_slice(&encoded).unwrap();
    let map = value.as_object().unwrap();
    for key in ["poses", "gripper_poses", "gripper_widths", "timestamps"] {
        assert!(map.contains_key(key), "missing {}", key);
    }
}

#[test]
fn test_empty_frame_data_document() {
    let temp_dir = TempDir::new().unwrap();
    let info = write_frame_data(temp_dir.path(), &[]).unwrap();

    let document = FrameDataDocument::from_msgpack(&fs::read(&info.path).unwrap()).unwrap();
    assert!(document.is_empty());
    assert!(document.poses.is_empty());
    assert!(document.gripper_poses.is_empty());
    assert!(document.gripper_widths.is_empty());
}

#[test]
fn test_frame_data_into_missing_directory_fails() {
    let temp_dir = TempDir::new().unwrap();
    let result = write_frame_data(&temp_dir.path().join("gone"), &[record(0)]);
    assert!(matches!(result, Err(FinalizeError::FrameData { .. })));
}

#[test]
fn test_archive_contains_sorted_prefixed_entries() {
    let temp_dir = TempDir::new().unwrap();
    let dir = session_dir(temp_dir.path(), "session-1");

    let info = build_archive(&dir, CompressionLevel::Default).unwrap();
    assert_eq!(info.name, "session-1.tar.gz");
    assert_eq!(info.path, temp_dir.path().join("session-1.tar.gz"));
    assert_eq!(fs::metadata(&info.path).unwrap().len(), info.bytes);
    assert!(!temp_dir.path().join("session-1.tar").exists());

    let mut archive = tar::Archive::new(GzDecoder::new(File::open(&info.path).unwrap()));
    let mut entries = Vec::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry.path().unwrap().to_string_lossy().into_owned();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        entries.push((name, content));
    }

    let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec!["session-1/a.bin", "session-1/b.bin", "session-1/extra/c.txt"]
    );
    assert_eq!(entries[0].1, vec![1u8; 100]);
    assert_eq!(entries[2].1, b"nested".to_vec());

    // Source directory is left in place
    assert!(dir.join("a.bin").exists());
}

#[test]
fn test_archive_of_missing_directory_fails() {
    let temp_dir = TempDir::new().unwrap();
    let result = build_archive(&temp_dir.path().join("missing"), CompressionLevel::Fastest);

    assert!(matches!(result, Err(FinalizeError::Archive { .. })));
    assert!(!temp_dir.path().join("missing.tar").exists());
}

#[test]
fn test_manifest_reports_missing_chunk_as_unknown() {
    let temp_dir = TempDir::new().unwrap();
    let chunk_path = temp_dir.path().join("depth_map_0.depth");
    fs::write(&chunk_path, vec![0u8; 1234]).unwrap();

    let summary = DepthSummary {
        chunks: vec![
            ChunkDescriptor {
                index: 0,
                name: "depth_map_0.depth".to_string(),
                path: chunk_path,
                frame_count: 3,
                byte_size: 1234,
            },
            ChunkDescriptor {
                index: 1,
                name: "depth_map_1.depth".to_string(),
                path: temp_dir.path().join("depth_map_1.depth"),
                frame_count: 1,
                byte_size: 10,
            },
        ],
        frames_submitted: 4,
        frames_accepted: 4,
        frames_dropped: 0,
        compressed_bytes: 1244,
        error: None,
    };

    let video_path = temp_dir.path().join("video.raw");
    fs::write(&video_path, vec![0u8; 2048]).unwrap();
    let video = ArtifactOutcome::Written(ArtifactInfo {
        name: "video.raw".to_string(),
        path: video_path,
        bytes: 2048,
        frame_count: Some(4),
    });
    let frame_data = ArtifactOutcome::failed("disk full");
    let depth = ArtifactOutcome::Written(summary);
    let device = DeviceDescriptor::default();
    let started_at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    let ended_at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 1, 30).unwrap();

    let manifest = Manifest::build(&ManifestContext {
        session_id: "s-42",
        device: &device,
        started_at,
        ended_at,
        pose_records: 4,
        video: &video,
        depth: &depth,
        frame_data: &frame_data,
    });

    assert_eq!(manifest.duration_seconds, 90.0);
    assert_eq!(manifest.video.size, "2.05 KB");
    assert_eq!(manifest.video.bytes, Some(2048));
    assert_eq!(manifest.frame_data.size, "unknown");
    assert_eq!(manifest.depth.chunks[0].size, "1.23 KB");
    assert_eq!(manifest.depth.chunks[1].size, "unknown");
    assert_eq!(manifest.depth.total_size, "unknown");
    assert_eq!(manifest.depth.frames_recorded, Some(4));

    let info = write_manifest(temp_dir.path(), &manifest).unwrap();
    assert_eq!(info.name, MANIFEST_FILE);
    let parsed: Manifest =
        serde_yaml::from_str(&fs::read_to_string(&info.path).unwrap()).unwrap();
    assert_eq!(parsed, manifest);
}
