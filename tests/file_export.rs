use std::fs;

use tempfile::TempDir;

use chroma_session::export::encoding::decode_f32_le;
use chroma_session::export::file::{FRAMES_FILE, MARKERS_FILE};
use chroma_session::export::{EventMarker, FrameRecord};
use chroma_session::{
    DepthGrid, ExportSink, FileExportSink, FrameMetadata, FrameStats, PixelFormat,
    ProcessedFrame, QcFlags, QcLevel, RawBuffer, ScalarGrid, SessionId, TorchPhase,
    TrainingExportConfig,
};

fn processed(index: u64) -> ProcessedFrame {
    ProcessedFrame {
        meta: FrameMetadata::new(40 * index, TorchPhase::AlternatingOn)
            .with_index(index)
            .with_geometry(Some(120.0), Some(-3.0)),
        qc: QcFlags::all_ok(),
        qc_level: QcLevel::Good,
        scalar: Some(ScalarGrid::new(2, 2, vec![0.0, 0.25, 0.75, 1.0]).unwrap()),
        depth: Some(DepthGrid::new(1, 2, vec![110.0, 130.0]).unwrap()),
        rgb: None,
        stats: Some(FrameStats {
            min: 0.0,
            mean: 0.5,
            max: 1.0,
        }),
    }
}

fn sink() -> (TempDir, FileExportSink) {
    let root = TempDir::new().expect("temp export root");
    let sink = FileExportSink::new(root.path()).expect("export sink");
    (root, sink)
}

#[test]
fn export_before_begin_or_after_end_is_a_silent_noop() {
    let (root, sink) = sink();
    let id = SessionId::generate();

    sink.export_frame(id, &processed(0)).unwrap();
    sink.export_marker(
        id,
        &EventMarker {
            frame_index: None,
            wall_clock_ms: 1,
            note: None,
        },
    )
    .unwrap();
    assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);

    sink.begin_session(id, None).unwrap();
    let dir = sink.session_dir(id).unwrap();
    sink.end_session(id);
    sink.export_frame(id, &processed(1)).unwrap();
    sink.end_session(id);

    assert!(!sink.is_registered(id));
    assert_eq!(fs::read_to_string(dir.join(FRAMES_FILE)).unwrap(), "");
}

#[test]
fn begin_session_is_idempotent() {
    let (root, sink) = sink();
    let id = SessionId::generate();
    sink.begin_session(id, None).unwrap();
    let dir = sink.session_dir(id).unwrap();
    sink.begin_session(id, Some(&TrainingExportConfig::training_defaults()))
        .unwrap();

    assert_eq!(sink.session_dir(id).unwrap(), dir);
    assert_eq!(fs::read_dir(root.path()).unwrap().count(), 1);
    assert!(dir
        .file_name()
        .unwrap()
        .to_string_lossy()
        .ends_with(&id.to_string()));
}

#[test]
fn clinical_session_writes_metadata_stream_only() {
    let (_root, sink) = sink();
    let id = SessionId::generate();
    sink.begin_session(id, None).unwrap();
    let dir = sink.session_dir(id).unwrap();

    sink.export_frame(id, &processed(0)).unwrap();
    sink.export_frame(id, &processed(1)).unwrap();
    sink.end_session(id);

    let raw = fs::read_to_string(dir.join(FRAMES_FILE)).unwrap();
    let records: Vec<FrameRecord> = raw
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].index, 1);
    assert_eq!(records[1].session_id, id);
    assert_eq!(records[0].qc_level, QcLevel::Good);
    assert_eq!(records[0].scalar_mean, Some(0.5));
    assert_eq!(records[0].scalar_width, Some(2));
    assert!(records[0].has_depth);
    assert!(!records[0].has_rgb);

    let entries: Vec<_> = fs::read_dir(&dir).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[test]
fn training_session_writes_grids_and_stills() {
    let (_root, sink) = sink();
    let id = SessionId::generate();
    sink.begin_session(id, Some(&TrainingExportConfig::training_defaults()))
        .unwrap();
    let dir = sink.session_dir(id).unwrap();

    let frame = processed(3);
    let buffer = RawBuffer::new(vec![7u8; 2 * 2], 2, 2, PixelFormat::Gray8).unwrap();
    sink.export_still(id, &frame.meta, &buffer).unwrap();
    sink.export_frame(id, &frame).unwrap();
    sink.end_session(id);

    let scalar = decode_f32_le(&fs::read(dir.join("scalar_3.bin")).unwrap());
    assert_eq!(scalar, vec![0.0, 0.25, 0.75, 1.0]);
    let depth = decode_f32_le(&fs::read(dir.join("depth_3.bin")).unwrap());
    assert_eq!(depth, vec![110.0, 130.0]);
    assert!(!dir.join("rgb_3.bin").exists());
    assert_eq!(fs::read(dir.join("raw_3.bin")).unwrap(), vec![7u8; 4]);

    let pgm = fs::read(dir.join("processed_3.pgm")).unwrap();
    assert!(pgm.starts_with(b"P5\n2 2\n255\n"));
    assert_eq!(&pgm[pgm.len() - 4..], &[0, 64, 191, 255]);
}

#[test]
fn existing_frame_files_are_never_overwritten() {
    let (_root, sink) = sink();
    let id = SessionId::generate();
    sink.begin_session(
        id,
        Some(&TrainingExportConfig {
            enable_jsonl: false,
            enable_bin_grids: true,
            export_raw_stills: false,
            export_processed_stills: false,
        }),
    )
    .unwrap();
    let dir = sink.session_dir(id).unwrap();

    sink.export_frame(id, &processed(0)).unwrap();
    let err = sink.export_frame(id, &processed(0)).unwrap_err();
    assert!(err.to_string().contains("scalar_0.bin"));
    assert!(!dir.join(FRAMES_FILE).exists());
    sink.end_session(id);
}

#[test]
fn markers_file_is_created_on_first_marker() {
    let (_root, sink) = sink();
    let id = SessionId::generate();
    sink.begin_session(id, Some(&TrainingExportConfig::training_defaults()))
        .unwrap();
    let dir = sink.session_dir(id).unwrap();
    assert!(!dir.join(MARKERS_FILE).exists());

    sink.export_marker(
        id,
        &EventMarker {
            frame_index: Some(12),
            wall_clock_ms: 1_700_000_000_000,
            note: Some("camera repositioned".to_string()),
        },
    )
    .unwrap();
    sink.end_session(id);

    let raw = fs::read_to_string(dir.join(MARKERS_FILE)).unwrap();
    assert_eq!(raw.lines().count(), 1);
    assert!(raw.contains("camera repositioned"));
    assert!(raw.contains(&id.to_string()));
}

#[test]
fn sessions_are_isolated_by_id() {
    let (root, sink) = sink();
    let a = SessionId::generate();
    let b = SessionId::generate();
    sink.begin_session(a, None).unwrap();
    sink.begin_session(b, None).unwrap();
    sink.export_frame(a, &processed(0)).unwrap();
    sink.end_session(a);
    sink.export_frame(b, &processed(0)).unwrap();
    sink.export_frame(b, &processed(1)).unwrap();
    sink.end_session(b);

    assert_eq!(fs::read_dir(root.path()).unwrap().count(), 2);
    let lines = |id: SessionId| {
        fs::read_dir(root.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .find(|path| path.to_string_lossy().ends_with(&id.to_string()))
            .map(|dir| fs::read_to_string(dir.join(FRAMES_FILE)).unwrap().lines().count())
            .unwrap()
    };
    assert_eq!(lines(a), 1);
    assert_eq!(lines(b), 2);
}
