use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use chroma_session::config::SessionConfig;
use chroma_session::FlashMode;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "CHROMA_CONFIG",
        "CHROMA_EXPORT_ROOT",
        "CHROMA_HISTORY_DB",
        "CHROMA_SOURCE_URL",
        "CHROMA_FLASH_MODE",
        "CHROMA_INFERENCE_BACKEND",
        "CHROMA_INFERENCE_TIMEOUT_MS",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_apply_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = SessionConfig::load().expect("load config");
    assert_eq!(cfg.export_root.to_str(), Some("sessions"));
    assert_eq!(cfg.history_db_path, "chroma_history.db");
    assert_eq!(cfg.source.url, "stub://camera");
    assert_eq!(cfg.source.flash_mode, FlashMode::Alternating);
    assert_eq!(cfg.pipeline.backend, "stub");
    assert_eq!(cfg.pipeline.inference_timeout, Duration::from_secs(2));
    assert!(cfg.training.enable_bin_grids);

    let settings = cfg.orchestrator_settings();
    assert_eq!(settings.workers, cfg.pipeline.workers);
    assert_eq!(settings.qc, cfg.qc);
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "export_root": "/data/sessions",
            "history_db_path": "clinic.db",
            "source": {
                "url": "stub://ward-3",
                "target_fps": 30,
                "width": 320,
                "height": 240,
                "flash_mode": "on"
            },
            "pipeline": {
                "queue_capacity": 16,
                "workers": 3,
                "inference_timeout_ms": 750,
                "backend": "luminance"
            },
            "qc": {
                "distance_min_mm": 100.0,
                "distance_max_mm": 200.0
            },
            "training": {
                "export_raw_stills": false
            }
        }"#,
    );

    std::env::set_var("CHROMA_CONFIG", file.path());
    std::env::set_var("CHROMA_SOURCE_URL", "stub://ward-4");
    std::env::set_var("CHROMA_FLASH_MODE", "alternating");
    std::env::set_var("CHROMA_INFERENCE_TIMEOUT_MS", "1500");

    let cfg = SessionConfig::load().expect("load config");

    assert_eq!(cfg.export_root.to_str(), Some("/data/sessions"));
    assert_eq!(cfg.history_db_path, "clinic.db");
    assert_eq!(cfg.source.url, "stub://ward-4");
    assert_eq!(cfg.source.target_fps, 30);
    assert_eq!(cfg.source.width, 320);
    assert_eq!(cfg.source.height, 240);
    assert_eq!(cfg.source.flash_mode, FlashMode::Alternating);
    assert_eq!(cfg.pipeline.queue_capacity, 16);
    assert_eq!(cfg.pipeline.workers, 3);
    assert_eq!(cfg.pipeline.inference_timeout, Duration::from_millis(1500));
    assert_eq!(cfg.pipeline.backend, "luminance");
    assert_eq!(cfg.qc.distance_min_mm, 100.0);
    assert_eq!(cfg.qc.distance_max_mm, 200.0);
    assert_eq!(cfg.qc.max_tilt_deg, 15.0);
    assert!(!cfg.training.export_raw_stills);
    assert!(cfg.training.enable_jsonl);

    let source = cfg.source_config();
    assert_eq!(source.url, "stub://ward-4");
    assert_eq!(source.frame_limit, None);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    for json in [
        r#"{ "source": { "target_fps": 0 } }"#,
        r#"{ "source": { "width": 0 } }"#,
        r#"{ "pipeline": { "workers": 0 } }"#,
        r#"{ "pipeline": { "queue_capacity": 0 } }"#,
        r#"{ "pipeline": { "inference_timeout_ms": 0 } }"#,
        r#"{ "qc": { "distance_min_mm": 300.0, "distance_max_mm": 100.0 } }"#,
        r#"{ "qc": { "max_saturated_fraction": 1.5 } }"#,
        r#"{ "source": { "flash_mode": "strobe" } }"#,
        r#"{ "pipeline": "#,
    ] {
        let file = write_config(json);
        std::env::set_var("CHROMA_CONFIG", file.path());
        assert!(SessionConfig::load().is_err(), "accepted {}", json);
    }

    clear_env();
    std::env::set_var("CHROMA_INFERENCE_TIMEOUT_MS", "soon");
    assert!(SessionConfig::load().is_err());

    clear_env();
    std::env::set_var("CHROMA_CONFIG", "/nonexistent/chroma.json");
    assert!(SessionConfig::load().is_err());

    clear_env();
}
