//! Runs in its own process: the global subscriber can be installed once.

use emurun_telemetry::{init_with_config, TelemetryConfig, LOG_FILE_NAME};

#[test]
fn test_file_logging_writes_into_log_dir() {
    let temp = tempfile::TempDir::new().unwrap();
    let dir = temp.path().join("logs");

    let guard = init_with_config(TelemetryConfig {
        log_level: "info".to_string(),
        ansi: false,
        file_dir: Some(dir.clone()),
        ..TelemetryConfig::default()
    })
    .unwrap();
    tracing::error!(code = "E8003", "build still failing");
    drop(guard);

    let log = std::fs::read_to_string(dir.join(LOG_FILE_NAME)).unwrap();
    assert!(log.contains("build still failing"));

    assert!(init_with_config(TelemetryConfig::default()).is_err());
}
