// Settings file round trips on disk.
// Run with: cargo test -p luma-config --test settings_file

use luma_config::{Settings, SettingsError};

#[test]
fn missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    assert_eq!(Settings::load_or_default(&path), Settings::default());
    assert!(matches!(Settings::load_from(&path), Err(SettingsError::Io(_))));
}

#[test]
fn save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("settings.json");

    let mut settings = Settings::default();
    settings.target_fps = 24.0;
    settings.overlay_stats = true;
    settings.max_frames = Some(120);
    settings.save_to(&path).unwrap();

    let json = std::fs::read_to_string(&path).unwrap();
    assert!(json.contains("\"frame.targetFps\": 24.0"));
    assert_eq!(Settings::load_from(&path).unwrap(), settings);
}

#[test]
fn malformed_file_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, "{ \"frame.targetFps\": \"fast\" }").unwrap();
    assert_eq!(Settings::load_or_default(&path), Settings::default());
}

#[test]
fn default_file_written_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("luma").join("settings.json");
    assert!(Settings::write_default_file(&path).unwrap());
    assert!(!Settings::write_default_file(&path).unwrap());
    assert_eq!(Settings::load_from(&path).unwrap(), Settings::default());
}
