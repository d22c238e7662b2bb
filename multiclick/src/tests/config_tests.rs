use std::path::PathBuf;

use crate::config::{clamp_interval, Settings, DEFAULT_INTERVAL_SECONDS, MIN_INTERVAL_SECONDS};

struct TempSettingsFile {
    path: PathBuf,
}

impl TempSettingsFile {
    fn with_contents(contents: &str) -> Self {
        let path = std::env::temp_dir().join(format!("multiclick-settings-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).expect("write temp settings");
        Self { path }
    }
}

impl Drop for TempSettingsFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let path = std::env::temp_dir().join("multiclick-settings-does-not-exist.json");
    let settings = Settings::load(&path);
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.effective_interval(), DEFAULT_INTERVAL_SECONDS);
}

#[test]
fn malformed_json_falls_back_to_defaults() {
    let file = TempSettingsFile::with_contents("{ not json");
    assert_eq!(Settings::load(&file.path), Settings::default());
}

#[test]
fn numeric_string_interval_is_accepted() {
    let file = TempSettingsFile::with_contents(r#"{"intervalSeconds":"30","smoothScroll":false}"#);
    let settings = Settings::load(&file.path);
    assert_eq!(settings.interval_seconds, Some(30.0));
    assert!(!settings.smooth_scroll);
    assert_eq!(settings.effective_interval(), 30.0);
}

#[test]
fn non_numeric_interval_maps_to_default() {
    let file = TempSettingsFile::with_contents(r#"{"intervalSeconds":"soon"}"#);
    let settings = Settings::load(&file.path);
    assert_eq!(settings.interval_seconds, None);
    assert_eq!(settings.effective_interval(), DEFAULT_INTERVAL_SECONDS);
}

#[test]
fn intervals_below_the_floor_are_clamped() {
    assert_eq!(clamp_interval(Some(2.0)), MIN_INTERVAL_SECONDS);
    assert_eq!(clamp_interval(Some(5.0)), 5.0);
    assert_eq!(clamp_interval(Some(20.5)), 20.5);
    assert_eq!(clamp_interval(None), DEFAULT_INTERVAL_SECONDS);
    assert_eq!(clamp_interval(Some(f64::NAN)), DEFAULT_INTERVAL_SECONDS);
}

#[test]
fn save_then_load_roundtrips() {
    let file = TempSettingsFile::with_contents("{}");
    let settings = Settings {
        interval_seconds: Some(25.0),
        smooth_scroll: false,
    };
    settings.save(&file.path).expect("save");
    assert_eq!(Settings::load(&file.path), settings);
}
