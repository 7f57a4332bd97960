//! End-to-end checks of the public settings + template surface: a stored
//! record is loaded, edited the way the front end edits it, and rendered.

use profile_proto::protocol::Track;
use profile_proto::settings::{JsonSettingsStore, MusicBioSettings, SettingsStore, SETTINGS_KEY};
use profile_proto::template::{
    build_bio_from_template, clamp_poll_interval, normalize_username, truncate_bio,
};
use tempfile::TempDir;

fn track(title: &str) -> Track {
    Track {
        title: title.to_string(),
        artist: "Artist".to_string(),
        album: "Album".to_string(),
        source_label: "Last.fm".to_string(),
    }
}

#[test]
fn stored_record_loads_sanitized() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    let record = serde_json::json!({
        SETTINGS_KEY: {
            "enabled": true,
            "lastfmUsername": "https://www.last.fm/user/tester",
            "lastfmApiKey": "key",
            "pollIntervalSec": 3,
            "idleText": "AFK"
        }
    });
    std::fs::write(&path, record.to_string()).unwrap();

    let settings = JsonSettingsStore::new(&path).load();
    assert!(settings.enabled);
    assert_eq!(settings.lastfm_username, "tester");
    assert_eq!(settings.poll_interval_sec, 5);
    assert_eq!(settings.idle_text, "AFK");
}

#[test]
fn enabled_record_without_credentials_loads_disabled() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    let record = serde_json::json!({
        SETTINGS_KEY: { "enabled": true, "pollIntervalSec": 30, "idleText": "Custom Idle" }
    });
    std::fs::write(&path, record.to_string()).unwrap();

    let settings = JsonSettingsStore::new(&path).load();
    assert!(!settings.enabled);
    assert_eq!(settings.poll_interval_sec, 30);
    assert_eq!(settings.idle_text, "Custom Idle");
}

#[test]
fn older_record_versions_are_ignored() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r#"{"music_bio_settings_v0": {"enabled": true}}"#).unwrap();
    assert_eq!(JsonSettingsStore::new(&path).load(), MusicBioSettings::default());
}

#[test]
fn rendered_bios_always_fit_the_field() {
    let settings = MusicBioSettings {
        bio_template: "{title} by {artist} from {album} on {source}".to_string(),
        ..Default::default()
    };
    for len in [0usize, 1, 50, 124, 125, 126, 400] {
        let bio = build_bio_from_template(&settings.bio_template, &track(&"t".repeat(len)));
        assert!(bio.chars().count() <= 127, "len {} produced {}", len, bio.len());
        // Rendering already truncated, so a second pass changes nothing.
        assert_eq!(truncate_bio(&bio), bio);
    }
}

#[test]
fn edits_normalize_like_the_settings_form() {
    assert_eq!(normalize_username("https://www.last.fm/user/tester"), "tester");
    assert_eq!(normalize_username("just_a_name"), "just_a_name");
    assert_eq!(normalize_username(" \t "), "");
    assert_eq!(clamp_poll_interval(f64::NAN), 15);
    assert_eq!(clamp_poll_interval(0.0), 5);
    assert_eq!(clamp_poll_interval(1e9), 120);
}
