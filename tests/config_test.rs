//! Integration tests for configuration loading

use ball_transit::domain::DeviceId;
use ball_transit::infra::Config;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[machine]
name = "test-machine"

[[devices]]
name = "trough"
transit_timeout_ms = 2500

[devices.ball_missing_timeouts]
playfield = 4000
plunger_lane = 3000

[[devices]]
name = "plunger_lane"
mechanical_eject = true

[[devices]]
name = "playfield"
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.machine_name(), "test-machine");

    let trough = DeviceId::new("trough");
    let plunger_lane = DeviceId::new("plunger_lane");
    let playfield = DeviceId::new("playfield");

    assert_eq!(config.transit_timeout(&trough), Duration::from_millis(2500));
    assert_eq!(config.ball_missing_timeout(&trough, &playfield), Duration::from_secs(4));
    assert_eq!(config.ball_missing_timeout(&trough, &plunger_lane), Duration::from_secs(3));

    assert!(config.device(&plunger_lane).unwrap().mechanical_eject());
    assert!(!config.device(&playfield).unwrap().mechanical_eject());
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.config_file(), "default");
    assert!(config.device(&DeviceId::new("trough")).is_some());
    assert!(config.device(&DeviceId::new("plunger_lane")).unwrap().mechanical_eject());
}
