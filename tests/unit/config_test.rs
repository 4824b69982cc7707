use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use validator::Validate;
use workout_sink::config::Config;
use workout_sink::services::WatchBackend;
use workout_sink::sink::SportDirPolicy;

// Each test uses its own prefix so parallel tests never see each other's
// environment.

#[test]
fn test_config_default_values() {
    let config = Config::default();
    assert_eq!(config.upload_folder, PathBuf::from("./uploads"));
    assert_eq!(config.default_sport_id, 1);
    assert_eq!(config.non_numeric_sport_dir, SportDirPolicy::Reject);
    assert_eq!(config.watch_backend, WatchBackend::Auto);
    assert_eq!(config.settle_interval(), Duration::from_millis(500));
    assert_eq!(config.request_timeout(), Duration::from_secs(60));
    assert!(config.api_token.is_none());
    assert!(config.validate().is_ok());
}

#[test]
fn test_load_from_file() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("sink.toml");
    fs::write(
        &file,
        r#"
upload_folder = "/srv/uploads"
default_sport_id = 4
non_numeric_sport_dir = "default_sport"
watch_backend = "polling"
poll_interval_ms = 250
api_token = "abc"
"#,
    )
    .unwrap();

    let config = Config::load_with_env_prefix(Some(&file), "WS_TEST_FILE").unwrap();
    assert_eq!(config.upload_folder, PathBuf::from("/srv/uploads"));
    assert_eq!(config.default_sport_id, 4);
    assert_eq!(config.non_numeric_sport_dir, SportDirPolicy::DefaultSport);
    assert_eq!(config.watch_backend, WatchBackend::Polling);
    assert_eq!(config.poll_interval(), Duration::from_millis(250));
    assert_eq!(config.api_token.as_deref(), Some("abc"));
    // Untouched keys keep their defaults
    assert_eq!(config.settle_timeout_ms, 60_000);
}

#[test]
fn test_environment_overrides_file() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("sink.toml");
    fs::write(&file, "default_sport_id = 4\n").unwrap();

    std::env::set_var("WS_TEST_ENV__DEFAULT_SPORT_ID", "7");
    std::env::set_var("WS_TEST_ENV__API_URL", "http://fit.example:8080");
    let config = Config::load_with_env_prefix(Some(&file), "WS_TEST_ENV").unwrap();
    std::env::remove_var("WS_TEST_ENV__DEFAULT_SPORT_ID");
    std::env::remove_var("WS_TEST_ENV__API_URL");

    assert_eq!(config.default_sport_id, 7);
    assert_eq!(config.api_url, "http://fit.example:8080");
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("absent.toml");
    assert!(Config::load_with_env_prefix(Some(&missing), "WS_TEST_MISSING").is_err());
}

#[test]
fn test_validation_rejects_out_of_range_values() {
    let temp = TempDir::new().unwrap();

    let cases = [
        "default_sport_id = 0\n",
        "poll_interval_ms = 10\n",
        "settle_interval_ms = 1\n",
        "request_timeout_secs = 0\n",
        "settle_interval_ms = 1000\nsettle_timeout_ms = 500\n",
    ];
    for (i, body) in cases.iter().enumerate() {
        let file = temp.path().join(format!("case{}.toml", i));
        fs::write(&file, body).unwrap();
        let result = Config::load_with_env_prefix(Some(&file), "WS_TEST_INVALID");
        assert!(result.is_err(), "expected rejection for {:?}", body);
    }
}

#[test]
fn test_unknown_backend_is_rejected() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("sink.toml");
    fs::write(&file, "watch_backend = \"inotify\"\n").unwrap();
    assert!(Config::load_with_env_prefix(Some(&file), "WS_TEST_BACKEND").is_err());
}
