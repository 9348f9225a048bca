use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use frame_narrator::config::{ClientConfig, GatewayConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "NARRATOR_GATEWAY_CONFIG",
        "NARRATOR_GATEWAY_ADDR",
        "NARRATOR_CAPTION_URL",
        "NARRATOR_TRAFFIC_URL",
        "NARRATOR_OCR_COMMAND",
        "NARRATOR_TRANSLATE_URL",
        "NARRATOR_TRANSLATE_API_KEY",
        "NARRATOR_BACKEND_TIMEOUT_SECS",
        "NARRATOR_CLIENT_CONFIG",
        "NARRATOR_SERVER_URL",
        "NARRATOR_CAMERA",
        "NARRATOR_INTERVAL_MS",
        "NARRATOR_LANGUAGE",
        "NARRATOR_UPLOAD_TIMEOUT_SECS",
        "NARRATOR_PIN_DEVICE",
        "NARRATOR_WORKERS",
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
fn client_defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let cfg = ClientConfig::load().expect("load defaults");
    assert_eq!(cfg.server_url, "http://specsserver.local");
    assert_eq!(cfg.camera, "0");
    assert_eq!(cfg.interval, Duration::from_millis(1000));
    assert_eq!(cfg.language, "en");
    assert_eq!(cfg.upload_timeout, Duration::from_secs(30));
    assert_eq!(cfg.workers, 2);
    assert!(cfg.pin_device.is_none());
}

#[test]
fn client_loads_file_then_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let file = write_config(
        r#"{
            "server_url": "http://10.0.0.5:8080/",
            "camera": "stub://porch",
            "interval_ms": 2500,
            "language": "hindi",
            "pin_device": "/dev/ttyACM0",
            "workers": 4
        }"#,
    );
    std::env::set_var("NARRATOR_CLIENT_CONFIG", file.path());
    std::env::set_var("NARRATOR_LANGUAGE", "Telugu");
    std::env::set_var("NARRATOR_INTERVAL_MS", "500");

    let cfg = ClientConfig::load().expect("load config");
    assert_eq!(cfg.server_url, "http://10.0.0.5:8080");
    assert_eq!(cfg.camera, "stub://porch");
    assert_eq!(cfg.interval, Duration::from_millis(500));
    assert_eq!(cfg.language, "te");
    assert_eq!(cfg.pin_device, Some(PathBuf::from("/dev/ttyACM0")));
    assert_eq!(cfg.workers, 4);

    clear_env();
}

#[test]
fn client_rejects_invalid_env() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    std::env::set_var("NARRATOR_WORKERS", "many");
    assert!(ClientConfig::load().is_err());
    clear_env();

    std::env::set_var("NARRATOR_LANGUAGE", "not a language");
    assert!(ClientConfig::load().is_err());
    clear_env();

    std::env::set_var("NARRATOR_WORKERS", "9");
    assert!(ClientConfig::load().is_err());
    clear_env();
}

#[test]
fn gateway_loads_backends_from_file_and_env() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let file = write_config(
        r#"{
            "addr": "127.0.0.1:9090",
            "backends": {
                "caption_url": "http://models.local/caption",
                "ocr_command": "none",
                "timeout_secs": 5
            }
        }"#,
    );
    std::env::set_var("NARRATOR_GATEWAY_CONFIG", file.path());
    std::env::set_var("NARRATOR_TRANSLATE_URL", "http://translate.local:5000");
    std::env::set_var("NARRATOR_TRAFFIC_URL", "off");

    let cfg = GatewayConfig::load().expect("load config");
    assert_eq!(cfg.addr, "127.0.0.1:9090");
    assert_eq!(
        cfg.backends.caption_url.as_deref(),
        Some("http://models.local/caption")
    );
    assert!(cfg.backends.traffic_url.is_none());
    assert!(cfg.backends.ocr_command.is_none());
    assert_eq!(
        cfg.backends.translate_url.as_deref(),
        Some("http://translate.local:5000")
    );
    assert_eq!(cfg.backends.timeout, Duration::from_secs(5));

    clear_env();
}

#[test]
fn gateway_rejects_bad_address() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    std::env::set_var("NARRATOR_GATEWAY_ADDR", "not-an-address");
    assert!(GatewayConfig::load().is_err());

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    std::env::set_var("NARRATOR_CLIENT_CONFIG", "/nonexistent/narrator.json");
    assert!(ClientConfig::load().is_err());

    clear_env();
}
