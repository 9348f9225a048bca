use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::language::{canonical_language, DEFAULT_LANGUAGE};

const DEFAULT_GATEWAY_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_OCR_COMMAND: &str = "tesseract";
const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SERVER_URL: &str = "http://specsserver.local";
const DEFAULT_CAMERA: &str = "0";
const DEFAULT_INTERVAL_MS: u64 = 1_000;
const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 30;
const DEFAULT_WORKERS: usize = 2;
const MAX_WORKERS: usize = 8;

/// Values that switch an optional backend off.
const DISABLED_VALUES: [&str; 2] = ["off", "none"];

// ----------------------------------------------------------------------------
// Gateway
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct GatewayConfigFile {
    addr: Option<String>,
    backends: Option<BackendsConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct BackendsConfigFile {
    caption_url: Option<String>,
    traffic_url: Option<String>,
    ocr_command: Option<String>,
    translate_url: Option<String>,
    translate_api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub addr: String,
    pub backends: BackendSettings,
}

/// Where each backend lives. `None` leaves the backend unconfigured, so its
/// pipeline serves placeholders.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub caption_url: Option<String>,
    pub traffic_url: Option<String>,
    pub ocr_command: Option<String>,
    pub translate_url: Option<String>,
    pub translate_api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            caption_url: None,
            traffic_url: None,
            ocr_command: Some(DEFAULT_OCR_COMMAND.to_string()),
            translate_url: None,
            translate_api_key: None,
            timeout: Duration::from_secs(DEFAULT_BACKEND_TIMEOUT_SECS),
        }
    }
}

impl GatewayConfig {
    pub fn load() -> Result<Self> {
        let file_cfg = match std::env::var("NARRATOR_GATEWAY_CONFIG").ok().as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: GatewayConfigFile) -> Self {
        let backends = file.backends.unwrap_or_default();
        let defaults = BackendSettings::default();
        Self {
            addr: file.addr.unwrap_or_else(|| DEFAULT_GATEWAY_ADDR.to_string()),
            backends: BackendSettings {
                caption_url: backends.caption_url,
                traffic_url: backends.traffic_url,
                ocr_command: match backends.ocr_command {
                    Some(command) => enabled(command),
                    None => defaults.ocr_command,
                },
                translate_url: backends.translate_url,
                translate_api_key: backends.translate_api_key,
                timeout: backends
                    .timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.timeout),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = env_value("NARRATOR_GATEWAY_ADDR") {
            self.addr = addr;
        }
        if let Some(url) = env_value("NARRATOR_CAPTION_URL") {
            self.backends.caption_url = enabled(url);
        }
        if let Some(url) = env_value("NARRATOR_TRAFFIC_URL") {
            self.backends.traffic_url = enabled(url);
        }
        if let Some(command) = env_value("NARRATOR_OCR_COMMAND") {
            self.backends.ocr_command = enabled(command);
        }
        if let Some(url) = env_value("NARRATOR_TRANSLATE_URL") {
            self.backends.translate_url = enabled(url);
        }
        if let Some(key) = env_value("NARRATOR_TRANSLATE_API_KEY") {
            self.backends.translate_api_key = Some(key);
        }
        if let Some(secs) = env_u64("NARRATOR_BACKEND_TIMEOUT_SECS")? {
            self.backends.timeout = Duration::from_secs(secs);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.addr
            .parse::<std::net::SocketAddr>()
            .map_err(|_| anyhow!("gateway addr '{}' must be host:port", self.addr))?;
        if self.backends.timeout.is_zero() {
            return Err(anyhow!("backend timeout must be greater than zero"));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Client
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct ClientConfigFile {
    server_url: Option<String>,
    camera: Option<String>,
    interval_ms: Option<u64>,
    language: Option<String>,
    upload_timeout_secs: Option<u64>,
    pin_device: Option<PathBuf>,
    workers: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    /// Camera: `stub://name`, `file://path`, a device index, or a device path.
    pub camera: String,
    pub interval: Duration,
    /// Canonical language code used for `/caption` and `/ocr` uploads.
    pub language: String,
    pub upload_timeout: Duration,
    /// Line-oriented source of button pin numbers.
    pub pin_device: Option<PathBuf>,
    pub workers: usize,
}

impl ClientConfig {
    pub fn load() -> Result<Self> {
        let file_cfg = match std::env::var("NARRATOR_CLIENT_CONFIG").ok().as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ClientConfigFile) -> Self {
        Self {
            server_url: file
                .server_url
                .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()),
            camera: file.camera.unwrap_or_else(|| DEFAULT_CAMERA.to_string()),
            interval: Duration::from_millis(file.interval_ms.unwrap_or(DEFAULT_INTERVAL_MS)),
            language: file
                .language
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            upload_timeout: Duration::from_secs(
                file.upload_timeout_secs
                    .unwrap_or(DEFAULT_UPLOAD_TIMEOUT_SECS),
            ),
            pin_device: file.pin_device,
            workers: file.workers.unwrap_or(DEFAULT_WORKERS),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_value("NARRATOR_SERVER_URL") {
            self.server_url = url;
        }
        if let Some(camera) = env_value("NARRATOR_CAMERA") {
            self.camera = camera;
        }
        if let Some(ms) = env_u64("NARRATOR_INTERVAL_MS")? {
            self.interval = Duration::from_millis(ms);
        }
        if let Some(language) = env_value("NARRATOR_LANGUAGE") {
            self.language = language;
        }
        if let Some(secs) = env_u64("NARRATOR_UPLOAD_TIMEOUT_SECS")? {
            self.upload_timeout = Duration::from_secs(secs);
        }
        if let Some(path) = env_value("NARRATOR_PIN_DEVICE") {
            self.pin_device = Some(PathBuf::from(path));
        }
        if let Some(workers) = env_u64("NARRATOR_WORKERS")? {
            self.workers = workers as usize;
        }
        Ok(())
    }

    /// Validate and canonicalize. Binaries call this again after applying
    /// command-line overrides.
    pub fn validate(&mut self) -> Result<()> {
        let url = Url::parse(&self.server_url)
            .map_err(|e| anyhow!("invalid server url '{}': {}", self.server_url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "server url '{}' must use http or https",
                self.server_url
            ));
        }
        self.server_url = self.server_url.trim_end_matches('/').to_string();

        self.language = canonical_language(&self.language)
            .ok_or_else(|| anyhow!("unsupported language '{}'", self.language))?;

        if self.interval.is_zero() {
            return Err(anyhow!("capture interval must be greater than zero"));
        }
        if self.upload_timeout.is_zero() {
            return Err(anyhow!("upload timeout must be greater than zero"));
        }
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(anyhow!("workers must be between 1 and {}", MAX_WORKERS));
        }
        if self.camera.trim().is_empty() {
            return Err(anyhow!("camera must not be empty"));
        }
        Ok(())
    }
}

fn read_config_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    match env_value(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a non-negative integer", key)),
        None => Ok(None),
    }
}

fn enabled(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty()
        || DISABLED_VALUES
            .iter()
            .any(|disabled| trimmed.eq_ignore_ascii_case(disabled))
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_defaults_leave_remote_backends_unconfigured() {
        let cfg = GatewayConfig::from_file(GatewayConfigFile::default());
        assert_eq!(cfg.addr, DEFAULT_GATEWAY_ADDR);
        assert!(cfg.backends.caption_url.is_none());
        assert!(cfg.backends.translate_url.is_none());
        assert_eq!(cfg.backends.ocr_command.as_deref(), Some("tesseract"));
    }

    #[test]
    fn ocr_can_be_switched_off_from_file() {
        let file: GatewayConfigFile =
            serde_json::from_str(r#"{"backends": {"ocr_command": "off"}}"#).unwrap();
        let cfg = GatewayConfig::from_file(file);
        assert!(cfg.backends.ocr_command.is_none());
    }

    #[test]
    fn client_language_is_canonicalized() -> Result<()> {
        let mut cfg = ClientConfig::from_file(ClientConfigFile {
            language: Some("Telugu".to_string()),
            server_url: Some("http://gateway.local:8080/".to_string()),
            ..ClientConfigFile::default()
        });
        cfg.validate()?;
        assert_eq!(cfg.language, "te");
        assert_eq!(cfg.server_url, "http://gateway.local:8080");
        Ok(())
    }

    #[test]
    fn client_rejects_bad_values() {
        let mut cfg = ClientConfig::from_file(ClientConfigFile {
            server_url: Some("ftp://gateway".to_string()),
            ..ClientConfigFile::default()
        });
        assert!(cfg.validate().is_err());

        let mut cfg = ClientConfig::from_file(ClientConfigFile {
            workers: Some(0),
            ..ClientConfigFile::default()
        });
        assert!(cfg.validate().is_err());

        let mut cfg = ClientConfig::from_file(ClientConfigFile {
            interval_ms: Some(0),
            ..ClientConfigFile::default()
        });
        assert!(cfg.validate().is_err());
    }
}
