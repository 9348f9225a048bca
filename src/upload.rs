//! Frame upload to the narrator gateway.
//!
//! Every failure on this path is fatal to the client: the session logs it,
//! releases the camera and exits so a supervisor can restart the process.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::capture::CapturedFrame;
use crate::multipart::MultipartBody;
use crate::trigger::Endpoint;

/// Form field the gateway reads the image from.
pub const UPLOAD_FIELD: &str = "image";

/// Reply keys checked for speakable text, in order.
const TEXT_KEYS: [&str; 4] = ["caption", "text", "result", "message"];

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload to {url} timed out")]
    Timeout { url: String },
    #[error("upload to {url} failed: {reason}")]
    Transport { url: String, reason: String },
    #[error("server answered {code} for {url}: {body}")]
    Status { url: String, code: u16, body: String },
    #[error("unreadable reply from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Decoded gateway reply.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ServerReply {
    body: Value,
}

impl ServerReply {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(Self {
            body: serde_json::from_str(raw)?,
        })
    }

    /// First non-empty of `caption`, `text`, `result`, `message`.
    pub fn spoken_text(&self) -> Option<&str> {
        TEXT_KEYS.iter().find_map(|key| {
            self.body
                .get(*key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|text| !text.is_empty())
        })
    }

    pub fn confidence(&self) -> Option<f64> {
        self.body.get("confidence").and_then(Value::as_f64)
    }

    pub fn language(&self) -> Option<&str> {
        self.body.get("language").and_then(Value::as_str)
    }
}

pub trait Uploader: Send + Sync {
    fn upload(
        &self,
        frame: &CapturedFrame,
        endpoint: Endpoint,
        language: &str,
    ) -> Result<ServerReply, UploadError>;
}

/// Blocking HTTP uploader with a bounded per-request timeout.
pub struct UploadClient {
    base_url: String,
    agent: ureq::Agent,
}

impl UploadClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let parsed = Url::parse(base_url).with_context(|| format!("parse server url '{base_url}'"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow!(
                "unsupported server scheme '{}'; expected http or https",
                parsed.scheme()
            ));
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        })
    }

    pub fn endpoint_url(&self, endpoint: Endpoint, language: &str) -> String {
        format!("{}{}", self.base_url, endpoint.path(language))
    }
}

impl Uploader for UploadClient {
    fn upload(
        &self,
        frame: &CapturedFrame,
        endpoint: Endpoint,
        language: &str,
    ) -> Result<ServerReply, UploadError> {
        let url = self.endpoint_url(endpoint, language);
        let body = MultipartBody::single_file(
            UPLOAD_FIELD,
            frame.file_name(),
            frame.content_type(),
            frame.bytes(),
        );
        log::debug!(
            "POST {} ({} bytes, digest {})",
            url,
            frame.len(),
            crate::digest_prefix(frame.bytes())
        );

        let response = self
            .agent
            .post(&url)
            .set("Content-Type", &body.content_type())
            .send_bytes(body.as_bytes())
            .map_err(|err| classify(&url, err))?;
        let raw = response.into_string().map_err(|err| UploadError::Decode {
            url: url.clone(),
            reason: err.to_string(),
        })?;
        ServerReply::from_json(&raw).map_err(|err| UploadError::Decode {
            url,
            reason: err.to_string(),
        })
    }
}

fn classify(url: &str, err: ureq::Error) -> UploadError {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            UploadError::Status {
                url: url.to_string(),
                code,
                body: body.trim().chars().take(200).collect(),
            }
        }
        ureq::Error::Transport(transport) => {
            let timed_out = std::error::Error::source(&transport)
                .and_then(|source| source.downcast_ref::<std::io::Error>())
                .map_or(false, |io| {
                    matches!(
                        io.kind(),
                        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                    )
                });
            if timed_out {
                UploadError::Timeout {
                    url: url.to_string(),
                }
            } else {
                UploadError::Transport {
                    url: url.to_string(),
                    reason: transport.to_string(),
                }
            }
        }
    }
}
