//! Backends that delegate to remote HTTP inference services.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::multipart::{sniff_image_type, MultipartBody};
use crate::pipeline::backend::{TranslationBackend, VisionBackend};

/// Vision backend that forwards the image to an inference endpoint.
///
/// The endpoint receives a multipart `image` field and answers with either a
/// JSON string, an object carrying `caption`/`text`/`generated_text`, or a
/// list whose first element is such an object.
pub struct HttpVisionBackend {
    name: &'static str,
    url: String,
    agent: ureq::Agent,
}

impl HttpVisionBackend {
    pub fn new(name: &'static str, url: &str, timeout: Duration) -> Result<Self> {
        let url = parse_http_url(url)?;
        Ok(Self {
            name,
            url: url.to_string(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        })
    }
}

impl VisionBackend for HttpVisionBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn describe(&self, image: &[u8]) -> Result<String> {
        let body = MultipartBody::single_file("image", "frame", sniff_image_type(image), image);
        let response = self
            .agent
            .post(&self.url)
            .set("Content-Type", &body.content_type())
            .send_bytes(body.as_bytes())
            .with_context(|| format!("POST {}", self.url))?;
        let raw = response
            .into_string()
            .context("read inference response")?;
        parse_vision_reply(&raw)
    }
}

fn parse_vision_reply(raw: &str) -> Result<String> {
    let value: Value = serde_json::from_str(raw).context("inference response is not JSON")?;
    let text = match &value {
        Value::String(text) => Some(text.as_str()),
        Value::Object(_) => text_field(&value),
        Value::Array(items) => items.first().and_then(text_field),
        _ => None,
    };
    text.map(|text| text.trim().to_string())
        .ok_or_else(|| anyhow!("inference response carries no text field"))
}

fn text_field(value: &Value) -> Option<&str> {
    ["caption", "text", "generated_text"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
}

/// Translator speaking the LibreTranslate `/translate` protocol.
pub struct HttpTranslator {
    url: String,
    api_key: Option<String>,
    agent: ureq::Agent,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateReply {
    translated_text: String,
}

impl HttpTranslator {
    /// `base_url` may name the service root or the `/translate` route itself.
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let mut url = parse_http_url(base_url)?;
        if !url.path().trim_end_matches('/').ends_with("/translate") {
            let path = format!("{}/translate", url.path().trim_end_matches('/'));
            url.set_path(&path);
        }
        Ok(Self {
            url: url.to_string(),
            api_key,
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl TranslationBackend for HttpTranslator {
    fn name(&self) -> &'static str {
        "libretranslate"
    }

    fn translate(&self, text: &str, target_language: &str) -> Result<String> {
        let request = TranslateRequest {
            q: text,
            source: "en",
            target: target_language,
            format: "text",
            api_key: self.api_key.as_deref(),
        };
        let payload = serde_json::to_string(&request)?;
        let response = self
            .agent
            .post(&self.url)
            .set("Content-Type", "application/json")
            .send_string(&payload)
            .with_context(|| format!("POST {}", self.url))?;
        let raw = response
            .into_string()
            .context("read translation response")?;
        let reply: TranslateReply =
            serde_json::from_str(&raw).context("invalid translation response")?;
        Ok(reply.translated_text)
    }
}

fn parse_http_url(value: &str) -> Result<Url> {
    let url = Url::parse(value).with_context(|| format!("invalid backend url '{}'", value))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(anyhow!(
            "unsupported backend scheme '{}'; expected http(s)",
            other
        )),
    }
}
