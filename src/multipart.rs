//! Minimal `multipart/form-data` codec.
//!
//! Only what the narrator needs: encoding one file part for upload, and
//! splitting an inbound body into named parts on the gateway.

use rand::RngCore;
use thiserror::Error;

/// Form field names accepted for the image payload, in lookup order.
pub const IMAGE_FIELDS: [&str; 2] = ["image", "file"];

const CRLF: &[u8] = b"\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MultipartError {
    #[error("multipart body has no opening boundary")]
    MissingBoundary,
    #[error("multipart part headers are not terminated")]
    UnterminatedHeaders,
    #[error("multipart part is not terminated by a boundary")]
    UnterminatedPart,
    #[error("multipart part has no form-data name")]
    MissingName,
}

/// An encoded multipart body ready to send.
#[derive(Debug)]
pub struct MultipartBody {
    boundary: String,
    bytes: Vec<u8>,
}

impl MultipartBody {
    /// Encode a single file part under `field`.
    pub fn single_file(field: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        let mut nonce = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce);
        let boundary = format!("----narrator{}", hex::encode(nonce));

        let mut bytes = Vec::with_capacity(data.len() + 256);
        bytes.extend_from_slice(b"--");
        bytes.extend_from_slice(boundary.as_bytes());
        bytes.extend_from_slice(CRLF);
        bytes.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
            )
            .as_bytes(),
        );
        bytes.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        bytes.extend_from_slice(data);
        bytes.extend_from_slice(CRLF);
        bytes.extend_from_slice(b"--");
        bytes.extend_from_slice(boundary.as_bytes());
        bytes.extend_from_slice(b"--\r\n");

        Self { boundary, bytes }
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// One decoded form part.
#[derive(Clone, Debug)]
pub struct FormPart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Extract the boundary parameter from a `Content-Type` header value.
///
/// Returns `None` unless the media type is `multipart/form-data`.
pub fn boundary_from_content_type(value: &str) -> Option<String> {
    let mut params = value.split(';');
    let media_type = params.next()?.trim();
    if !media_type.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params
        .filter_map(|param| param.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, boundary)| unquote(boundary.trim()).to_string())
        .filter(|boundary| !boundary.is_empty())
}

/// Split a multipart body into its parts.
pub fn parse_form(body: &[u8], boundary: &str) -> Result<Vec<FormPart>, MultipartError> {
    let delimiter = [b"--", boundary.as_bytes()].concat();
    let next_delimiter = [CRLF, delimiter.as_slice()].concat();

    let mut cursor =
        find(body, &delimiter, 0).ok_or(MultipartError::MissingBoundary)? + delimiter.len();
    let mut parts = Vec::new();

    loop {
        if body[cursor..].starts_with(b"--") {
            break;
        }
        if body[cursor..].starts_with(CRLF) {
            cursor += CRLF.len();
        }

        let header_end =
            find(body, HEADER_END, cursor).ok_or(MultipartError::UnterminatedHeaders)?;
        let headers = String::from_utf8_lossy(&body[cursor..header_end]);
        let data_start = header_end + HEADER_END.len();
        let data_end =
            find(body, &next_delimiter, data_start).ok_or(MultipartError::UnterminatedPart)?;

        parts.push(decode_part(&headers, body[data_start..data_end].to_vec())?);
        cursor = data_end + next_delimiter.len();
        if cursor >= body.len() {
            break;
        }
    }

    Ok(parts)
}

/// Return the first non-empty accepted image part, honoring [`IMAGE_FIELDS`]
/// order.
pub fn find_image(parts: &[FormPart]) -> Option<&FormPart> {
    IMAGE_FIELDS.iter().find_map(|field| {
        parts
            .iter()
            .find(|part| part.name == *field && !part.data.is_empty())
    })
}

/// Best-effort media type for encoded image bytes.
pub fn sniff_image_type(data: &[u8]) -> &'static str {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else {
        "application/octet-stream"
    }
}

fn decode_part(headers: &str, data: Vec<u8>) -> Result<FormPart, MultipartError> {
    let mut name = None;
    let mut file_name = None;
    let mut content_type = None;

    for line in headers.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.eq_ignore_ascii_case("content-disposition") {
            for param in value.split(';').skip(1) {
                if let Some((k, v)) = param.trim().split_once('=') {
                    match k.trim().to_ascii_lowercase().as_str() {
                        "name" => name = Some(unquote(v.trim()).to_string()),
                        "filename" => file_name = Some(unquote(v.trim()).to_string()),
                        _ => {}
                    }
                }
            }
        } else if key.eq_ignore_ascii_case("content-type") {
            content_type = Some(value.trim().to_string());
        }
    }

    Ok(FormPart {
        name: name.ok_or(MultipartError::MissingName)?,
        file_name,
        content_type,
        data,
    })
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}
