use std::collections::HashMap;
use std::io::{self, Read, Write};

use crate::multipart::{boundary_from_content_type, find_image, parse_form};

use super::router::RequestError;

pub const MAX_HEAD_BYTES: usize = 16 * 1024;
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Image bytes from the `image` or `file` form field, if any.
    ///
    /// Bodies that are not well-formed `multipart/form-data` carry no image.
    pub fn image_payload(&self) -> Option<Vec<u8>> {
        let boundary = boundary_from_content_type(self.header("content-type")?)?;
        let parts = match parse_form(&self.body, &boundary) {
            Ok(parts) => parts,
            Err(err) => {
                log::debug!("unreadable form body on {}: {}", self.path, err);
                return None;
            }
        };
        find_image(&parts).map(|part| part.data.clone())
    }
}

/// Read one request (head and `Content-Length` body) from `stream`.
pub fn read_request<R: Read>(stream: &mut R) -> Result<HttpRequest, RequestError> {
    let mut buf = [0u8; 4096];
    let mut data = Vec::new();
    let head_end = loop {
        if let Some(pos) = find_subslice(&data, b"\r\n\r\n") {
            break pos;
        }
        if data.len() > MAX_HEAD_BYTES {
            return Err(RequestError::PayloadTooLarge);
        }
        let n = stream.read(&mut buf).map_err(connection_error)?;
        if n == 0 {
            return Err(RequestError::Malformed("connection closed before end of headers".into()));
        }
        data.extend_from_slice(&buf[..n]);
    };
    if head_end > MAX_HEAD_BYTES {
        return Err(RequestError::PayloadTooLarge);
    }

    let head = String::from_utf8_lossy(&data[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines
        .next()
        .filter(|line| !line.is_empty())
        .ok_or_else(|| RequestError::Malformed("empty request".into()))?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| RequestError::Malformed("missing method".into()))?;
    let raw_path = parts
        .next()
        .ok_or_else(|| RequestError::Malformed("missing path".into()))?;

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();

    let content_length = match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| RequestError::Malformed(format!("bad content-length '{value}'")))?,
        None if headers.contains_key("transfer-encoding") => {
            return Err(RequestError::LengthRequired)
        }
        None => 0,
    };
    if content_length > MAX_BODY_BYTES {
        return Err(RequestError::PayloadTooLarge);
    }

    let mut body = data.split_off(head_end + 4);
    while body.len() < content_length {
        let n = stream.read(&mut buf).map_err(connection_error)?;
        if n == 0 {
            return Err(RequestError::Malformed("body shorter than content-length".into()));
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    Ok(HttpRequest {
        method: method.to_string(),
        path,
        headers,
        body,
    })
}

pub fn write_json_response<W: Write>(stream: &mut W, status: u16, body: &[u8]) -> io::Result<()> {
    write_response(stream, status, "application/json", body)
}

pub fn write_response<W: Write>(
    stream: &mut W,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> io::Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        408 => "HTTP/1.1 408 Request Timeout",
        411 => "HTTP/1.1 411 Length Required",
        413 => "HTTP/1.1 413 Payload Too Large",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    stream.flush()
}

fn connection_error(err: io::Error) -> RequestError {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => RequestError::Timeout,
        _ => RequestError::Malformed(format!("read failed: {err}")),
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
