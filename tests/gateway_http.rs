use anyhow::Result;
use serde_json::Value;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

use frame_narrator::gateway::{GatewayHandle, GatewayRouter, GatewayServer};
use frame_narrator::multipart::MultipartBody;
use frame_narrator::pipeline::backends::{StubTranslator, StubVisionBackend};
use frame_narrator::pipeline::{
    BackendKind, BackendRegistry, InferencePipeline, Pipeline, TranslationBackend, VisionBackend,
    OCR_FALLBACK,
};

const JPEG: &[u8] = b"\xFF\xD8\xFF\xE0fake-jpeg-payload";

struct TestGateway {
    handle: Option<GatewayHandle>,
    registry: Arc<BackendRegistry>,
}

impl TestGateway {
    fn new(setup: impl FnOnce(&mut BackendRegistry)) -> Result<Self> {
        let mut registry = BackendRegistry::new();
        setup(&mut registry);
        let registry = Arc::new(registry);
        let router = GatewayRouter::new(InferencePipeline::new(registry.clone()))
            .with_public_url("http://specsserver.local");
        let handle = GatewayServer::new("127.0.0.1:0", router).spawn()?;
        Ok(Self {
            handle: Some(handle),
            registry,
        })
    }

    fn addr(&self) -> SocketAddr {
        self.handle.as_ref().map(|h| h.addr).expect("running gateway")
    }

    fn send(&self, raw: &[u8]) -> Result<(String, Value)> {
        let mut stream = TcpStream::connect(self.addr())?;
        stream.write_all(raw)?;
        let mut response = Vec::new();
        stream.read_to_end(&mut response)?;
        let response = String::from_utf8(response)?;
        let mut parts = response.splitn(2, "\r\n\r\n");
        let headers = parts.next().unwrap_or("").to_string();
        let body = serde_json::from_str(parts.next().unwrap_or(""))?;
        Ok((headers, body))
    }

    fn get(&self, path: &str) -> Result<(String, Value)> {
        self.send(format!("GET {path} HTTP/1.1\r\nHost: test\r\n\r\n").as_bytes())
    }

    fn post_field(&self, path: &str, field: &str, data: &[u8]) -> Result<(String, Value)> {
        let body = MultipartBody::single_file(field, "photo.jpg", "image/jpeg", data);
        let mut raw = format!(
            "POST {path} HTTP/1.1\r\nHost: test\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n",
            body.content_type(),
            body.as_bytes().len()
        )
        .into_bytes();
        raw.extend_from_slice(body.as_bytes());
        self.send(&raw)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.stop();
        }
    }
}

fn status_line(headers: &str) -> &str {
    headers.lines().next().unwrap_or("")
}

fn caption_stub(text: &str) -> Arc<StubVisionBackend> {
    Arc::new(StubVisionBackend::new(text))
}

#[test]
fn get_returns_usage_descriptor() -> Result<()> {
    let backends: Vec<_> = Pipeline::ALL
        .iter()
        .map(|pipeline| (*pipeline, caption_stub("unused")))
        .collect();
    let registered = backends.clone();
    let gateway = TestGateway::new(move |registry| {
        for (pipeline, backend) in registered {
            registry.register_vision(pipeline, move || Ok(backend.clone() as Arc<dyn VisionBackend>));
        }
    })?;
    let (headers, body) = gateway.get("/caption/en")?;
    assert_eq!(status_line(&headers), "HTTP/1.1 200 OK");
    assert!(body["help"].as_str().unwrap().contains("caption"));
    assert_eq!(
        body["example"]["curl"],
        "curl -X POST -F \"image=@/path/photo.jpg\" http://specsserver.local/caption/en"
    );

    let (_, body) = gateway.get("/traffic")?;
    assert!(body["example"]["curl"].as_str().unwrap().ends_with("/traffic"));
    let (headers, _) = gateway.get("/ocr/hi")?;
    assert_eq!(status_line(&headers), "HTTP/1.1 200 OK");

    for (pipeline, backend) in &backends {
        assert_eq!(backend.calls(), 0);
        assert_eq!(gateway.registry.init_attempts(BackendKind::Vision(*pipeline)), 0);
    }
    Ok(())
}

#[test]
fn post_without_image_is_400_and_skips_backend() -> Result<()> {
    let backend = caption_stub("a dog");
    let shared = backend.clone();
    let gateway = TestGateway::new(move |registry| {
        registry.register_vision(Pipeline::Caption, move || {
            Ok(shared.clone() as Arc<dyn VisionBackend>)
        });
    })?;

    let (headers, body) = gateway.post_field("/caption/en", "photo", JPEG)?;
    assert_eq!(status_line(&headers), "HTTP/1.1 400 Bad Request");
    assert_eq!(
        body["error"],
        "No image provided. Use multipart form 'image' or 'file'."
    );

    let (headers, _) = gateway.send(b"POST /caption/en HTTP/1.1\r\nContent-Length: 0\r\n\r\n")?;
    assert_eq!(status_line(&headers), "HTTP/1.1 400 Bad Request");

    assert_eq!(backend.calls(), 0);
    Ok(())
}

#[test]
fn unavailable_ocr_serves_placeholder() -> Result<()> {
    let gateway = TestGateway::new(|_| {})?;
    let (headers, body) = gateway.post_field("/ocr/en", "image", JPEG)?;
    assert_eq!(status_line(&headers), "HTTP/1.1 200 OK");
    assert_eq!(body["text"], OCR_FALLBACK);
    assert_eq!(body["text_en"], OCR_FALLBACK);
    assert_eq!(body["confidence"], 0.8);
    assert_eq!(body["language"], "en");
    Ok(())
}

#[test]
fn caption_is_translated_for_language_alias() -> Result<()> {
    let translator = Arc::new(StubTranslator::new());
    let shared_translator = translator.clone();
    let gateway = TestGateway::new(move |registry| {
        registry.register_vision(Pipeline::Caption, || {
            Ok(caption_stub("a dog on a sofa") as Arc<dyn VisionBackend>)
        });
        registry.register_translator(move || {
            Ok(shared_translator.clone() as Arc<dyn TranslationBackend>)
        });
    })?;

    let (_, body) = gateway.post_field("/caption/hindi", "file", JPEG)?;
    assert_eq!(body["caption"], "[hi] a dog on a sofa");
    assert_eq!(body["caption_en"], "a dog on a sofa");
    assert_eq!(body["language"], "hi");
    assert_eq!(body["confidence"], 0.85);
    assert_eq!(translator.calls(), 1);
    Ok(())
}

#[test]
fn traffic_is_always_english() -> Result<()> {
    let translator = Arc::new(StubTranslator::new());
    let shared_translator = translator.clone();
    let gateway = TestGateway::new(move |registry| {
        registry.register_vision(Pipeline::Traffic, || {
            Ok(caption_stub("two cars at a red light") as Arc<dyn VisionBackend>)
        });
        registry.register_translator(move || {
            Ok(shared_translator.clone() as Arc<dyn TranslationBackend>)
        });
    })?;

    let (_, body) = gateway.post_field("/traffic", "image", JPEG)?;
    assert_eq!(body["caption"], "two cars at a red light");
    assert_eq!(body["caption_en"], body["caption"]);
    assert_eq!(body["language"], "en");
    assert_eq!(translator.calls(), 0);

    let (headers, _) = gateway.post_field("/traffic/hi", "image", JPEG)?;
    assert_eq!(status_line(&headers), "HTTP/1.1 404 Not Found");
    Ok(())
}

#[test]
fn protocol_errors_map_to_status_codes() -> Result<()> {
    let gateway = TestGateway::new(|_| {})?;

    let (headers, _) = gateway.send(b"PUT /traffic HTTP/1.1\r\nContent-Length: 0\r\n\r\n")?;
    assert_eq!(status_line(&headers), "HTTP/1.1 405 Method Not Allowed");

    let (headers, _) = gateway.get("/search")?;
    assert_eq!(status_line(&headers), "HTTP/1.1 404 Not Found");

    let (headers, _) =
        gateway.send(b"POST /traffic HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n")?;
    assert_eq!(status_line(&headers), "HTTP/1.1 411 Length Required");

    let (headers, body) = gateway.get("/ocr/not!a!language")?;
    assert_eq!(status_line(&headers), "HTTP/1.1 400 Bad Request");
    assert!(body["error"].as_str().unwrap().contains("not!a!language"));
    Ok(())
}

#[test]
fn concurrent_first_requests_initialize_backend_once() -> Result<()> {
    let gateway = Arc::new(TestGateway::new(|registry| {
        registry.register_vision(Pipeline::Caption, || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            Ok(caption_stub("a crowd") as Arc<dyn VisionBackend>)
        });
    })?);

    let clients: Vec<_> = (0..8)
        .map(|_| {
            let gateway = gateway.clone();
            std::thread::spawn(move || gateway.post_field("/caption/en", "image", JPEG))
        })
        .collect();
    for client in clients {
        let (_, body) = client.join().expect("client thread")?;
        assert_eq!(body["caption"], "a crowd");
    }
    assert_eq!(
        gateway
            .registry
            .init_attempts(BackendKind::Vision(Pipeline::Caption)),
        1
    );
    Ok(())
}
