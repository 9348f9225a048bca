use serde::Serialize;
use thiserror::Error;

use crate::language::{canonical_language, DEFAULT_LANGUAGE};
use crate::pipeline::{InferencePipeline, InferenceResult, Pipeline};

/// Client-facing request failures. The pipeline never runs for these.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("No image provided. Use multipart form 'image' or 'file'.")]
    MissingImage,
    #[error("unsupported language '{0}'")]
    InvalidLanguage(String),
    #[error("not found")]
    NotFound,
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error("content-length required")]
    LengthRequired,
    #[error("request too large")]
    PayloadTooLarge,
    #[error("request timed out")]
    Timeout,
}

impl RequestError {
    pub fn status(&self) -> u16 {
        match self {
            RequestError::MissingImage
            | RequestError::InvalidLanguage(_)
            | RequestError::Malformed(_) => 400,
            RequestError::NotFound => 404,
            RequestError::MethodNotAllowed => 405,
            RequestError::Timeout => 408,
            RequestError::LengthRequired => 411,
            RequestError::PayloadTooLarge => 413,
        }
    }

    /// `{"error": "..."}` body for this failure.
    pub fn to_json(&self) -> Vec<u8> {
        serde_json::json!({ "error": self.to_string() })
            .to_string()
            .into_bytes()
    }
}

/// Pipeline and canonical language named by a request path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub pipeline: Pipeline,
    pub language: String,
}

/// Map `/caption/{lang}`, `/ocr/{lang}` and `/traffic` to a pipeline.
pub fn resolve_route(path: &str) -> Result<Route, RequestError> {
    let trimmed = path.trim_matches('/');
    let mut segments = trimmed.split('/');
    let head = segments.next().unwrap_or_default();
    let lang = segments.next();
    if segments.next().is_some() {
        return Err(RequestError::NotFound);
    }

    let (pipeline, lang) = match (head, lang) {
        ("caption", Some(lang)) => (Pipeline::Caption, lang),
        ("ocr", Some(lang)) => (Pipeline::Ocr, lang),
        ("traffic", None) => (Pipeline::Traffic, DEFAULT_LANGUAGE),
        _ => return Err(RequestError::NotFound),
    };
    let language =
        canonical_language(lang).ok_or_else(|| RequestError::InvalidLanguage(lang.to_string()))?;
    Ok(Route { pipeline, language })
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct UsageExample {
    pub curl: String,
}

/// Static help returned for GET on a pipeline path.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct UsageDescriptor {
    pub help: String,
    pub example: UsageExample,
}

impl UsageDescriptor {
    fn for_route(route: &Route, public_url: &str) -> Self {
        let (help, path) = match route.pipeline {
            Pipeline::Caption => (
                format!(
                    "POST an image to get a scene caption in '{}'.",
                    route.language
                ),
                format!("/caption/{}", route.language),
            ),
            Pipeline::Ocr => (
                format!(
                    "POST an image to read its text, translated to '{}'.",
                    route.language
                ),
                format!("/ocr/{}", route.language),
            ),
            Pipeline::Traffic => (
                "POST an image to get an English description of the traffic scene.".to_string(),
                "/traffic".to_string(),
            ),
        };
        Self {
            help,
            example: UsageExample {
                curl: format!(
                    "curl -X POST -F \"image=@/path/photo.jpg\" {}{}",
                    public_url.trim_end_matches('/'),
                    path
                ),
            },
        }
    }
}

#[derive(Debug)]
pub enum RouteReply {
    Usage(UsageDescriptor),
    Inference {
        pipeline: Pipeline,
        result: InferenceResult,
    },
}

impl RouteReply {
    pub fn to_json(self) -> serde_json::Result<Vec<u8>> {
        match self {
            RouteReply::Usage(usage) => serde_json::to_vec(&usage),
            RouteReply::Inference { pipeline, result } => {
                serde_json::to_vec(&result.into_response(pipeline))
            }
        }
    }
}

/// Dispatches gateway requests to the inference pipelines.
pub struct GatewayRouter {
    pipeline: InferencePipeline,
    public_url: String,
}

impl GatewayRouter {
    pub fn new(pipeline: InferencePipeline) -> Self {
        Self {
            pipeline,
            public_url: "http://localhost:8080".to_string(),
        }
    }

    /// Base URL shown in usage examples.
    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = url.into();
        self
    }

    pub fn pipeline(&self) -> &InferencePipeline {
        &self.pipeline
    }

    pub fn route(
        &self,
        method: &str,
        path: &str,
        image: Option<&[u8]>,
    ) -> Result<RouteReply, RequestError> {
        let route = resolve_route(path)?;
        match method {
            "GET" => Ok(RouteReply::Usage(UsageDescriptor::for_route(
                &route,
                &self.public_url,
            ))),
            "POST" => {
                let image = image
                    .filter(|bytes| !bytes.is_empty())
                    .ok_or(RequestError::MissingImage)?;
                let result = self.pipeline.run(route.pipeline, &route.language, image);
                log::debug!(
                    "{} {} -> {:?} ({} bytes in, digest {})",
                    method,
                    path,
                    result.source,
                    image.len(),
                    crate::digest_prefix(image)
                );
                Ok(RouteReply::Inference {
                    pipeline: route.pipeline,
                    result,
                })
            }
            _ => Err(RequestError::MethodNotAllowed),
        }
    }
}
