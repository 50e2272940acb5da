//! HTTP request handling on top of hyper
//!
//! Protocol parsing and framing are left to hyper. Requests are collected
//! into a plain `Request` with the body limit enforced while reading, and
//! routing is a pure function of that request and the store so it can be
//! tested without sockets. Every response closes its connection.

use crate::artifact::{ArtifactMetadata, PublishedArtifact};
use crate::store::{ModelStore, Publisher};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body as HttpBody;
use hyper::header::{self, HeaderName, HeaderValue};
use hyper::StatusCode;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Header carrying JSON artifact metadata on upload
pub const METADATA_HEADER: &str = "X-Model-Metadata";

const GLB_CONTENT_TYPE: &str = "model/gltf-binary";

const CORS_HEADERS: [(HeaderName, &str); 3] = [
    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"),
    (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type, X-Model-Metadata"),
];

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("payload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    #[error("connection error: {0}")]
    Body(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Collect a hyper request, refusing bodies larger than `max_body`.
///
/// A declared `Content-Length` over the limit is refused before any of the
/// body is read; undeclared lengths are cut off once the limit is crossed.
pub async fn read_request<B>(request: hyper::Request<B>, max_body: usize) -> Result<Request, HttpError>
where
    B: HttpBody,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = request.into_parts();
    let declared = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .map(|v| {
            v.to_str()
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .ok_or_else(|| HttpError::BadRequest(format!("invalid Content-Length {:?}", v)))
        })
        .transpose()?;
    if declared.is_some_and(|len| len > max_body) {
        return Err(HttpError::PayloadTooLarge { limit: max_body });
    }

    let mut request = Request::new(parts.method.as_str(), parts.uri.path());
    for (name, value) in &parts.headers {
        match value.to_str() {
            Ok(value) => request.headers.push((name.as_str().to_string(), value.to_string())),
            Err(_) => debug!(header = %name, "ignoring non-ASCII header value"),
        }
    }

    let collected = Limited::new(body, max_body).collect().await.map_err(|e| {
        if e.downcast_ref::<LengthLimitError>().is_some() {
            HttpError::PayloadTooLarge { limit: max_body }
        } else {
            HttpError::Body(e.to_string())
        }
    })?;
    request.body = collected.to_bytes().to_vec();
    Ok(request)
}

/// Read-only view of a stored artifact's bytes
struct ArtifactBytes(Arc<PublishedArtifact>);

impl AsRef<[u8]> for ArtifactBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0.bytes
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    content_type: &'static str,
    body: Bytes,
}

impl Response {
    fn new(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    pub fn text(status: StatusCode, message: &str) -> Self {
        Self::new(status, "text/plain", message.to_string())
    }

    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        Self::new(status, "application/json", value.to_string())
    }

    /// Serve the artifact bytes without copying them out of the store
    pub fn artifact(artifact: Arc<PublishedArtifact>) -> Self {
        Self::new(StatusCode::OK, GLB_CONTENT_TYPE, Bytes::from_owner(ArtifactBytes(artifact)))
    }

    pub fn status(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn content_type(&self) -> &str {
        self.content_type
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Convert into a hyper response carrying the CORS headers
    pub fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let mut response = hyper::Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(self.content_type));
        for (name, value) in CORS_HEADERS {
            headers.insert(name, HeaderValue::from_static(value));
        }
        headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        response
    }
}

impl From<HttpError> for Response {
    fn from(err: HttpError) -> Self {
        let status = match err {
            HttpError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::Body(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Response::json(status, &json!({ "status": "error", "message": err.to_string() }))
    }
}

/// Read, route and answer one request
pub async fn handle<B>(request: hyper::Request<B>, store: &ModelStore, max_body: usize) -> hyper::Response<Full<Bytes>>
where
    B: HttpBody,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let response = match read_request(request, max_body).await {
        Ok(request) => {
            debug!(method = %request.method, path = %request.path, "request");
            route(&request, store)
        }
        Err(e) => {
            warn!(error = %e, "rejected request");
            Response::from(e)
        }
    };
    response.into_hyper()
}

const ROUTES: [(&str, &str); 4] = [
    ("GET", "/ping"),
    ("GET", "/latest-model"),
    ("GET", "/latest-model-info"),
    ("POST", "/upload-model"),
];

/// Answer a parsed request against the store
pub fn route(request: &Request, store: &ModelStore) -> Response {
    if request.method == "OPTIONS" {
        return Response::new(StatusCode::OK, "text/plain", Bytes::new());
    }

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/ping") => Response::text(StatusCode::OK, "pong"),
        ("GET", "/latest-model") => match store.latest() {
            Some(artifact) => Response::artifact(artifact),
            None => Response::text(StatusCode::NOT_FOUND, "No model available"),
        },
        ("GET", "/latest-model-info") => match store.latest() {
            Some(artifact) => match serde_json::to_value(&artifact.metadata) {
                Ok(value) => Response::json(StatusCode::OK, &value),
                Err(e) => Response::json(StatusCode::INTERNAL_SERVER_ERROR, &json!({ "status": "error", "message": e.to_string() })),
            },
            None => Response::text(StatusCode::NOT_FOUND, "No model metadata available"),
        },
        ("POST", "/upload-model") => upload(request, store),
        (_, path) if ROUTES.iter().any(|(_, p)| *p == path) => Response::text(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"),
        _ => Response::text(StatusCode::NOT_FOUND, "Not found"),
    }
}

fn upload(request: &Request, store: &ModelStore) -> Response {
    let metadata = match request.header(METADATA_HEADER) {
        Some(raw) => match serde_json::from_str::<ArtifactMetadata>(raw) {
            Ok(meta) => meta,
            Err(e) => {
                warn!(error = %e, "rejected upload with unreadable metadata");
                return Response::json(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &json!({ "status": "error", "message": format!("invalid metadata: {}", e) }),
                );
            }
        },
        None => ArtifactMetadata::minimal(request.body.len()),
    };

    let artifact = PublishedArtifact::new(request.body.clone(), metadata);
    match store.publish(artifact) {
        Ok(receipt) => {
            info!(size = receipt.size, "model uploaded");
            Response::json(
                StatusCode::OK,
                &json!({ "status": "success", "size": receipt.size, "size_mb": receipt.size_mb }),
            )
        }
        Err(e) => Response::json(StatusCode::INTERNAL_SERVER_ERROR, &json!({ "status": "error", "message": e.to_string() })),
    }
}
