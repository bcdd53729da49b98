#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use casevault::base::Role;
use casevault::blob::BlobClient;
use casevault::blob::memory::MemoryBlobStore;
use casevault::persistence::RecordStore;
use casevault::persistence::memory::MemoryRecordStore;
use casevault::service::actor::{ACTOR_ID_HEADER, ACTOR_ROLE_HEADER};
use casevault::service::{AppContext, router};
use casevault::settings::Settings;

const BOUNDARY: &str = "casevault-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub blobs: Arc<MemoryBlobStore>,
    pub records: Arc<MemoryRecordStore>,
}

impl TestApp {
    pub fn new() -> Self {
        let settings = Settings::default();
        let blobs = Arc::new(MemoryBlobStore::new());
        let records = Arc::new(MemoryRecordStore::new());
        let client = BlobClient::new(blobs.clone(), &settings.blob_store);
        let records_dyn: Arc<dyn RecordStore> = records.clone();
        let router = router(AppContext::new(settings, records_dyn, client));
        Self {
            router,
            blobs,
            records,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub async fn send_raw(&self, request: Request<Body>) -> axum::response::Response {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

/// Request builder carrying actor headers for `role` and `Accept-Language: en`.
pub fn request(method: Method, uri: &str, role: Option<Role>) -> axum::http::request::Builder {
    request_in("en", method, uri, role)
}

pub fn request_in(
    language: &str,
    method: Method,
    uri: &str,
    role: Option<Role>,
) -> axum::http::request::Builder {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::ACCEPT_LANGUAGE, language);
    if let Some(role) = role {
        builder = builder
            .header(ACTOR_ID_HEADER, Uuid::new_v4().to_string())
            .header(ACTOR_ROLE_HEADER, role.as_str());
    }
    builder
}

pub fn empty(method: Method, uri: &str, role: Option<Role>) -> Request<Body> {
    request(method, uri, role).body(Body::empty()).unwrap()
}

pub fn json(method: Method, uri: &str, role: Option<Role>, body: Value) -> Request<Body> {
    request(method, uri, role)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        field: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        bytes: &'a [u8],
    },
}

pub fn image(file_name: &str) -> Part<'_> {
    Part::File {
        field: "attachments",
        file_name,
        content_type: "image/jpeg",
        bytes: b"\xff\xd8\xff\xe0jpeg",
    }
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File {
                field,
                file_name,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart(
    method: Method,
    uri: &str,
    role: Option<Role>,
    parts: &[Part<'_>],
) -> Request<Body> {
    request(method, uri, role)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

/// External ids of a case JSON's attachments, in order.
pub fn external_ids(case: &Value) -> Vec<String> {
    case["images"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["externalId"].as_str().unwrap().to_string())
        .collect()
}
