//! HTTP implementation of the analysis backend

use crate::backend::{AnalysisBackend, ChunkUpload};
use crate::multipart::encode_chunk;
use crate::{ClientError, HttpBackendConfig, Result};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::{header, Method, Request, StatusCode};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{connect::HttpConnector, Client as HyperClient};
use hyper_util::rt::TokioExecutor;
use nids_core::{AnalysisResult, JobId, MergeRequest, MergeResponse, StatusResponse};
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::debug;

type RequestBody = BoxBody<Bytes, Infallible>;

/// Talks to the analysis service over HTTP/1.1, plain or TLS, with a bearer
/// credential
#[derive(Clone)]
pub struct HttpBackend {
    config: Arc<HttpBackendConfig>,
    http: HyperClient<HttpsConnector<HttpConnector>, RequestBody>,
}

impl HttpBackend {
    /// Create a backend client; fails on an invalid URL or missing token
    pub fn new(config: HttpBackendConfig) -> Result<Self> {
        config.validate()?;

        let connector = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
            .map_err(|e| ClientError::Config(format!("TLS setup failed: {}", e)))?
            .https_or_http()
            .enable_http1()
            .build();
        let http = HyperClient::builder(TokioExecutor::new()).build(connector);

        Ok(HttpBackend {
            config: Arc::new(config),
            http,
        })
    }

    pub fn config(&self) -> &HttpBackendConfig {
        &self.config
    }

    fn build(
        &self,
        method: Method,
        path: &str,
        content_type: Option<&str>,
        body: RequestBody,
    ) -> Result<Request<RequestBody>> {
        let mut builder = Request::builder()
            .method(method)
            .uri(self.config.url(path)?)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.config.bearer_token))
            .header(header::ACCEPT, "application/json");

        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }

        builder
            .body(body)
            .map_err(|e| ClientError::Config(format!("Failed to build request: {}", e)))
    }

    /// Send a request under the configured timeout and collect the body
    async fn send(&self, request: Request<RequestBody>) -> Result<(StatusCode, Bytes)> {
        let method = request.method().clone();
        let uri = request.uri().clone();
        let timeout = self.config.request_timeout;

        let exchange = async {
            let response = self
                .http
                .request(request)
                .await
                .map_err(|e| ClientError::Transport(format!("{} {}: {}", method, uri, e)))?;

            let status = response.status();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| ClientError::Transport(format!("reading {} body: {}", uri, e)))?
                .to_bytes();

            Ok::<_, ClientError>((status, body))
        };

        let (status, body) = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| ClientError::Timeout(timeout))??;

        debug!("{} {} -> {} ({} bytes)", method, uri, status, body.len());
        check_status(status, &body)?;
        Ok((status, body))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: Request<RequestBody>) -> Result<T> {
        let (_, body) = self.send(request).await?;
        decode(&body)
    }
}

#[async_trait]
impl AnalysisBackend for HttpBackend {
    async fn upload_chunk(&self, chunk: ChunkUpload) -> Result<()> {
        let form = encode_chunk(chunk);
        let content_type = form.content_type();
        let request = self.build(
            Method::POST,
            &self.config.endpoints.upload_chunk,
            Some(&content_type),
            form.finish().boxed(),
        )?;

        self.send(request).await.map(|_| ())
    }

    async fn merge(&self, merge: &MergeRequest) -> Result<MergeResponse> {
        let body = serde_json::to_vec(merge).map_err(nids_core::NidsError::from)?;
        let request = self.build(
            Method::POST,
            &self.config.endpoints.merge,
            Some("application/json"),
            Full::new(Bytes::from(body)).boxed(),
        )?;

        self.send_json(request).await
    }

    async fn job_status(&self, job_id: JobId) -> Result<StatusResponse> {
        let path = self.config.endpoints.status_path(job_id);
        let request = self.build(Method::GET, &path, None, empty())?;
        self.send_json(request).await
    }

    async fn job_result(&self, job_id: JobId) -> Result<AnalysisResult> {
        let path = self.config.endpoints.result_path(job_id);
        let request = self.build(Method::GET, &path, None, empty())?;
        self.send_json(request).await
    }
}

fn empty() -> RequestBody {
    Full::new(Bytes::new()).boxed()
}

/// Map a non-2xx answer to an application failure
fn check_status(status: StatusCode, body: &[u8]) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }

    let message = error_detail(body);
    if status == StatusCode::UNAUTHORIZED {
        return Err(ClientError::Unauthorized(message));
    }

    Err(ClientError::Application {
        status: status.as_u16(),
        message,
    })
}

/// Pull `detail` or `error` out of a JSON error body, else use the raw text
fn error_detail(body: &[u8]) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_slice::<serde_json::Value>(body) {
        for key in ["detail", "error", "message"] {
            if let Some(value) = map.get(key) {
                return match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
            }
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        "no response body".to_string()
    } else {
        text.chars().take(200).collect()
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| ClientError::Protocol(e.to_string()))
}
