//! Outbound HTTP abstraction
//!
//! TigerStyle: Model, rerank, embedding and vector-search calls go through
//! [`HttpClient`] so tests can answer them without a network.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use crate::constants::HTTP_TIMEOUT_MS_DEFAULT;

/// Stream of raw body chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, String>> + Send>>;

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// HTTP request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Attach `Authorization: Bearer {token}` unless the token is empty
    pub fn bearer(self, token: &str) -> Self {
        if token.is_empty() {
            self
        } else {
            self.header("Authorization", format!("Bearer {}", token))
        }
    }

    pub fn json<T: serde::Serialize>(mut self, body: &T) -> Result<Self, String> {
        let json =
            serde_json::to_vec(body).map_err(|e| format!("JSON serialization failed: {}", e))?;
        self.body = Some(json);
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    /// Body decoded as JSON, for inspection in stubs
    pub fn json_body(&self) -> Option<serde_json::Value> {
        self.body
            .as_deref()
            .and_then(|b| serde_json::from_slice(b).ok())
    }
}

/// HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// 200 response with a JSON body
    pub fn ok_json(value: &serde_json::Value) -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            body: value.to_string().into_bytes(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> Result<String, String> {
        String::from_utf8(self.body.clone()).map_err(|e| format!("Invalid UTF-8: {}", e))
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, String> {
        serde_json::from_slice(&self.body)
            .map_err(|e| format!("JSON deserialization failed: {}", e))
    }
}

/// HTTP client trait
///
/// Business logic never touches reqwest directly.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send a request and buffer the whole response
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;

    /// Send a request and return body chunks as they arrive (SSE)
    async fn send_streaming(&self, request: HttpRequest) -> Result<ByteStream, String>;
}

/// Production HTTP client using reqwest
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::with_timeout_ms(HTTP_TIMEOUT_MS_DEFAULT)
    }

    /// Client whose requests fail after `timeout_ms`
    pub fn with_timeout_ms(timeout_ms: u64) -> Self {
        assert!(timeout_ms > 0, "timeout must be positive");
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    fn build(&self, request: HttpRequest) -> reqwest::RequestBuilder {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        };
        let mut builder = self.client.request(method, &request.url);
        for (key, value) in request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        builder
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        let response = self
            .build(request)
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {}", e))?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| format!("Failed to read response body: {}", e))?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn send_streaming(&self, request: HttpRequest) -> Result<ByteStream, String> {
        let response = self
            .build(request)
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("API error {}: {}", status, body));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| format!("Stream error: {}", e)));
        Ok(Box::pin(stream))
    }
}
