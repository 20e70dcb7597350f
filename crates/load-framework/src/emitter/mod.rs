/*
Copyright 2024-2025 The Spice.ai OSS Authors

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

     https://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    Client, Request, Response,
};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub const DEFAULT_INVOKE_URL: &str = "http://localhost:8000/invoke";
pub const DEFAULT_MODEL_ID: &str = "1";
pub const DEFAULT_INPUT: [i64; 3] = [1, 2, 3];
pub const CONTENT_TYPE_JSON: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkletInput {
    pub model_id: String,
    pub input: Vec<i64>,
}

/// The body of a `POST /invoke` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeRequest {
    pub worklet_input: WorkletInput,
}

impl Default for InvokeRequest {
    fn default() -> Self {
        Self {
            worklet_input: WorkletInput {
                model_id: DEFAULT_MODEL_ID.to_string(),
                input: DEFAULT_INPUT.to_vec(),
            },
        }
    }
}

/// The immutable description of the request sent on every invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTemplate {
    url: String,
    body: InvokeRequest,
    /// Sent verbatim as the `authorization` header, e.g. `Api-Key <key>`.
    authorization: Option<String>,
}

impl Default for RequestTemplate {
    fn default() -> Self {
        Self {
            url: DEFAULT_INVOKE_URL.to_string(),
            body: InvokeRequest::default(),
            authorization: None,
        }
    }
}

impl RequestTemplate {
    #[must_use]
    pub fn new(url: impl Into<String>, body: InvokeRequest) -> Self {
        Self {
            url: url.into(),
            body,
            authorization: None,
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    #[must_use]
    pub fn with_authorization(mut self, authorization: Option<String>) -> Self {
        self.authorization = authorization;
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn authorization(&self) -> Option<&str> {
        self.authorization.as_deref()
    }

    #[must_use]
    pub fn body(&self) -> &InvokeRequest {
        &self.body
    }

    pub fn body_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.body)
    }

    /// Builds the request without sending it. [`RequestEmitter`] sends clones of this request.
    pub fn build_request(&self, client: &Client) -> Result<Request> {
        let body = self.body_json()?;
        let mut builder = client
            .post(self.url.as_str())
            .header(CONTENT_TYPE, CONTENT_TYPE_JSON);
        if let Some(authorization) = &self.authorization {
            builder = builder.header(AUTHORIZATION, authorization);
        }

        builder
            .body(body)
            .build()
            .map_err(|e| anyhow!("Failed to build request to {}. Error: {e}", self.url))
    }
}

/// A single unit of work invoked by an executor.
///
/// Returns how long the invocation took. Errors are counted by the caller, never retried.
#[async_trait]
pub trait Emit: Send + Sync {
    async fn emit(&self) -> Result<Duration>;
}

/// Sends the request described by a [`RequestTemplate`] once per call.
///
/// The request is built once up front; every call sends a clone of it.
pub struct RequestEmitter {
    client: Client,
    request: Request,
}

impl RequestEmitter {
    pub fn new(client: Client, template: &RequestTemplate) -> Result<Self> {
        let request = template.build_request(&client)?;
        Ok(Self { client, request })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        self.request.url().as_str()
    }

    /// The request sent on every call.
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Sends one request and returns the raw response. The status is not inspected.
    pub async fn send(&self) -> Result<Response> {
        let request = self
            .request
            .try_clone()
            .ok_or_else(|| anyhow!("Request to {} has a body that cannot be cloned", self.url()))?;

        self.client
            .execute(request)
            .await
            .map_err(|e| anyhow!("POST request to {} failed. Error: {e}", self.url()))
    }
}

#[async_trait]
impl Emit for RequestEmitter {
    async fn emit(&self) -> Result<Duration> {
        let start_time = Instant::now();
        let response = self.send().await?;

        // drain the body so the connection can be reused
        response
            .bytes()
            .await
            .map_err(|e| anyhow!("Failed to read response from {}. Error: {e}", self.url()))?;

        Ok(start_time.elapsed())
    }
}

pub fn http_client() -> Result<Client> {
    Ok(Client::builder()
        .user_agent(concat!("load-framework/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;
    use serde_json::{json, Value};

    #[test]
    fn test_default_body_is_the_literal_payload() {
        let body = RequestTemplate::default()
            .body_json()
            .expect("body should serialize");
        assert_eq!(
            body,
            r#"{"worklet_input":{"model_id":"1","input":[1,2,3]}}"#
        );

        let parsed: Value = serde_json::from_str(&body).expect("body should parse");
        assert_eq!(
            parsed,
            json!({"worklet_input": {"model_id": "1", "input": [1, 2, 3]}})
        );
    }

    #[test]
    fn test_built_request_is_a_json_post_to_invoke() {
        let client = Client::new();
        let request = RequestTemplate::default()
            .build_request(&client)
            .expect("request should build");

        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.url().as_str(), "http://localhost:8000/invoke");
        assert_eq!(
            request
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("application/json")
        );

        let body = request
            .body()
            .and_then(reqwest::Body::as_bytes)
            .expect("request should have a buffered body");
        let parsed: Value = serde_json::from_slice(body).expect("body should parse");
        assert_eq!(
            parsed,
            json!({"worklet_input": {"model_id": "1", "input": [1, 2, 3]}})
        );
    }

    #[test]
    fn test_with_url_keeps_body() {
        let template = RequestTemplate::default().with_url("http://127.0.0.1:8001/invoke");
        assert_eq!(template.url(), "http://127.0.0.1:8001/invoke");
        assert_eq!(template.body(), &InvokeRequest::default());
    }

    #[test]
    fn test_invalid_url_fails_to_build() {
        let client = Client::new();
        let result = RequestTemplate::default()
            .with_url("not a url")
            .build_request(&client);
        assert!(result.is_err());
    }

    fn header<'a>(request: &'a Request, name: &reqwest::header::HeaderName) -> Option<&'a str> {
        request.headers().get(name).and_then(|v| v.to_str().ok())
    }

    #[test]
    fn test_emitter_sends_the_built_request() {
        let template = RequestTemplate::default().with_url("http://127.0.0.1:8001/invoke");
        let emitter = RequestEmitter::new(Client::new(), &template).expect("emitter should build");
        let request = emitter.request();

        assert_eq!(request.method(), &Method::POST);
        assert_eq!(emitter.url(), "http://127.0.0.1:8001/invoke");
        assert_eq!(header(request, &CONTENT_TYPE), Some("application/json"));
        assert_eq!(header(request, &AUTHORIZATION), None);
        assert_eq!(
            request.body().and_then(reqwest::Body::as_bytes),
            Some(br#"{"worklet_input":{"model_id":"1","input":[1,2,3]}}"#.as_slice())
        );
        assert!(request.try_clone().is_some());
    }

    #[test]
    fn test_authorization_header_is_optional() {
        let template =
            RequestTemplate::default().with_authorization(Some("Api-Key abc.123".to_string()));
        assert_eq!(template.authorization(), Some("Api-Key abc.123"));

        let emitter = RequestEmitter::new(Client::new(), &template).expect("emitter should build");
        assert_eq!(header(emitter.request(), &AUTHORIZATION), Some("Api-Key abc.123"));
        assert_eq!(
            header(emitter.request(), &CONTENT_TYPE),
            Some("application/json")
        );
    }

    #[test]
    fn test_emitter_rejects_invalid_url() {
        let template = RequestTemplate::default().with_url("not a url");
        assert!(RequestEmitter::new(Client::new(), &template).is_err());
    }

    #[tokio::test]
    async fn test_emit_fails_when_nothing_is_listening() {
        // bind then drop, so the port is very likely closed
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("should bind");
        let addr = listener.local_addr().expect("should have an address");
        drop(listener);

        let template = RequestTemplate::default().with_url(format!("http://{addr}/invoke"));
        let emitter = RequestEmitter::new(Client::new(), &template).expect("emitter should build");
        assert!(emitter.emit().await.is_err());
    }
}
