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

use load_framework::emitter::http_client;
use serde_json::{json, Value};

use crate::{init_tracing, start_mock};

#[tokio::test]
async fn health_check_reports_healthy() {
    init_tracing(None);
    let mock = start_mock(0).await;

    let body: Value = http_client()
        .expect("client should build")
        .get(format!("http://{}/healtz", mock.local_addr()))
        .send()
        .await
        .expect("health check should be sent")
        .json()
        .await
        .expect("health check should parse");

    assert_eq!(
        body,
        json!({"status": "healthy", "service": "worklet-mock-server"})
    );
    assert_eq!(mock.stop().await.expect("mock should stop"), 0);
}

#[tokio::test]
async fn malformed_invoke_body_is_rejected() {
    init_tracing(None);
    let mock = start_mock(0).await;

    let response = http_client()
        .expect("client should build")
        .post(mock.invoke_url())
        .json(&json!({"worklet_input": {"model_id": 1}}))
        .send()
        .await
        .expect("request should be sent");

    assert!(response.status().is_client_error());
    // rejected by the extractor, so never counted
    assert_eq!(mock.stop().await.expect("mock should stop"), 0);
}
