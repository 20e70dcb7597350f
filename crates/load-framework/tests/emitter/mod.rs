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

use std::time::Duration;

use load_framework::{
    emitter::{http_client, Emit, RequestEmitter, RequestTemplate},
    executor::LoadTest,
    metrics::MetricCollector,
    mock::InvokeResponse,
    policy::InvocationPolicy,
};

use crate::{init_tracing, start_mock};

#[tokio::test]
async fn n_invocations_issue_n_requests() {
    init_tracing(None);
    let mock = start_mock(0).await;

    let template = RequestTemplate::default().with_url(mock.invoke_url());
    let emitter = RequestEmitter::new(http_client().expect("client should build"), &template)
        .expect("emitter should build");

    for _ in 0..7 {
        emitter.emit().await.expect("invoke should succeed");
    }

    assert_eq!(mock.invocation_count(), 7);
    assert_eq!(mock.stop().await.expect("mock should stop"), 7);
}

#[tokio::test]
async fn mock_accepts_the_emitted_payload() {
    init_tracing(None);
    let mock = start_mock(0).await;

    let template = RequestTemplate::default().with_url(mock.invoke_url());
    let emitter = RequestEmitter::new(http_client().expect("client should build"), &template)
        .expect("emitter should build");

    let response = emitter.send().await.expect("invoke should succeed");
    assert!(response.status().is_success());

    let body: InvokeResponse = response.json().await.expect("response should parse");
    assert!(body.success);
    assert_eq!(body.latency_ms, 0);
    assert_eq!(body.worklet_output, vec![0, 1, 2]);

    mock.stop().await.expect("mock should stop");
}

#[tokio::test]
async fn failed_invocations_are_not_classified() {
    init_tracing(None);
    let mock = start_mock(100).await;

    let template = RequestTemplate::default().with_url(mock.invoke_url());
    let emitter = RequestEmitter::new(http_client().expect("client should build"), &template)
        .expect("emitter should build");

    // the emitter only reports transport failures, so a failed invocation still counts as sent
    emitter.emit().await.expect("invoke should be sent");

    let body: InvokeResponse = emitter
        .send()
        .await
        .expect("invoke should be sent")
        .json()
        .await
        .expect("response should parse");
    assert!(!body.success);
    assert!(body.worklet_output.is_empty());
    assert!(
        [
            "There was a Network error while calling the model",
            "Model 1 is not deployed",
            "Model 1 does not exist",
        ]
        .contains(&body.error_log.as_str()),
        "unexpected error log: {}",
        body.error_log
    );

    assert_eq!(mock.stop().await.expect("mock should stop"), 2);
}

#[tokio::test]
async fn load_test_against_mock_issues_one_request_per_iteration() {
    init_tracing(None);
    let mock = start_mock(0).await;

    let template = RequestTemplate::default().with_url(mock.invoke_url());
    let emitter = RequestEmitter::new(http_client().expect("client should build"), &template)
        .expect("emitter should build");

    let policy = InvocationPolicy {
        rate: 20,
        duration: Duration::from_secs(1),
        graceful_stop: Duration::from_secs(10),
        ..Default::default()
    };

    let test = LoadTest::new(policy, emitter)
        .start()
        .expect("test should start")
        .wait()
        .await
        .expect("test should complete");

    let metrics = test.collect().expect("metrics should collect");
    let started = metrics.totals.iterations;
    assert_eq!(started + metrics.totals.dropped, 20);
    assert_eq!(metrics.totals.errors, 0);
    assert_eq!(metrics.totals.interrupted, 0);
    assert_eq!(mock.stop().await.expect("mock should stop"), started);
}
