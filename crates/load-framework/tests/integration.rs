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

use std::net::SocketAddr;

use load_framework::mock::{MockConfig, MockServer};
use tracing_subscriber::EnvFilter;

mod emitter;
mod mock;

pub(crate) fn init_tracing(trace_config: Option<&str>) {
    let filter = match (trace_config, std::env::var("LOADOPERATOR_LOG").ok()) {
        (_, Some(log)) => EnvFilter::new(log),
        (Some(level), None) => EnvFilter::new(level),
        _ => EnvFilter::new("load_framework=DEBUG,integration=DEBUG,WARN"),
    };
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Starts a mock on an ephemeral port that never sleeps and never fails unless told to.
pub(crate) async fn start_mock(failure_percentage: u8) -> MockServer {
    let addr: SocketAddr = "127.0.0.1:0".parse().expect("address should parse");
    MockServer::start(
        addr,
        MockConfig {
            failure_percentage,
            max_latency_ms: 0,
        },
    )
    .await
    .expect("mock server should start")
}
