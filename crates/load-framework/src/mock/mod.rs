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

//! A local stand-in for the worklet invoke endpoint.
//!
//! The mock accepts the same request body as the real endpoint, waits a random amount of time and
//! fails a configurable share of invocations, so a load test can be exercised without the real service.

use std::{
    future::Future,
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use snafu::prelude::*;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};

use crate::emitter::InvokeRequest;

pub const DEFAULT_MOCK_ADDR: &str = "127.0.0.1:8001";
pub const DEFAULT_FAILURE_PERCENTAGE: u8 = 10;
pub const DEFAULT_MAX_LATENCY_MS: u64 = 100;

/// The mock reports `latency_ms`, but sleeps ten times as long.
const LATENCY_SLEEP_MULTIPLIER: u64 = 10;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Unable to bind the worklet mock server to {addr}: {source}"))]
    UnableToBind {
        source: std::io::Error,
        addr: SocketAddr,
    },

    #[snafu(display("The worklet mock server failed: {source}"))]
    ServerFailed { source: std::io::Error },

    #[snafu(display("The worklet mock server task failed: {source}"))]
    ServerTaskFailed { source: tokio::task::JoinError },

    #[snafu(display("Failure percentage must be between 0 and 100, got {value}"))]
    InvalidFailurePercentage { value: u8 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockConfig {
    /// Share of invocations, 0 to 100, answered with `success: false`.
    pub failure_percentage: u8,

    /// Exclusive upper bound of the reported `latency_ms`. 0 disables the delay.
    pub max_latency_ms: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            failure_percentage: DEFAULT_FAILURE_PERCENTAGE,
            max_latency_ms: DEFAULT_MAX_LATENCY_MS,
        }
    }
}

impl MockConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.failure_percentage <= 100,
            InvalidFailurePercentageSnafu {
                value: self.failure_percentage
            }
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeResponse {
    pub latency_ms: u64,
    pub success: bool,
    pub error_log: String,
    pub worklet_output: Vec<i64>,
}

struct MockState {
    config: MockConfig,
    invocations: AtomicUsize,
}

pub struct MockServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl MockServer {
    /// Binds `addr` and serves the mock in the background until [`MockServer::stop`] is called.
    pub async fn start(addr: SocketAddr, config: MockConfig) -> Result<Self> {
        let (shutdown, rx) = oneshot::channel::<()>();
        Self::start_with_shutdown(addr, config, async move {
            let _ = rx.await;
        })
        .await
        .map(|mut server| {
            server.shutdown = Some(shutdown);
            server
        })
    }

    /// Binds `addr` and serves the mock until `signal` resolves.
    pub async fn start_with_shutdown<F>(
        addr: SocketAddr,
        config: MockConfig,
        signal: F,
    ) -> Result<Self>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        config.validate()?;

        let listener = TcpListener::bind(addr)
            .await
            .context(UnableToBindSnafu { addr })?;
        let addr = listener.local_addr().context(UnableToBindSnafu { addr })?;

        let state = Arc::new(MockState {
            config,
            invocations: AtomicUsize::new(0),
        });

        let app = routes(Arc::clone(&state));
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(signal)
                .await
        });

        tracing::info!(
            "Worklet mock server listening on http://{addr} (failure percentage: {}%, max latency: {}ms)",
            config.failure_percentage,
            config.max_latency_ms
        );

        Ok(Self {
            addr,
            state,
            shutdown: None,
            handle,
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    #[must_use]
    pub fn invoke_url(&self) -> String {
        format!("http://{}/invoke", self.addr)
    }

    /// The number of `/invoke` requests received so far.
    #[must_use]
    pub fn invocation_count(&self) -> usize {
        self.state.invocations.load(Ordering::SeqCst)
    }

    /// Waits for the server to exit, which happens once its shutdown signal resolves.
    pub async fn wait(self) -> Result<usize> {
        let invocations = Arc::clone(&self.state);
        self.handle
            .await
            .context(ServerTaskFailedSnafu)?
            .context(ServerFailedSnafu)?;
        Ok(invocations.invocations.load(Ordering::SeqCst))
    }

    pub async fn stop(mut self) -> Result<usize> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.wait().await
    }
}

fn routes(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/invoke", post(invoke))
        .route("/healtz", get(health))
        .with_state(state)
}

async fn invoke(
    State(state): State<Arc<MockState>>,
    Json(request): Json<InvokeRequest>,
) -> Json<InvokeResponse> {
    state.invocations.fetch_add(1, Ordering::SeqCst);

    let latency_ms = random_below(state.config.max_latency_ms);
    if latency_ms > 0 {
        tokio::time::sleep(Duration::from_millis(latency_ms * LATENCY_SLEEP_MULTIPLIER)).await;
    }

    let model_id = &request.worklet_input.model_id;
    if percentage_bool(state.config.failure_percentage) {
        let error_log = match random_below(3) {
            0 => "There was a Network error while calling the model".to_string(),
            1 => format!("Model {model_id} is not deployed"),
            _ => format!("Model {model_id} does not exist"),
        };
        tracing::debug!("Mock invoke for model {model_id} failed: {error_log}");

        return Json(InvokeResponse {
            latency_ms,
            success: false,
            error_log,
            worklet_output: vec![],
        });
    }

    Json(InvokeResponse {
        latency_ms,
        success: true,
        error_log: String::new(),
        worklet_output: transform(&request.worklet_input.input),
    })
}

async fn health() -> Json<Value> {
    Json(json!({"status": "healthy", "service": "worklet-mock-server"}))
}

/// Scales every input by two thirds, truncating toward zero.
fn transform(input: &[i64]) -> Vec<i64> {
    input.iter().map(|x| x.saturating_mul(2) / 3).collect()
}

fn random_below(upper: u64) -> u64 {
    if upper == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..upper)
}

/// 100 always returns true, 0 always returns false.
fn percentage_bool(p: u8) -> bool {
    u64::from(p) > random_below(100)
}
