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

use clap::{Parser, Subcommand};
use load_framework::{
    emitter::DEFAULT_INVOKE_URL,
    mock::{DEFAULT_FAILURE_PERCENTAGE, DEFAULT_MAX_LATENCY_MS, DEFAULT_MOCK_ADDR},
};

mod scenario;
pub use scenario::ScenarioArgs;

#[derive(Subcommand)]
pub enum Commands {
    /// Run a load test against the invoke endpoint
    Run(RunArgs),
    /// Send a single invoke request and print the response
    Invoke(InvokeArgs),
    /// Serve a local worklet mock of the invoke endpoint
    MockServer(MockServerArgs),
    /// Print the scenario file that `run` would execute with the same arguments
    Export(ScenarioArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub(crate) scenario: ScenarioArgs,

    /// Optional value for the `authorization` header, e.g. `Api-Key <key>`
    #[arg(long, env = "LOADOPERATOR_AUTHORIZATION")]
    pub(crate) authorization: Option<String>,

    /// Whether to disable progress bars, for CI or non-interactive environments
    #[arg(long)]
    pub(crate) disable_progress_bars: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct InvokeArgs {
    /// The URL to POST the invoke request to
    #[arg(long, env = "LOADOPERATOR_URL", default_value = DEFAULT_INVOKE_URL)]
    pub(crate) url: String,

    /// Optional value for the `authorization` header, e.g. `Api-Key <key>`
    #[arg(long, env = "LOADOPERATOR_AUTHORIZATION")]
    pub(crate) authorization: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct MockServerArgs {
    /// The address to listen on
    #[arg(long, default_value = DEFAULT_MOCK_ADDR)]
    pub(crate) bind: SocketAddr,

    /// The percentage of invocations, 0 to 100, that respond with `success: false`
    #[arg(long, default_value_t = DEFAULT_FAILURE_PERCENTAGE, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub(crate) failure_percentage: u8,

    /// The exclusive upper bound of the reported latency. The mock sleeps ten times the reported latency.
    #[arg(long, default_value_t = DEFAULT_MAX_LATENCY_MS)]
    pub(crate) max_latency_ms: u64,
}
