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

use load_framework::{
    anyhow,
    mock::{MockConfig, MockServer},
};

use super::util::Color;
use crate::args::MockServerArgs;

/// Serves the worklet mock until Ctrl-C.
pub(crate) async fn run(args: &MockServerArgs) -> anyhow::Result<()> {
    let config = MockConfig {
        failure_percentage: args.failure_percentage,
        max_latency_ms: args.max_latency_ms,
    };

    let server = MockServer::start_with_shutdown(args.bind, config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;

    println!(
        "{}",
        Color::Blue.paint(format!(
            "Worklet mock listening on {}, press Ctrl-C to stop",
            server.invoke_url()
        ))
    );

    let count = server.wait().await?;
    tracing::info!("Worklet mock stopped after {count} invocations");
    Ok(())
}
