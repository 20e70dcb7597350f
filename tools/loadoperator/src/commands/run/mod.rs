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
    emitter::{http_client, RequestEmitter, RequestTemplate},
    executor::LoadTest,
    metrics::{IterationStatus, MetricCollector},
    policy::format_duration,
};

use super::util::{separator, Color};
use crate::args::RunArgs;

pub(crate) async fn run(args: &RunArgs) -> anyhow::Result<()> {
    let (url, policy) = args.scenario.resolve()?;
    let template = RequestTemplate::default()
        .with_url(url)
        .with_authorization(args.authorization.clone());
    let emitter = RequestEmitter::new(http_client()?, &template)?;

    println!(
        "{}",
        Color::Blue.paint(format!(
            "Running {} against {}: {} iterations per {} for {}",
            policy.name,
            template.url(),
            policy.rate,
            format_duration(policy.time_unit),
            format_duration(policy.duration)
        ))
    );

    let test = LoadTest::new(policy, emitter)
        .with_progress_bars(!args.disable_progress_bars)
        .start()?
        .wait()
        .await?;
    tracing::info!("{test}");

    let metrics = test.collect()?;

    println!("Iteration metrics:");
    metrics.show_records()?;
    println!("Latency histogram (seconds):");
    metrics.show_histogram()?;
    println!("{}", separator());
    println!("Run metrics:");
    metrics.show_run()?;

    let status = metrics.status();
    let summary = match status {
        IterationStatus::Passed => "Load test completed".to_string(),
        IterationStatus::Failed => format!(
            "Load test completed with {} failed and {} interrupted iterations",
            metrics.totals.errors, metrics.totals.interrupted
        ),
    };
    println!("{}", Color::from(status).paint(summary));

    Ok(())
}
