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

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use load_framework::{
    anyhow,
    emitter::DEFAULT_INVOKE_URL,
    policy::{
        parse_duration, ExecutorKind, InvocationPolicy, ScenarioFile, DEFAULT_MAX_VUS,
        DEFAULT_PRE_ALLOCATED_VUS, DEFAULT_RATE, DEFAULT_SCENARIO_NAME,
    },
};

/// Arguments describing the target and the invocation policy of a load test.
#[derive(Parser, Debug, Clone)]
pub struct ScenarioArgs {
    /// The URL to POST the invoke request to
    #[arg(long, env = "LOADOPERATOR_URL", default_value = DEFAULT_INVOKE_URL)]
    pub(crate) url: String,

    /// Path to a YAML scenario file. When set, the URL and policy come from the file instead of the flags below.
    #[arg(short('f'), long)]
    pub(crate) scenario_file: Option<PathBuf>,

    /// The scenario to run from the scenario file. Defaults to the first scenario by name.
    #[arg(long, requires = "scenario_file")]
    pub(crate) scenario: Option<String>,

    /// The number of iterations to start every time unit
    #[arg(long, default_value_t = DEFAULT_RATE)]
    pub(crate) rate: u32,

    /// The period over which `rate` iterations are started, e.g. `1s` or `500ms`
    #[arg(long, default_value = "1s", value_parser = duration_arg)]
    pub(crate) time_unit: Duration,

    /// How long to keep starting new iterations, e.g. `30s` or `5m`
    #[arg(long, default_value = "30s", value_parser = duration_arg)]
    pub(crate) duration: Duration,

    /// The number of VUs available when the test starts
    #[arg(long, default_value_t = DEFAULT_PRE_ALLOCATED_VUS)]
    pub(crate) pre_allocated_vus: usize,

    /// The maximum number of VUs. Iterations that find every VU busy at this limit are dropped.
    #[arg(long, default_value_t = DEFAULT_MAX_VUS)]
    pub(crate) max_vus: usize,

    /// How long in-flight iterations may run after the test duration before being interrupted
    #[arg(long, default_value = "30s", value_parser = duration_arg)]
    pub(crate) graceful_stop: Duration,
}

fn duration_arg(value: &str) -> Result<Duration, String> {
    parse_duration("duration", value).map_err(|e| e.to_string())
}

impl ScenarioArgs {
    /// Resolves the target URL and the policy to run.
    pub(crate) fn resolve(&self) -> anyhow::Result<(String, InvocationPolicy)> {
        if let Some(path) = &self.scenario_file {
            let file = ScenarioFile::load(path)?;
            let policy = file.policy(self.scenario.as_deref())?;
            return Ok((file.url, policy));
        }

        let policy = InvocationPolicy {
            name: DEFAULT_SCENARIO_NAME.to_string(),
            executor: ExecutorKind::ConstantArrivalRate,
            rate: self.rate,
            time_unit: self.time_unit,
            duration: self.duration,
            pre_allocated_vus: self.pre_allocated_vus,
            max_vus: self.max_vus,
            graceful_stop: self.graceful_stop,
        };
        policy.validate()?;

        Ok((self.url.clone(), policy))
    }
}
