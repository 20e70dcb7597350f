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

use std::{
    collections::BTreeMap,
    fmt::Display,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::emitter::DEFAULT_INVOKE_URL;

pub const DEFAULT_SCENARIO_NAME: &str = "constant_request_rate";
pub const DEFAULT_RATE: u32 = 10;
pub const DEFAULT_TIME_UNIT: Duration = Duration::from_secs(1);
pub const DEFAULT_DURATION: Duration = Duration::from_secs(30);
pub const DEFAULT_PRE_ALLOCATED_VUS: usize = 2;
pub const DEFAULT_MAX_VUS: usize = 10;
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Unable to read scenario file {}: {source}", path.display()))]
    UnableToReadScenarioFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("Unable to parse scenario file {}: {source}", path.display()))]
    UnableToParseScenarioFile {
        source: serde_yaml::Error,
        path: PathBuf,
    },

    #[snafu(display("Unable to serialize scenario file: {source}"))]
    UnableToSerializeScenarioFile { source: serde_yaml::Error },

    #[snafu(display(r#"Invalid duration "{value}" for "{field}": {reason}"#))]
    InvalidDuration {
        field: String,
        value: String,
        reason: String,
    },

    #[snafu(display("Scenario '{name}' was not found. Available scenarios: {available}"))]
    ScenarioNotFound { name: String, available: String },

    #[snafu(display("The scenario file does not define any scenarios."))]
    NoScenarios,

    #[snafu(display("Invalid invocation policy for scenario '{name}': {reason}"))]
    InvalidPolicy { name: String, reason: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutorKind {
    /// Start iterations at a fixed rate, regardless of how long each iteration takes.
    #[default]
    ConstantArrivalRate,
}

impl Display for ExecutorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorKind::ConstantArrivalRate => write!(f, "constant-arrival-rate"),
        }
    }
}

/// Describes how often, and for how long, the request emitter is invoked.
///
/// The policy is read once when a test starts and never changes while it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationPolicy {
    pub name: String,
    pub executor: ExecutorKind,

    /// The number of iterations to start every `time_unit`.
    pub rate: u32,
    pub time_unit: Duration,

    /// How long new iterations keep being started.
    pub duration: Duration,

    /// Workers available as soon as the test starts.
    pub pre_allocated_vus: usize,

    /// Upper bound on workers. Once reached, iterations that find no idle worker are dropped.
    pub max_vus: usize,

    /// How long in-flight iterations may keep running after `duration` has elapsed.
    pub graceful_stop: Duration,
}

impl Default for InvocationPolicy {
    fn default() -> Self {
        Self {
            name: DEFAULT_SCENARIO_NAME.to_string(),
            executor: ExecutorKind::ConstantArrivalRate,
            rate: DEFAULT_RATE,
            time_unit: DEFAULT_TIME_UNIT,
            duration: DEFAULT_DURATION,
            pre_allocated_vus: DEFAULT_PRE_ALLOCATED_VUS,
            max_vus: DEFAULT_MAX_VUS,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
        }
    }
}

impl InvocationPolicy {
    pub fn validate(&self) -> Result<()> {
        let reason = if self.rate == 0 {
            Some("rate must be greater than 0".to_string())
        } else if self.time_unit.is_zero() {
            Some("time unit must be greater than 0".to_string())
        } else if self.duration.is_zero() {
            Some("duration must be greater than 0".to_string())
        } else if self.max_vus == 0 {
            Some("max VUs must be greater than 0".to_string())
        } else if self.pre_allocated_vus > self.max_vus {
            Some(format!(
                "pre-allocated VUs ({}) cannot exceed max VUs ({})",
                self.pre_allocated_vus, self.max_vus
            ))
        } else {
            None
        };

        match reason {
            Some(reason) => InvalidPolicySnafu {
                name: self.name.clone(),
                reason,
            }
            .fail(),
            None => Ok(()),
        }
    }

    /// The number of iteration start slots within the test duration.
    ///
    /// Slot `k` starts at `k * time_unit / rate`; every slot strictly before `duration` counts.
    #[must_use]
    pub fn iteration_slots(&self) -> u64 {
        let time_unit = self.time_unit.as_nanos();
        if time_unit == 0 {
            return 0;
        }

        let scaled = self.duration.as_nanos() * u128::from(self.rate);
        u64::try_from(scaled.div_ceil(time_unit)).unwrap_or(u64::MAX)
    }

    /// The offset from the start of the test at which the iteration in slot `slot` starts.
    ///
    /// Computed from the slot index directly, so rounding never accumulates across slots.
    #[must_use]
    pub fn iteration_offset(&self, slot: u64) -> Duration {
        if self.rate == 0 {
            return Duration::ZERO;
        }

        let nanos = self.time_unit.as_nanos() * u128::from(slot) / u128::from(self.rate);
        duration_from_nanos(nanos)
    }

    /// The rate of iterations per second implied by the policy.
    #[must_use]
    pub fn rate_per_second(&self) -> f64 {
        if self.time_unit.is_zero() {
            return 0.0;
        }
        f64::from(self.rate) / self.time_unit.as_secs_f64()
    }
}

fn duration_from_nanos(nanos: u128) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;
    let secs = u64::try_from(nanos / NANOS_PER_SEC).unwrap_or(u64::MAX);
    // safety: the remainder is always below 1_000_000_000
    #[allow(clippy::cast_possible_truncation)]
    let subsec = (nanos % NANOS_PER_SEC) as u32;
    Duration::new(secs, subsec)
}

/// The YAML form of a single scenario. Durations are human readable, e.g. `1s` or `500ms`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub executor: ExecutorKind,

    pub rate: u32,

    #[serde(default = "default_time_unit", alias = "timeUnit")]
    pub time_unit: String,

    pub duration: String,

    #[serde(default = "default_pre_allocated_vus", alias = "preAllocatedVUs")]
    pub pre_allocated_vus: usize,

    #[serde(default = "default_max_vus", alias = "maxVUs")]
    pub max_vus: usize,

    #[serde(default = "default_graceful_stop", alias = "gracefulStop")]
    pub graceful_stop: String,
}

fn default_time_unit() -> String {
    format_duration(DEFAULT_TIME_UNIT)
}

const fn default_pre_allocated_vus() -> usize {
    DEFAULT_PRE_ALLOCATED_VUS
}

const fn default_max_vus() -> usize {
    DEFAULT_MAX_VUS
}

fn default_graceful_stop() -> String {
    format_duration(DEFAULT_GRACEFUL_STOP)
}

impl ScenarioConfig {
    pub fn to_policy(&self, name: &str) -> Result<InvocationPolicy> {
        let policy = InvocationPolicy {
            name: name.to_string(),
            executor: self.executor,
            rate: self.rate,
            time_unit: parse_duration("time_unit", &self.time_unit)?,
            duration: parse_duration("duration", &self.duration)?,
            pre_allocated_vus: self.pre_allocated_vus,
            max_vus: self.max_vus,
            graceful_stop: parse_duration("graceful_stop", &self.graceful_stop)?,
        };
        policy.validate()?;
        Ok(policy)
    }
}

impl From<&InvocationPolicy> for ScenarioConfig {
    fn from(policy: &InvocationPolicy) -> Self {
        Self {
            executor: policy.executor,
            rate: policy.rate,
            time_unit: format_duration(policy.time_unit),
            duration: format_duration(policy.duration),
            pre_allocated_vus: policy.pre_allocated_vus,
            max_vus: policy.max_vus,
            graceful_stop: format_duration(policy.graceful_stop),
        }
    }
}

/// A scenario file: the target URL and one or more named scenarios.
///
/// ```yaml
/// url: http://localhost:8000/invoke
/// scenarios:
///   constant_request_rate:
///     executor: constant-arrival-rate
///     rate: 10
///     time_unit: 1s
///     duration: 30s
///     pre_allocated_vus: 2
///     max_vus: 10
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default)]
    pub scenarios: BTreeMap<String, ScenarioConfig>,
}

fn default_url() -> String {
    DEFAULT_INVOKE_URL.to_string()
}

impl Default for ScenarioFile {
    fn default() -> Self {
        Self::from_policy(DEFAULT_INVOKE_URL, &InvocationPolicy::default())
    }
}

impl ScenarioFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).context(UnableToReadScenarioFileSnafu {
            path: path.to_path_buf(),
        })?;
        let file: ScenarioFile =
            serde_yaml::from_str(&contents).context(UnableToParseScenarioFileSnafu {
                path: path.to_path_buf(),
            })?;

        tracing::debug!(
            "Loaded {} scenario(s) from {}",
            file.scenarios.len(),
            path.display()
        );
        Ok(file)
    }

    #[must_use]
    pub fn from_policy(url: impl Into<String>, policy: &InvocationPolicy) -> Self {
        let mut scenarios = BTreeMap::new();
        scenarios.insert(policy.name.clone(), ScenarioConfig::from(policy));
        Self {
            url: url.into(),
            scenarios,
        }
    }

    /// Resolve a scenario by name, or the first scenario (by name) if none is requested.
    pub fn policy(&self, name: Option<&str>) -> Result<InvocationPolicy> {
        match name {
            Some(name) => {
                let Some(config) = self.scenarios.get(name) else {
                    return ScenarioNotFoundSnafu {
                        name: name.to_string(),
                        available: self
                            .scenarios
                            .keys()
                            .cloned()
                            .collect::<Vec<_>>()
                            .join(", "),
                    }
                    .fail();
                };
                config.to_policy(name)
            }
            None => {
                let Some((name, config)) = self.scenarios.iter().next() else {
                    return NoScenariosSnafu.fail();
                };
                config.to_policy(name)
            }
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context(UnableToSerializeScenarioFileSnafu)
    }
}

pub fn parse_duration(field: &str, value: &str) -> Result<Duration> {
    fundu::parse_duration(value).map_err(|e| Error::InvalidDuration {
        field: field.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Formats a duration in the shortest unit that represents it exactly.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        format!("{}s", duration.as_secs())
    } else if duration.subsec_nanos() % 1_000_000 == 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{}ns", duration.as_nanos())
    }
}
