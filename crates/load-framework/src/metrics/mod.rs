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
    fmt::Display,
    sync::Arc,
    time::{Duration, SystemTime},
};

use anyhow::Result;
use arrow::{
    array::{ArrayRef, Float64Array, RecordBatch, StringArray, UInt64Array},
    datatypes::{DataType, Field, Schema, SchemaRef},
    util::pretty::print_batches,
};
use uuid::Uuid;

const FLOAT_ERROR_MARGIN: f64 = 0.0001;

/// Upper bounds, in seconds, of the latency histogram buckets. An implicit `+Inf` bucket follows.
pub const LATENCY_BUCKETS: [f64; 8] = [0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum IterationStatus {
    #[default]
    Passed,
    Failed,
}

impl Display for IterationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IterationStatus::Passed => write!(f, "Passed"),
            IterationStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Latency statistics, in seconds, for one named group of iterations.
#[derive(Debug, Clone)]
pub struct IterationMetric {
    pub name: String,
    pub status: IterationStatus,
    pub min_duration: f64,
    pub mean_duration: f64,
    pub median_duration: f64,
    pub percentile_90_duration: f64,
    pub percentile_95_duration: f64,
    pub percentile_99_duration: f64,
    pub max_duration: f64,
    /// Cumulative counts: `latency_buckets[i]` is the number of samples `<= LATENCY_BUCKETS[i]`.
    pub latency_buckets: Vec<usize>,
    pub count: usize,
}

impl IterationMetric {
    pub fn new_from_durations(name: &str, durations: &[Duration]) -> Result<Self> {
        if durations.is_empty() {
            return Ok(Self::new(name).failed());
        }

        let mut sorted = durations.to_vec();
        sorted.sort();

        let total: Duration = sorted.iter().sum();
        #[allow(clippy::cast_precision_loss)]
        let mean_duration = total.as_secs_f64() / sorted.len() as f64;

        Ok(Self {
            name: name.to_string(),
            status: IterationStatus::Passed,
            min_duration: sorted[0].as_secs_f64(),
            mean_duration,
            median_duration: sorted.median()?.as_secs_f64(),
            percentile_90_duration: sorted.percentile(90.0)?.as_secs_f64(),
            percentile_95_duration: sorted.percentile(95.0)?.as_secs_f64(),
            percentile_99_duration: sorted.percentile(99.0)?.as_secs_f64(),
            max_duration: sorted[sorted.len() - 1].as_secs_f64(),
            latency_buckets: cumulative_buckets(&sorted),
            count: sorted.len(),
        })
    }

    #[must_use]
    pub fn failed(mut self) -> Self {
        self.status = IterationStatus::Failed;
        self
    }

    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: IterationStatus::Passed,
            min_duration: 0.0,
            mean_duration: 0.0,
            median_duration: 0.0,
            percentile_90_duration: 0.0,
            percentile_95_duration: 0.0,
            percentile_99_duration: 0.0,
            max_duration: 0.0,
            latency_buckets: vec![0; LATENCY_BUCKETS.len()],
            count: 0,
        }
    }
}

fn cumulative_buckets(sorted: &[Duration]) -> Vec<usize> {
    LATENCY_BUCKETS
        .iter()
        .map(|le| sorted.partition_point(|d| d.as_secs_f64() <= *le))
        .collect()
}

pub trait StatisticsCollector<T> {
    fn percentile(&self, percentile: f64) -> Result<T>;
    fn median(&self) -> Result<T>;
}

impl StatisticsCollector<Duration> for [Duration] {
    fn percentile(&self, percentile: f64) -> Result<Duration> {
        if self.is_empty() {
            return Err(anyhow::anyhow!(
                "Cannot calculate a percentile without durations"
            ));
        }

        let mut sorted_durations = self.to_vec();
        sorted_durations.sort();

        // safety: sorted_durations.len() cannot be negative, and is unlikely to be larger than u32::MAX
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            let rank =
                (percentile / 100.0) * (f64::from(u32::try_from(sorted_durations.len() - 1)?));
            if (rank - rank.floor()).abs() < FLOAT_ERROR_MARGIN {
                Ok(sorted_durations[rank as usize])
            } else {
                let lower_duration = sorted_durations[rank.floor() as usize];
                let upper_duration = sorted_durations[rank.ceil() as usize];
                Ok((lower_duration + upper_duration) / 2)
            }
        }
    }

    fn median(&self) -> Result<Duration> {
        if self.is_empty() {
            return Err(anyhow::anyhow!("Cannot calculate a median without durations"));
        }

        let mut sorted_durations = self.to_vec();
        sorted_durations.sort();

        let half = sorted_durations.len() / 2;
        if sorted_durations.len() % 2 == 0 {
            Ok((sorted_durations[half - 1] + sorted_durations[half]) / 2)
        } else {
            Ok(sorted_durations[half])
        }
    }
}

/// Totals for a single run, independent of latency.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunTotals {
    /// Iterations that were handed a worker and started.
    pub iterations: usize,
    /// Started iterations whose invocation returned an error.
    pub errors: usize,
    /// Iteration slots skipped because every worker was busy.
    pub dropped: usize,
    /// Iterations still running when the graceful stop window closed.
    pub interrupted: usize,
    pub vus_allocated: usize,
    /// Started iterations per second of wall time.
    pub achieved_rate: f64,
    /// Percentage of started iterations that completed without error.
    pub success_rate: f64,
}

/// A collection of metrics for a single test run.
pub struct RunMetrics {
    pub run_id: Uuid,
    pub run_name: String,
    pub executor: String,
    pub started_at: usize,
    pub finished_at: usize,
    pub metrics: Vec<IterationMetric>,
    pub totals: RunTotals,
}

// Macro to help extract values from metric vecs
macro_rules! extract_metric_values {
    // no clone or to_string, direct copy
    ($metrics:expr, $field:ident) => {
        $metrics
            .iter()
            .map(|metric| metric.$field)
            .collect::<Vec<_>>()
    };

    // clone
    ($metrics:expr, $field:ident, clone) => {
        $metrics
            .iter()
            .map(|metric| metric.$field.clone())
            .collect::<Vec<_>>()
    };

    // to_string
    ($metrics:expr, $field:ident, to_string) => {
        $metrics
            .iter()
            .map(|metric| metric.$field.to_string())
            .collect::<Vec<_>>()
    };

    // as u64
    ($metrics:expr, $field:ident, as_u64) => {
        $metrics
            .iter()
            .map(|metric| metric.$field as u64)
            .collect::<Vec<_>>()
    };
}

impl RunMetrics {
    #[must_use]
    pub fn run_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("run_id", DataType::Utf8, false),
            Field::new("run_name", DataType::Utf8, false),
            Field::new("executor", DataType::Utf8, false),
            Field::new("started_at", DataType::UInt64, false),
            Field::new("finished_at", DataType::UInt64, false),
            Field::new("status", DataType::Utf8, false),
            Field::new("iterations", DataType::UInt64, false),
            Field::new("errors", DataType::UInt64, false),
            Field::new("dropped_iterations", DataType::UInt64, false),
            Field::new("interrupted_iterations", DataType::UInt64, false),
            Field::new("vus_allocated", DataType::UInt64, false),
            Field::new("achieved_rate", DataType::Float64, false),
            Field::new("success_rate", DataType::Float64, false),
        ]))
    }

    /// Records do not need the values from the main run, because they contain a reference to the run ID to retrieve them
    #[must_use]
    pub fn records_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("run_id", DataType::Utf8, false),
            Field::new("name", DataType::Utf8, false),
            Field::new("status", DataType::Utf8, false),
            Field::new("min_duration", DataType::Float64, false),
            Field::new("mean_duration", DataType::Float64, false),
            Field::new("median_duration", DataType::Float64, false),
            Field::new("percentile_90_duration", DataType::Float64, false),
            Field::new("percentile_95_duration", DataType::Float64, false),
            Field::new("percentile_99_duration", DataType::Float64, false),
            Field::new("max_duration", DataType::Float64, false),
            Field::new("count", DataType::UInt64, false),
        ]))
    }

    /// The run passes when every metric has samples and no invocation errored.
    #[must_use]
    pub fn status(&self) -> IterationStatus {
        if self
            .metrics
            .iter()
            .all(|m| m.status == IterationStatus::Passed)
            && self.totals.errors == 0
        {
            IterationStatus::Passed
        } else {
            IterationStatus::Failed
        }
    }

    pub fn build_records(&self) -> Result<Vec<RecordBatch>> {
        let run_id = vec![self.run_id.to_string(); self.metrics.len()];

        let name = extract_metric_values!(self.metrics, name, clone);
        let status = extract_metric_values!(self.metrics, status, to_string);
        let min_duration = extract_metric_values!(self.metrics, min_duration);
        let mean_duration = extract_metric_values!(self.metrics, mean_duration);
        let median_duration = extract_metric_values!(self.metrics, median_duration);
        let percentile_90_duration = extract_metric_values!(self.metrics, percentile_90_duration);
        let percentile_95_duration = extract_metric_values!(self.metrics, percentile_95_duration);
        let percentile_99_duration = extract_metric_values!(self.metrics, percentile_99_duration);
        let max_duration = extract_metric_values!(self.metrics, max_duration);
        let count = extract_metric_values!(self.metrics, count, as_u64);

        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(run_id)),
            Arc::new(StringArray::from(name)),
            Arc::new(StringArray::from(status)),
            Arc::new(Float64Array::from(min_duration)),
            Arc::new(Float64Array::from(mean_duration)),
            Arc::new(Float64Array::from(median_duration)),
            Arc::new(Float64Array::from(percentile_90_duration)),
            Arc::new(Float64Array::from(percentile_95_duration)),
            Arc::new(Float64Array::from(percentile_99_duration)),
            Arc::new(Float64Array::from(max_duration)),
            Arc::new(UInt64Array::from(count)),
        ];

        Ok(vec![RecordBatch::try_new(Self::records_schema(), columns)?])
    }

    /// A single row, representing the run as a whole
    pub fn build_run(&self) -> Result<Vec<RecordBatch>> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(vec![self.run_id.to_string()])),
            Arc::new(StringArray::from(vec![self.run_name.clone()])),
            Arc::new(StringArray::from(vec![self.executor.clone()])),
            Arc::new(UInt64Array::from(vec![self.started_at as u64])),
            Arc::new(UInt64Array::from(vec![self.finished_at as u64])),
            Arc::new(StringArray::from(vec![self.status().to_string()])),
            Arc::new(UInt64Array::from(vec![self.totals.iterations as u64])),
            Arc::new(UInt64Array::from(vec![self.totals.errors as u64])),
            Arc::new(UInt64Array::from(vec![self.totals.dropped as u64])),
            Arc::new(UInt64Array::from(vec![self.totals.interrupted as u64])),
            Arc::new(UInt64Array::from(vec![self.totals.vus_allocated as u64])),
            Arc::new(Float64Array::from(vec![self.totals.achieved_rate])),
            Arc::new(Float64Array::from(vec![self.totals.success_rate])),
        ];

        Ok(vec![RecordBatch::try_new(Self::run_schema(), columns)?])
    }

    #[must_use]
    pub fn histogram_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("run_id", DataType::Utf8, false),
            Field::new("name", DataType::Utf8, false),
            Field::new("le", DataType::Utf8, false),
            Field::new("count", DataType::UInt64, false),
        ]))
    }

    /// One row per metric and latency bucket, ending with the `+Inf` bucket.
    pub fn build_histogram(&self) -> Result<Vec<RecordBatch>> {
        let mut name = Vec::new();
        let mut le = Vec::new();
        let mut count = Vec::new();

        for metric in &self.metrics {
            let buckets = LATENCY_BUCKETS
                .iter()
                .map(ToString::to_string)
                .chain(std::iter::once("+Inf".to_string()));
            let counts = metric
                .latency_buckets
                .iter()
                .copied()
                .chain(std::iter::once(metric.count));

            for (bound, bucket_count) in buckets.zip(counts) {
                name.push(metric.name.clone());
                le.push(bound);
                count.push(bucket_count as u64);
            }
        }

        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(vec![self.run_id.to_string(); name.len()])),
            Arc::new(StringArray::from(name)),
            Arc::new(StringArray::from(le)),
            Arc::new(UInt64Array::from(count)),
        ];

        Ok(vec![RecordBatch::try_new(Self::histogram_schema(), columns)?])
    }

    pub fn show_histogram(&self) -> Result<()> {
        print_batches(&self.build_histogram()?)?;

        Ok(())
    }

    pub fn show_records(&self) -> Result<()> {
        print_batches(&self.build_records()?)?;

        Ok(())
    }

    pub fn show_run(&self) -> Result<()> {
        print_batches(&self.build_run()?)?;

        Ok(())
    }
}

pub trait MetricCollector {
    fn start_time(&self) -> SystemTime;
    fn end_time(&self) -> SystemTime;
    fn name(&self) -> String;
    fn executor(&self) -> String;
    fn metrics(&self) -> Result<Vec<IterationMetric>>;
    fn totals(&self) -> RunTotals;
    fn collect(&self) -> Result<RunMetrics> {
        Ok(RunMetrics {
            run_id: uuid::Uuid::new_v4(),
            run_name: self.name(),
            executor: self.executor(),
            started_at: usize::try_from(
                self.start_time()
                    .duration_since(SystemTime::UNIX_EPOCH)?
                    .as_secs(),
            )?,
            finished_at: usize::try_from(
                self.end_time()
                    .duration_since(SystemTime::UNIX_EPOCH)?
                    .as_secs(),
            )?,
            metrics: self.metrics()?,
            totals: self.totals(),
        })
    }
}
