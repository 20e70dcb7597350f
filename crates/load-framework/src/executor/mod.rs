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
    sync::Arc,
    time::{Duration, SystemTime},
};

use anyhow::Result;
use indicatif::ProgressBar;
use scheduler::{ArrivalScheduler, ScheduleOutcome};
use tokio::{
    task::{JoinError, JoinHandle},
    time::Instant,
};

use crate::{
    emitter::Emit,
    metrics::{IterationMetric, MetricCollector, RunTotals},
    policy::InvocationPolicy,
};

mod scheduler;

pub struct NotStarted<E: Emit + 'static> {
    emitter: Arc<E>,
}

pub struct Running {
    start_time: Instant,
    scheduler: JoinHandle<ScheduleOutcome>,
    progress_bar: Option<ProgressBar>,
}

pub struct Completed {
    result: LoadResult,
    test_duration: Duration,
    end_time: SystemTime,
}

#[derive(Debug, Default)]
pub struct LoadResult {
    /// The duration of each iteration that completed without error.
    pub durations: Vec<Duration>,
    pub error_count: usize,
    pub dropped: usize,
    pub interrupted: usize,
    pub vus_allocated: usize,
}

impl LoadResult {
    #[must_use]
    pub fn iterations_started(&self) -> usize {
        self.durations.len() + self.error_count + self.interrupted
    }

    pub(crate) fn record(&mut self, name: &str, joined: Result<Result<Duration>, JoinError>) {
        match joined {
            Ok(Ok(duration)) => self.durations.push(duration),
            Ok(Err(e)) => {
                tracing::debug!("Scenario {name} - iteration failed: {e}");
                self.error_count += 1;
            }
            Err(e) => {
                tracing::warn!("Scenario {name} - iteration panicked: {e}");
                self.error_count += 1;
            }
        }
    }
}

pub trait TestState {}

impl<E: Emit + 'static> TestState for NotStarted<E> {}
impl TestState for Running {}
impl TestState for Completed {}

/// A load test drives an emitter according to an [`InvocationPolicy`].
///
/// The test moves through `NotStarted` -> `Running` -> `Completed`; each transition consumes the previous state.
pub struct LoadTest<S: TestState> {
    name: String,
    policy: InvocationPolicy,
    start_time: SystemTime,
    use_progress_bars: bool,

    state: S,
}

impl<E: Emit + 'static> LoadTest<NotStarted<E>> {
    #[must_use]
    pub fn new(policy: InvocationPolicy, emitter: E) -> Self {
        Self {
            name: policy.name.clone(),
            policy,
            start_time: SystemTime::now(),
            use_progress_bars: false,
            state: NotStarted {
                emitter: Arc::new(emitter),
            },
        }
    }

    #[must_use]
    pub fn with_progress_bars(mut self, use_progress_bars: bool) -> Self {
        self.use_progress_bars = use_progress_bars;
        self
    }

    fn get_new_progress_bar(&self) -> ProgressBar {
        let pb = ProgressBar::new(self.policy.duration.as_secs());
        pb.enable_steady_tick(Duration::from_secs(1));
        pb
    }

    pub fn start(self) -> Result<LoadTest<Running>> {
        self.policy.validate()?;

        tracing::info!(
            "Starting scenario {}: {} iterations per {:?} for {:?} ({} pre-allocated VUs, {} max VUs)",
            self.name,
            self.policy.rate,
            self.policy.time_unit,
            self.policy.duration,
            self.policy.pre_allocated_vus,
            self.policy.max_vus
        );

        let progress_bar = self
            .use_progress_bars
            .then(|| self.get_new_progress_bar());

        let start_time = Instant::now();
        let scheduler = ArrivalScheduler::new(self.policy.clone(), self.state.emitter);
        let scheduler = match &progress_bar {
            Some(pb) => scheduler.with_progress_bar(pb.clone()),
            None => scheduler,
        };

        Ok(LoadTest {
            name: self.name,
            policy: self.policy,
            start_time: SystemTime::now(),
            use_progress_bars: self.use_progress_bars,
            state: Running {
                start_time,
                scheduler: scheduler.start(start_time),
                progress_bar,
            },
        })
    }
}

impl LoadTest<Running> {
    /// Waits for the scheduler to finish, then gives in-flight iterations until `graceful_stop`
    /// past the end of the test duration. Iterations still running after that are aborted.
    pub async fn wait(self) -> Result<LoadTest<Completed>> {
        let ScheduleOutcome {
            mut in_flight,
            mut result,
        } = self.state.scheduler.await?;

        if let Some(pb) = &self.state.progress_bar {
            pb.finish_and_clear();
        }

        let deadline = self.state.start_time + self.policy.duration + self.policy.graceful_stop;
        loop {
            match tokio::time::timeout_at(deadline, in_flight.join_next()).await {
                Ok(Some(joined)) => result.record(&self.name, joined),
                Ok(None) => break,
                Err(_) => {
                    result.interrupted = in_flight.len();
                    in_flight.abort_all();
                    break;
                }
            }
        }

        if result.interrupted > 0 {
            tracing::warn!(
                "Scenario {} - {} iteration(s) did not finish within the graceful stop of {:?}",
                self.name,
                result.interrupted,
                self.policy.graceful_stop
            );
        }

        if result.dropped > 0 {
            tracing::warn!(
                "Scenario {} - dropped {} iteration(s); consider raising max VUs above {}",
                self.name,
                result.dropped,
                self.policy.max_vus
            );
        }

        Ok(LoadTest {
            name: self.name,
            policy: self.policy,
            start_time: self.start_time,
            use_progress_bars: self.use_progress_bars,
            state: Completed {
                result,
                test_duration: self.state.start_time.elapsed(),
                end_time: SystemTime::now(),
            },
        })
    }
}

impl LoadTest<Completed> {
    #[must_use]
    pub fn result(&self) -> &LoadResult {
        &self.state.result
    }

    #[must_use]
    pub fn policy(&self) -> &InvocationPolicy {
        &self.policy
    }

    #[must_use]
    pub fn get_test_duration(&self) -> Duration {
        self.state.test_duration
    }

    /// Started iterations per second over the whole test, including the graceful stop.
    #[must_use]
    pub fn achieved_rate(&self) -> f64 {
        let secs = self.state.test_duration.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }

        #[allow(clippy::cast_precision_loss)]
        let started = self.state.result.iterations_started() as f64;
        started / secs
    }

    /// Percentage of started iterations that completed without error.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let started = self.state.result.iterations_started();
        if started == 0 {
            return 0.0;
        }

        #[allow(clippy::cast_precision_loss)]
        let succeeded = self.state.result.durations.len() as f64;
        #[allow(clippy::cast_precision_loss)]
        let started = started as f64;
        succeeded / started * 100.0
    }
}

impl std::fmt::Display for LoadTest<Completed> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "LoadTest: {} - {} iterations ({} failed, {} dropped, {} interrupted) in {} seconds",
            self.name,
            self.state.result.iterations_started(),
            self.state.result.error_count,
            self.state.result.dropped,
            self.state.result.interrupted,
            self.get_test_duration().as_secs_f32()
        )
    }
}

impl MetricCollector for LoadTest<Completed> {
    fn start_time(&self) -> SystemTime {
        self.start_time
    }

    fn end_time(&self) -> SystemTime {
        self.state.end_time
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn executor(&self) -> String {
        self.policy.executor.to_string()
    }

    fn metrics(&self) -> Result<Vec<IterationMetric>> {
        Ok(vec![IterationMetric::new_from_durations(
            "invoke",
            &self.state.result.durations,
        )?])
    }

    fn totals(&self) -> RunTotals {
        RunTotals {
            iterations: self.state.result.iterations_started(),
            errors: self.state.result.error_count,
            dropped: self.state.result.dropped,
            interrupted: self.state.result.interrupted,
            vus_allocated: self.state.result.vus_allocated,
            achieved_rate: self.achieved_rate(),
            success_rate: self.success_rate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::anyhow;
    use async_trait::async_trait;

    use super::*;

    /// Counts invocations, taking `latency` of (virtual) time per call.
    struct CountingEmitter {
        calls: Arc<AtomicUsize>,
        latency: Duration,
        fail: bool,
    }

    impl CountingEmitter {
        fn new(latency: Duration) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    calls: Arc::clone(&calls),
                    latency,
                    fail: false,
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl Emit for CountingEmitter {
        async fn emit(&self) -> Result<Duration> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            if self.fail {
                return Err(anyhow!("connection refused"));
            }
            Ok(self.latency)
        }
    }

    fn policy(
        rate: u32,
        duration: Duration,
        pre_allocated_vus: usize,
        max_vus: usize,
    ) -> InvocationPolicy {
        InvocationPolicy {
            rate,
            duration,
            pre_allocated_vus,
            max_vus,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_policy_starts_300_iterations() {
        let (emitter, calls) = CountingEmitter::new(Duration::from_millis(50));
        let test = LoadTest::new(InvocationPolicy::default(), emitter)
            .start()
            .expect("test should start")
            .wait()
            .await
            .expect("test should complete");

        assert_eq!(calls.load(Ordering::SeqCst), 300);
        assert_eq!(test.result().durations.len(), 300);
        assert_eq!(test.result().dropped, 0);
        assert_eq!(test.result().interrupted, 0);
        assert_eq!(test.result().error_count, 0);
        // a 50ms iteration every 100ms never needs more than the pre-allocated VUs
        assert_eq!(test.result().vus_allocated, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_iterations_allocate_vus_up_to_max_then_drop() {
        let (emitter, calls) = CountingEmitter::new(Duration::from_secs(10));
        let test = LoadTest::new(policy(10, Duration::from_secs(1), 1, 3), emitter)
            .start()
            .expect("test should start")
            .wait()
            .await
            .expect("test should complete");

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(test.result().vus_allocated, 3);
        assert_eq!(test.result().durations.len(), 3);
        assert_eq!(test.result().dropped, 7);
        assert_eq!(test.result().iterations_started(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_iterations_past_graceful_stop_are_interrupted() {
        let (emitter, calls) = CountingEmitter::new(Duration::from_secs(120));
        let policy = InvocationPolicy {
            graceful_stop: Duration::from_secs(1),
            ..policy(2, Duration::from_secs(1), 2, 2)
        };
        let test = LoadTest::new(policy, emitter)
            .start()
            .expect("test should start")
            .wait()
            .await
            .expect("test should complete");

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(test.result().interrupted, 2);
        assert!(test.result().durations.is_empty());

        let metrics = test.collect().expect("metrics should collect");
        assert_eq!(metrics.totals.interrupted, 2);
        assert!(metrics.totals.success_rate.abs() < f64::EPSILON);
        assert_eq!(
            metrics.metrics[0].status,
            crate::metrics::IterationStatus::Failed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_graceful_stop_starts_when_duration_ends() {
        // one slot at t=0, so the scheduler is done long before the 30s duration elapses
        let sparse = InvocationPolicy {
            time_unit: Duration::from_secs(60),
            graceful_stop: Duration::from_secs(30),
            ..policy(1, Duration::from_secs(30), 1, 1)
        };

        let (emitter, _) = CountingEmitter::new(Duration::from_secs(45));
        let test = LoadTest::new(sparse.clone(), emitter)
            .start()
            .expect("test should start")
            .wait()
            .await
            .expect("test should complete");
        assert_eq!(test.result().durations, vec![Duration::from_secs(45)]);
        assert_eq!(test.result().interrupted, 0);

        let (emitter, _) = CountingEmitter::new(Duration::from_secs(75));
        let test = LoadTest::new(sparse, emitter)
            .start()
            .expect("test should start")
            .wait()
            .await
            .expect("test should complete");
        assert!(test.result().durations.is_empty());
        assert_eq!(test.result().interrupted, 1);
        assert!(test.get_test_duration() >= Duration::from_secs(60));
        assert!(test.get_test_duration() < Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_iterations_are_reaped_while_scheduling() {
        let (emitter, _) = CountingEmitter::new(Duration::from_millis(10));
        let scheduler = ArrivalScheduler::new(
            policy(10, Duration::from_secs(5), 1, 1),
            Arc::new(emitter),
        );

        let outcome = scheduler
            .start(Instant::now())
            .await
            .expect("scheduler should finish");

        // every iteration but the last had finished before a later slot was scheduled
        assert_eq!(outcome.result.durations.len(), 49);
        assert_eq!(outcome.in_flight.len(), 1);
        assert_eq!(outcome.result.dropped, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_iterations_are_counted_not_retried() {
        let (mut emitter, calls) = CountingEmitter::new(Duration::from_millis(1));
        emitter.fail = true;
        let test = LoadTest::new(policy(5, Duration::from_secs(2), 1, 1), emitter)
            .start()
            .expect("test should start")
            .wait()
            .await
            .expect("test should complete");

        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert_eq!(test.result().error_count, 10);
        assert!(test.result().durations.is_empty());
        assert_eq!(
            test.collect().expect("metrics should collect").totals.errors,
            10
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_policy_does_not_start() {
        let (emitter, calls) = CountingEmitter::new(Duration::ZERO);
        let result = LoadTest::new(policy(10, Duration::from_secs(1), 5, 2), emitter).start();
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_reports_run_totals() {
        let (emitter, _) = CountingEmitter::new(Duration::from_millis(10));
        let test = LoadTest::new(policy(4, Duration::from_secs(1), 1, 1), emitter)
            .start()
            .expect("test should start")
            .wait()
            .await
            .expect("test should complete");

        let metrics = test.collect().expect("metrics should collect");
        assert_eq!(metrics.run_name, "constant_request_rate");
        assert_eq!(metrics.executor, "constant-arrival-rate");
        assert_eq!(metrics.totals.iterations, 4);
        assert_eq!(metrics.totals.vus_allocated, 1);
        assert!((metrics.totals.success_rate - 100.0).abs() < f64::EPSILON);
        assert_eq!(metrics.metrics[0].count, 4);
        assert_eq!(metrics.metrics[0].latency_buckets[0], 4);
        assert!(metrics.totals.achieved_rate > 0.0);
    }
}
