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

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use indicatif::ProgressBar;
use tokio::{
    sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError},
    task::{JoinHandle, JoinSet},
    time::Instant,
};

use super::LoadResult;
use crate::{emitter::Emit, policy::InvocationPolicy};

pub(crate) struct ScheduleOutcome {
    /// Iterations still running when the last slot was scheduled.
    pub in_flight: JoinSet<Result<Duration>>,
    /// Iterations that had already finished, plus dropped slots and allocated VUs.
    pub result: LoadResult,
}

/// Starts iterations at the slots defined by the policy, handing each one to an idle worker.
///
/// Workers are modelled as semaphore permits: the pool starts with `pre_allocated_vus` permits and
/// grows one permit at a time up to `max_vus`. Workers are never deallocated during a run.
/// Finished iterations are reaped after every slot, so only in-flight tasks are held.
pub(crate) struct ArrivalScheduler<E: Emit + 'static> {
    policy: InvocationPolicy,
    emitter: Arc<E>,
    progress_bar: Option<ProgressBar>,
}

impl<E: Emit + 'static> ArrivalScheduler<E> {
    pub fn new(policy: InvocationPolicy, emitter: Arc<E>) -> Self {
        Self {
            policy,
            emitter,
            progress_bar: None,
        }
    }

    pub fn with_progress_bar(mut self, progress_bar: ProgressBar) -> Self {
        self.progress_bar = Some(progress_bar);
        self
    }

    /// Spawns the scheduling loop. Slot offsets are measured from `start`.
    pub fn start(self, start: Instant) -> JoinHandle<ScheduleOutcome> {
        tokio::spawn(async move {
            let vus = Arc::new(Semaphore::new(self.policy.pre_allocated_vus));
            let mut in_flight = JoinSet::new();
            let mut result = LoadResult {
                vus_allocated: self.policy.pre_allocated_vus,
                ..Default::default()
            };

            for slot in 0..self.policy.iteration_slots() {
                tokio::time::sleep_until(start + self.policy.iteration_offset(slot)).await;

                while let Some(joined) = in_flight.try_join_next() {
                    result.record(&self.policy.name, joined);
                }

                if let Some(pb) = &self.progress_bar {
                    pb.set_position(start.elapsed().as_secs());
                }

                let Some(permit) = self.acquire_vu(&vus, &mut result.vus_allocated) else {
                    tracing::debug!(
                        "Scenario {} - dropped iteration {slot}, all {} VUs are busy",
                        self.policy.name,
                        result.vus_allocated
                    );
                    result.dropped += 1;
                    continue;
                };

                let emitter = Arc::clone(&self.emitter);
                in_flight.spawn(async move {
                    let _permit = permit;
                    emitter.emit().await
                });
            }

            if let Some(pb) = &self.progress_bar {
                pb.set_position(self.policy.duration.as_secs());
            }

            ScheduleOutcome { in_flight, result }
        })
    }

    fn acquire_vu(
        &self,
        vus: &Arc<Semaphore>,
        vus_allocated: &mut usize,
    ) -> Option<OwnedSemaphorePermit> {
        match Arc::clone(vus).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(TryAcquireError::NoPermits) if *vus_allocated < self.policy.max_vus => {
                vus.add_permits(1);
                *vus_allocated += 1;
                tracing::debug!(
                    "Scenario {} - allocated VU {} of {}",
                    self.policy.name,
                    *vus_allocated,
                    self.policy.max_vus
                );
                Arc::clone(vus).try_acquire_owned().ok()
            }
            Err(_) => None,
        }
    }
}
