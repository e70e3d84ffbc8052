use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use serde::Serialize;

use crate::archive::ArchiveTransport;
use crate::domain::{DateRange, StationId, StationRecord, WorkUnit};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::resolver::{RunMode, UnitOutcome, UnitResolver, UnitStatus};

pub const DEFAULT_WORKERS: usize = 5;

/// Station-days to schedule, plus the stations whose window misses the
/// requested range entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchPlan {
    pub units: Vec<WorkUnit>,
    pub skipped: Vec<StationId>,
}

impl BatchPlan {
    pub fn expand(stations: &[StationRecord], requested: &DateRange) -> Self {
        let mut plan = BatchPlan::default();
        for station in stations {
            match station.window().resolve(requested) {
                Some(effective) => plan.units.extend(
                    effective
                        .days()
                        .map(|date| WorkUnit::new(station.id.clone(), date)),
                ),
                None => plan.skipped.push(station.id.clone()),
            }
        }
        plan
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub workers: usize,
    pub mode: RunMode,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            mode: RunMode::Download,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub planned: usize,
    pub skipped_stations: Vec<StationId>,
    /// Per-unit outcomes in completion order.
    pub outcomes: Vec<UnitOutcome>,
}

impl RunSummary {
    fn from_outcomes(skipped_stations: Vec<StationId>, outcomes: Vec<UnitOutcome>) -> Self {
        let count = |status: fn(&UnitStatus) -> bool| {
            outcomes
                .iter()
                .filter(|outcome| status(&outcome.status))
                .count()
        };
        Self {
            total: outcomes.len(),
            succeeded: count(UnitStatus::is_success),
            failed: count(|status: &UnitStatus| *status == UnitStatus::Failed),
            planned: count(|status: &UnitStatus| *status == UnitStatus::Planned),
            skipped_stations,
            outcomes,
        }
    }

    pub fn failed_units(&self) -> Vec<WorkUnit> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == UnitStatus::Failed)
            .map(UnitOutcome::unit)
            .collect()
    }
}

pub struct Orchestrator<T: ArchiveTransport> {
    resolver: UnitResolver<T>,
    config: BatchConfig,
}

impl<T: ArchiveTransport> Orchestrator<T> {
    pub fn new(resolver: UnitResolver<T>, config: BatchConfig) -> Self {
        Self { resolver, config }
    }

    pub fn resolver(&self) -> &UnitResolver<T> {
        &self.resolver
    }

    pub fn run(
        &self,
        stations: &[StationRecord],
        requested: &DateRange,
        sink: &dyn ProgressSink,
    ) -> RunSummary {
        let plan = BatchPlan::expand(stations, requested);
        for station in &plan.skipped {
            sink.event(ProgressEvent::StationSkipped {
                station: station.clone(),
            });
        }
        let workers = self.config.workers.max(1);
        sink.event(ProgressEvent::BatchStarted {
            stations: stations.len(),
            units: plan.units.len(),
            workers,
        });

        let outcomes = self.execute(&plan.units, workers, sink);
        let summary = RunSummary::from_outcomes(plan.skipped, outcomes);
        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            planned = summary.planned,
            "download complete"
        );
        summary
    }

    /// Runs `units` on a fixed pool of worker threads and gathers outcomes as
    /// they finish.
    pub fn execute(
        &self,
        units: &[WorkUnit],
        workers: usize,
        sink: &dyn ProgressSink,
    ) -> Vec<UnitOutcome> {
        let total = units.len();
        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel::<UnitOutcome>();
        let mut outcomes = Vec::with_capacity(total);

        thread::scope(|scope| {
            for _ in 0..workers.min(total) {
                let tx = tx.clone();
                let next = &next;
                scope.spawn(move || {
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(unit) = units.get(index) else {
                            break;
                        };
                        if tx.send(self.resolve_isolated(unit, sink)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            for outcome in rx {
                sink.event(ProgressEvent::UnitFinished {
                    unit: outcome.unit(),
                    status: outcome.status,
                    completed: outcomes.len() + 1,
                    total,
                });
                outcomes.push(outcome);
            }
        });

        outcomes
    }

    /// Keeps one unit's error or panic from reaching the rest of the batch.
    fn resolve_isolated(&self, unit: &WorkUnit, sink: &dyn ProgressSink) -> UnitOutcome {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.resolver.resolve(unit, self.config.mode, sink)
        }));
        match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                tracing::error!(%unit, error = %err, "unit failed");
                UnitOutcome::failed(unit, None, 0)
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|value| value.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(%unit, %message, "unit panicked");
                UnitOutcome::failed(unit, None, 0)
            }
        }
    }
}
