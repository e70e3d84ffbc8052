use std::time::Duration;

use camino::Utf8PathBuf;

use crate::domain::{StationId, WorkUnit};
use crate::resolver::UnitStatus;

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    StationSkipped {
        station: StationId,
    },
    BatchStarted {
        stations: usize,
        units: usize,
        workers: usize,
    },
    WouldAttempt {
        unit: WorkUnit,
        url: String,
    },
    AlreadyPresent {
        unit: WorkUnit,
        path: Utf8PathBuf,
    },
    Downloaded {
        url: String,
        bytes: u64,
    },
    Retrying {
        url: String,
        attempt: u32,
        delay: Duration,
    },
    UnitFinished {
        unit: WorkUnit,
        status: UnitStatus,
        completed: usize,
        total: usize,
    },
}

/// Receives progress from every worker thread.
pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

pub struct NullSink;

impl ProgressSink for NullSink {
    fn event(&self, _event: ProgressEvent) {}
}

/// Writes progress as log lines.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::StationSkipped { station } => {
                tracing::info!(%station, "skipping station: no overlap with date range");
            }
            ProgressEvent::BatchStarted {
                stations,
                units,
                workers,
            } => {
                tracing::info!(stations, units, workers, "starting download");
            }
            ProgressEvent::WouldAttempt { unit, url } => {
                tracing::info!(%unit, %url, "[dry run] would try");
            }
            ProgressEvent::AlreadyPresent { unit, path } => {
                tracing::debug!(%unit, %path, "already exists, skipping");
            }
            ProgressEvent::Downloaded { url, bytes } => {
                tracing::info!(%url, bytes, "downloaded");
            }
            ProgressEvent::Retrying {
                url,
                attempt,
                delay,
            } => {
                tracing::info!(%url, attempt, delay_secs = delay.as_secs_f64(), "retrying");
            }
            ProgressEvent::UnitFinished {
                unit,
                status,
                completed,
                total,
            } => {
                if status == UnitStatus::Failed {
                    tracing::debug!(%unit, completed, total, "all candidates failed");
                } else {
                    tracing::debug!(%unit, ?status, completed, total, "unit finished");
                }
            }
        }
    }
}
