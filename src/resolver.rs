use camino::Utf8PathBuf;
use chrono::NaiveDate;
use serde::Serialize;

use crate::archive::{ArchiveTransport, FetchFailure, Fetcher};
use crate::candidates::CandidateGenerator;
use crate::domain::{StationId, WorkUnit};
use crate::error::FetchError;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::store::is_satisfied;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Download,
    DryRun,
}

/// Final state of one station-day.
///
/// `Planned` only says which candidates a dry run would try; it is never a
/// successful fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Planned,
    Present,
    Downloaded,
    Failed,
}

impl UnitStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, UnitStatus::Present | UnitStatus::Downloaded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitOutcome {
    pub station: StationId,
    pub date: NaiveDate,
    pub path: Option<Utf8PathBuf>,
    pub status: UnitStatus,
    /// Network requests issued for this unit, retries included.
    pub attempts: u32,
}

impl UnitOutcome {
    pub fn failed(unit: &WorkUnit, path: Option<Utf8PathBuf>, attempts: u32) -> Self {
        Self {
            station: unit.station.clone(),
            date: unit.date,
            path,
            status: UnitStatus::Failed,
            attempts,
        }
    }

    pub fn unit(&self) -> WorkUnit {
        WorkUnit::new(self.station.clone(), self.date)
    }
}

pub struct UnitResolver<T: ArchiveTransport> {
    generator: CandidateGenerator,
    fetcher: Fetcher<T>,
}

impl<T: ArchiveTransport> UnitResolver<T> {
    pub fn new(generator: CandidateGenerator, fetcher: Fetcher<T>) -> Self {
        Self { generator, fetcher }
    }

    pub fn generator(&self) -> &CandidateGenerator {
        &self.generator
    }

    pub fn fetcher(&self) -> &Fetcher<T> {
        &self.fetcher
    }

    /// Tries each candidate in order until one is on disk or downloads.
    ///
    /// `Err` means the unit could not be attempted at all (local filesystem
    /// trouble); fetch failures are reported as `UnitStatus::Failed`.
    pub fn resolve(
        &self,
        unit: &WorkUnit,
        mode: RunMode,
        sink: &dyn ProgressSink,
    ) -> Result<UnitOutcome, FetchError> {
        let candidates = self.generator.generate(&unit.station, unit.date);
        let nominal = candidates.first().map(|candidate| candidate.path.clone());

        if mode == RunMode::DryRun {
            for candidate in &candidates {
                sink.event(ProgressEvent::WouldAttempt {
                    unit: unit.clone(),
                    url: candidate.url.clone(),
                });
            }
            return Ok(UnitOutcome {
                station: unit.station.clone(),
                date: unit.date,
                path: nominal,
                status: UnitStatus::Planned,
                attempts: 0,
            });
        }

        // Any variant already on disk satisfies the unit, whichever name an
        // earlier run ended up downloading.
        if let Some(present) = candidates
            .iter()
            .find(|candidate| is_satisfied(&candidate.path))
        {
            sink.event(ProgressEvent::AlreadyPresent {
                unit: unit.clone(),
                path: present.path.clone(),
            });
            return Ok(UnitOutcome {
                station: unit.station.clone(),
                date: unit.date,
                path: Some(present.path.clone()),
                status: UnitStatus::Present,
                attempts: 0,
            });
        }

        let mut attempts = 0;
        for candidate in &candidates {
            match self.fetcher.fetch(candidate, sink) {
                Ok(fetched) => {
                    attempts += fetched.attempts;
                    return Ok(UnitOutcome {
                        station: unit.station.clone(),
                        date: unit.date,
                        path: Some(fetched.path),
                        status: UnitStatus::Downloaded,
                        attempts,
                    });
                }
                Err(FetchFailure::Local(err)) => return Err(err),
                Err(failure) => {
                    attempts += failure.attempts();
                    tracing::debug!(
                        %unit,
                        url = %candidate.url,
                        result = ?failure.result(),
                        "candidate failed, trying next"
                    );
                }
            }
        }

        tracing::debug!(%unit, "all filename variants failed");
        Ok(UnitOutcome::failed(unit, nominal, attempts))
    }
}
