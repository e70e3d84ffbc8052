use std::path::PathBuf;

use camino::Utf8PathBuf;

use crate::archive::{ArchiveTransport, Fetcher};
use crate::batch::{BatchConfig, Orchestrator, RunSummary};
use crate::candidates::CandidateGenerator;
use crate::catalog::{BoundingBox, StationCatalog};
use crate::config::FetchConfig;
use crate::domain::DateRange;
use crate::error::FetchError;
use crate::progress::ProgressSink;
use crate::resolver::{RunMode, UnitResolver};
use crate::selection::{load_station_list, select_stations};

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub bbox: BoundingBox,
    pub range: DateRange,
    pub stations_file: Option<PathBuf>,
    pub out_root: Utf8PathBuf,
    /// Overrides `FetchConfig::workers` when set.
    pub workers: Option<usize>,
    pub mode: RunMode,
}

/// Wires the catalog, station selection and the download batch together.
pub struct App<C: StationCatalog, T: ArchiveTransport> {
    catalog: C,
    transport: T,
    config: FetchConfig,
}

impl<C: StationCatalog, T: ArchiveTransport> App<C, T> {
    pub fn new(catalog: C, transport: T, config: FetchConfig) -> Self {
        Self {
            catalog,
            transport,
            config,
        }
    }

    /// Everything up to station selection can fail the run; once the batch
    /// starts, failures are only reported per unit.
    pub fn run(self, request: RunRequest, sink: &dyn ProgressSink) -> Result<RunSummary, FetchError> {
        let allow_list = request
            .stations_file
            .as_deref()
            .map(load_station_list)
            .transpose()?;

        tracing::info!(
            min_lat = request.bbox.min_lat,
            max_lat = request.bbox.max_lat,
            min_lon = request.bbox.min_lon,
            max_lon = request.bbox.max_lon,
            "querying station metadata"
        );
        let records = self.catalog.stations_in(&request.bbox)?;
        if records.is_empty() {
            tracing::error!("no stations found in bounding box");
            return Err(FetchError::NoStations);
        }
        tracing::info!(stations = records.len(), "found stations in bounding box");

        let selection = select_stations(records, allow_list.as_deref())?;

        let workers = request.workers.unwrap_or(self.config.workers);
        if workers == 0 {
            return Err(FetchError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }

        let generator = CandidateGenerator::new(&self.config.archive_url, &request.out_root);
        let fetcher = Fetcher::new(self.transport, self.config.retry_policy());
        let orchestrator = Orchestrator::new(
            UnitResolver::new(generator, fetcher),
            BatchConfig {
                workers,
                mode: request.mode,
            },
        );
        tracing::info!(
            out_root = %request.out_root,
            range = %request.range,
            workers,
            "resolved run"
        );
        Ok(orchestrator.run(&selection.stations, &request.range, sink))
    }
}
