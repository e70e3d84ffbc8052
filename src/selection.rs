use std::fs;
use std::path::Path;

use crate::domain::{StationId, StationRecord};
use crate::error::FetchError;

/// Reads an allow-list with one station id per line. Blank lines and lines
/// starting with `#` are ignored.
pub fn load_station_list(path: &Path) -> Result<Vec<StationId>, FetchError> {
    let content =
        fs::read_to_string(path).map_err(|_| FetchError::StationListRead(path.to_path_buf()))?;
    let stations = parse_station_list(&content)?;
    if stations.is_empty() {
        return Err(FetchError::EmptyStationList(path.to_path_buf()));
    }
    Ok(stations)
}

pub fn parse_station_list(content: &str) -> Result<Vec<StationId>, FetchError> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::parse::<StationId>)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub stations: Vec<StationRecord>,
    /// Requested ids the catalog did not return.
    pub missing: Vec<StationId>,
}

/// Narrows catalog records to the allow-list, if any.
pub fn select_stations(
    records: Vec<StationRecord>,
    allow_list: Option<&[StationId]>,
) -> Result<Selection, FetchError> {
    let selection = match allow_list {
        None => Selection {
            stations: records,
            missing: Vec::new(),
        },
        Some(requested) => {
            let mut stations: Vec<StationRecord> = Vec::new();
            let mut missing = Vec::new();
            for id in requested {
                if stations.iter().any(|station| station.id.eq_ignore_case(id)) {
                    continue;
                }
                match records.iter().find(|record| record.id.eq_ignore_case(id)) {
                    Some(record) => stations.push(record.clone()),
                    None => missing.push(id.clone()),
                }
            }
            if !missing.is_empty() {
                let names: Vec<&str> = missing.iter().map(StationId::as_str).collect();
                tracing::warn!(
                    missing = %names.join(", "),
                    "stations in list not found in bounding-box metadata"
                );
            }
            Selection { stations, missing }
        }
    };

    if selection.stations.is_empty() {
        return Err(FetchError::NoStations);
    }
    Ok(selection)
}
