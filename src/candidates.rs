use std::collections::HashSet;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::domain::StationId;
use crate::store::Layout;

pub const DEFAULT_ARCHIVE_URL: &str = "https://gage-data.earthscope.org/archive/gnss/rinex/obs";

/// One remote location to try for a work unit, with the local file it lands in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub url: String,
    pub path: Utf8PathBuf,
}

/// How the station code is spelled inside the archive file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingVariant {
    Lowercase,
    Uppercase,
}

impl NamingVariant {
    pub fn station_code(&self, station: &StationId) -> String {
        match self {
            NamingVariant::Lowercase => station.to_lowercase(),
            NamingVariant::Uppercase => station.to_uppercase(),
        }
    }
}

pub fn default_variants() -> Vec<NamingVariant> {
    vec![NamingVariant::Lowercase, NamingVariant::Uppercase]
}

/// RINEX 2 daily observation file name, e.g. `p1230050.20d.Z`.
pub fn rinex_file_name(station_code: &str, date: NaiveDate) -> String {
    format!(
        "{station_code}{:03}0.{:02}d.Z",
        date.ordinal(),
        date.year().rem_euclid(100)
    )
}

#[derive(Debug, Clone)]
pub struct CandidateGenerator {
    archive_url: String,
    layout: Layout,
    variants: Vec<NamingVariant>,
}

impl CandidateGenerator {
    pub fn new(archive_url: &str, out_root: &Utf8Path) -> Self {
        Self {
            archive_url: archive_url.trim_end_matches('/').to_string(),
            layout: Layout::new(out_root),
            variants: default_variants(),
        }
    }

    /// Replaces the naming variants tried, in order. An empty list keeps the
    /// defaults.
    pub fn with_variants(mut self, variants: Vec<NamingVariant>) -> Self {
        if !variants.is_empty() {
            self.variants = variants;
        }
        self
    }

    /// Ordered, duplicate-free candidates for one station-day.
    pub fn generate(&self, station: &StationId, date: NaiveDate) -> Vec<Candidate> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::with_capacity(self.variants.len());
        for variant in &self.variants {
            let file_name = rinex_file_name(&variant.station_code(station), date);
            let url = format!(
                "{}/{:04}/{:03}/{file_name}",
                self.archive_url,
                date.year(),
                date.ordinal()
            );
            if !seen.insert(url.clone()) {
                continue;
            }
            candidates.push(Candidate {
                url,
                path: self.layout.file_path(date, &file_name),
            });
        }
        candidates
    }
}
