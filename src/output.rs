use std::io::{self, Write};

use serde::Serialize;

use crate::batch::RunSummary;
use crate::resolver::UnitStatus;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub fn print_human_summary(summary: &RunSummary) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    write_human_summary(&mut stdout, summary)
}

pub fn write_human_summary<W: Write>(out: &mut W, summary: &RunSummary) -> io::Result<()> {
    if summary.planned > 0 {
        writeln!(
            out,
            "Dry run: {} station-days planned, nothing downloaded",
            summary.planned
        )?;
    } else {
        writeln!(
            out,
            "Download complete: {} succeeded, {} failed or missing",
            summary.succeeded, summary.failed
        )?;
    }
    if !summary.skipped_stations.is_empty() {
        let names: Vec<&str> = summary
            .skipped_stations
            .iter()
            .map(|station| station.as_str())
            .collect();
        writeln!(out, "Skipped (no overlap): {}", names.join(", "))?;
    }
    for outcome in summary
        .outcomes
        .iter()
        .filter(|outcome| outcome.status == UnitStatus::Failed)
    {
        let path = outcome
            .path
            .as_ref()
            .map(|path| path.as_str())
            .unwrap_or("-");
        writeln!(
            out,
            "  failed: {} {} ({path})",
            outcome.station, outcome.date
        )?;
    }
    Ok(())
}
