//! Batch downloader for daily GNSS RINEX observation files.
//!
//! Stations come from a metadata catalog with their operational windows. Each
//! station-day inside both the window and the requested range becomes one
//! work unit, resolved on a fixed pool of worker threads by trying candidate
//! file names against the archive.

pub mod app;
pub mod archive;
pub mod batch;
pub mod candidates;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod output;
pub mod progress;
pub mod resolver;
pub mod selection;
pub mod store;
pub mod window;
