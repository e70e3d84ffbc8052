use std::fs;
use std::io::{self, Read, Write};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{Datelike, NaiveDate};

use crate::error::FetchError;

const TEMP_PREFIX: &str = ".gnss-fetch";

/// On-disk layout: `<out_root>/<yyyy>/<ddd>/<file>`.
#[derive(Debug, Clone)]
pub struct Layout {
    out_root: Utf8PathBuf,
}

impl Layout {
    pub fn new(out_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            out_root: out_root.into(),
        }
    }

    pub fn day_dir(&self, date: NaiveDate) -> Utf8PathBuf {
        self.out_root
            .join(format!("{:04}", date.year()))
            .join(format!("{:03}", date.ordinal()))
    }

    pub fn file_path(&self, date: NaiveDate, file_name: &str) -> Utf8PathBuf {
        self.day_dir(date).join(file_name)
    }
}

/// A destination counts as done when it exists and is not empty.
pub fn is_satisfied(path: &Utf8Path) -> bool {
    fs::metadata(path.as_std_path())
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

pub fn ensure_parent(path: &Utf8Path) -> Result<(), FetchError> {
    let parent = path
        .parent()
        .ok_or_else(|| FetchError::Filesystem(format!("no parent directory for {path}")))?;
    // create_dir_all tolerates another worker creating the same directory.
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| FetchError::Filesystem(format!("create {parent}: {err}")))
}

/// Streams `reader` into a temp file next to `dest` and renames it into place,
/// so `dest` only ever appears with its full content.
///
/// An empty stream is discarded: `dest` is left as it was and `Ok(0)` is
/// returned.
pub fn write_stream_atomic<R: Read>(reader: &mut R, dest: &Utf8Path) -> Result<u64, FetchError> {
    ensure_parent(dest)?;
    let parent = dest
        .parent()
        .ok_or_else(|| FetchError::Filesystem(format!("no parent directory for {dest}")))?;
    let mut temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(parent.as_std_path())
        .map_err(|err| FetchError::Filesystem(err.to_string()))?;
    let written = io::copy(reader, temp.as_file_mut())
        .map_err(|err| FetchError::Filesystem(format!("write {dest}: {err}")))?;
    if written == 0 {
        return Ok(0);
    }
    temp.as_file_mut()
        .flush()
        .map_err(|err| FetchError::Filesystem(err.to_string()))?;
    if dest.as_std_path().exists() {
        fs::remove_file(dest.as_std_path())
            .map_err(|err| FetchError::Filesystem(err.to_string()))?;
    }
    temp.persist(dest.as_std_path())
        .map_err(|err| FetchError::Filesystem(err.to_string()))?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parse_date;

    fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        (temp, root)
    }

    #[test]
    fn layout_uses_year_and_padded_day_of_year() {
        let layout = Layout::new("/data/rinex");
        let date = parse_date("2020-01-05").unwrap();
        assert_eq!(
            layout.file_path(date, "p1230050.20d.Z"),
            Utf8PathBuf::from("/data/rinex/2020/005/p1230050.20d.Z")
        );
        let leap = parse_date("2020-12-31").unwrap();
        assert!(layout.day_dir(leap).ends_with("2020/366"));
    }

    #[test]
    fn empty_file_is_not_satisfied() {
        let (_temp, root) = temp_root();
        let path = root.join("empty.Z");
        assert!(!is_satisfied(&path));
        fs::write(path.as_std_path(), b"").unwrap();
        assert!(!is_satisfied(&path));
        fs::write(path.as_std_path(), b"x").unwrap();
        assert!(is_satisfied(&path));
    }

    #[test]
    fn atomic_write_creates_directories_and_leaves_no_temp_files() {
        let (_temp, root) = temp_root();
        let dest = root.join("2021").join("152").join("abcd1520.21d.Z");
        let written = write_stream_atomic(&mut &b"payload"[..], &dest).unwrap();
        assert_eq!(written, 7);
        assert_eq!(fs::read(dest.as_std_path()).unwrap(), b"payload");

        let leftovers: Vec<_> = fs::read_dir(root.join("2021").join("152").as_std_path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn atomic_write_replaces_existing_file() {
        let (_temp, root) = temp_root();
        let dest = root.join("file.Z");
        fs::write(dest.as_std_path(), b"old contents").unwrap();
        write_stream_atomic(&mut &b"new"[..], &dest).unwrap();
        assert_eq!(fs::read(dest.as_std_path()).unwrap(), b"new");
    }

    #[test]
    fn empty_stream_leaves_nothing_behind() {
        let (_temp, root) = temp_root();
        let day = root.join("2021").join("152");
        let dest = day.join("abcd1520.21d.Z");
        assert_eq!(write_stream_atomic(&mut &b""[..], &dest).unwrap(), 0);
        assert!(!dest.as_std_path().exists());
        assert_eq!(fs::read_dir(day.as_std_path()).unwrap().count(), 0);
    }

    #[test]
    fn failed_stream_never_creates_destination() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            }
        }

        let (_temp, root) = temp_root();
        let dest = root.join("2021").join("001").join("file.Z");
        assert!(write_stream_atomic(&mut Broken, &dest).is_err());
        assert!(!dest.as_std_path().exists());
    }
}
