//! Stage 2: split an intermediate file into one file per calendar day.

use anyhow::{Context, Result, bail};
use csv::Reader;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::output::{create_reading_writer, finish, write_reading};
use crate::reading::SpeedReading;
use crate::routes::{Route, partition_path};

/// Outcome of extracting one day from an intermediate file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionReport {
    pub date: String,
    pub path: PathBuf,
    pub rows: usize,
}

/// Writes `<prefix><date>.csv` holding the header plus every row of
/// `intermediate` whose timestamp falls on `date`, in original order.
///
/// `date` is compared as text against the part of `tstamp` before the first
/// space; a date that is malformed or absent from the data yields a
/// header-only file.
#[tracing::instrument(skip(output_prefix), fields(intermediate = %intermediate.display()))]
pub fn partition_for_date(
    intermediate: &Path,
    output_prefix: &Path,
    date: &str,
) -> Result<PartitionReport> {
    extract_date(intermediate, partition_path(output_prefix, date), date)
}

/// Runs [`partition_for_date`] for each date, rescanning the route's
/// intermediate file once per date.
#[tracing::instrument(skip(route, dates), fields(route = %route.id))]
pub fn partition_route(route: &Route, dates: &[String]) -> Result<Vec<PartitionReport>> {
    info!(file = %route.intermediate_path.display(), "Processing file");

    dates
        .iter()
        .map(|date| extract_date(&route.intermediate_path, route.partition_path(date), date))
        .collect()
}

fn extract_date(source: &Path, path: PathBuf, date: &str) -> Result<PartitionReport> {
    debug!(date, path = %path.display(), "Processing date");

    // A date like `p1` turns `<prefix><date>.csv` into the intermediate file itself.
    if path == source {
        bail!(
            "partition for date `{date}` would overwrite its input {}",
            source.display()
        );
    }

    let file = File::open(source).with_context(|| format!("failed to open {}", source.display()))?;
    let mut rdr = Reader::from_reader(file);

    let mut writer = create_reading_writer(&path)?;
    let mut rows = 0;

    for result in rdr.deserialize() {
        let reading: SpeedReading =
            result.with_context(|| format!("malformed row in {}", source.display()))?;
        if reading.date() == date {
            write_reading(&mut writer, &reading)
                .with_context(|| format!("failed to write {}", path.display()))?;
            rows += 1;
        }
    }

    finish(writer, &path)?;

    info!(date, rows, path = %path.display(), "Extraction of data for date completed");
    Ok(PartitionReport {
        date: date.to_string(),
        path,
        rows,
    })
}
