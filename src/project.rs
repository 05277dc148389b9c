//! Stage 1: narrow a provider export to the four attributes of interest.

use anyhow::{Context, Result, bail};
use csv::{Reader, StringRecord};
use std::fs::File;
use std::path::Path;
use tracing::info;

use crate::output::{create_reading_writer, finish, write_reading};
use crate::reading::{SOURCE_COLUMNS, SpeedReading};

/// Outcome of projecting one export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionReport {
    pub rows: usize,
}

/// Positions of the required columns within an export's header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnIndex {
    tmc_code: usize,
    measurement_tstamp: usize,
    speed: usize,
    cvalue: usize,
}

impl ColumnIndex {
    fn from_headers(headers: &StringRecord, source: &Path) -> Result<Self> {
        let mut positions = [0usize; 4];
        for (slot, name) in positions.iter_mut().zip(SOURCE_COLUMNS) {
            *slot = match headers.iter().position(|h| h == name) {
                Some(i) => i,
                None => bail!("column `{}` not found in {}", name, source.display()),
            };
        }

        let [tmc_code, measurement_tstamp, speed, cvalue] = positions;
        Ok(Self {
            tmc_code,
            measurement_tstamp,
            speed,
            cvalue,
        })
    }

    fn reading(&self, record: &StringRecord) -> SpeedReading {
        // The reader rejects rows whose length differs from the header, so every index is present.
        let field = |i: usize| record.get(i).unwrap_or_default().to_string();
        SpeedReading {
            tmc: field(self.tmc_code),
            tstamp: field(self.measurement_tstamp),
            speed: field(self.speed),
            cvalue: field(self.cvalue),
        }
    }
}

/// Writes `destination` containing the fixed header and, for each row of
/// `source`, its `tmc_code`, `measurement_tstamp`, `speed` and `cvalue`
/// values copied verbatim.
///
/// # Errors
///
/// Fails if `source` cannot be read, lacks one of the required columns, or
/// holds a row with the wrong number of fields, or if `destination` cannot be
/// written. The header is checked before `destination` is created.
#[tracing::instrument(fields(source = %source.display(), destination = %destination.display()))]
pub fn project_file(source: &Path, destination: &Path) -> Result<ProjectionReport> {
    info!(
        source = %source.display(),
        destination = %destination.display(),
        "Extracting attributes of interest"
    );

    let file = File::open(source).with_context(|| format!("failed to open {}", source.display()))?;
    let mut rdr = Reader::from_reader(file);

    let headers = rdr
        .headers()
        .with_context(|| format!("failed to read header of {}", source.display()))?;
    let columns = ColumnIndex::from_headers(headers, source)?;

    let mut writer = create_reading_writer(destination)?;
    let mut rows = 0;

    for result in rdr.records() {
        let record = result.with_context(|| format!("malformed row in {}", source.display()))?;
        write_reading(&mut writer, &columns.reading(&record))
            .with_context(|| format!("failed to write {}", destination.display()))?;
        rows += 1;
    }

    finish(writer, destination)?;

    info!(rows, destination = %destination.display(), "Projection complete");
    Ok(ProjectionReport { rows })
}
