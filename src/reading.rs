//! The projected speed reading and the CSV layout shared by both stages.

use serde::{Deserialize, Serialize};

/// Column names the provider export must carry, in output order.
pub const SOURCE_COLUMNS: [&str; 4] = ["tmc_code", "measurement_tstamp", "speed", "cvalue"];

/// Header written at the top of every intermediate and partition file.
pub const OUTPUT_HEADER: [&str; 4] = ["tmc", "tstamp", "speed", "cvalue"];

/// One row of an intermediate or partition file.
///
/// All values are kept as the strings found in the export so that numbers
/// keep their original precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedReading {
    pub tmc: String,
    pub tstamp: String,
    pub speed: String,
    pub cvalue: String,
}

impl SpeedReading {
    /// Date component of the timestamp: everything before the first space.
    ///
    /// A timestamp without a space is returned whole.
    pub fn date(&self) -> &str {
        date_component(&self.tstamp)
    }
}

pub fn date_component(tstamp: &str) -> &str {
    tstamp.split_once(' ').map_or(tstamp, |(date, _)| date)
}
