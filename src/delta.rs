//! Change in speed between two days of one route.
//!
//! Reads two partition files, pairs readings by TMC and 10-minute time slot,
//! and writes `tmc,time,cvalue,delta_speed` where `delta_speed` is the later
//! day's speed minus the earlier day's. Readings whose `cvalue` is below the
//! threshold, or whose speed is not a number, count as missing and leave
//! `delta_speed` empty.

use anyhow::{Context, Result, anyhow};
use csv::{QuoteStyle, Reader, Terminator, WriterBuilder};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::reading::SpeedReading;
use crate::routes::Route;

/// Readings below this `cvalue` are treated as missing unless overridden.
pub const DEFAULT_MIN_CVALUE: f64 = 75.0;

/// `HH:MM` slot taken from the time part of a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeSlot {
    pub hr: u32,
    pub min: u32,
}

impl TimeSlot {
    /// Parses the `HH:MM` that follows the first space of `YYYY-MM-DD HH:MM:SS`.
    pub fn from_tstamp(tstamp: &str) -> Result<Self> {
        let time = tstamp
            .split_once(' ')
            .map(|(_, time)| time)
            .ok_or_else(|| anyhow!("timestamp `{tstamp}` has no time part"))?;
        let mut parts = time.split(':');
        let mut next = |what: &str| -> Result<u32> {
            parts
                .next()
                .and_then(|p| p.trim().parse().ok())
                .ok_or_else(|| anyhow!("timestamp `{tstamp}` has no valid {what}"))
        };
        let hr = next("hour")?;
        let min = next("minute")?;
        Ok(TimeSlot { hr, min })
    }
}

impl std::fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hr, self.min)
    }
}

/// A reading reduced to what the comparison needs.
#[derive(Debug, Clone, PartialEq)]
struct SlotReading {
    tmc: String,
    slot: TimeSlot,
    /// `None` when the speed is not a number or the cvalue is under the threshold.
    speed: Option<f64>,
    cvalue: Option<f64>,
}

impl SlotReading {
    fn from_reading(reading: &SpeedReading, min_cvalue: f64) -> Result<Self> {
        let cvalue = reading.cvalue.trim().parse::<f64>().ok();
        let speed = reading
            .speed
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|s| !s.is_nan())
            .filter(|_| min_cvalue <= 0.0 || cvalue.is_some_and(|c| c >= min_cvalue));

        Ok(SlotReading {
            tmc: reading.tmc.clone(),
            slot: TimeSlot::from_tstamp(&reading.tstamp)?,
            speed,
            cvalue,
        })
    }
}

/// One row of a delta file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeedDelta {
    pub tmc: String,
    pub time: String,
    /// Lower of the two days' cvalues.
    pub cvalue: Option<f64>,
    pub delta_speed: Option<f64>,
}

/// Outcome of comparing two days.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaReport {
    pub path: PathBuf,
    pub rows: usize,
    /// Rows with both speeds present.
    pub with_delta: usize,
}

/// `<prefix>delta_<first>_<last>.csv`, next to the route's partition files.
pub fn delta_path(route: &Route, first: &str, last: &str) -> PathBuf {
    route.partition_path(&format!("delta_{first}_{last}"))
}

fn load_slots(path: &Path, min_cvalue: f64) -> Result<Vec<SlotReading>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut rdr = Reader::from_reader(file);

    let mut slots = Vec::new();
    for result in rdr.deserialize() {
        let reading: SpeedReading =
            result.with_context(|| format!("malformed row in {}", path.display()))?;
        slots.push(
            SlotReading::from_reading(&reading, min_cvalue)
                .with_context(|| format!("bad timestamp in {}", path.display()))?,
        );
    }

    debug!(path = %path.display(), rows = slots.len(), "Loaded day");
    Ok(slots)
}

/// Pairs readings by (TMC, slot). Rows follow the first day's order, then any
/// slots seen only on the last day; a slot missing from either day has no delta.
pub fn compute_deltas(
    first: &[SpeedReading],
    last: &[SpeedReading],
    min_cvalue: f64,
) -> Result<Vec<SpeedDelta>> {
    let first = first
        .iter()
        .map(|r| SlotReading::from_reading(r, min_cvalue))
        .collect::<Result<Vec<_>>>()?;
    let last = last
        .iter()
        .map(|r| SlotReading::from_reading(r, min_cvalue))
        .collect::<Result<Vec<_>>>()?;
    Ok(pair_slots(&first, &last))
}

fn pair_slots(first: &[SlotReading], last: &[SlotReading]) -> Vec<SpeedDelta> {
    let mut last_by_key: HashMap<(&str, TimeSlot), &SlotReading> = HashMap::new();
    for reading in last {
        last_by_key.entry((reading.tmc.as_str(), reading.slot)).or_insert(reading);
    }

    let mut deltas = Vec::with_capacity(first.len());
    for earlier in first {
        let later = last_by_key.remove(&(earlier.tmc.as_str(), earlier.slot));
        deltas.push(SpeedDelta {
            tmc: earlier.tmc.clone(),
            time: earlier.slot.to_string(),
            cvalue: later.and_then(|l| min_of(earlier.cvalue, l.cvalue)),
            delta_speed: later.and_then(|l| Some(l.speed? - earlier.speed?)),
        });
    }

    // Slots only the last day has, in the last day's order.
    for later in last {
        if last_by_key.remove(&(later.tmc.as_str(), later.slot)).is_some() {
            deltas.push(SpeedDelta {
                tmc: later.tmc.clone(),
                time: later.slot.to_string(),
                cvalue: None,
                delta_speed: None,
            });
        }
    }

    deltas
}

fn min_of(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    Some(a?.min(b?))
}

/// Compares `route`'s partition files for `first` and `last` and writes the
/// result to `destination`.
#[tracing::instrument(skip(route, destination), fields(route = %route.id))]
pub fn write_route_delta(
    route: &Route,
    first: &str,
    last: &str,
    min_cvalue: f64,
    destination: &Path,
) -> Result<DeltaReport> {
    let first_path = route.partition_path(first);
    let last_path = route.partition_path(last);
    info!(first = %first_path.display(), last = %last_path.display(), "Comparing days");

    let deltas = pair_slots(
        &load_slots(&first_path, min_cvalue)?,
        &load_slots(&last_path, min_cvalue)?,
    );

    let file = File::create(destination)
        .with_context(|| format!("failed to create {}", destination.display()))?;
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Never)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(file);
    writer.write_record(["tmc", "time", "cvalue", "delta_speed"])?;
    for delta in &deltas {
        writer.serialize(delta)?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to flush {}", destination.display()))?;

    let with_delta = deltas.iter().filter(|d| d.delta_speed.is_some()).count();
    info!(rows = deltas.len(), with_delta, path = %destination.display(), "Delta written");
    Ok(DeltaReport {
        path: destination.to_path_buf(),
        rows: deltas.len(),
        with_delta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    fn reading(tmc: &str, tstamp: &str, speed: &str, cvalue: &str) -> SpeedReading {
        SpeedReading {
            tmc: tmc.to_string(),
            tstamp: tstamp.to_string(),
            speed: speed.to_string(),
            cvalue: cvalue.to_string(),
        }
    }

    #[test]
    fn test_time_slot_from_tstamp() {
        let slot = TimeSlot::from_tstamp("2020-07-01 08:50:00").unwrap();
        assert_eq!(slot, TimeSlot { hr: 8, min: 50 });
        assert_eq!(slot.to_string(), "08:50");
    }

    #[test]
    fn test_time_slot_requires_time_part() {
        assert!(TimeSlot::from_tstamp("2020-07-01").is_err());
        assert!(TimeSlot::from_tstamp("2020-07-01 xx:10:00").is_err());
    }

    #[test]
    fn test_delta_is_last_minus_first() {
        let first = vec![reading("A", "2020-07-01 00:00:00", "60", "100")];
        let last = vec![reading("A", "2020-07-15 00:00:00", "52.5", "90")];

        let deltas = compute_deltas(&first, &last, DEFAULT_MIN_CVALUE).unwrap();

        assert_eq!(
            deltas,
            vec![SpeedDelta {
                tmc: "A".to_string(),
                time: "00:00".to_string(),
                cvalue: Some(90.0),
                delta_speed: Some(-7.5),
            }]
        );
    }

    #[test]
    fn test_low_cvalue_counts_as_missing() {
        let first = vec![reading("A", "2020-07-01 00:10:00", "60", "30")];
        let last = vec![reading("A", "2020-07-15 00:10:00", "50", "100")];

        let strict = compute_deltas(&first, &last, DEFAULT_MIN_CVALUE).unwrap();
        assert_eq!(strict[0].delta_speed, None);
        assert_eq!(strict[0].cvalue, Some(30.0));

        let unrestricted = compute_deltas(&first, &last, 0.0).unwrap();
        assert_eq!(unrestricted[0].delta_speed, Some(-10.0));
    }

    #[test]
    fn test_empty_speed_or_cvalue_counts_as_missing() {
        let first = vec![
            reading("A", "2020-07-01 00:00:00", "", "100"),
            reading("B", "2020-07-01 00:00:00", "40", ""),
        ];
        let last = vec![
            reading("A", "2020-07-15 00:00:00", "50", "100"),
            reading("B", "2020-07-15 00:00:00", "45", "100"),
        ];

        let deltas = compute_deltas(&first, &last, DEFAULT_MIN_CVALUE).unwrap();
        assert_eq!(deltas[0].delta_speed, None);
        assert_eq!(deltas[1].delta_speed, None);
        assert_eq!(deltas[1].cvalue, None);
    }

    #[test]
    fn test_pairs_by_tmc_and_slot_not_position() {
        let first = vec![
            reading("A", "2020-07-01 00:00:00", "60", "100"),
            reading("B", "2020-07-01 00:00:00", "50", "100"),
        ];
        let last = vec![
            reading("B", "2020-07-15 00:00:00", "40", "100"),
            reading("C", "2020-07-15 00:00:00", "30", "100"),
            reading("A", "2020-07-15 00:00:00", "65", "100"),
        ];

        let deltas = compute_deltas(&first, &last, DEFAULT_MIN_CVALUE).unwrap();

        let rows: Vec<_> = deltas
            .iter()
            .map(|d| (d.tmc.as_str(), d.delta_speed))
            .collect();
        assert_eq!(
            rows,
            vec![("A", Some(5.0)), ("B", Some(-10.0)), ("C", None)]
        );
    }

    #[test]
    fn test_write_route_delta() {
        let dir = env::temp_dir().join(format!("speed_extract_{}_delta", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();

        let route = Route::from_source("I93_NB", dir.join("i93_nb.csv"));
        fs::write(
            route.partition_path("2020-07-01"),
            "tmc,tstamp,speed,cvalue\nA,2020-07-01 00:00:00,60,100\nA,2020-07-01 00:10:00,58,20\n",
        )
        .unwrap();
        fs::write(
            route.partition_path("2020-07-15"),
            "tmc,tstamp,speed,cvalue\nA,2020-07-15 00:00:00,55,100\nA,2020-07-15 00:10:00,57,100\n",
        )
        .unwrap();

        let destination = delta_path(&route, "2020-07-01", "2020-07-15");
        let report =
            write_route_delta(&route, "2020-07-01", "2020-07-15", DEFAULT_MIN_CVALUE, &destination)
                .unwrap();

        assert_eq!(destination, dir.join("i93_nb_delta_2020-07-01_2020-07-15.csv"));
        assert_eq!(report.rows, 2);
        assert_eq!(report.with_delta, 1);
        assert_eq!(
            fs::read_to_string(&destination).unwrap(),
            "tmc,time,cvalue,delta_speed\nA,00:00,100.0,-5.0\nA,00:10,20.0,\n"
        );

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_write_route_delta_missing_day_errors() {
        let route = Route::from_source("X", env::temp_dir().join("speed_extract_absent/x.csv"));
        let err = write_route_delta(&route, "2020-07-01", "2020-07-02", 0.0, Path::new("unused.csv"))
            .unwrap_err();
        assert!(err.to_string().contains("failed to open"));
    }
}
