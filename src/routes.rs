//! Route table: where each route's export lives and where its outputs go.

use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Base directory used when neither the environment nor the CLI gives one.
pub const DEFAULT_BASE_DIR: &str = "s:/_congestion_data/granularity_10min/";

/// Routes downloaded from RITIS, as `<ROAD>_<DIRECTION>`.
pub const DEFAULT_ROUTE_IDS: &[&str] = &[
    "I90_EB", "I90_WB", "I93_NB", "I93_SB", "I95_NB", "I95_SB", "I290_EB", "I290_WB", "I495_NB",
    "I495_SB", "US1_NB", "US1_SB", "US3_NB", "US3_SB", "US44_EB", "US44_WB", "SR2_EB", "SR2_WB",
    "SR3_NB", "SR3_SB", "SR24_NB", "SR24_SB", "SR128_NB", "SR128_SB", "SR140_NB", "SR140_SB",
    "SR146_NB", "SR146_SB", "SR213_EB", "SR213_WB", "N087_NB", "N482_SB",
];

/// Suffix inserted before the extension of the intermediate file.
const INTERMEDIATE_SUFFIX: &str = "_p1";

/// One directional highway segment and the files derived from its export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub id: String,
    pub source_path: PathBuf,
    pub intermediate_path: PathBuf,
    /// Directory plus base name plus `_`; a date and `.csv` complete it.
    pub output_prefix: PathBuf,
}

/// A route as written in a JSON config file. Derived paths are never configured.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteEntry {
    pub id: String,
    pub source_path: PathBuf,
}

impl Route {
    /// Builds a route from its export path, deriving the intermediate path
    /// (`i90_eb.csv` -> `i90_eb_p1.csv`) and output prefix (`i90_eb_`) in the
    /// same directory.
    pub fn from_source(id: impl Into<String>, source_path: impl Into<PathBuf>) -> Self {
        let source_path = source_path.into();
        let dir = source_path.parent().unwrap_or(Path::new("")).to_path_buf();
        let stem = source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let intermediate_name = match source_path.extension() {
            Some(ext) => format!("{stem}{INTERMEDIATE_SUFFIX}.{}", ext.to_string_lossy()),
            None => format!("{stem}{INTERMEDIATE_SUFFIX}"),
        };

        Route {
            id: id.into(),
            intermediate_path: dir.join(intermediate_name),
            output_prefix: dir.join(format!("{stem}_")),
            source_path,
        }
    }

    /// Route laid out the way RITIS downloads are filed:
    /// `<base>/<ID>_data/<id>.csv`.
    pub fn under_base(base_dir: &Path, id: &str) -> Self {
        let source = base_dir
            .join(format!("{id}_data"))
            .join(format!("{}.csv", id.to_lowercase()));
        Route::from_source(id, source)
    }

    /// Path of the partition file holding `date`'s readings.
    pub fn partition_path(&self, date: &str) -> PathBuf {
        partition_path(&self.output_prefix, date)
    }
}

impl From<RouteEntry> for Route {
    fn from(entry: RouteEntry) -> Self {
        Route::from_source(entry.id, entry.source_path)
    }
}

/// `<output_prefix><date>.csv`
pub fn partition_path(output_prefix: &Path, date: &str) -> PathBuf {
    let mut path = OsString::from(output_prefix.as_os_str());
    path.push(date);
    path.push(".csv");
    PathBuf::from(path)
}

/// The built-in route table rooted at `base_dir`.
pub fn default_routes(base_dir: &Path) -> Vec<Route> {
    DEFAULT_ROUTE_IDS
        .iter()
        .map(|id| Route::under_base(base_dir, id))
        .collect()
}
