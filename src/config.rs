//! Run configuration: which routes to process and which dates to extract.
//!
//! Built once at startup and handed to each stage. Defaults reproduce the
//! July 2020 download; a JSON file can replace the routes and/or dates:
//! ```json
//! {
//!   "routes": [{ "id": "I90_EB", "source_path": "data/I90_EB_data/i90_eb.csv" }],
//!   "dates": ["2020-08-01", "2020-08-02"]
//! }
//! ```

use anyhow::{Context, Result, anyhow, bail};
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::routes::{DEFAULT_BASE_DIR, Route, RouteEntry, default_routes};

/// Month covered by the built-in date list.
pub const DEFAULT_MONTH: (i32, u32) = (2020, 7);

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub routes: Vec<Route>,
    pub dates: Vec<String>,
}

/// Contents of an optional JSON config file. Omitted keys keep their defaults.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub routes: Option<Vec<RouteEntry>>,
    pub dates: Option<Vec<String>>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }
}

/// Overrides gathered from the command line and environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    /// `--base-dir`
    pub base_dir: Option<PathBuf>,
    /// `SPEED_DATA_BASE_DIR`
    pub env_base_dir: Option<String>,
    pub file: Option<ConfigFile>,
    /// `--month YYYY-MM`; wins over `dates`.
    pub month: Option<String>,
    pub dates: Vec<String>,
    pub routes: Vec<String>,
}

impl Overrides {
    /// `--base-dir`, else `SPEED_DATA_BASE_DIR`, else [`DEFAULT_BASE_DIR`].
    pub fn base_dir(&self) -> PathBuf {
        self.base_dir.clone().unwrap_or_else(|| {
            PathBuf::from(self.env_base_dir.as_deref().unwrap_or(DEFAULT_BASE_DIR))
        })
    }
}

impl PipelineConfig {
    /// Defaults, then the config file, then `--month` or `--date`, then
    /// dedup, then the route filter.
    pub fn resolve(overrides: Overrides) -> Result<Self> {
        let mut config = PipelineConfig::defaults(&overrides.base_dir());

        if let Some(file) = overrides.file {
            config = config.with_file(file);
        }

        if let Some(month) = &overrides.month {
            let (year, month) = parse_month(month)?;
            config = config.with_dates(month_dates(year, month)?);
        } else if !overrides.dates.is_empty() {
            config = config.with_dates(overrides.dates);
        }

        config.dedup_dates().select_routes(&overrides.routes)
    }

    /// Built-in routes rooted at `base_dir` with every day of the default month.
    pub fn defaults(base_dir: &Path) -> Self {
        let (year, month) = DEFAULT_MONTH;
        PipelineConfig {
            routes: default_routes(base_dir),
            dates: month_dates(year, month).unwrap_or_default(),
        }
    }

    /// Applies a config file over the defaults.
    pub fn with_file(mut self, file: ConfigFile) -> Self {
        if let Some(routes) = file.routes {
            self.routes = routes.into_iter().map(Route::from).collect();
        }
        if let Some(dates) = file.dates {
            self.dates = dates;
        }
        self
    }

    pub fn with_dates(mut self, dates: Vec<String>) -> Self {
        self.dates = dates;
        self
    }

    /// Keeps only the routes named in `ids`, in table order.
    ///
    /// An empty `ids` keeps every route; an id not in the table is an error.
    pub fn select_routes(mut self, ids: &[String]) -> Result<Self> {
        if ids.is_empty() {
            return Ok(self);
        }
        for id in ids {
            if !self.routes.iter().any(|r| &r.id == id) {
                bail!("unknown route `{id}`");
            }
        }
        self.routes.retain(|r| ids.contains(&r.id));
        Ok(self)
    }

    /// Drops repeated dates, keeping the first occurrence, so each partition
    /// file is written once per run.
    pub fn dedup_dates(mut self) -> Self {
        let mut seen = HashSet::new();
        self.dates.retain(|d| seen.insert(d.clone()));
        self
    }
}

/// Every calendar day of `year`-`month` as `YYYY-MM-DD`.
pub fn month_dates(year: i32, month: u32) -> Result<Vec<String>> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| anyhow!("invalid month {year}-{month:02}"))?;

    Ok(first
        .iter_days()
        .take_while(|d| d.month() == month)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .collect())
}

/// Parses a `YYYY-MM` argument into year and month.
pub fn parse_month(value: &str) -> Result<(i32, u32)> {
    let first = NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d")
        .with_context(|| format!("expected YYYY-MM, got `{value}`"))?;
    Ok((first.year(), first.month()))
}
