//! Drives both stages over every configured route.
//!
//! Stage 1 finishes for all routes before Stage 2 starts. Any error stops the
//! run; files already written are left as they are.

use anyhow::Result;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::partition::{PartitionReport, partition_route};
use crate::project::{ProjectionReport, project_file};

/// What a run produced for one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSummary {
    pub route_id: String,
    /// Rows in the intermediate file, when Stage 1 ran in this process.
    pub projected_rows: Option<usize>,
    pub partitions: Vec<PartitionReport>,
}

impl RouteSummary {
    pub fn partitioned_rows(&self) -> usize {
        self.partitions.iter().map(|p| p.rows).sum()
    }

    /// Rows whose date is not in the configured list and so were left out of
    /// every partition file.
    pub fn uncovered_rows(&self) -> Option<usize> {
        self.projected_rows
            .map(|projected| projected.saturating_sub(self.partitioned_rows()))
    }
}

/// Stage 1 over every route, in order.
pub fn run_projection(config: &PipelineConfig) -> Result<Vec<(String, ProjectionReport)>> {
    let mut reports = Vec::with_capacity(config.routes.len());

    for route in &config.routes {
        info!(route = %route.id, input = %route.source_path.display(), "Processing input");
        info!(route = %route.id, output = %route.intermediate_path.display(), "Generating output");

        let report = project_file(&route.source_path, &route.intermediate_path)?;
        reports.push((route.id.clone(), report));
    }

    Ok(reports)
}

/// Stage 2 over every route, in order.
///
/// `projected` carries Stage 1 row counts by route id; routes found there get
/// a warning when some of their rows fall outside the date list.
pub fn run_partition(
    config: &PipelineConfig,
    projected: &HashMap<String, usize>,
) -> Result<Vec<RouteSummary>> {
    let mut summaries = Vec::with_capacity(config.routes.len());

    for route in &config.routes {
        let summary = RouteSummary {
            route_id: route.id.clone(),
            projected_rows: projected.get(&route.id).copied(),
            partitions: partition_route(route, &config.dates)?,
        };

        if let Some(uncovered) = summary.uncovered_rows().filter(|n| *n > 0) {
            warn!(
                route = %route.id,
                uncovered,
                "Rows dated outside the configured date list were not written to any partition"
            );
        }

        summaries.push(summary);
    }

    Ok(summaries)
}

/// Runs Stage 1 then Stage 2.
pub fn run(config: &PipelineConfig) -> Result<Vec<RouteSummary>> {
    info!(
        routes = config.routes.len(),
        dates = config.dates.len(),
        "Starting pipeline"
    );

    let projected: HashMap<String, usize> = run_projection(config)?
        .into_iter()
        .map(|(id, report)| (id, report.rows))
        .collect();

    let summaries = run_partition(config, &projected)?;

    let files: usize = summaries.iter().map(|s| s.partitions.len()).sum();
    info!(routes = summaries.len(), files, "Pipeline complete");
    Ok(summaries)
}
