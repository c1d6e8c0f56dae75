//! Pipeline execution engine.
//!
//! Applies steps sequentially through a [`Catalog`], aborting on the first
//! failure, and generates a run report alongside the cleaned table.

use super::catalog::{Catalog, StandardCatalog};
use super::error::StepError;
use super::spec::{PipelineSpec, Step};
use super::validation::validate_pipeline;
use crate::io::{load_table, save_table};
use anyhow::{Context as _, Result};
use polars::prelude::*;
use std::path::Path;
use std::time::{Duration, Instant};

/// Report generated after pipeline execution
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Number of rows before processing
    pub rows_before: usize,

    /// Number of columns before processing
    pub columns_before: usize,

    /// Number of rows after processing
    pub rows_after: usize,

    /// Number of columns after processing
    pub columns_after: usize,

    /// Number of steps successfully applied
    pub steps_applied: usize,

    /// Time taken for execution
    pub duration: Duration,
}

impl RunReport {
    pub fn rows_removed(&self) -> usize {
        self.rows_before.saturating_sub(self.rows_after)
    }

    /// Create a summary message
    pub fn summary(&self) -> String {
        format!(
            "Pipeline completed: {} rows ({} → {}), {} columns ({} → {}), {} steps, {:.2}s",
            change(self.rows_before, self.rows_after),
            self.rows_before,
            self.rows_after,
            change(self.columns_before, self.columns_after),
            self.columns_before,
            self.columns_after,
            self.steps_applied,
            self.duration.as_secs_f64()
        )
    }
}

fn change(before: usize, after: usize) -> &'static str {
    match after.cmp(&before) {
        std::cmp::Ordering::Greater => "added",
        std::cmp::Ordering::Less => "removed",
        std::cmp::Ordering::Equal => "unchanged",
    }
}

/// A cleaned table together with the report of the run that produced it.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub table: DataFrame,
    pub report: RunReport,
}

/// Apply `steps` to `df` with the standard catalog.
pub fn apply(df: &DataFrame, steps: &[Step]) -> Result<PipelineRun, StepError> {
    apply_with(&StandardCatalog, df, steps)
}

/// Apply `steps` in order, each on the previous step's output.
///
/// The first failing step aborts the run; its error carries the step's
/// position and operation name. `df` itself is never modified. The returned
/// table is a single contiguous chunk with rows numbered densely from zero.
pub fn apply_with<C: Catalog + ?Sized>(
    catalog: &C,
    df: &DataFrame,
    steps: &[Step],
) -> Result<PipelineRun, StepError> {
    let start = Instant::now();
    let mut table = df.clone();

    for (index, step) in steps.iter().enumerate() {
        let operation = step.name();
        tracing::info!(
            step = index + 1,
            operation,
            rows = table.height(),
            "Applying pipeline step"
        );

        table = step.apply(catalog, &table).map_err(|source| {
            tracing::error!(step = index + 1, operation, error = %source, "Pipeline aborted");
            StepError {
                index,
                operation,
                source,
            }
        })?;
    }

    table.as_single_chunk_par();

    let report = RunReport {
        rows_before: df.height(),
        columns_before: df.width(),
        rows_after: table.height(),
        columns_after: table.width(),
        steps_applied: steps.len(),
        duration: start.elapsed(),
    };
    tracing::info!(
        rows_before = report.rows_before,
        rows_after = report.rows_after,
        steps = report.steps_applied,
        "Pipeline finished"
    );

    Ok(PipelineRun { table, report })
}

/// Execute a pipeline spec on a local file and write the cleaned table.
///
/// `spec` is validated against the input schema before any step runs.
pub fn run_pipeline(spec: &PipelineSpec, input_path: &Path, output_path: &Path) -> Result<RunReport> {
    let input = load_table(input_path).context("Failed to load input file")?;

    let findings = validate_pipeline(spec, &input.schema());
    if !findings.is_empty() {
        return Err(anyhow::anyhow!(
            "Pipeline validation failed:\n{}",
            findings
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n")
        ));
    }

    if output_path.exists() && !spec.output.overwrite {
        return Err(anyhow::anyhow!(
            "Output file already exists and overwrite is false: {}",
            output_path.display()
        ));
    }

    let PipelineRun { mut table, report } = apply(&input, &spec.steps)?;
    save_table(&mut table, output_path, &spec.output.format)?;

    tracing::info!(output = %output_path.display(), "{}", report.summary());
    Ok(report)
}
