// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in `report` pipeline: scrape → parse → index → summarize.
//!
//! The step bodies simulate acquisition work with small cancel-aware
//! waits; real scrapers and parsers plug in behind the same step
//! interface. The summarize step leaves a report artifact on disk.

use pulse_core::{LogLevel, RetryPolicy, StepError};
use pulse_engine::{FnStep, OperationDefinition, StepRef};
use std::path::{Path, PathBuf};
use std::time::Duration;

const PAGES: u64 = 5;

pub fn report_definition(reports_dir: &Path) -> OperationDefinition {
    let reports_dir: PathBuf = reports_dir.to_path_buf();

    let scrape = FnStep::new(
        StepRef::new("scrape", "Scrape exchange data")
            .timeout(Duration::from_secs(60))
            .retry(RetryPolicy::new(3, Duration::from_millis(250), Duration::from_secs(5))),
        |ctx| async move {
            for page in 1..=PAGES {
                ctx.sleep(Duration::from_millis(10)).await?;
                ctx.reporter().progress(
                    (page * 100 / PAGES) as f64,
                    format!("fetched page {page}/{PAGES}"),
                );
            }
            ctx.set_value("scraped_rows", serde_json::json!(PAGES * 40));
            Ok(())
        },
    );

    let parse = FnStep::new(
        StepRef::new("parse", "Parse raw pages").timeout(Duration::from_secs(30)),
        |ctx| async move {
            let rows = ctx
                .get_value("scraped_rows")
                .and_then(|v| v.as_u64())
                .ok_or_else(|| StepError::internal("scrape left no row count"))?;
            ctx.sleep(Duration::from_millis(10)).await?;
            ctx.reporter().progress(100.0, format!("parsed {rows} rows"));
            ctx.set_value("parsed_rows", serde_json::json!(rows));
            Ok(())
        },
    );

    let index = FnStep::new(
        StepRef::new("index", "Index parsed records").timeout(Duration::from_secs(30)),
        |ctx| async move {
            ctx.sleep(Duration::from_millis(10)).await?;
            ctx.reporter().progress(100.0, "index refreshed");
            Ok(())
        },
    );

    let summarize = FnStep::new(
        StepRef::new("summarize", "Write summary report").timeout(Duration::from_secs(30)),
        move |ctx| {
            let reports_dir = reports_dir.clone();
            async move {
                ctx.checkpoint()?;
                let rows =
                    ctx.get_value("parsed_rows").and_then(|v| v.as_u64()).unwrap_or_default();
                let path = reports_dir.join(format!("report-{}.json", ctx.run_id()));
                let body = serde_json::json!({
                    "run_id": ctx.run_id().as_str(),
                    "rows": rows,
                });

                tokio::fs::create_dir_all(&reports_dir)
                    .await
                    .map_err(|e| StepError::unavailable(format!("reports dir: {e}")))?;
                tokio::fs::write(&path, serde_json::to_vec_pretty(&body).unwrap_or_default())
                    .await
                    .map_err(|e| StepError::unavailable(format!("write report: {e}")))?;

                ctx.reporter().artifact("report", path.display().to_string());
                ctx.reporter().log(
                    LogLevel::Info,
                    "summary written",
                    serde_json::Map::new(),
                );
                Ok(())
            }
        },
    )
    .skip_when(|params| params["skip_summary"].as_bool().unwrap_or(false));

    // Step order is the dependency order; ids double as progress keys.
    OperationDefinition::builder("report", "Scrape and summarize")
        .step(scrape)
        .step(parse)
        .step(index)
        .step(summarize)
        .build()
        .unwrap_or_else(|err| {
            // The definition is static; this cannot fail at runtime.
            unreachable!("built-in definition invalid: {err}")
        })
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
