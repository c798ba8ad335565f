use crate::models::{EvaluationRecord, RunSummary};
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

/// Output format options for the console summary
#[derive(Debug, Clone, Copy, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    Plain,
    Json,
}

/// Print the run summary in the specified format
pub fn print_summary(summary: &RunSummary, format: OutputFormat) {
    match format {
        OutputFormat::Plain => print!("{}", render_plain(summary)),
        OutputFormat::Json => print_json(summary),
    }
}

/// Render the summary as plain text
pub fn render_plain(summary: &RunSummary) -> String {
    let mut out = String::new();

    let Some(average) = summary.average_score else {
        let _ = writeln!(out, "\n--- No results to evaluate. ---");
        return out;
    };

    let _ = writeln!(out, "\n--- Evaluation Complete ---");
    let _ = writeln!(
        out,
        "Average Score for '{}': {:.2} / 5.0",
        summary.label, average
    );
    let _ = writeln!(out, "Evaluated items: {}", summary.evaluated);
    let _ = writeln!(out, "Answer failures: {}", summary.answer_failures);
    let _ = writeln!(out, "Judge failures:  {}", summary.judge_failures);
    out.push('\n');

    let _ = writeln!(out, "Score distribution");
    let _ = writeln!(out, "{}", "-".repeat(18));
    for (score, count) in summary.distribution.iter().enumerate().rev() {
        if score == 0 {
            let _ = writeln!(out, "  0 (failed): {}", count);
        } else {
            let _ = writeln!(out, "  {}:          {}", score, count);
        }
    }
    out.push('\n');

    render_categories_plain(summary, &mut out);
    out
}

/// Per-category table of mean, median and mode
fn render_categories_plain(summary: &RunSummary, out: &mut String) {
    if summary.categories.is_empty() {
        let _ = writeln!(out, "No category statistics available.");
        return;
    }

    let _ = writeln!(
        out,
        "{:<24} {:<6} {:<8} {:<8} {:<6}",
        "Category", "Count", "Mean", "Median", "Mode"
    );
    let _ = writeln!(out, "{}", "-".repeat(56));

    for (category, stats) in &summary.categories {
        let _ = writeln!(
            out,
            "{:<24} {:<6} {:<8.2} {:<8.2} {:<6}",
            category, stats.count, stats.mean, stats.median, stats.mode
        );
    }
}

/// Print the summary in JSON format
fn print_json(summary: &RunSummary) {
    match serde_json::to_string_pretty(summary) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing summary to JSON: {}", e),
    }
}

/// Write all records as an indented JSON array, creating the directory if needed
pub fn write_results(records: &[EvaluationRecord], path: &Path) -> Result<()> {
    let json_content =
        serde_json::to_string_pretty(records).context("Failed to serialize results to JSON")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    std::fs::write(path, json_content)
        .with_context(|| format!("Failed to write results to: {}", path.display()))
}
