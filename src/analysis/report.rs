//! Report generation for a processed run.
//!
//! Writes the derived flow table (CSV), the Markdown summary and a JSON dump
//! of the aggregate report.

use std::fs;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, Result};
use serde::Serialize;

use super::types::*;
use crate::config::{AnalyzerConfig, ThroughputUnit};
use crate::schema::Metric;

/// One row of the derived flow table
#[derive(Debug, Serialize)]
struct FlowRow<'a> {
    flow_id: u64,
    entity: &'a str,
    destination_port: Option<u16>,
    source_port: Option<u16>,
    source_address: &'a str,
    destination_address: &'a str,
    protocol: &'a str,
    tx_bytes: f64,
    rx_bytes: f64,
    tx_packets: u64,
    rx_packets: u64,
    lost_packets: u64,
    loss_rate_pct: f64,
    throughput: f64,
    delay_sum_ms: f64,
    avg_delay_ms: f64,
    jitter_sum_ms: f64,
    avg_jitter_ms: f64,
    duration_ms: f64,
}

/// Header of the derived flow table
pub fn flow_table_header(unit: ThroughputUnit) -> Vec<String> {
    [
        "FlowID",
        "UE",
        "DestinationPort",
        "SourcePort",
        "SourceAddress",
        "DestinationAddress",
        "Protocol",
        "TxBytes",
        "RxBytes",
        "TxPackets",
        "RxPackets",
        "LostPackets",
        "PacketLossRate(%)",
    ]
    .iter()
    .map(|s| s.to_string())
    .chain(std::iter::once(format!("Throughput({})", unit.label())))
    .chain(
        [
            "DelaySum(ms)",
            "AvgDelay(ms)",
            "JitterSum(ms)",
            "AvgJitter(ms)",
            "Duration(ms)",
        ]
        .iter()
        .map(|s| s.to_string()),
    )
    .collect()
}

/// Write the classified flows as CSV and return the number of rows.
///
/// Nothing is written when no flow was classified.
pub fn write_flow_csv(table: &FlowTable, config: &AnalyzerConfig, output_path: &Path) -> Result<usize> {
    let names = config.entity_names();
    let matched: Vec<(&FlowRecord, DerivedMetrics)> = table.matched_rows().collect();

    if matched.is_empty() {
        log::warn!(
            "[{}] No classified flows; {} not written",
            table.run,
            output_path.display()
        );
        return Ok(0);
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(output_path)
        .with_context(|| format!("Failed to create flow table {}", output_path.display()))?;

    writer
        .write_record(flow_table_header(table.throughput.unit))
        .with_context(|| format!("Failed to write header of {}", output_path.display()))?;

    for (record, metrics) in &matched {
        let entity = record
            .entity_index
            .and_then(|i| names.get(i))
            .map(String::as_str)
            .unwrap_or(UNKNOWN);
        let row = FlowRow {
            flow_id: record.flow_id,
            entity,
            destination_port: record.destination_port,
            source_port: record.source_port,
            source_address: &record.source_address,
            destination_address: &record.destination_address,
            protocol: &record.protocol,
            tx_bytes: record.tx_bytes,
            rx_bytes: record.rx_bytes,
            tx_packets: record.tx_packets,
            rx_packets: record.rx_packets,
            lost_packets: record.lost_packets,
            loss_rate_pct: metrics.loss_rate_pct,
            throughput: metrics.throughput,
            delay_sum_ms: record.delay_sum_ms,
            avg_delay_ms: metrics.avg_delay_ms,
            jitter_sum_ms: record.jitter_sum_ms,
            avg_jitter_ms: metrics.avg_jitter_ms,
            duration_ms: record.duration_ms,
        };
        writer
            .serialize(&row)
            .with_context(|| format!("Failed to write flow {} to {}", record.flow_id, output_path.display()))?;
    }

    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", output_path.display()))?;

    log::info!(
        "[{}] Flow table with {} rows written to {}",
        table.run,
        matched.len(),
        output_path.display()
    );
    Ok(matched.len())
}

/// Serialize any report as pretty JSON
pub fn generate_json_report<T: Serialize>(report: &T, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report to JSON")?;

    fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON report to {}", output_path.display()))?;

    log::info!("JSON report written to {}", output_path.display());
    Ok(())
}

/// Generate the Markdown summary; plot links are relative to the reports directory
pub fn generate_markdown_report(
    report: &AggregateReport,
    plots: &[PathBuf],
    throughput_unit: ThroughputUnit,
    output_path: &Path,
) -> Result<()> {
    let content = render_markdown(report, plots, throughput_unit, chrono::Local::now());

    fs::write(output_path, content)
        .with_context(|| format!("Failed to write Markdown report to {}", output_path.display()))?;

    log::info!("Markdown report written to {}", output_path.display());
    Ok(())
}

fn render_markdown(
    report: &AggregateReport,
    plots: &[PathBuf],
    throughput_unit: ThroughputUnit,
    generated: chrono::DateTime<chrono::Local>,
) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push("# Simulation Report".to_string());
    lines.push(String::new());
    lines.push(format!("**Run:** {}", report.run));
    lines.push(format!("**Report Generated:** {}", generated.format("%Y-%m-%d %H:%M:%S")));
    lines.push(format!("**Series Schema:** {}", report.series_schema));
    lines.push(String::new());

    // Summary
    lines.push("## Summary".to_string());
    for metric in Metric::ALL {
        lines.push(format!(
            "- **Average {}:** {}",
            metric.label(),
            fmt_with_unit(report.overall.get(metric), metric.series_unit())
        ));
    }
    lines.push(format!("- **Time Steps:** {}", report.series_rows));
    lines.push(String::new());

    // Flow monitor
    if let Some(ref totals) = report.totals {
        lines.push("## Flow Monitor Totals".to_string());
        lines.push(format!(
            "- **Flows Counted:** {}{}",
            totals.flows_counted,
            if totals.includes_unmatched { " (including unmatched)" } else { "" }
        ));
        lines.push(format!("- **Tx Packets:** {}", totals.total_tx_packets));
        lines.push(format!("- **Rx Packets:** {}", totals.total_rx_packets));
        lines.push(format!("- **Lost Packets:** {}", totals.total_lost_packets));
        if totals.counters_saturated {
            lines.push("- **Warning:** packet totals overflowed and were capped".to_string());
        }
        lines.push(format!(
            "- **Packet Loss Rate ({:?}):** {}",
            totals.loss_convention,
            fmt_with_unit(defined(totals.loss_rate_pct), "%")
        ));
        lines.push(format!("- **Average Delay:** {:.3} ms", totals.avg_delay_ms));
        lines.push(format!("- **Average Jitter:** {:.3} ms", totals.avg_jitter_ms));
        lines.push(format!("- **Unmatched Flows:** {}", report.unmatched_flows));
        if report.skipped_flow_records > 0 {
            lines.push(format!("- **Skipped Flow Records:** {}", report.skipped_flow_records));
        }
        lines.push(String::new());
    }

    // Per-entity
    lines.push("## Per-Entity Metrics".to_string());
    lines.push(String::new());
    lines.push(format!(
        "| Entity | Throughput (Kbps) | Latency (ms) | Packet Loss (%) | Jitter (ms) | Flows | Flow Throughput ({}) | Flow Loss (%) |",
        throughput_unit.label()
    ));
    lines.push("|---|---|---|---|---|---|---|---|".to_string());
    for entity in &report.per_entity {
        let (flows, flow_tput, flow_loss) = match entity.flows {
            Some(ref f) => (
                f.flow_count.to_string(),
                fmt(f.mean_throughput),
                fmt(f.mean_loss_rate_pct),
            ),
            None => ("-".to_string(), "-".to_string(), "-".to_string()),
        };
        lines.push(format!(
            "| {} | {} | {} | {} | {} | {} | {} | {} |",
            entity.name,
            fmt(entity.series.throughput),
            fmt(entity.series.latency_ms),
            fmt(entity.series.packet_loss_pct),
            fmt(entity.series.jitter_ms),
            flows,
            flow_tput,
            flow_loss
        ));
    }
    lines.push(String::new());

    if report.is_degraded() {
        lines.push("## Degraded Metrics".to_string());
        for d in &report.degraded {
            lines.push(format!("- **{}:** {}", d.metric.label(), d.reason));
        }
        lines.push(String::new());
    }

    lines.push("## Matched Columns".to_string());
    for group in &report.matched_columns {
        let columns = if group.columns.is_empty() {
            "none".to_string()
        } else {
            group
                .columns
                .iter()
                .map(|c| format!("`{}`", c))
                .collect::<Vec<_>>()
                .join(", ")
        };
        lines.push(format!("- **{}:** {}", group.metric.label(), columns));
    }
    lines.push(String::new());

    if !plots.is_empty() {
        lines.push("## Plots".to_string());
        for plot in plots {
            let Some(file_name) = plot.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            lines.push(format!("### {}", plot_title(&file_name)));
            lines.push(format!("![{}](../plots/{})", file_name, file_name));
            lines.push(String::new());
        }
    }

    lines.push("## Detailed Metrics".to_string());
    lines.push("See `flowmon_parsed.csv` for detailed flow statistics.".to_string());
    lines.push(String::new());

    lines.join("\n")
}

/// Print a summary to stdout
pub fn print_summary(report: &AggregateReport) {
    println!("\n=== SIMULATION SUMMARY: {} ===\n", report.run);
    for metric in Metric::ALL {
        println!(
            "{:<14} {}",
            format!("{}:", metric.label()),
            fmt_with_unit(report.overall.get(metric), metric.series_unit())
        );
    }

    if let Some(ref totals) = report.totals {
        println!("\nFlow Monitor:");
        println!("  Flows: {}", totals.flows_counted);
        println!("  Tx/Rx packets: {}/{}", totals.total_tx_packets, totals.total_rx_packets);
        println!("  Loss rate: {}", fmt_with_unit(defined(totals.loss_rate_pct), "%"));
        println!("  Avg delay: {:.3} ms", totals.avg_delay_ms);
    }

    if report.is_degraded() {
        println!("\nDegraded:");
        for d in &report.degraded {
            println!("  {}: {}", d.metric.label(), d.reason);
        }
    }

    println!();
}

/// Print a comparison summary to stdout
pub fn print_comparison_summary(report: &ComparisonReport) {
    println!("\n=== RUN COMPARISON ===\n");
    println!("Runs requested: {}", report.runs_requested.join(", "));
    for set in &report.sets {
        let runs: Vec<&str> = set.series.iter().map(|s| s.run.as_str()).collect();
        println!("  {}: {}", set.metric, runs.join(", "));
    }
    if !report.skipped_runs.is_empty() {
        println!("\nSkipped runs:");
        for skipped in &report.skipped_runs {
            println!("  {}: {}", skipped.run, skipped.reason);
        }
    }
    println!();
}

fn defined(value: f64) -> Option<f64> {
    (!value.is_nan()).then_some(value)
}

fn fmt(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "n/a".to_string())
}

fn fmt_with_unit(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{:.2} {}", v, unit),
        None => "n/a".to_string(),
    }
}

/// "ue-throughput-time-series.svg" -> "Ue Throughput Time Series"
fn plot_title(file_name: &str) -> String {
    let stem = file_name.rsplit_once('.').map(|(s, _)| s).unwrap_or(file_name);
    stem.split(|c| c == '-' || c == '_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
