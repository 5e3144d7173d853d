//! Per-flow derived metrics and flow-table reductions.
//!
//! Every function here is pure. Division by zero never raises: throughput and
//! average delay fall back to 0, loss rate to NaN.

use super::types::*;
use crate::config::{LossConfig, LossConvention, ThroughputConfig, ThroughputConvention, TotalsConfig};

/// Throughput of a flow in the configured output unit
pub fn throughput(record: &FlowRecord, config: &ThroughputConfig) -> f64 {
    let bits = record.rx_bytes * 8.0;
    let scale = config.unit.bits_per_second();

    match config.convention {
        ThroughputConvention::Canonical => {
            if !(record.duration_ms > 0.0) {
                return 0.0;
            }
            let bps = bits / (record.duration_ms / 1e3);
            bps / scale
        }
        ThroughputConvention::LegacyGbpsScaled => {
            if !(record.raw_duration > 0.0) {
                return 0.0;
            }
            let gbps = bits / (record.raw_duration * 1e9);
            gbps * 1e9 / scale
        }
    }
}

/// Mean delay per received packet, in milliseconds
pub fn avg_delay_ms(record: &FlowRecord) -> f64 {
    if record.rx_packets == 0 {
        return 0.0;
    }
    record.delay_sum_ms / record.rx_packets as f64
}

/// Mean jitter per received packet, in milliseconds
pub fn avg_jitter_ms(record: &FlowRecord) -> f64 {
    if record.rx_packets == 0 {
        return 0.0;
    }
    record.jitter_sum_ms / record.rx_packets as f64
}

/// Lost over transmitted packets, in percent; NaN when nothing was transmitted
pub fn loss_rate_pct(record: &FlowRecord) -> f64 {
    if record.tx_packets == 0 {
        return f64::NAN;
    }
    record.lost_packets as f64 / record.tx_packets as f64 * 100.0
}

/// All derived metrics of a flow
pub fn derive_metrics(record: &FlowRecord, config: &ThroughputConfig) -> DerivedMetrics {
    DerivedMetrics {
        throughput: throughput(record, config),
        avg_delay_ms: avg_delay_ms(record),
        avg_jitter_ms: avg_jitter_ms(record),
        loss_rate_pct: loss_rate_pct(record),
    }
}

/// Mean of the non-NaN values, `None` if there are none
pub fn mean_skip_nan(values: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if finite.is_empty() {
        return None;
    }
    Some(finite.iter().sum::<f64>() / finite.len() as f64)
}

/// Loss rates prepared for averaging, honoring `include_undefined_in_mean`
fn loss_rates_for_mean(rates: impl Iterator<Item = f64>, loss: &LossConfig) -> Vec<f64> {
    rates
        .filter_map(|rate| {
            if rate.is_nan() {
                loss.include_undefined_in_mean.then_some(0.0)
            } else {
                Some(rate)
            }
        })
        .collect()
}

/// Per-entity statistics over the matched flows, in entity order
pub fn entity_flow_stats(
    table: &FlowTable,
    entity_count: usize,
    loss: &LossConfig,
) -> Vec<EntityFlowStats> {
    let mut buckets: Vec<Vec<DerivedMetrics>> = vec![Vec::new(); entity_count];
    for (record, metrics) in table.matched_rows() {
        if let Some(bucket) = record.entity_index.and_then(|i| buckets.get_mut(i)) {
            bucket.push(metrics);
        }
    }

    buckets
        .into_iter()
        .map(|rows| {
            let throughput: Vec<f64> = rows.iter().map(|m| m.throughput).collect();
            let delay: Vec<f64> = rows.iter().map(|m| m.avg_delay_ms).collect();
            let jitter: Vec<f64> = rows.iter().map(|m| m.avg_jitter_ms).collect();
            let loss_rates = loss_rates_for_mean(rows.iter().map(|m| m.loss_rate_pct), loss);

            EntityFlowStats {
                flow_count: rows.len(),
                mean_throughput: mean_skip_nan(&throughput),
                mean_delay_ms: mean_skip_nan(&delay),
                mean_loss_rate_pct: mean_skip_nan(&loss_rates),
                mean_jitter_ms: mean_skip_nan(&jitter),
            }
        })
        .collect()
}

/// Trace-wide totals
pub fn flow_totals(table: &FlowTable, loss: &LossConfig, totals: &TotalsConfig) -> FlowTotals {
    let rows: Vec<(&FlowRecord, DerivedMetrics)> = table
        .rows()
        .filter(|(r, _)| totals.include_unmatched || r.is_matched())
        .collect();

    let (total_tx, tx_capped) = sum_counters(rows.iter().map(|(r, _)| r.tx_packets));
    let (total_rx, rx_capped) = sum_counters(rows.iter().map(|(r, _)| r.rx_packets));
    let (total_lost, lost_capped) = sum_counters(rows.iter().map(|(r, _)| r.lost_packets));
    let delay_sum: f64 = rows.iter().map(|(r, _)| r.delay_sum_ms).sum();
    let jitter_sum: f64 = rows.iter().map(|(r, _)| r.jitter_sum_ms).sum();

    let loss_rate_pct = match loss.convention {
        LossConvention::Totals => {
            if total_tx == 0 {
                f64::NAN
            } else {
                (1.0 - total_rx as f64 / total_tx as f64) * 100.0
            }
        }
        LossConvention::PerFlowMean => {
            let rates = loss_rates_for_mean(rows.iter().map(|(_, m)| m.loss_rate_pct), loss);
            mean_skip_nan(&rates).unwrap_or(f64::NAN)
        }
    };

    let (avg_delay_ms, avg_jitter_ms) = if total_rx == 0 {
        (0.0, 0.0)
    } else {
        (delay_sum / total_rx as f64, jitter_sum / total_rx as f64)
    };

    FlowTotals {
        flows_counted: rows.len(),
        includes_unmatched: totals.include_unmatched,
        total_tx_packets: total_tx,
        total_rx_packets: total_rx,
        total_lost_packets: total_lost,
        counters_saturated: tx_capped || rx_capped || lost_capped,
        loss_rate_pct,
        loss_convention: loss.convention,
        avg_delay_ms,
        avg_jitter_ms,
    }
}

/// Sum of packet counters, capped at `u64::MAX`; the flag is set when capped
fn sum_counters(values: impl Iterator<Item = u64>) -> (u64, bool) {
    let mut capped = false;
    let total = values.fold(0u64, |acc, v| {
        acc.checked_add(v).unwrap_or_else(|| {
            capped = true;
            u64::MAX
        })
    });
    (total, capped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThroughputUnit;

    fn record(tx: u64, rx: u64, rx_bytes: f64, duration_ms: f64) -> FlowRecord {
        let mut r = FlowRecord::empty(1);
        r.tx_packets = tx;
        r.rx_packets = rx;
        r.lost_packets = tx.saturating_sub(rx);
        r.rx_bytes = rx_bytes;
        r.duration_ms = duration_ms;
        r.raw_duration = duration_ms * 1e6;
        r
    }

    fn table(records: Vec<FlowRecord>) -> FlowTable {
        FlowTable {
            run: "t".to_string(),
            schema_version: "test".to_string(),
            records,
            skipped_records: 0,
            throughput: ThroughputConfig::default(),
        }
    }

    #[test]
    fn test_canonical_throughput_units() {
        // 1000 bytes over 2 seconds = 4000 bps
        let r = record(10, 10, 1000.0, 2000.0);
        let mut config = ThroughputConfig::default();
        assert!((throughput(&r, &config) - 4.0).abs() < 1e-12);

        config.unit = ThroughputUnit::Bps;
        assert!((throughput(&r, &config) - 4000.0).abs() < 1e-9);

        config.unit = ThroughputUnit::Gbps;
        assert!((throughput(&r, &config) - 4e-6).abs() < 1e-18);
    }

    #[test]
    fn test_legacy_convention_reads_raw_duration_as_seconds() {
        // raw span 2e9 (ns in the trace) is read as 2e9 seconds
        let r = record(10, 10, 1000.0, 2000.0);
        let config = ThroughputConfig {
            unit: ThroughputUnit::Kbps,
            convention: ThroughputConvention::LegacyGbpsScaled,
        };
        let expected_kbps = 1000.0 * 8.0 / (2e9 * 1e9) * 1e6;
        assert!((throughput(&r, &config) - expected_kbps).abs() < 1e-24);
        assert_ne!(throughput(&r, &config), throughput(&r, &ThroughputConfig::default()));
    }

    #[test]
    fn test_zero_division_sentinels() {
        let r = record(0, 0, 500.0, 0.0);
        let m = derive_metrics(&r, &ThroughputConfig::default());
        assert_eq!(m.throughput, 0.0);
        assert_eq!(m.avg_delay_ms, 0.0);
        assert_eq!(m.avg_jitter_ms, 0.0);
        assert!(m.loss_rate_pct.is_nan());

        let negative = record(5, 5, 500.0, -3.0);
        assert_eq!(throughput(&negative, &ThroughputConfig::default()), 0.0);
    }

    #[test]
    fn test_loss_rate() {
        assert_eq!(loss_rate_pct(&record(100, 0, 0.0, 0.0)), 100.0);
        assert_eq!(loss_rate_pct(&record(100, 100, 0.0, 0.0)), 0.0);
        assert_eq!(loss_rate_pct(&record(4, 3, 0.0, 0.0)), 25.0);
    }

    #[test]
    fn test_totals_conventions_differ() {
        let mut a = record(100, 100, 0.0, 0.0);
        a.entity_index = Some(0);
        let mut b = record(10, 0, 0.0, 0.0);
        b.entity_index = Some(1);
        let mut c = record(0, 0, 0.0, 0.0);
        c.entity_index = Some(1);
        let t = table(vec![a, b, c]);

        let totals = flow_totals(&t, &LossConfig::default(), &TotalsConfig::default());
        assert_eq!(totals.total_tx_packets, 110);
        assert_eq!(totals.total_rx_packets, 100);
        assert!((totals.loss_rate_pct - (1.0 - 100.0 / 110.0) * 100.0).abs() < 1e-9);

        let per_flow = LossConfig {
            convention: LossConvention::PerFlowMean,
            include_undefined_in_mean: false,
        };
        let totals = flow_totals(&t, &per_flow, &TotalsConfig::default());
        // NaN row excluded: mean of 0% and 100%
        assert!((totals.loss_rate_pct - 50.0).abs() < 1e-9);

        let including = LossConfig {
            convention: LossConvention::PerFlowMean,
            include_undefined_in_mean: true,
        };
        let totals = flow_totals(&t, &including, &TotalsConfig::default());
        assert!((totals.loss_rate_pct - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_totals_exclude_unmatched_by_default() {
        let mut a = record(10, 10, 0.0, 0.0);
        a.entity_index = Some(0);
        a.delay_sum_ms = 20.0;
        let b = record(50, 50, 0.0, 0.0);
        let t = table(vec![a, b]);

        let totals = flow_totals(&t, &LossConfig::default(), &TotalsConfig::default());
        assert_eq!(totals.flows_counted, 1);
        assert_eq!(totals.total_tx_packets, 10);
        assert!((totals.avg_delay_ms - 2.0).abs() < 1e-12);

        let all = TotalsConfig {
            include_unmatched: true,
        };
        let totals = flow_totals(&t, &LossConfig::default(), &all);
        assert_eq!(totals.flows_counted, 2);
        assert_eq!(totals.total_tx_packets, 60);
    }

    #[test]
    fn test_counter_sums_saturate() {
        assert_eq!(sum_counters([1u64, 2, 3].into_iter()), (6, false));
        assert_eq!(sum_counters([u64::MAX, 1, 5].into_iter()), (u64::MAX, true));
    }

    #[test]
    fn test_entity_flow_stats_in_entity_order() {
        let mut a = record(10, 10, 1000.0, 1000.0);
        a.entity_index = Some(2);
        let mut b = record(0, 0, 0.0, 0.0);
        b.entity_index = Some(0);
        let t = table(vec![a, b, record(1, 1, 1.0, 1.0)]);

        let stats = entity_flow_stats(&t, 3, &LossConfig::default());
        assert_eq!(stats.len(), 3);
        assert_eq!(stats[0].flow_count, 1);
        assert_eq!(stats[0].mean_loss_rate_pct, None);
        assert_eq!(stats[1].flow_count, 0);
        assert_eq!(stats[1].mean_throughput, None);
        assert_eq!(stats[2].mean_loss_rate_pct, Some(0.0));
        assert!((stats[2].mean_throughput.unwrap() - 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_mean_skip_nan() {
        assert_eq!(mean_skip_nan(&[]), None);
        assert_eq!(mean_skip_nan(&[f64::NAN]), None);
        assert_eq!(mean_skip_nan(&[1.0, f64::NAN, 3.0]), Some(2.0));
    }
}
