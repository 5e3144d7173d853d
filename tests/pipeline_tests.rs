#[cfg(test)]
mod pipeline_tests {
    use std::fs;
    use std::io::Write;
    use std::path::Path;

    use tempfile::{NamedTempFile, TempDir};

    use lteflow::analysis::comparator::{compare_runs, required_columns, DirectorySeriesSource};
    use lteflow::analysis::plots::RecordingPlotter;
    use lteflow::analysis::{Pipeline, RunInputs};
    use lteflow::config::{AnalyzerConfig, MissingColumnPolicy, ThroughputConvention};
    use lteflow::config_loader::load_config;
    use lteflow::diagnostics::MemoryDiagnostics;
    use lteflow::schema::Metric;
    use lteflow::utils::workspace::{RunWorkspace, SERIES_FILE, TRACE_FILE};
    use lteflow::AnalyzerError;

    /// Flow A and B belong to UE 0 and UE 1; flow C uses a port outside the range
    const SCENARIO_TRACE: &str = r#"<?xml version="1.0" ?>
<FlowMonitor>
  <FlowStats>
    <Flow flowId="1" txPackets="100" rxPackets="100" txBytes="100000" rxBytes="100000" delaySum="50ms" jitterSum="10ms" timeFirstTxPacket="+1e+09ns" timeLastRxPacket="+3e+09ns" />
    <Flow flowId="2" txPackets="100" rxPackets="0" txBytes="100000" rxBytes="0" delaySum="0ms" />
    <Flow flowId="3" txPackets="50" rxPackets="50" txBytes="5000" rxBytes="5000" delaySum="1000000ns" />
  </FlowStats>
  <Ipv4FlowClassifier>
    <Flow flowId="1" sourceAddress="1.0.0.2" destinationAddress="7.0.0.2" protocol="17" sourcePort="49153" destinationPort="5000" />
    <Flow flowId="2" sourceAddress="1.0.0.2" destinationAddress="7.0.0.3" protocol="17" sourcePort="49154" destinationPort="5001" />
    <Flow flowId="3" sourceAddress="1.0.0.2" destinationAddress="7.0.0.4" protocol="17" sourcePort="49155" destinationPort="9999" />
  </Ipv4FlowClassifier>
</FlowMonitor>"#;

    const SCENARIO_SERIES: &str = "\
Time(s),UE_0_Throughput(Kbps),UE_1_Throughput(Kbps),Avg_Throughput(Kbps),Avg_Latency(ms),UE_0_PacketLoss(%),UE_1_PacketLoss(%)
0.1,100,200,150,5,0,10
0.2,300,400,350,7,0,30
";

    fn write_run(dir: &Path, trace: Option<&str>, series: Option<&str>) {
        fs::create_dir_all(dir).unwrap();
        if let Some(trace) = trace {
            fs::write(dir.join(TRACE_FILE), trace).unwrap();
        }
        if let Some(series) = series {
            fs::write(dir.join(SERIES_FILE), series).unwrap();
        }
    }

    #[test]
    fn test_end_to_end_scenario() {
        let dir = TempDir::new().unwrap();
        write_run(dir.path(), Some(SCENARIO_TRACE), Some(SCENARIO_SERIES));

        let pipeline = Pipeline::new(AnalyzerConfig::default()).unwrap();
        let diagnostics = MemoryDiagnostics::new();
        let analysis = pipeline
            .analyze("scenario", &RunInputs::in_dir(dir.path()), &diagnostics)
            .unwrap();

        let rows: Vec<_> = analysis.flows.rows().collect();
        assert_eq!(rows.len(), 3);

        let (a, a_metrics) = &rows[0];
        assert_eq!(a.entity_index, Some(0));
        assert!((a_metrics.avg_delay_ms - 0.5).abs() < 1e-12);
        assert_eq!(a_metrics.loss_rate_pct, 0.0);
        // 100000 bytes over 2 s = 400 Kbps
        assert!((a_metrics.throughput - 400.0).abs() < 1e-9);

        let (b, b_metrics) = &rows[1];
        assert_eq!(b.entity_index, Some(1));
        assert_eq!(b_metrics.avg_delay_ms, 0.0);
        assert_eq!(b_metrics.loss_rate_pct, 100.0);
        assert_eq!(b_metrics.throughput, 0.0);

        let (c, c_metrics) = &rows[2];
        assert_eq!(c.entity_index, None);
        assert!((c.delay_sum_ms - 1.0).abs() < 1e-12);
        assert!((c_metrics.avg_delay_ms - 0.02).abs() < 1e-12);

        let report = &analysis.report;
        assert_eq!(report.unmatched_flows, 1);
        let ue0 = report.per_entity[0].flows.as_ref().unwrap();
        let ue1 = report.per_entity[1].flows.as_ref().unwrap();
        assert_eq!(ue0.flow_count, 1);
        assert_eq!(ue0.mean_delay_ms, Some(0.5));
        assert_eq!(ue1.mean_loss_rate_pct, Some(100.0));

        // Totals exclude the unmatched flow C by default
        let totals = report.totals.as_ref().unwrap();
        assert_eq!(totals.flows_counted, 2);
        assert_eq!(totals.total_tx_packets, 200);
        assert_eq!(totals.total_rx_packets, 100);
        assert!((totals.loss_rate_pct - 50.0).abs() < 1e-9);

        assert_eq!(report.per_entity[0].series.throughput, Some(200.0));
        assert_eq!(report.per_entity[1].series.throughput, Some(300.0));
        assert_eq!(report.overall.throughput, Some(250.0));
        assert_eq!(report.overall.latency_ms, Some(6.0));
        assert_eq!(report.overall.packet_loss_pct, Some(10.0));
        assert!(!report.is_metric_degraded(Metric::Latency));
        assert!(diagnostics.contains("classified 2 of 3 flows"));
    }

    #[test]
    fn test_missing_latency_column_degrades_report() {
        let dir = TempDir::new().unwrap();
        let series = "Time(s),UE_0_Throughput(Kbps),UE_0_PacketLoss(%)\n0.1,10,1\n0.2,30,3\n";
        write_run(dir.path(), Some(SCENARIO_TRACE), Some(series));

        let pipeline = Pipeline::new(AnalyzerConfig::default()).unwrap();
        let analysis = pipeline
            .analyze("degraded", &RunInputs::in_dir(dir.path()), &MemoryDiagnostics::new())
            .unwrap();

        let report = &analysis.report;
        assert_eq!(report.overall.throughput, Some(20.0));
        assert_eq!(report.overall.packet_loss_pct, Some(2.0));
        assert_eq!(report.overall.latency_ms, None);
        assert!(report.is_metric_degraded(Metric::Latency));
    }

    #[test]
    fn test_missing_inputs_are_reported_per_run() {
        let dir = TempDir::new().unwrap();
        write_run(dir.path(), Some(SCENARIO_TRACE), None);

        let pipeline = Pipeline::new(AnalyzerConfig::default()).unwrap();
        let err = pipeline
            .analyze("v7", &RunInputs::in_dir(dir.path()), &MemoryDiagnostics::new())
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::SeriesNotFound { ref run, .. } if run == "v7"));
        assert!(err.to_string().contains(SERIES_FILE));
    }

    #[test]
    fn test_malformed_trace_aborts_run() {
        let dir = TempDir::new().unwrap();
        write_run(dir.path(), Some("<FlowMonitor><FlowStats>"), Some(SCENARIO_SERIES));

        let pipeline = Pipeline::new(AnalyzerConfig::default()).unwrap();
        let err = pipeline
            .analyze("broken", &RunInputs::in_dir(dir.path()), &MemoryDiagnostics::new())
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::TraceParse { .. }));
    }

    #[test]
    fn test_process_run_writes_outputs() {
        let input = TempDir::new().unwrap();
        write_run(input.path(), Some(SCENARIO_TRACE), Some(SCENARIO_SERIES));
        let output = TempDir::new().unwrap();
        let workspace = RunWorkspace::create(output.path().join("v1")).unwrap();

        let pipeline = Pipeline::new(AnalyzerConfig::default()).unwrap();
        let plotter = RecordingPlotter::new();
        let outcome = pipeline
            .process_run(
                "v1",
                &RunInputs::in_dir(input.path()),
                &workspace,
                &plotter,
                &MemoryDiagnostics::new(),
            )
            .unwrap();

        assert_eq!(outcome.flow_rows, 2);
        assert!(!outcome.plots.is_empty());
        assert_eq!(plotter.calls().len(), outcome.plots.len());

        let csv = fs::read_to_string(workspace.flow_table_path()).unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert!(!csv.contains("9999"));

        let md = fs::read_to_string(workspace.markdown_report_path()).unwrap();
        assert!(md.contains("## Flow Monitor Totals"));
        assert!(md.contains("../plots/ue-throughput-time-series.svg"));

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(workspace.json_report_path()).unwrap()).unwrap();
        assert_eq!(json["run"], "v1");
        assert_eq!(json["unmatched_flows"], 1);
    }

    #[test]
    fn test_batch_isolates_failed_runs() {
        let input = TempDir::new().unwrap();
        write_run(&input.path().join("run_ok"), Some(SCENARIO_TRACE), Some(SCENARIO_SERIES));
        write_run(&input.path().join("run_no_trace"), None, Some(SCENARIO_SERIES));
        let output = TempDir::new().unwrap();

        let pipeline = Pipeline::new(AnalyzerConfig::default()).unwrap();
        let diagnostics = MemoryDiagnostics::new();
        let summary = pipeline
            .process_batch(input.path(), output.path(), &RecordingPlotter::new(), &diagnostics)
            .unwrap();

        assert_eq!(summary.results.len(), 2);
        assert_eq!(summary.succeeded(), 1);
        assert!(!summary.all_failed());

        let failed = summary.failed();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].run, "run_no_trace");

        let ok = summary.results.iter().find(|r| r.run == "run_ok").unwrap();
        assert!(ok.output_dir.join("reports").join("simulation-report.md").is_file());
        assert!(ok
            .output_dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("run_ok_output_"));
        assert!(diagnostics.contains("run failed"));
        assert!(diagnostics.contains("Processing 2 runs"));
        assert!(diagnostics.contains("Batch complete: 1 succeeded, 1 failed"));
    }

    #[test]
    fn test_compare_three_runs_one_invalid() {
        let input = TempDir::new().unwrap();
        write_run(
            &input.path().join("run_a"),
            None,
            Some("Time(s),Avg_Throughput(Kbps)\n0,1\n1,2\n"),
        );
        write_run(&input.path().join("run_b"), None, Some("Step,Avg_Throughput(Kbps)\n0,5\n"));
        write_run(
            &input.path().join("run_c"),
            None,
            Some("Time(s),Avg_Throughput(Kbps),UE_0_PacketLoss(%)\n0,3,4\n"),
        );

        let pipeline = Pipeline::new(AnalyzerConfig::default()).unwrap();
        let config = pipeline.config();
        let schema = pipeline.series_schema();
        let diagnostics = MemoryDiagnostics::new();
        let runs: Vec<String> = ["run_c", "run_b", "run_a"].iter().map(|s| s.to_string()).collect();

        let report = compare_runs(
            &DirectorySeriesSource::new(input.path()),
            &runs,
            &config.comparison.metrics,
            schema,
            &required_columns(schema, config),
            &diagnostics,
        );

        let throughput = report.set("Avg_Throughput(Kbps)").unwrap();
        let order: Vec<&str> = throughput.series.iter().map(|s| s.run.as_str()).collect();
        assert_eq!(order, vec!["run_c", "run_a"]);
        assert_eq!(throughput.series[1].points, vec![(0.0, 1.0), (1.0, 2.0)]);

        assert_eq!(report.skipped_runs.len(), 1);
        assert_eq!(report.skipped_runs[0].run, "run_b");
        assert!(report.warnings.iter().any(|w| w.contains("run_b") && w.contains("Time(s)")));

        // Default policy synthesizes loss from UE columns, but only run_c has any
        let loss = report.set("Avg_PacketLoss(%)").unwrap();
        assert_eq!(loss.series.len(), 2);
        assert_eq!(loss.series[0].points, vec![(0.0, 4.0)]);
        assert_eq!(loss.series[1].points, vec![(0.0, 0.0), (1.0, 0.0)]);
    }

    #[test]
    fn test_yaml_config_selects_conventions() {
        let yaml = r#"
classifier:
  port_range_start: 6000
  entity_count: 2
throughput:
  unit: mbps
  convention: legacy-gbps-scaled
comparison:
  metrics:
    - column: "Avg_Jitter(ms)"
      missing:
        policy: zero
"#;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.classifier.port_range_start, 6000);
        assert_eq!(config.throughput.convention, ThroughputConvention::LegacyGbpsScaled);
        assert_eq!(config.comparison.metrics[0].missing, MissingColumnPolicy::Zero);

        let pipeline = Pipeline::new(config).unwrap();
        assert_eq!(pipeline.classifier().classify(6001), Some(1));
        assert_eq!(pipeline.classifier().classify(5000), None);
    }

    #[test]
    fn test_invalid_port_range_rejected() {
        let yaml = "classifier:\n  port_range_start: 65535\n  entity_count: 3\n";
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        assert!(load_config(file.path()).is_err());
    }
}
