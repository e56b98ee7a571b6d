//! Multi-trial loop with a bounded error budget and periodic result batches

use super::{ClientOutcome, ClientResult, ProtocolDriver};
use crate::error::Result;
use crate::logging::Logger;
use crate::models::{BenchmarkResult, Config, TrialOutput};
use crate::models::result::TrialOutcome;
use crate::output::ResultSink;
use crate::stats::{StatisticsCollector, ThroughputSummary};
use crate::types::AmbiguousPolicy;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Knobs of one benchmark run
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub trials: u32,
    pub client_timeout: Option<Duration>,
    pub setup_timeout: Duration,
    /// Accumulated trial time after which the current batch is emitted
    pub log_chunk: Duration,
    pub ambiguous: AmbiguousPolicy,
    pub collect_statistics: bool,
    pub label: String,
    pub data_size: u64,
    pub cca: String,
    pub pep: bool,
}

impl RunnerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            trials: config.trials,
            client_timeout: config.timeout(),
            setup_timeout: config.setup_timeout(),
            log_chunk: config.log_chunk(),
            ambiguous: config.ambiguous_policy,
            collect_statistics: config.network_statistics,
            label: config.label.clone(),
            data_size: config.data_size,
            cca: config.cca.clone(),
            pep: config.pep,
        }
    }
}

/// Bookkeeping of a finished run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Result records handed to the sink
    pub batches: usize,
    /// Client invocations, counted or not
    pub attempts: u32,
    pub successes: u32,
    pub timeouts: u32,
    pub errors: u32,
    /// Trials given up on once the error budget ran out
    pub abandoned: u32,
    pub throughput: Option<ThroughputSummary>,
}

impl RunSummary {
    fn record(&mut self, output: &TrialOutput) {
        match output.outcome() {
            TrialOutcome::Success => self.successes += 1,
            TrialOutcome::Timeout => self.timeouts += 1,
            TrialOutcome::Error => self.errors += 1,
        }
    }
}

pub struct TrialRunner {
    settings: RunnerSettings,
    logger: Logger,
}

impl TrialRunner {
    pub fn new(settings: RunnerSettings, logger: Logger) -> Self {
        Self { settings, logger }
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Start the server, run the trials and stop the server again.
    ///
    /// Setup and process errors end the run immediately. Clients that
    /// produce no result consume the error budget instead; once it is spent
    /// the remaining trials are abandoned.
    pub async fn run(
        &self,
        driver: &mut dyn ProtocolDriver,
        mut stats: Option<&mut StatisticsCollector>,
        sink: &mut dyn ResultSink,
    ) -> Result<RunSummary> {
        if !self.settings.collect_statistics {
            stats = None;
        }

        driver.start_server(self.settings.setup_timeout).await?;
        let result = self.trials(driver, stats, sink).await;
        let stopped = driver.stop_server().await;

        let summary = result?;
        stopped?;
        self.log_summary(&summary).await;
        Ok(summary)
    }

    async fn trials(
        &self,
        driver: &mut dyn ProtocolDriver,
        mut stats: Option<&mut StatisticsCollector>,
        sink: &mut dyn ResultSink,
    ) -> Result<RunSummary> {
        let settings = &self.settings;
        let mut summary = RunSummary::default();
        let mut throughputs = Vec::new();
        let mut remaining = settings.trials;
        let mut budget = settings.trials;

        let mut batch = BenchmarkResult::new(
            settings.label.clone(),
            driver.protocol(),
            settings.data_size,
            settings.cca.clone(),
            settings.pep,
        );
        let mut chunk_elapsed = Duration::ZERO;

        self.logger
            .info(&format!("Running {} {} trials", settings.trials, driver.protocol()))
            .field("cca", &settings.cca)
            .field("data_size", settings.data_size)
            .log()
            .await;

        while remaining > 0 {
            let started = Instant::now();
            summary.attempts += 1;

            if let Some(collector) = stats.as_deref_mut() {
                collector.reset().await;
            }

            match self.resolve(driver.run_client(settings.client_timeout).await?).await {
                Some(result) => {
                    let mut output = TrialOutput::completed(result.status_code, result.time_s, settings.data_size);
                    if let Some(collector) = stats.as_deref() {
                        output = output.with_statistics(collector.snapshot().await);
                    }
                    if let Some(mbps) = output.throughput_mbps.filter(|_| output.success) {
                        throughputs.push(mbps);
                    }
                    self.logger
                        .debug(&format!("trial {} of {}", settings.trials - remaining + 1, settings.trials))
                        .field("status_code", result.status_code)
                        .field("time_s", result.time_s)
                        .log()
                        .await;
                    summary.record(&output);
                    batch.push(output);
                    remaining -= 1;
                }
                None => {
                    if driver.restarts_on_no_output() {
                        self.logger.info("Restarting server").log().await;
                        driver.restart_server(settings.setup_timeout).await?;
                    }
                    let output = TrialOutput::error();
                    summary.record(&output);
                    batch.push(output);

                    budget = budget.saturating_sub(1);
                    if budget == 0 {
                        self.logger
                            .error(&format!("Error budget exhausted, abandoning {} remaining trials", remaining))
                            .log()
                            .await;
                        summary.abandoned = remaining;
                        remaining = 0;
                    }
                }
            }

            chunk_elapsed += started.elapsed();
            if chunk_elapsed >= settings.log_chunk && remaining > 0 {
                self.emit(sink, &batch, &mut summary)?;
                batch = batch.next_batch();
                chunk_elapsed = Duration::ZERO;
            }
        }

        if !batch.is_empty() {
            self.emit(sink, &batch, &mut summary)?;
        }
        summary.throughput = ThroughputSummary::from_samples(&throughputs);
        Ok(summary)
    }

    /// Reduce a client outcome to one result, or `None` for no output
    async fn resolve(&self, outcome: ClientOutcome) -> Option<ClientResult> {
        match outcome {
            ClientOutcome::Completed(result) => Some(result),
            ClientOutcome::NoOutput(_) => None,
            ClientOutcome::Ambiguous(results) => match self.settings.ambiguous {
                AmbiguousPolicy::First => {
                    self.logger
                        .warn(&format!("Using the first of {} results", results.len()))
                        .log()
                        .await;
                    results.first().copied()
                }
                AmbiguousPolicy::Discard => {
                    self.logger
                        .warn(&format!("Discarding {} results", results.len()))
                        .log()
                        .await;
                    None
                }
            },
        }
    }

    fn emit(&self, sink: &mut dyn ResultSink, batch: &BenchmarkResult, summary: &mut RunSummary) -> Result<()> {
        sink.emit(batch)?;
        summary.batches += 1;
        Ok(())
    }

    async fn log_summary(&self, summary: &RunSummary) {
        let mut entry = self
            .logger
            .info(&format!(
                "Finished {} attempts: {} succeeded, {} timed out, {} failed",
                summary.attempts, summary.successes, summary.timeouts, summary.errors
            ))
            .field("batches", summary.batches);
        if let Some(throughput) = &summary.throughput {
            entry = entry.field("mean_mbps", throughput.mean);
        }
        entry.log().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::logging::{LogCapture, LogLevel};
    use crate::output::MemorySink;
    use crate::types::Protocol;
    use crate::process::{DirectSubstrate, ProcessSupervisor};
    use crate::stats::Metric;
    use async_trait::async_trait;
    use std::collections::{BTreeMap, VecDeque};
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    /// Replays scripted client outcomes
    struct ScriptedDriver {
        outcomes: VecDeque<ClientOutcome>,
        restarts: bool,
        starts: u32,
        stops: u32,
        runs: u32,
        /// Fake counter tree whose values every client run raises by
        /// `1000 * run number`
        counters: Option<(PathBuf, u64)>,
    }

    fn write_counters(root: &Path, value: u64) {
        let dir = root.join("h1-eth0").join("statistics");
        std::fs::create_dir_all(&dir).unwrap();
        for metric in Metric::ALL {
            std::fs::write(dir.join(metric.as_str()), format!("{}\n", value)).unwrap();
        }
    }

    impl ScriptedDriver {
        fn new(outcomes: Vec<ClientOutcome>, restarts: bool) -> Self {
            Self {
                outcomes: outcomes.into(),
                restarts,
                starts: 0,
                stops: 0,
                runs: 0,
                counters: None,
            }
        }

        fn with_counters(mut self, root: &Path) -> Self {
            write_counters(root, 0);
            self.counters = Some((root.to_path_buf(), 0));
            self
        }
    }

    #[async_trait]
    impl ProtocolDriver for ScriptedDriver {
        fn protocol(&self) -> Protocol {
            Protocol::Picoquic
        }

        fn restarts_on_no_output(&self) -> bool {
            self.restarts
        }

        async fn start_server(&mut self, _timeout: Duration) -> Result<()> {
            self.starts += 1;
            Ok(())
        }

        async fn stop_server(&mut self) -> Result<()> {
            self.stops += 1;
            Ok(())
        }

        async fn run_client(&mut self, _timeout: Option<Duration>) -> Result<ClientOutcome> {
            self.runs += 1;
            if let Some((root, value)) = &mut self.counters {
                *value += 1000 * u64::from(self.runs);
                write_counters(root, *value);
            }
            self.outcomes
                .pop_front()
                .ok_or_else(|| AppError::internal("script exhausted"))
        }
    }

    fn settings(trials: u32) -> RunnerSettings {
        let mut config = Config::default();
        config.trials = trials;
        config.data_size = 1_000_000;
        let mut settings = RunnerSettings::from_config(&config);
        settings.log_chunk = Duration::from_secs(3600);
        settings
    }

    fn runner(settings: RunnerSettings) -> (TrialRunner, LogCapture) {
        let (logger, capture) = Logger::capture("BENCH");
        (TrialRunner::new(settings, logger), capture)
    }

    fn ok(time_s: f64) -> ClientOutcome {
        ClientOutcome::Completed(ClientResult::new(200, time_s))
    }

    fn none() -> ClientOutcome {
        ClientOutcome::NoOutput("no result".into())
    }

    #[tokio::test]
    async fn test_all_trials_succeed() {
        let (runner, _) = runner(settings(3));
        let mut driver = ScriptedDriver::new(vec![ok(1.0), ok(2.0), ok(0.5)], false);
        let mut sink = MemorySink::new();

        let summary = runner.run(&mut driver, None, &mut sink).await.unwrap();

        assert_eq!(summary.attempts, 3);
        assert_eq!(summary.successes, 3);
        assert_eq!(summary.batches, 1);
        assert_eq!((driver.starts, driver.stops), (1, 1));

        let record = &sink.records()[0];
        assert_eq!(record.inputs.num_trials, 3);
        assert_eq!(record.inputs.protocol, Protocol::Picoquic);
        assert_eq!(record.outputs[0].throughput_mbps, Some(8.0));
        assert_eq!(record.outputs[2].throughput_mbps, Some(16.0));
        let throughput = summary.throughput.unwrap();
        assert_eq!(throughput.count, 3);
        assert_eq!(throughput.max, 16.0);
    }

    #[tokio::test]
    async fn test_statistics_measure_each_client_run() {
        let dir = tempfile::tempdir().unwrap();
        let (logger, _) = Logger::capture("STATS");
        let supervisor = ProcessSupervisor::new(Arc::new(DirectSubstrate), logger.named("PROC"));
        let interfaces = BTreeMap::from([("h1-eth0".to_string(), "h1".to_string())]);
        let mut stats = StatisticsCollector::new(supervisor, logger, interfaces).with_sysfs_root(dir.path());

        let mut s = settings(2);
        s.collect_statistics = true;
        let (runner, _) = runner(s);
        let mut driver = ScriptedDriver::new(vec![ok(1.0), none(), ok(2.0)], false).with_counters(dir.path());
        let mut sink = MemorySink::new();

        runner.run(&mut driver, Some(&mut stats), &mut sink).await.unwrap();

        let outputs = &sink.records()[0].outputs;
        assert_eq!(outputs.len(), 3);
        let first = outputs[0].statistics.as_ref().unwrap();
        assert_eq!(first.ifaces, ["h1-eth0"]);
        for metric in Metric::ALL {
            assert_eq!(first.get("h1-eth0", metric), Some(1000));
        }
        assert!(outputs[1].statistics.is_none());
        let third = outputs[2].statistics.as_ref().unwrap();
        assert_eq!(third.get("h1-eth0", Metric::RxBytes), Some(3000));
    }

    #[tokio::test]
    async fn test_statistics_ignored_unless_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let (logger, _) = Logger::capture("STATS");
        let supervisor = ProcessSupervisor::new(Arc::new(DirectSubstrate), logger.named("PROC"));
        let interfaces = BTreeMap::from([("h1-eth0".to_string(), "h1".to_string())]);
        let mut stats = StatisticsCollector::new(supervisor, logger, interfaces).with_sysfs_root(dir.path());

        let (runner, _) = runner(settings(1));
        let mut driver = ScriptedDriver::new(vec![ok(1.0)], false).with_counters(dir.path());
        let mut sink = MemorySink::new();

        runner.run(&mut driver, Some(&mut stats), &mut sink).await.unwrap();
        assert!(sink.records()[0].outputs[0].statistics.is_none());
    }

    #[tokio::test]
    async fn test_budget_exhaustion_abandons_remaining_trials() {
        let (runner, capture) = runner(settings(3));
        let mut driver = ScriptedDriver::new(vec![ok(1.0), none(), none(), none()], false);
        let mut sink = MemorySink::new();

        let summary = runner.run(&mut driver, None, &mut sink).await.unwrap();

        assert_eq!(driver.runs, 4);
        assert_eq!(summary.successes, 1);
        assert_eq!(summary.errors, 3);
        assert_eq!(summary.abandoned, 2);
        assert!(summary.attempts <= 2 * 3 - 1);

        let record = &sink.records()[0];
        assert_eq!(record.outputs.len(), 4);
        assert_eq!(record.outputs.iter().filter(|o| o.throughput_mbps.is_some()).count(), 1);
        assert!(capture.contains(LogLevel::Error, "abandoning 2 remaining trials"));
    }

    #[tokio::test]
    async fn test_no_output_restarts_when_supported() {
        let (runner, _) = runner(settings(2));
        let mut driver = ScriptedDriver::new(vec![none(), ok(1.0), ok(1.0)], true);
        let mut sink = MemorySink::new();

        let summary = runner.run(&mut driver, None, &mut sink).await.unwrap();

        assert_eq!(summary.successes, 2);
        assert_eq!(summary.errors, 1);
        // initial start plus one restart
        assert_eq!(driver.starts, 2);
        assert_eq!(driver.stops, 2);
    }

    #[tokio::test]
    async fn test_timeout_trials_count_toward_completion() {
        let (runner, _) = runner(settings(2));
        let mut driver = ScriptedDriver::new(
            vec![ClientOutcome::Completed(ClientResult::timed_out(Duration::from_secs(30))), ok(1.0)],
            false,
        );
        let mut sink = MemorySink::new();

        let summary = runner.run(&mut driver, None, &mut sink).await.unwrap();
        assert_eq!(summary.timeouts, 1);
        assert_eq!(summary.successes, 1);
        assert_eq!(summary.throughput.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_zero_chunk_emits_every_trial() {
        let mut s = settings(3);
        s.log_chunk = Duration::ZERO;
        let (runner, _) = runner(s);
        let mut driver = ScriptedDriver::new(vec![ok(1.0), ok(1.0), ok(1.0)], false);
        let mut sink = MemorySink::new();

        let summary = runner.run(&mut driver, None, &mut sink).await.unwrap();

        assert_eq!(summary.batches, 3);
        assert!(sink.records().iter().all(|r| r.inputs.num_trials == 1));
    }

    #[tokio::test]
    async fn test_ambiguous_policies() {
        let ambiguous = || ClientOutcome::Ambiguous(vec![ClientResult::new(200, 1.0), ClientResult::new(200, 4.0)]);

        let (runner_first, capture) = runner(settings(1));
        let mut driver = ScriptedDriver::new(vec![ambiguous()], false);
        let mut sink = MemorySink::new();
        runner_first.run(&mut driver, None, &mut sink).await.unwrap();
        assert_eq!(sink.records()[0].outputs[0].time_s, Some(1.0));
        assert!(capture.contains(LogLevel::Warn, "first of 2 results"));

        let mut s = settings(1);
        s.ambiguous = AmbiguousPolicy::Discard;
        let (runner_discard, _) = runner(s);
        let mut driver = ScriptedDriver::new(vec![ambiguous(), ok(2.0)], false);
        let mut sink = MemorySink::new();
        let summary = runner_discard.run(&mut driver, None, &mut sink).await.unwrap();
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.successes, 1);
    }

    #[tokio::test]
    async fn test_driver_error_stops_server_and_propagates() {
        let (runner, _) = runner(settings(2));
        let mut driver = ScriptedDriver::new(vec![ok(1.0)], false);
        let mut sink = MemorySink::new();

        let err = runner.run(&mut driver, None, &mut sink).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(driver.stops, 1);
        assert!(sink.records().is_empty());
    }
}
