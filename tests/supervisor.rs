//! Process supervision and the trial engine on a direct substrate: real
//! child processes, no namespaces.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use transport_bench::benchmark::{
    ClientResult, DriverContext, LineVerdict, ProcessDriver, ProtocolAdapter, RunnerSettings, TrialRunner,
};
use transport_bench::error::AppError;
use transport_bench::logging::{LogLevel, Logger};
use transport_bench::models::Config;
use transport_bench::output::MemorySink;
use transport_bench::process::{
    CommandLine, DirectSubstrate, ExecTarget, ExitClass, OutputHandling, ProcessSupervisor, ReadinessPolicy,
    ReadyMarker, RunOptions,
};
use transport_bench::types::Protocol;

fn supervisor() -> (ProcessSupervisor, transport_bench::logging::LogCapture) {
    let (logger, capture) = Logger::capture("PROC");
    (ProcessSupervisor::new(Arc::new(DirectSubstrate), logger), capture)
}

fn sh(script: &str) -> CommandLine {
    CommandLine::from_argv(["sh", "-c", script])
}

#[tokio::test]
async fn test_even_count_matches_in_both_modes() {
    let (supervisor, _) = supervisor();
    let host = ExecTarget::host("h1");

    let sync_count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&sync_count);
    let output = OutputHandling::new().on_line(move |line| {
        if line.trim().parse::<u32>().map(|n| n % 2 == 0).unwrap_or(false) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    assert_ok!(supervisor.run(&host, "seq 1 11", RunOptions::new().output(output)).await);

    let bg_count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&bg_count);
    let output = OutputHandling::new().on_line(move |line| {
        if line.trim().parse::<u32>().map(|n| n % 2 == 0).unwrap_or(false) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    let id = supervisor.spawn(&host, "seq 1 11", output, LogLevel::Debug).await.unwrap();
    assert_eq!(supervisor.wait(id).await.unwrap(), ExitClass::Completed);

    assert_eq!(sync_count.load(Ordering::SeqCst), 5);
    assert_eq!(bg_count.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_non_utf8_output_keeps_draining() {
    let (supervisor, _) = supervisor();
    let host = ExecTarget::host("h1");

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let output = OutputHandling::new().on_line(move |line| {
        if line == "done in 0.5" {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    let exit = supervisor
        .run(&host, sh("printf 'junk \\377\\n'; echo done in 0.5"), RunOptions::new().output(output))
        .await
        .unwrap();
    assert_eq!(exit, ExitClass::Completed);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let lines = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&lines);
    let output = OutputHandling::new().on_line(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let finished = tokio::time::timeout(
        Duration::from_secs(10),
        supervisor.run(&host, sh("printf 'junk \\377\\n'; seq 1 100000"), RunOptions::new().output(output)),
    )
    .await;
    assert!(matches!(finished, Ok(Ok(ExitClass::Completed))));
    assert_eq!(lines.load(Ordering::SeqCst), 100_001);
}

#[tokio::test]
async fn test_timeout_wrapper_is_classified() {
    let (supervisor, _) = supervisor();
    let exit = supervisor
        .run(
            &ExecTarget::host("h1"),
            "sleep 5",
            RunOptions::new().timeout(Some(Duration::from_millis(200))),
        )
        .await
        .unwrap();
    assert_eq!(exit, ExitClass::TimedOut);
}

#[tokio::test]
async fn test_failure_is_fatal_and_logged() {
    let (supervisor, capture) = supervisor();
    let err = assert_err!(supervisor.run(&ExecTarget::host("h2"), sh("exit 3"), RunOptions::new()).await);
    assert!(matches!(err, AppError::ProcessExit { code: 3, .. }));
    assert!(!capture.messages(LogLevel::Error).is_empty());
}

#[tokio::test]
async fn test_readiness_and_teardown() {
    let (supervisor, _) = supervisor();
    let host = ExecTarget::host("h2");

    assert_ok!(
        supervisor
            .spawn_until_ready(
                "server",
                &host,
                sh("echo starting; echo Serving on 4433; exec sleep 30"),
                OutputHandling::new(),
                ReadyMarker::contains("Serving"),
                Duration::from_secs(5),
                ReadinessPolicy::Required,
            )
            .await
    );
    assert_eq!(supervisor.active_count().await, 1);

    let err = supervisor
        .spawn_until_ready(
            "server",
            &host,
            sh("echo nothing here; exec sleep 30"),
            OutputHandling::new(),
            ReadyMarker::contains("Serving"),
            Duration::from_millis(300),
            ReadinessPolicy::Required,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::SetupTimeout { .. }));

    supervisor.stop().await;
    assert_eq!(supervisor.active_count().await, 0);
    supervisor.stop().await;
}

/// Shell stand-ins for a protocol's server and client binaries
#[derive(Debug)]
struct ScriptAdapter {
    client_script: String,
}

impl ProtocolAdapter for ScriptAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::LinuxTcp
    }

    fn server_command(&self, _ctx: &DriverContext) -> CommandLine {
        sh("echo Serving HTTP; exec sleep 30")
    }

    fn ready_marker(&self) -> ReadyMarker {
        ReadyMarker::contains("Serving")
    }

    fn client_command(&self, _ctx: &DriverContext) -> CommandLine {
        sh(&self.client_script)
    }

    fn parse_line(&self, line: &str) -> Option<LineVerdict> {
        let time_s = line.strip_prefix("done in ")?.parse().ok()?;
        Some(LineVerdict::Result(ClientResult::new(200, time_s)))
    }
}

fn context(logdir: PathBuf) -> DriverContext {
    let mut config = Config::default();
    config.logdir = logdir;
    config.data_size = 1_000_000;
    DriverContext::from_config(&config).unwrap()
}

#[tokio::test]
async fn test_trial_engine_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let (supervisor, _) = supervisor();
    let (logger, _) = Logger::capture("BENCH");
    let adapter = Arc::new(ScriptAdapter {
        client_script: "echo fetching; echo done in 0.5".to_string(),
    });
    let mut driver = ProcessDriver::new(adapter, context(dir.path().to_path_buf()), supervisor.clone(), logger.clone());

    let mut config = Config::default();
    config.trials = 3;
    config.data_size = 1_000_000;
    config.timeout_seconds = Some(10);
    let runner = TrialRunner::new(RunnerSettings::from_config(&config), logger);
    let mut sink = MemorySink::new();

    let summary = runner.run(&mut driver, None, &mut sink).await.unwrap();

    assert_eq!(summary.successes, 3);
    assert_eq!(supervisor.active_count().await, 0);
    let record = &sink.records()[0];
    assert_eq!(record.inputs.num_trials, 3);
    assert!(record.outputs.iter().all(|o| o.throughput_mbps == Some(16.0)));

    let client_log = std::fs::read_to_string(dir.path().join("client.log")).unwrap();
    assert_eq!(client_log.matches("done in 0.5").count(), 3);
    let server_log = std::fs::read_to_string(dir.path().join("server.log")).unwrap();
    assert!(server_log.contains("Serving HTTP"));
}

#[tokio::test]
async fn test_client_timeout_yields_timeout_trial() {
    let dir = tempfile::tempdir().unwrap();
    let (supervisor, _) = supervisor();
    let (logger, _) = Logger::capture("BENCH");
    let adapter = Arc::new(ScriptAdapter {
        client_script: "exec sleep 10".to_string(),
    });
    let mut driver = ProcessDriver::new(adapter, context(dir.path().to_path_buf()), supervisor, logger.clone());

    let mut config = Config::default();
    config.trials = 1;
    config.timeout_seconds = Some(1);
    let runner = TrialRunner::new(RunnerSettings::from_config(&config), logger);
    let mut sink = MemorySink::new();

    let summary = runner.run(&mut driver, None, &mut sink).await.unwrap();
    assert_eq!(summary.timeouts, 1);
    let trial = &sink.records()[0].outputs[0];
    assert!(!trial.success);
    assert_eq!(trial.timeout, Some(true));
    assert_eq!(trial.time_s, Some(1.0));
}

#[tokio::test]
async fn test_silent_client_is_logged_as_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let (supervisor, _) = supervisor();
    let (logger, capture) = Logger::capture("BENCH");
    let adapter = Arc::new(ScriptAdapter {
        client_script: "echo connecting".to_string(),
    });
    let mut driver = ProcessDriver::new(adapter, context(dir.path().to_path_buf()), supervisor, logger.clone());

    let mut config = Config::default();
    config.trials = 1;
    let runner = TrialRunner::new(RunnerSettings::from_config(&config), logger);
    let mut sink = MemorySink::new();

    let summary = runner.run(&mut driver, None, &mut sink).await.unwrap();
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.abandoned, 1);

    let warning = capture
        .entries()
        .into_iter()
        .find(|e| e.level == LogLevel::Warn && e.message.starts_with("No output"))
        .unwrap();
    assert_eq!(warning.fields["error_category"], "NO_OUTPUT");
    assert_eq!(warning.fields["error_recoverable"], true);
}
