//! Main application orchestration and execution

use crate::benchmark::{adapter_for, DriverContext, ProcessDriver, RunSummary, RunnerSettings, TrialRunner};
use crate::config::{display_config_summary, validate_config, ValidationLevel};
use crate::defaults::{CLIENT_LOGFILE, ROUTER_LOGFILE, SERVER_LOGFILE};
use crate::error::{AppError, Result};
use crate::logging::{Logger, LoggerFactory};
use crate::models::{BenchmarkResult, Config};
use crate::output::{JsonLineSink, SummaryPrinter};
use crate::process::{NetnsSubstrate, ProcessSupervisor};
use crate::shaper::{KernelVersion, TrafficShaper};
use crate::stats::StatisticsCollector;
use crate::topology::{PathParams, Topology};
use std::path::Path;
use std::sync::Arc;

/// Create `logdir` and empty the per-role logfiles of a previous run
pub fn init_logdir(logdir: &Path) -> Result<()> {
    std::fs::create_dir_all(logdir)
        .map_err(|e| AppError::io(format!("Failed to create {}: {}", logdir.display(), e)))?;
    for name in [SERVER_LOGFILE, CLIENT_LOGFILE, ROUTER_LOGFILE] {
        let path = logdir.join(name);
        std::fs::File::create(&path)
            .map_err(|e| AppError::io(format!("Failed to truncate {}: {}", path.display(), e)))?;
    }
    Ok(())
}

/// Main application struct that coordinates all components
pub struct App {
    config: Config,
    loggers: LoggerFactory,
    logger: Logger,
}

impl App {
    pub fn new(config: Config) -> Self {
        let loggers = LoggerFactory::new(&config);
        let logger = loggers.create_logger("MAIN");
        Self { config, loggers, logger }
    }

    /// Build the topology, run the benchmark, and tear everything down
    /// whatever the outcome
    pub async fn run(self) -> Result<RunSummary> {
        let config = &self.config;
        init_logdir(&config.logdir)?;

        let kernel = KernelVersion::detect().await?;
        self.logger
            .debug(&format!("Configuration:\n{}", display_config_summary(config)))
            .field("kernel", kernel.to_string())
            .field("session", self.loggers.session_id())
            .log()
            .await;
        for warning in validate_config(config, Some(kernel))? {
            let entry = match warning.level {
                ValidationLevel::Info => self.logger.info(&warning.message),
                ValidationLevel::Warning => self.logger.warn(&warning.message),
            };
            entry.log().await;
        }

        let substrate = Arc::new(NetnsSubstrate::new(config.namespace_prefix.clone(), config.use_sudo));
        let supervisor = ProcessSupervisor::new(substrate, self.loggers.create_logger("PROC"));
        let shaper = TrafficShaper::new(supervisor.clone(), self.loggers.create_logger("SHAPE"), kernel);

        let mut perf = self.loggers.create_performance_logger();
        perf.start_timing("topology setup").await;
        let mut topology = Topology::create(
            config.topology,
            config.namespace_prefix.clone(),
            supervisor,
            shaper,
            self.loggers.create_logger("TOPO"),
            &PathParams::from_config(config),
        )
        .await?;
        perf.end_timing("topology setup").await;
        crate::log_info!(self.logger, "{} topology ready", config.topology);

        let result = tokio::select! {
            result = self.benchmark(&topology) => result,
            _ = tokio::signal::ctrl_c() => {
                crate::log_warn!(self.logger, "Interrupted, tearing down");
                Err(AppError::internal("Interrupted"))
            }
        };
        topology.stop().await;
        if let Err(e) = &result {
            self.logger.fatal(&format!("Benchmark aborted: {}", e)).error_info(e).log().await;
        }
        result
    }

    async fn benchmark(&self, topology: &Topology) -> Result<RunSummary> {
        let config = &self.config;
        let setup_timeout = config.setup_timeout();

        if config.pep {
            topology
                .start_tcp_proxy(&config.logfile(ROUTER_LOGFILE), setup_timeout)
                .await?;
        }
        if config.packet_capture {
            topology.start_packet_capture(&config.logdir, setup_timeout).await?;
        }

        let adapter = adapter_for(config.protocol)?;
        if adapter.uses_kernel_congestion_control() {
            topology.set_tcp_congestion_control(&config.cca).await?;
        }

        let bench_logger = self.loggers.create_logger("BENCH");
        let mut driver = ProcessDriver::new(
            adapter,
            DriverContext::from_config(config)?,
            topology.supervisor().clone(),
            bench_logger.clone(),
        );
        let mut stats = config
            .network_statistics
            .then(|| StatisticsCollector::for_topology(topology, self.loggers.create_logger("STATS")));

        let runner = TrialRunner::new(RunnerSettings::from_config(config), bench_logger);
        let mut sink = JsonLineSink::stdout(config.pretty);
        let summary = runner.run(&mut driver, stats.as_mut(), &mut sink).await?;

        let inputs = BenchmarkResult::new(
            config.label.clone(),
            config.protocol,
            config.data_size,
            config.cca.clone(),
            config.pep,
        )
        .inputs;
        SummaryPrinter::new(config.enable_color).print(&inputs, &summary);
        Ok(summary)
    }
}
