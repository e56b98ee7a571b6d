//! Transport Bench - command-line entry point
//!
//! Builds an emulated network path, benchmarks one transport across it and
//! prints one JSON record per result batch on stdout.

use clap::Parser;
use std::process;
use transport_bench::{app::App, cli::Cli, config::load_config, error::ErrorReporter};

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        process::exit(1);
    }));

    let cli = Cli::parse();
    let reporter = ErrorReporter::new(cli.use_colors(), cli.verbose || cli.debug);

    let config = match load_config(cli.clone()) {
        Ok(config) => config,
        Err(e) => {
            reporter.report_error(&e);
            process::exit(e.exit_code());
        }
    };

    if config.debug {
        eprintln!("{} v{}", transport_bench::PKG_NAME, transport_bench::VERSION);
        eprint!("{}", cli.get_config_summary());
    }

    if let Err(e) = App::new(config).run().await {
        reporter.report_error(&e);
        process::exit(e.exit_code());
    }
}
