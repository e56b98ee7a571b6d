//! Run summary for the terminal

use crate::benchmark::RunSummary;
use crate::models::BenchmarkInputs;
use colored::*;
use std::fmt::Write as _;

/// Renders a [`RunSummary`], colored when enabled
#[derive(Debug, Clone)]
pub struct SummaryPrinter {
    use_color: bool,
}

impl SummaryPrinter {
    pub fn new(use_color: bool) -> Self {
        Self { use_color }
    }

    fn paint(&self, text: String, color: Color) -> String {
        if self.use_color {
            text.color(color).to_string()
        } else {
            text
        }
    }

    pub fn render(&self, inputs: &BenchmarkInputs, summary: &RunSummary) -> String {
        let mut out = String::new();
        let header = format!(
            "{} {} cca={} n={} pep={}",
            inputs.label, inputs.protocol, inputs.cca, inputs.data_size, inputs.pep
        );
        let _ = writeln!(out, "{}", if self.use_color { header.bold().to_string() } else { header });

        let _ = writeln!(
            out,
            "  trials: {} attempted, {}, {}, {}",
            summary.attempts,
            self.paint(format!("{} ok", summary.successes), Color::Green),
            self.paint(format!("{} timed out", summary.timeouts), Color::Yellow),
            self.paint(format!("{} failed", summary.errors), Color::Red),
        );
        if summary.abandoned > 0 {
            let _ = writeln!(
                out,
                "  {}",
                self.paint(format!("{} trials abandoned", summary.abandoned), Color::Red)
            );
        }

        match &summary.throughput {
            Some(t) => {
                let _ = writeln!(
                    out,
                    "  throughput (Mbps): mean {:.3}  min {:.3}  max {:.3}  std-dev {:.3}  median {:.3}",
                    t.mean, t.min, t.max, t.std_dev, t.median
                );
            }
            None => {
                let _ = writeln!(out, "  {}", self.paint("no throughput samples".to_string(), Color::BrightBlack));
            }
        }
        out
    }

    pub fn print(&self, inputs: &BenchmarkInputs, summary: &RunSummary) {
        eprint!("{}", self.render(inputs, summary));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BenchmarkResult;
    use crate::stats::ThroughputSummary;
    use crate::types::Protocol;

    #[test]
    fn test_plain_render() {
        let inputs = BenchmarkResult::new("exp", Protocol::GoogleQuic, 1000, "bbr", true).inputs;
        let summary = RunSummary {
            batches: 1,
            attempts: 4,
            successes: 2,
            timeouts: 1,
            errors: 1,
            abandoned: 0,
            throughput: ThroughputSummary::from_samples(&[8.0, 16.0]),
        };
        let text = SummaryPrinter::new(false).render(&inputs, &summary);
        assert!(text.starts_with("exp GOOGLE_QUIC cca=bbr n=1000 pep=true"));
        assert!(text.contains("4 attempted, 2 ok, 1 timed out, 1 failed"));
        assert!(text.contains("mean 12.000"));
        assert!(!text.contains("abandoned"));
    }

    #[test]
    fn test_no_samples() {
        let inputs = BenchmarkResult::new("exp", Protocol::Picoquic, 1000, "bbr", false).inputs;
        let summary = RunSummary {
            attempts: 3,
            errors: 3,
            abandoned: 1,
            ..RunSummary::default()
        };
        let text = SummaryPrinter::new(false).render(&inputs, &summary);
        assert!(text.contains("1 trials abandoned"));
        assert!(text.contains("no throughput samples"));
    }
}
