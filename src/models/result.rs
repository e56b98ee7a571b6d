//! Benchmark result records

use crate::defaults::{HTTP_OK_STATUSCODE, HTTP_TIMEOUT_STATUSCODE};
use crate::error::Result;
use crate::stats::StatisticsSnapshot;
use crate::types::Protocol;
use chrono::Local;
use serde::{Deserialize, Serialize};

/// Compute throughput in Mbps for `data_size` bytes moved in `time_s` seconds.
/// Returns `None` for non-positive elapsed times.
pub fn throughput_mbps(data_size: u64, time_s: f64) -> Option<f64> {
    if time_s > 0.0 {
        Some(8.0 * data_size as f64 / 1_000_000.0 / time_s)
    } else {
        None
    }
}

/// Outcome tag of a single trial
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialOutcome {
    Success,
    Timeout,
    Error,
}

/// One client invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialOutput {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_s: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throughput_mbps: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<StatisticsSnapshot>,

    /// Raw protocol payload, if a driver reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<serde_json::Value>,
}

impl TrialOutput {
    /// A trial whose client produced a status code and an elapsed time
    pub fn completed(status_code: u16, time_s: f64, data_size: u64) -> Self {
        Self {
            success: status_code == HTTP_OK_STATUSCODE,
            timeout: Some(status_code == HTTP_TIMEOUT_STATUSCODE),
            time_s: Some(time_s),
            throughput_mbps: throughput_mbps(data_size, time_s),
            statistics: None,
            additional_data: None,
        }
    }

    /// A trial whose client produced no usable result
    pub fn error() -> Self {
        Self {
            success: false,
            timeout: Some(false),
            ..Self::default()
        }
    }

    pub fn with_statistics(mut self, statistics: StatisticsSnapshot) -> Self {
        self.statistics = Some(statistics);
        self
    }

    pub fn with_additional_data(mut self, data: serde_json::Value) -> Self {
        self.additional_data = Some(data);
        self
    }

    pub fn outcome(&self) -> TrialOutcome {
        if self.success {
            TrialOutcome::Success
        } else if self.timeout == Some(true) {
            TrialOutcome::Timeout
        } else {
            TrialOutcome::Error
        }
    }
}

/// Static configuration of a benchmark run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkInputs {
    pub label: String,
    pub protocol: Protocol,
    pub num_trials: u32,
    /// Local time, `%Y-%m-%d %H:%M:%S`
    pub start_time: String,
    pub data_size: u64,
    pub cca: String,
    pub pep: bool,
}

/// A serializable record: static inputs plus an ordered list of trials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub inputs: BenchmarkInputs,
    pub outputs: Vec<TrialOutput>,
}

impl BenchmarkResult {
    pub fn new<L: Into<String>, C: Into<String>>(
        label: L,
        protocol: Protocol,
        data_size: u64,
        cca: C,
        pep: bool,
    ) -> Self {
        Self {
            inputs: BenchmarkInputs {
                label: label.into(),
                protocol,
                num_trials: 0,
                start_time: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                data_size,
                cca: cca.into(),
                pep,
            },
            outputs: Vec::new(),
        }
    }

    /// Start a fresh batch with the same static inputs and a new start time
    pub fn next_batch(&self) -> Self {
        let mut inputs = self.inputs.clone();
        inputs.num_trials = 0;
        inputs.start_time = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        Self {
            inputs,
            outputs: Vec::new(),
        }
    }

    pub fn push(&mut self, output: TrialOutput) {
        self.inputs.num_trials += 1;
        self.outputs.push(output);
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn count(&self, outcome: TrialOutcome) -> usize {
        self.outputs.iter().filter(|o| o.outcome() == outcome).count()
    }

    /// Serialize as one self-contained JSON record
    pub fn to_json(&self, pretty: bool) -> Result<String> {
        if pretty {
            Ok(serde_json::to_string_pretty(self)?)
        } else {
            Ok(serde_json::to_string(self)?)
        }
    }
}
