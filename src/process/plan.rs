//! Ordered command lists.
//!
//! Topology and shaping code builds plans as pure data so the exact commands
//! can be inspected in tests, then hands them to
//! [`ProcessSupervisor::execute_plan`](super::ProcessSupervisor::execute_plan).

use super::{CommandLine, ExecTarget};
use crate::logging::LogLevel;
use std::fmt;

/// One step of a [`CommandPlan`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCommand {
    pub target: ExecTarget,
    pub command: CommandLine,
    pub raise_on_error: bool,
}

impl fmt::Display for PlannedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.target, self.command)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandPlan {
    steps: Vec<PlannedCommand>,
    level: Option<LogLevel>,
}

impl CommandPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan whose commands are logged at `level` when executed
    pub fn logged_at(level: LogLevel) -> Self {
        Self {
            steps: Vec::new(),
            level: Some(level),
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level.unwrap_or(LogLevel::Trace)
    }

    pub fn push<C: Into<CommandLine>>(&mut self, target: &ExecTarget, command: C) -> &mut Self {
        self.steps.push(PlannedCommand {
            target: target.clone(),
            command: command.into(),
            raise_on_error: true,
        });
        self
    }

    /// Add a step whose failure is tolerated
    pub fn push_tolerant<C: Into<CommandLine>>(&mut self, target: &ExecTarget, command: C) -> &mut Self {
        self.steps.push(PlannedCommand {
            target: target.clone(),
            command: command.into(),
            raise_on_error: false,
        });
        self
    }

    pub fn extend(&mut self, other: CommandPlan) -> &mut Self {
        self.steps.extend(other.steps);
        self
    }

    pub fn steps(&self) -> &[PlannedCommand] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Commands rendered as strings, for assertions and dry runs
    pub fn lines(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.command.to_string()).collect()
    }

    /// Commands addressed to `target`
    pub fn lines_for(&self, target: &ExecTarget) -> Vec<String> {
        self.steps
            .iter()
            .filter(|s| &s.target == target)
            .map(|s| s.command.to_string())
            .collect()
    }
}
