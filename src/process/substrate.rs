//! Where commands physically run: inside a network namespace, or directly
//! on the machine.

use super::{CommandLine, ExecTarget};
use crate::error::{AppError, Result};
use std::fmt;
use std::process::Stdio;
use tokio::process::Command;

/// Builds OS commands for execution targets
pub trait Substrate: Send + Sync + fmt::Debug {
    /// Command running `line` on `target`, without shell interpretation
    fn command(&self, target: &ExecTarget, line: &CommandLine) -> Result<Command>;

    /// Command running `script` through `sh -c` on the local machine
    fn shell(&self, script: &str) -> Command;

    /// Command delivering `signal` (e.g. `TERM`) to `pid`
    fn signal(&self, pid: u32, signal: &str) -> Command;

    /// Short description used in log lines
    fn describe(&self) -> &'static str;
}

fn base_command(sudo: bool, program: &str) -> Command {
    if sudo {
        let mut cmd = Command::new("sudo");
        cmd.arg("-n").arg(program);
        cmd
    } else {
        Command::new(program)
    }
}

fn prepare(mut cmd: Command) -> Command {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

/// Hosts are `ip netns` namespaces named `<prefix><host>`
#[derive(Debug, Clone)]
pub struct NetnsSubstrate {
    prefix: String,
    sudo: bool,
}

impl NetnsSubstrate {
    pub fn new<S: Into<String>>(prefix: S, sudo: bool) -> Self {
        Self {
            prefix: prefix.into(),
            sudo,
        }
    }

    pub fn namespace(&self, host: &str) -> String {
        format!("{}{}", self.prefix, host)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Substrate for NetnsSubstrate {
    fn command(&self, target: &ExecTarget, line: &CommandLine) -> Result<Command> {
        let (program, args) = line
            .split_first()
            .ok_or_else(|| AppError::validation("Cannot run an empty command"))?;

        let cmd = match target {
            ExecTarget::Local => {
                let mut cmd = base_command(self.sudo, program);
                cmd.args(args);
                cmd
            }
            ExecTarget::Host(host) => {
                let mut cmd = base_command(self.sudo, "ip");
                cmd.args(["netns", "exec"])
                    .arg(self.namespace(host))
                    .arg(program)
                    .args(args);
                cmd
            }
        };
        Ok(prepare(cmd))
    }

    fn shell(&self, script: &str) -> Command {
        let mut cmd = base_command(self.sudo, "sh");
        cmd.arg("-c").arg(script);
        prepare(cmd)
    }

    fn signal(&self, pid: u32, signal: &str) -> Command {
        let mut cmd = base_command(self.sudo, "kill");
        cmd.arg(format!("-{}", signal)).arg(pid.to_string());
        cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
        cmd
    }

    fn describe(&self) -> &'static str {
        "netns"
    }
}

/// Runs every target's commands directly on this machine.
///
/// Used when no isolation is wanted, and by tests that exercise process
/// handling without root.
#[derive(Debug, Clone, Default)]
pub struct DirectSubstrate;

impl Substrate for DirectSubstrate {
    fn command(&self, _target: &ExecTarget, line: &CommandLine) -> Result<Command> {
        let (program, args) = line
            .split_first()
            .ok_or_else(|| AppError::validation("Cannot run an empty command"))?;
        let mut cmd = Command::new(program);
        cmd.args(args);
        Ok(prepare(cmd))
    }

    fn shell(&self, script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        prepare(cmd)
    }

    fn signal(&self, pid: u32, signal: &str) -> Command {
        let mut cmd = Command::new("kill");
        cmd.arg(format!("-{}", signal)).arg(pid.to_string());
        cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
        cmd
    }

    fn describe(&self) -> &'static str {
        "direct"
    }
}
