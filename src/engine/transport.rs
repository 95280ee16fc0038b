//! Provides an interface to run a command on a remote host.
//!
//! The engine never talks to SSH directly. It hands an address and a command to a [Transport],
//! which is expected to enforce the timeout and report the outcome as an exit code using the
//! conventions of `timeout(1)`: 124 for a timeout, 125 for a failure of the wrapper itself.

use crate::config::SSH_PROGRAM;
use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use shlex::Quoter;
use std::io;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs a single command on a single host.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Runs `command` on `address`, giving up after `timeout`.
    ///
    /// Returns the captured output and exit status. An [Err] value means the command could not be
    /// started at all.
    ///
    /// Dropping the returned future must stop any process it started, including processes those
    /// processes started.
    async fn run(&self, address: &str, command: &str, timeout: Duration) -> io::Result<Output>;
}

/// Production implementation of [Transport]: runs an external program under a timeout wrapper.
///
/// The full invocation is `WRAPPER SECONDS PROGRAM ARGS... ADDRESS COMMAND`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandTransport {
    /// The timeout-enforcing wrapper, normally `timeout`.
    pub wrapper: String,

    /// The transport program, normally `ssh`.
    pub program: String,

    /// Arguments passed to `program` before the address.
    pub args: Vec<String>,
}

impl CommandTransport {
    /// Runs `ssh` in batch mode under `timeout`.
    ///
    /// Stdin is closed so a remote command can't wait on the operator's terminal.
    pub fn ssh() -> Self {
        Self {
            wrapper: "timeout".into(),
            program: SSH_PROGRAM.into(),
            args: vec!["-n".into(), "-o".into(), "BatchMode=yes".into()],
        }
    }

    fn command(&self, address: &str, command: &str, timeout: Duration) -> Command {
        let mut cmd = Command::new(&self.wrapper);
        cmd.arg(seconds(timeout))
            .arg(&self.program)
            .args(&self.args)
            .arg(address)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    /// A shell-quoted rendering of the invocation, for logging.
    pub fn display(&self, address: &str, command: &str, timeout: Duration) -> String {
        let secs = seconds(timeout);
        let words = [self.wrapper.as_str(), &secs, &self.program]
            .into_iter()
            .chain(self.args.iter().map(String::as_str))
            .chain([address, command]);
        let words: Vec<&str> = words.collect();
        Quoter::new()
            .join(words.iter().copied())
            .unwrap_or_else(|_| words.join(" "))
    }
}

impl Default for CommandTransport {
    fn default() -> Self {
        Self::ssh()
    }
}

#[async_trait]
impl Transport for CommandTransport {
    async fn run(&self, address: &str, command: &str, timeout: Duration) -> io::Result<Output> {
        debug!(invocation = %self.display(address, command, timeout), "running");
        let child = self.command(address, command, timeout).spawn()?;
        let guard = Terminate::new(child.id());
        let output = child.wait_with_output().await;
        guard.disarm();
        output
    }
}

/// Formats a timeout for `timeout(1)`, which reads `0` as "no timeout".
///
/// Whole seconds are written as integers, anything else with millisecond precision. The budget is
/// never less than one millisecond.
fn seconds(timeout: Duration) -> String {
    let millis = timeout.as_millis().max(1);
    match millis % 1000 {
        0 => format!("{}", millis / 1000),
        frac => format!("{}.{frac:03}", millis / 1000),
    }
}

/// Sends SIGTERM to the wrapper when dropped while armed.
///
/// `timeout(1)` runs its command in its own process group and relays SIGTERM to that group, so
/// the transport program and everything it started stop with it. SIGKILL would not be relayed.
struct Terminate {
    pid: Option<Pid>,
}

impl Terminate {
    fn new(id: Option<u32>) -> Self {
        let pid = id.and_then(|id| i32::try_from(id).ok()).map(Pid::from_raw);
        Self { pid }
    }

    /// Call once the child has been reaped; its pid may be reused after that.
    fn disarm(mut self) {
        self.pid = None;
    }
}

impl Drop for Terminate {
    fn drop(&mut self) {
        let Some(pid) = self.pid.take() else {
            return;
        };
        debug!(%pid, "terminating abandoned transport");
        if let Err(error) = signal::kill(pid, Signal::SIGTERM) {
            warn!(%pid, %error, "can't terminate transport");
        }
    }
}
