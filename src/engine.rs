//! Runs one command across an ordered list of fleet members.
//!
//! # Ordering
//!
//! Whatever the [Mode], results come back in the order of the member list, and the [Report] sees
//! them in that same order. In [Mode::Sequential] this falls out of running one member at a time.
//! In [Mode::Concurrent] every member is launched at once and writes its output to its own file in
//! a scratch directory; once all members have finished, the files are read back in member order.
//! Members never share a stream, so output can't interleave.
//!
//! # Failure isolation
//!
//! A member that can't be resolved, times out, or fails remotely gets a [Status] saying so. It
//! never stops the run or cancels its siblings. Only problems with the run itself (an interrupt,
//! the scratch directory, writing the transcript) surface as an [Error].
//!
//! # Cleanup
//!
//! The scratch directory is a [tempfile::TempDir], so it is removed when the run returns, whether
//! it finished, failed, or was interrupted. Interrupting a run also drops every in-flight
//! [Transport] future, which stops the processes they started.

pub mod report;
pub mod transport;

use crate::error::{Error, ResolveError};
use crate::resolve::Resolver;
use report::Report;
use std::env;
use std::fmt;
use std::future::{self, Future};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use transport::Transport;

/// How members are run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// One member at a time; each block is reported as soon as its member finishes.
    #[default]
    Sequential,

    /// All members at once; blocks are reported after the last member finishes.
    Concurrent,
}

/// The terminal state of one member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Success,

    /// The remote command exited with this nonzero code.
    RemoteNonzero(i32),

    /// The timeout wrapper gave up on the host.
    Timeout,

    /// The timeout wrapper itself failed, could not be started, or was killed.
    WrapperError,

    /// The alias could not be resolved, so nothing was run.
    ResolutionFailure(ResolveError),
}

impl Status {
    /// Exit code the timeout wrapper uses when the time budget runs out.
    pub const TIMEOUT_EXIT: i32 = 124;

    /// Exit code the timeout wrapper uses when it fails itself.
    pub const WRAPPER_EXIT: i32 = 125;

    /// Maps a wrapper exit code to a [Status]. A missing code means the wrapper was killed by a
    /// signal.
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => Status::Success,
            Some(Self::TIMEOUT_EXIT) => Status::Timeout,
            Some(Self::WRAPPER_EXIT) | None => Status::WrapperError,
            Some(code) => Status::RemoteNonzero(code),
        }
    }

    pub fn is_success(&self) -> bool {
        *self == Status::Success
    }

    /// A process exit code equivalent to this status, for single-host invocations.
    pub fn exit_code(&self) -> i32 {
        match self {
            Status::Success => 0,
            Status::RemoteNonzero(code) => *code,
            Status::Timeout => Self::TIMEOUT_EXIT,
            Status::WrapperError => Self::WRAPPER_EXIT,
            Status::ResolutionFailure(_) => 1,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Success => write!(f, "success"),
            Status::RemoteNonzero(code) => write!(f, "exit code {code}"),
            Status::Timeout => write!(f, "connection timeout"),
            Status::WrapperError => write!(f, "timeout wrapper error"),
            Status::ResolutionFailure(error) => write!(f, "{error}"),
        }
    }
}

/// The outcome of running the command on one member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Position of the member in the list given to the [Engine].
    pub index: usize,

    pub alias: String,

    pub status: Status,

    /// Captured stdout followed by captured stderr.
    pub output: String,
}

/// Runs a command across fleet members through a [Transport].
pub struct Engine<T> {
    resolver: Resolver,
    transport: Arc<T>,

    /// Where concurrent runs create their scratch directory.
    scratch_root: PathBuf,
}

impl<T: Transport + 'static> Engine<T> {
    /// Creates an [Engine] that keeps concurrent scratch files under [env::temp_dir].
    pub fn new(resolver: Resolver, transport: T) -> Self {
        Self {
            resolver,
            transport: Arc::new(transport),
            scratch_root: env::temp_dir(),
        }
    }

    /// Keeps concurrent scratch files under `root` instead.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Runs `command` on every member and reports each result, in member order.
    ///
    /// Returns one [ExecutionResult] per member, in member order. An empty member list does
    /// nothing and returns an empty list.
    pub async fn run<R: Report>(
        &self,
        members: &[String],
        command: &str,
        mode: Mode,
        timeout: Duration,
        reporter: &mut R,
    ) -> Result<Vec<ExecutionResult>, Error> {
        self.run_until(
            members,
            command,
            mode,
            timeout,
            reporter,
            future::pending::<()>(),
        )
        .await
    }

    /// Like [Engine::run], but abandons the run when `interrupt` completes.
    ///
    /// On interrupt, in-flight transports are dropped, scratch files are removed, and
    /// [Error::Interrupted] is returned. Members already reported stay reported.
    pub async fn run_until<R: Report, F: Future<Output = ()>>(
        &self,
        members: &[String],
        command: &str,
        mode: Mode,
        timeout: Duration,
        reporter: &mut R,
        interrupt: F,
    ) -> Result<Vec<ExecutionResult>, Error> {
        if members.is_empty() {
            return Ok(Vec::new());
        }

        info!(members = members.len(), ?mode, "starting fleet run");
        match mode {
            Mode::Sequential => {
                tokio::select! {
                    results = self.run_sequential(members, command, timeout, reporter) => results,
                    _ = interrupt => Err(Error::Interrupted),
                }
            }
            Mode::Concurrent => {
                self.run_concurrent(members, command, timeout, reporter, interrupt)
                    .await
            }
        }
    }

    async fn run_sequential<R: Report>(
        &self,
        members: &[String],
        command: &str,
        timeout: Duration,
        reporter: &mut R,
    ) -> Result<Vec<ExecutionResult>, Error> {
        let mut results = Vec::with_capacity(members.len());
        for (index, alias) in members.iter().enumerate() {
            let (status, output) =
                execute(&self.resolver, &*self.transport, alias, command, timeout).await;
            let result = ExecutionResult {
                index,
                alias: alias.clone(),
                status,
                output,
            };
            reporter.report(&result).await.map_err(Error::Transcript)?;
            results.push(result);
        }
        Ok(results)
    }

    async fn run_concurrent<R: Report, F: Future<Output = ()>>(
        &self,
        members: &[String],
        command: &str,
        timeout: Duration,
        reporter: &mut R,
        interrupt: F,
    ) -> Result<Vec<ExecutionResult>, Error> {
        let scratch = tempfile::Builder::new()
            .prefix("oknav-")
            .tempdir_in(&self.scratch_root)?;
        debug!(path = %scratch.path().display(), "capturing member output");

        let mut tasks = JoinSet::new();
        for (index, alias) in members.iter().enumerate() {
            let resolver = self.resolver.clone();
            let transport = Arc::clone(&self.transport);
            let alias = alias.clone();
            let command = command.to_owned();
            let path = capture_path(scratch.path(), index);
            tasks.spawn(async move {
                let (status, output) =
                    execute(&resolver, &*transport, &alias, &command, timeout).await;
                if !output.is_empty() {
                    fs::write(&path, output).await?;
                }
                Ok::<_, io::Error>((index, status))
            });
        }

        let joined = tokio::select! {
            joined = join_all(&mut tasks) => Some(joined),
            _ = interrupt => None,
        };
        let Some(joined) = joined else {
            // Wait for the aborted tasks to drop their transports before the scratch directory
            // goes away.
            tasks.shutdown().await;
            return Err(Error::Interrupted);
        };
        let statuses = joined?;

        let mut results = Vec::with_capacity(members.len());
        for ((index, status), alias) in statuses.into_iter().zip(members) {
            let output = read_capture(&capture_path(scratch.path(), index)).await?;
            let result = ExecutionResult {
                index,
                alias: alias.clone(),
                status,
                output,
            };
            reporter.report(&result).await.map_err(Error::Transcript)?;
            results.push(result);
        }

        scratch.close()?;
        Ok(results)
    }
}

/// Resolves and runs one member. Never fails; every outcome becomes a [Status].
async fn execute<T: Transport + ?Sized>(
    resolver: &Resolver,
    transport: &T,
    alias: &str,
    command: &str,
    timeout: Duration,
) -> (Status, String) {
    let address = match resolver.resolve(alias) {
        Ok(address) => address,
        Err(error) => {
            warn!(%alias, %error, "skipping member");
            return (Status::ResolutionFailure(error), String::new());
        }
    };

    let (status, output) = match transport.run(address, command, timeout).await {
        Ok(output) => {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            (Status::from_exit_code(output.status.code()), text)
        }
        Err(error) => (
            Status::WrapperError,
            format!("failed to start transport: {error}\n"),
        ),
    };
    debug!(%alias, %address, %status, "member finished");
    (status, output)
}

/// Waits for every task and returns their statuses ordered by member index.
async fn join_all(
    tasks: &mut JoinSet<io::Result<(usize, Status)>>,
) -> Result<Vec<(usize, Status)>, Error> {
    let mut statuses = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        statuses.push(joined??);
    }
    statuses.sort_by_key(|(index, _)| *index);
    Ok(statuses)
}

/// The member-scoped capture file for the member at `index`.
fn capture_path(scratch: &Path, index: usize) -> PathBuf {
    scratch.join(format!("{index}.out"))
}

/// Reads a capture file. A member that produced no output has no file.
async fn read_capture(path: &Path) -> io::Result<String> {
    match fs::read(path).await {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(error) => Err(error),
    }
}
