//! The `oknav` command.
//!
//! Invoked as `oknav`, runs a command across the fleet. Invoked through a symlink named after an
//! alias (see `oknav install`), runs a command on that one host, or opens a shell there.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use oknav::config::{
    self, DEFAULT_LINK_DIR, DEFAULT_TIMEOUT, HOSTS_ENV, PROGRAM_NAME, SSH_PROGRAM, TIMEOUT_ENV,
};
use oknav::engine::report::Transcript;
use oknav::engine::transport::{CommandTransport, Transport};
use oknav::engine::{Mode, Status};
use oknav::{fleet, links, list, Engine, Error, Registry, Resolver};
use std::collections::HashSet;
use std::env;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::signal::unix::{signal, SignalKind};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Run a shell command across a fleet of servers.
#[derive(Debug, Parser)]
#[command(
    name = PROGRAM_NAME,
    version,
    args_conflicts_with_subcommands = true,
    subcommand_negates_reqs = true
)]
struct Cli {
    #[command(subcommand)]
    subcommand: Option<Sub>,

    #[command(flatten)]
    common: Common,

    /// Run on all servers at once instead of one after another.
    #[arg(short, long)]
    parallel: bool,

    /// Per-server timeout in seconds.
    #[arg(
        short,
        long,
        env = TIMEOUT_ENV,
        default_value_t = DEFAULT_TIMEOUT,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout: u64,

    /// Leave a server out of this run. May be repeated.
    #[arg(short = 'x', long = "exclude", value_name = "ALIAS")]
    exclude: Vec<String>,

    /// The command to run on each server.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[derive(Debug, Subcommand)]
enum Sub {
    /// List every alias, its address, and whether it is in the fleet.
    List,

    /// Create a symlink to this program for every alias.
    Install {
        #[arg(long, default_value = DEFAULT_LINK_DIR)]
        dir: PathBuf,
    },

    /// Remove the symlinks created by `install`.
    Remove {
        #[arg(long, default_value = DEFAULT_LINK_DIR)]
        dir: PathBuf,
    },
}

#[derive(Debug, Args)]
struct Common {
    /// Path to the host registry.
    #[arg(long, env = HOSTS_ENV, global = true, value_name = "PATH")]
    hosts: Option<PathBuf>,

    /// Log decisions to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Run a shell command on one server, or open a shell there if no command is given.
#[derive(Debug, Parser)]
struct DirectCli {
    #[command(flatten)]
    common: Common,

    /// Timeout in seconds.
    #[arg(
        short,
        long,
        env = TIMEOUT_ENV,
        default_value_t = DEFAULT_TIMEOUT,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout: u64,

    /// The command to run.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<OsString> = env::args_os().collect();
    let invoked_as = args
        .first()
        .and_then(|arg0| Path::new(arg0).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| PROGRAM_NAME.to_owned());

    let result = if invoked_as == PROGRAM_NAME {
        let cli = Cli::parse_from(args);
        init_logging(cli.common.verbose);
        run_fleet(cli).await
    } else {
        let cli = DirectCli::parse_from(args);
        init_logging(cli.common.verbose);
        run_direct(&invoked_as, cli).await
    };

    match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{invoked_as}: {error:#}");
            match error.downcast_ref::<Error>() {
                Some(Error::Interrupted) => ExitCode::from(130),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "oknav=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Completes on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(error) => {
            warn!(%error, "can't listen for SIGTERM");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

/// Looks up the current hostname once. Failing that, local-only aliases fail to resolve.
fn hostname() -> String {
    config::current_hostname().unwrap_or_else(|error| {
        warn!(%error, "can't determine hostname; local-only servers will be skipped");
        String::new()
    })
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

async fn run_fleet(cli: Cli) -> anyhow::Result<ExitCode> {
    let registry = Arc::new(Registry::load(cli.common.hosts.as_deref())?);

    match cli.subcommand {
        Some(Sub::List) => {
            let members = fleet::select(&registry, &HashSet::new());
            print!("{}", list::render(&registry, &list::rows(&registry, &members)));
            return Ok(ExitCode::SUCCESS);
        }
        Some(Sub::Install { dir }) => {
            let target = env::current_exe().context("can't locate this program")?;
            for (alias, outcome) in links::install(&registry, &dir, &target)? {
                match outcome {
                    links::Outcome::Created(path) => println!("linked {}", path.display()),
                    links::Outcome::Present(_) => {}
                    links::Outcome::Occupied(path) => {
                        eprintln!("skipped {alias}: {} already exists", path.display())
                    }
                    links::Outcome::Unsafe => eprintln!("skipped {alias}: not a file name"),
                }
            }
            return Ok(ExitCode::SUCCESS);
        }
        Some(Sub::Remove { dir }) => {
            let target = env::current_exe().context("can't locate this program")?;
            for path in links::remove(&registry, &dir, &target)? {
                println!("removed {}", path.display());
            }
            return Ok(ExitCode::SUCCESS);
        }
        None => {}
    }

    let excludes: HashSet<String> = cli.exclude.into_iter().collect();
    let members = fleet::require_members(fleet::select(&registry, &excludes))?;

    let engine = Engine::new(Resolver::new(registry, hostname()), CommandTransport::ssh());
    let mode = match cli.parallel {
        true => Mode::Concurrent,
        false => Mode::Sequential,
    };
    let command = cli.command.join(" ");
    let mut transcript = Transcript::stdout();

    engine
        .run_until(
            &members,
            &command,
            mode,
            Duration::from_secs(cli.timeout),
            &mut transcript,
            shutdown_signal(),
        )
        .await?;
    Ok(ExitCode::SUCCESS)
}

async fn run_direct(alias: &str, cli: DirectCli) -> anyhow::Result<ExitCode> {
    let registry = Arc::new(Registry::load(cli.common.hosts.as_deref())?);
    let resolver = Resolver::new(registry, hostname());
    let address = resolver.resolve(alias)?;

    if cli.command.is_empty() {
        let status = tokio::process::Command::new(SSH_PROGRAM)
            .arg(address)
            .kill_on_drop(true)
            .status()
            .await
            .with_context(|| format!("failed to start {SSH_PROGRAM}"))?;
        return Ok(exit_code(status.code().unwrap_or(255)));
    }

    let command = cli.command.join(" ");
    let transport = CommandTransport::ssh();
    let output = tokio::select! {
        output = transport.run(address, &command, Duration::from_secs(cli.timeout)) => output,
        _ = shutdown_signal() => return Err(Error::Interrupted.into()),
    };

    let status = match output {
        Ok(output) => {
            tokio::io::stdout().write_all(&output.stdout).await?;
            tokio::io::stderr().write_all(&output.stderr).await?;
            Status::from_exit_code(output.status.code())
        }
        Err(error) => {
            eprintln!("{alias}: failed to start transport: {error}");
            Status::WrapperError
        }
    };
    if matches!(status, Status::Timeout | Status::WrapperError) {
        eprintln!("{alias}: {status}");
    }
    Ok(exit_code(status.exit_code()))
}
