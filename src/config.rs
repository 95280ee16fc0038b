use anyhow::{bail, Context};
use std::env;
use std::ffi::OsString;
use std::os::unix::ffi::OsStringExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// File name of the host registry, both in [config_dir] and next to the executable.
pub const REGISTRY_FILE: &str = "hosts.conf";

/// Environment variable holding an explicit registry path.
pub const HOSTS_ENV: &str = "OKNAV_HOSTS";

/// Environment variable that overrides the current machine's hostname.
pub const HOSTNAME_ENV: &str = "OKNAV_HOSTNAME";

/// Environment variable holding the default per-host timeout in seconds.
pub const TIMEOUT_ENV: &str = "OKNAV_TIMEOUT";

/// Per-host timeout used when none is given.
pub const DEFAULT_TIMEOUT: u64 = 30;

/// The remote shell program, for fleet runs and interactive sessions alike.
pub const SSH_PROGRAM: &str = "ssh";

/// The name the binary answers to when not invoked through an alias symlink.
pub const PROGRAM_NAME: &str = "oknav";

/// Where `install` places alias symlinks by default.
pub const DEFAULT_LINK_DIR: &str = "/usr/local/bin";

/// Returns a [PathBuf] to the directory where oknav's configuration should live.
///
/// When compiled for testing, this returns `CARGO_MANIFEST_DIR` plus `resources/etc/oknav`.
/// Otherwise, it returns `/etc/oknav`.
pub fn config_dir() -> PathBuf {
    // Omit the leading slash so that PathBuf::push appends instead of replacing.
    const CONFIG_DIR: &str = "etc/oknav";

    let mut path = PathBuf::new();

    #[cfg(test)]
    {
        path.push(env!("CARGO_MANIFEST_DIR"));
        path.push("resources");
    }

    #[cfg(not(test))]
    path.push("/");

    path.push(CONFIG_DIR);
    path
}

/// Lists the places the registry may live, in lookup order.
///
/// 1. `explicit`, if given and it exists.
/// 2. [REGISTRY_FILE] in [config_dir].
/// 3. [REGISTRY_FILE] in the directory holding the running executable, if that can be determined.
///
/// Nothing past the first entry is checked for existence here; [Registry::locate] does that.
///
/// [Registry::locate]: crate::registry::Registry::locate
pub fn registry_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(3);

    if let Some(path) = explicit {
        if path.exists() {
            candidates.push(path.to_owned());
        }
    }

    candidates.push(config_dir().join(REGISTRY_FILE));

    if let Some(dir) = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_owned))
    {
        candidates.push(dir.join(REGISTRY_FILE));
    }

    candidates
}

/// Returns the current machine's hostname.
///
/// Honors [HOSTNAME_ENV] if it is set and non-empty; otherwise invokes the `hostname` utility.
/// Callers should look this up once per run and hand the value to the [Resolver].
///
/// [Resolver]: crate::resolve::Resolver
pub fn current_hostname() -> anyhow::Result<String> {
    if let Ok(name) = env::var(HOSTNAME_ENV) {
        let name = name.trim();
        if !name.is_empty() {
            return Ok(name.to_owned());
        }
    }

    match Command::new("hostname")
        .output()
        .context("error calling `hostname`")?
    {
        Output { status, stdout, .. } if status.success() => {
            let name = String::from_utf8(stdout).context("hostnames should be UTF-8")?;
            Ok(name.trim().to_owned())
        }
        Output { stderr, .. } => {
            bail!("error calling `hostname`: {:?}", OsString::from_vec(stderr))
        }
    }
}
