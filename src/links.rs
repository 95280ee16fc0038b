//! Installs and removes alias symlinks, so that `ok0 uptime` works like `oknav` targeting `ok0`.

use crate::registry::Registry;
use anyhow::Context;
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// What [install] did for one alias.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Created(PathBuf),

    /// A symlink to the target was already there.
    Present(PathBuf),

    /// Something else occupies the path; it was left alone.
    Occupied(PathBuf),

    /// The alias can't be used as a file name.
    Unsafe,
}

/// Distinct aliases in declaration order.
fn distinct_aliases(registry: &Registry) -> Vec<&str> {
    let mut seen = HashSet::new();
    registry
        .aliases()
        .iter()
        .map(String::as_str)
        .filter(|alias| seen.insert(*alias))
        .collect()
}

// Aliases become file names in `dir`. Refuse anything that could point elsewhere.
fn safe_file_name(alias: &str) -> bool {
    !alias.is_empty() && alias != "." && alias != ".." && !alias.contains('/')
}

/// Whether `path` is a symlink pointing at `target`.
fn links_to(path: &Path, target: &Path) -> bool {
    fs::read_link(path).is_ok_and(|dest| dest == target)
}

/// Creates `dir/ALIAS -> target` for every alias in the registry.
///
/// Existing files are never replaced. Returns one outcome per distinct alias, in declaration
/// order.
///
/// # Errors
///
/// Returns an error if `dir` can't be inspected or a symlink can't be created.
pub fn install(
    registry: &Registry,
    dir: &Path,
    target: &Path,
) -> anyhow::Result<Vec<(String, Outcome)>> {
    let mut outcomes = Vec::new();
    for alias in distinct_aliases(registry) {
        if !safe_file_name(alias) {
            warn!(%alias, "not installing a link for an alias that isn't a plain file name");
            outcomes.push((alias.to_owned(), Outcome::Unsafe));
            continue;
        }

        let path = dir.join(alias);
        let outcome = match fs::symlink_metadata(&path) {
            Ok(_) if links_to(&path, target) => Outcome::Present(path),
            Ok(_) => {
                warn!(path = %path.display(), "leaving existing file in place");
                Outcome::Occupied(path)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                symlink(target, &path).with_context(|| {
                    format!("failed to link {} -> {}", path.display(), target.display())
                })?;
                debug!(path = %path.display(), "created link");
                Outcome::Created(path)
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to inspect {}", path.display()));
            }
        };
        outcomes.push((alias.to_owned(), outcome));
    }
    Ok(outcomes)
}

/// Removes `dir/ALIAS` for every alias in the registry, but only where it is a symlink to
/// `target`.
///
/// Returns the paths removed.
pub fn remove(registry: &Registry, dir: &Path, target: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for alias in distinct_aliases(registry) {
        if !safe_file_name(alias) {
            continue;
        }
        let path = dir.join(alias);
        if links_to(&path, target) {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
            debug!(path = %path.display(), "removed link");
            removed.push(path);
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::parse("a.test a1 a2 (oknav)\nb.test b1\nc.test a1").unwrap()
    }

    #[test]
    fn install_works() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = PathBuf::from("/opt/oknav/bin/oknav");

        let outcomes = install(&registry(), dir.path(), &target)?;

        let expected: Vec<(String, Outcome)> = ["a1", "a2", "b1"]
            .into_iter()
            .map(|a| (a.to_owned(), Outcome::Created(dir.path().join(a))))
            .collect();
        assert_eq!(expected, outcomes);
        for alias in ["a1", "a2", "b1"] {
            assert_eq!(target, fs::read_link(dir.path().join(alias))?);
        }
        Ok(())
    }

    #[test]
    fn install_is_repeatable() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = PathBuf::from("/opt/oknav/bin/oknav");

        install(&registry(), dir.path(), &target)?;
        let outcomes = install(&registry(), dir.path(), &target)?;

        assert!(outcomes
            .iter()
            .all(|(_, outcome)| matches!(outcome, Outcome::Present(_))));
        Ok(())
    }

    #[test]
    fn install_leaves_other_files_alone() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = PathBuf::from("/opt/oknav/bin/oknav");
        fs::write(dir.path().join("b1"), "keep me")?;
        symlink("/usr/bin/true", dir.path().join("a2"))?;

        let outcomes = install(&registry(), dir.path(), &target)?;

        assert_eq!(Outcome::Occupied(dir.path().join("a2")), outcomes[1].1);
        assert_eq!(Outcome::Occupied(dir.path().join("b1")), outcomes[2].1);
        assert_eq!("keep me", fs::read_to_string(dir.path().join("b1"))?);
        assert_eq!(
            PathBuf::from("/usr/bin/true"),
            fs::read_link(dir.path().join("a2"))?,
        );
        Ok(())
    }

    #[test]
    fn install_refuses_path_like_aliases() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let registry = Registry::parse("a.test ../evil\nb.test ..").unwrap();

        let outcomes = install(&registry, dir.path(), Path::new("/opt/oknav"))?;

        assert_eq!(
            vec![
                ("../evil".to_owned(), Outcome::Unsafe),
                ("..".to_owned(), Outcome::Unsafe),
            ],
            outcomes,
        );
        Ok(())
    }

    #[test]
    fn remove_works() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = PathBuf::from("/opt/oknav/bin/oknav");
        install(&registry(), dir.path(), &target)?;
        fs::remove_file(dir.path().join("b1"))?;
        fs::write(dir.path().join("b1"), "keep me")?;

        let removed = remove(&registry(), dir.path(), &target)?;

        assert_eq!(
            vec![dir.path().join("a1"), dir.path().join("a2")],
            removed,
        );
        assert!(dir.path().join("b1").exists());
        assert!(fs::symlink_metadata(dir.path().join("a1")).is_err());
        Ok(())
    }

    #[test]
    fn remove_ignores_links_elsewhere() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        symlink("/usr/bin/true", dir.path().join("a1"))?;

        let removed = remove(&registry(), dir.path(), Path::new("/opt/oknav/bin/oknav"))?;

        assert!(removed.is_empty());
        assert!(fs::symlink_metadata(dir.path().join("a1")).is_ok());
        Ok(())
    }
}
