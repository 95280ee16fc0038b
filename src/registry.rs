//! Parses the host registry into an immutable, queryable [Registry].

use crate::config;
use crate::error::Error;
use indexmap::IndexMap;
use regex::Regex;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Option tagging an alias for fleet runs.
pub const FLEET: &str = "oknav";

/// Option removing an alias from fleet runs even when tagged with [FLEET].
pub const EXCLUDE: &str = "exclude";

/// Option restricting an alias to one named machine, e.g. `local-only:workstation`.
pub const LOCAL_ONLY: &str = "local-only";

/// The options attached to a registry line, e.g. `(oknav,local-only:workstation)`.
///
/// Maps each option name to its optional `:value` payload. Order is preserved from the source
/// line. Options this crate does not recognize are kept but otherwise ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OptionSet(IndexMap<String, Option<String>>);

impl OptionSet {
    /// Parses the text between the parentheses of an option group.
    ///
    /// Options are comma separated. Blank options are dropped. A repeated option keeps its last
    /// value.
    ///
    /// ```
    /// # use oknav::registry::OptionSet;
    /// let options = OptionSet::parse("oknav, local-only:workstation,");
    /// assert!(options.contains("oknav"));
    /// assert_eq!(Some("workstation"), options.value("local-only"));
    /// assert_eq!(2, options.len());
    /// ```
    pub fn parse(group: &str) -> Self {
        let mut options = IndexMap::new();
        for token in group.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token.split_once(':') {
                Some((name, value)) => {
                    options.insert(name.trim().to_owned(), Some(value.trim().to_owned()))
                }
                None => options.insert(token.to_owned(), None),
            };
        }
        Self(options)
    }

    /// Whether the option is present, with or without a value.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// The value attached to an option, if the option is present and has one.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.as_deref())
    }

    /// The hostname named by `local-only:HOST`, if any.
    pub fn local_only(&self) -> Option<&str> {
        self.value(LOCAL_ONLY)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }
}

impl fmt::Display for OptionSet {
    /// Formats the set the way it appears in the registry, e.g. `(oknav,local-only:ws)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let options: Vec<String> = self
            .iter()
            .map(|(name, value)| match value {
                Some(value) => format!("{name}:{value}"),
                None => name.to_owned(),
            })
            .collect();
        write!(f, "({})", options.join(","))
    }
}

/// One line of the registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostEntry {
    /// The target address, typically a fully qualified domain name.
    pub address: String,

    /// Aliases in declaration order. Never empty; the first is the primary alias.
    pub aliases: Vec<String>,

    pub options: OptionSet,

    /// The 1-based line number this entry was parsed from.
    pub line: usize,
}

impl HostEntry {
    /// The first alias declared for the address.
    pub fn primary(&self) -> &str {
        &self.aliases[0]
    }
}

/// The parsed host registry.
///
/// Built once per run by [Registry::parse] or [Registry::load]; there is no way to modify it
/// afterward. Share it with [std::sync::Arc] when tasks need it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Registry {
    /// Where this registry came from, if it was loaded from a file.
    pub source: Option<PathBuf>,

    entries: Vec<HostEntry>,

    /// Every alias occurrence in declaration order, duplicates included.
    aliases: Vec<String>,

    /// alias -> address. Last declaration wins.
    addresses: IndexMap<String, String>,

    /// alias -> options. Last declaration wins.
    options: IndexMap<String, OptionSet>,

    /// address -> primary alias. Last declaration wins.
    primaries: IndexMap<String, String>,
}

/// Matches a trimmed registry line: everything before an optional trailing option group, and the
/// group's contents. Lines with parentheses anywhere else do not match.
fn line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<head>[^()]*?)(?:\s*\((?P<options>[^()]*)\))?$")
            .expect("registry line pattern is valid")
    })
}

impl Registry {
    /// Parses registry text.
    ///
    /// Blank lines and lines starting with `#` are ignored. A line that doesn't have the shape
    /// `ADDRESS ALIAS [ALIAS...] [(OPTION[,OPTION...])]` is skipped with a warning.
    ///
    /// # Duplicates
    ///
    /// If an alias is declared more than once, the last declaration decides its address and
    /// options, but every occurrence is kept in [Registry::aliases]. The same applies to an
    /// address declared on more than one line: the last line decides its primary alias. Both
    /// cases are logged as warnings.
    ///
    /// # Errors
    ///
    /// Returns [Error::RegistryEmpty] if no aliases were found.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut registry = Registry::default();

        for (index, raw) in text.lines().enumerate() {
            let line_number = index + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some(captures) = line_pattern().captures(line) else {
                warn!(line = line_number, "skipping registry line with misplaced parentheses");
                continue;
            };

            let mut tokens = captures["head"].split_whitespace().map(str::to_owned);
            let address = tokens.next();
            let aliases: Vec<String> = tokens.collect();
            let (address, aliases) = match (address, aliases.is_empty()) {
                (Some(address), false) => (address, aliases),
                _ => {
                    warn!(line = line_number, "skipping registry line without an alias");
                    continue;
                }
            };

            let options = captures
                .name("options")
                .map(|group| OptionSet::parse(group.as_str()))
                .unwrap_or_default();

            registry.insert(HostEntry {
                address,
                aliases,
                options,
                line: line_number,
            });
        }

        if registry.aliases.is_empty() {
            return Err(Error::RegistryEmpty);
        }
        Ok(registry)
    }

    /// Adds an entry and updates the indices.
    fn insert(&mut self, entry: HostEntry) {
        if let Some(previous) = self
            .primaries
            .insert(entry.address.clone(), entry.primary().to_owned())
        {
            warn!(
                address = %entry.address,
                line = entry.line,
                previous = %previous,
                "address declared more than once; the last declaration sets its primary alias",
            );
        }

        for alias in &entry.aliases {
            if self
                .addresses
                .insert(alias.clone(), entry.address.clone())
                .is_some()
            {
                warn!(
                    alias = %alias,
                    line = entry.line,
                    "alias declared more than once; the last declaration wins",
                );
            }
            self.options.insert(alias.clone(), entry.options.clone());
            self.aliases.push(alias.clone());
        }

        self.entries.push(entry);
    }

    /// Finds the registry file.
    ///
    /// Tries the candidates from [config::registry_candidates] in order and returns the first one
    /// that exists.
    ///
    /// # Errors
    ///
    /// Returns [Error::RegistryNotFound] listing every path tried if none exists.
    pub fn locate(explicit: Option<&Path>) -> Result<PathBuf, Error> {
        let candidates = config::registry_candidates(explicit);
        match candidates.iter().find(|path| path.is_file()) {
            Some(path) => Ok(path.clone()),
            None => {
                let mut searched = Vec::with_capacity(candidates.len() + 1);
                if let Some(explicit) = explicit {
                    if !candidates.iter().any(|c| c == explicit) {
                        searched.push(explicit.to_owned());
                    }
                }
                searched.extend(candidates);
                Err(Error::RegistryNotFound { searched })
            }
        }
    }

    /// Locates, reads, and parses the registry.
    pub fn load(explicit: Option<&Path>) -> Result<Self, Error> {
        let path = Self::locate(explicit)?;
        Self::load_from(path)
    }

    /// Reads and parses the registry at `path`.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        debug!(path = %path.display(), "loading host registry");
        let text = fs::read_to_string(&path).map_err(|source| Error::RegistryRead {
            path: path.clone(),
            source,
        })?;
        let mut registry = Self::parse(&text)?;
        registry.source = Some(path);
        Ok(registry)
    }

    /// Parsed lines in file order.
    pub fn entries(&self) -> &[HostEntry] {
        &self.entries
    }

    /// Every alias occurrence in declaration order, duplicates included.
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Whether `alias` is declared anywhere in the registry.
    pub fn contains(&self, alias: &str) -> bool {
        self.addresses.contains_key(alias)
    }

    /// The address an alias points to.
    pub fn address(&self, alias: &str) -> Option<&str> {
        self.addresses.get(alias).map(String::as_str)
    }

    /// The options attached to an alias.
    pub fn options(&self, alias: &str) -> Option<&OptionSet> {
        self.options.get(alias)
    }

    /// The primary alias of an address.
    pub fn primary_alias(&self, address: &str) -> Option<&str> {
        self.primaries.get(address).map(String::as_str)
    }

    /// Whether `alias` is the primary alias of the address it points to.
    pub fn is_primary(&self, alias: &str) -> bool {
        self.address(alias)
            .and_then(|address| self.primary_alias(address))
            .is_some_and(|primary| primary == alias)
    }
}

#[cfg(test)]
pub mod fixtures {
    /// A small registry covering fleet members, excluded hosts, secondary aliases, and local-only
    /// hosts.
    pub const TEXT: &str = "\
# Fleet
a.test a1 (oknav)
b.test b1 (oknav,exclude)
c.test c1 c1b (oknav)

# Not tagged
d.test d1

# Pinned to one machine
e.test e1 (oknav,local-only:workstation)
";
}
