//! Renders the registry for the `list` subcommand.

use crate::registry::Registry;
use std::collections::HashSet;
use std::fmt::Write;

/// One row of the listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row<'r> {
    pub alias: &'r str,
    pub address: &'r str,
    pub primary: bool,

    /// Whether the alias is in `members`.
    pub fleet: bool,

    pub local_only: Option<&'r str>,
}

/// Builds one row per distinct alias, in declaration order.
///
/// `members` is typically the result of [fleet::select] with no runtime excludes.
///
/// [fleet::select]: crate::fleet::select
pub fn rows<'r>(registry: &'r Registry, members: &[String]) -> Vec<Row<'r>> {
    let members: HashSet<&str> = members.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    registry
        .aliases()
        .iter()
        .filter(|alias| seen.insert(alias.as_str()))
        .filter_map(|alias| {
            let address = registry.address(alias)?;
            Some(Row {
                alias: alias.as_str(),
                address,
                primary: registry.is_primary(alias),
                fleet: members.contains(alias.as_str()),
                local_only: registry.options(alias).and_then(|o| o.local_only()),
            })
        })
        .collect()
}

/// Formats rows as aligned columns: alias, address, then tags.
///
/// Secondary aliases are tagged with the primary alias they share an address with.
pub fn render(registry: &Registry, rows: &[Row]) -> String {
    let alias_width = rows.iter().map(|r| r.alias.len()).max().unwrap_or(0);
    let address_width = rows.iter().map(|r| r.address.len()).max().unwrap_or(0);

    let mut out = String::new();
    for row in rows {
        let mut tags = Vec::new();
        if row.fleet {
            tags.push("fleet".to_owned());
        }
        if !row.primary {
            if let Some(primary) = registry.primary_alias(row.address) {
                tags.push(format!("alias of {primary}"));
            }
        }
        if let Some(host) = row.local_only {
            tags.push(format!("local-only:{host}"));
        }

        // Writing to a String can't fail.
        let _ = writeln!(
            out,
            "{:alias_width$}  {:address_width$}  {}",
            row.alias,
            row.address,
            tags.join(", "),
        );
    }

    out.lines()
        .map(str::trim_end)
        .fold(String::new(), |mut acc, line| {
            acc.push_str(line);
            acc.push('\n');
            acc
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet;
    use crate::registry::fixtures::TEXT;

    fn fixture() -> (Registry, Vec<String>) {
        let registry = Registry::parse(TEXT).unwrap();
        let members = fleet::select(&registry, &HashSet::new());
        (registry, members)
    }

    #[test]
    fn rows_work() {
        let (registry, members) = fixture();
        let rows = rows(&registry, &members);

        let aliases: Vec<&str> = rows.iter().map(|r| r.alias).collect();
        assert_eq!(vec!["a1", "b1", "c1", "c1b", "d1", "e1"], aliases);

        assert_eq!(
            Row {
                alias: "c1b",
                address: "c.test",
                primary: false,
                fleet: false,
                local_only: None,
            },
            rows[3],
        );
        assert_eq!(Some("workstation"), rows[5].local_only);
        assert!(rows[5].fleet);
        assert!(!rows[1].fleet);
    }

    #[test]
    fn rows_skip_duplicates() {
        let registry = Registry::parse("a.test a1\nb.test a1").unwrap();
        let rows = rows(&registry, &[]);
        assert_eq!(1, rows.len());
        assert_eq!("b.test", rows[0].address);
    }

    #[test]
    fn render_works() {
        let (registry, members) = fixture();
        let rows = rows(&registry, &members);
        let expected = "\
a1   a.test  fleet
b1   b.test
c1   c.test  fleet
c1b  c.test  alias of c1
d1   d.test
e1   e.test  fleet, local-only:workstation
";
        assert_eq!(expected, render(&registry, &rows));
    }
}
