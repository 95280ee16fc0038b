//! Decides which aliases take part in a fleet run.

use crate::error::Error;
use crate::registry::{Registry, EXCLUDE, FLEET};
use std::collections::HashSet;

/// Returns the fleet members of `registry`, in declaration order.
///
/// An alias is a member if all of the following hold:
///
/// * it is the primary alias for its address,
/// * it is tagged `oknav`,
/// * it is not tagged `exclude`,
/// * it is not in `excludes`.
///
/// Secondary aliases are never members, even when tagged, so one address is targeted at most once
/// per run. An alias declared more than once appears at most once, at its first position.
///
/// `local-only` is not checked here. Members that may not run on this machine fail individually
/// when the [Engine] resolves them.
///
/// An empty result is not an error at this level; see [require_members].
///
/// [Engine]: crate::engine::Engine
pub fn select(registry: &Registry, excludes: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    registry
        .aliases()
        .iter()
        .filter(|alias| seen.insert(alias.as_str()))
        .filter(|alias| registry.is_primary(alias))
        .filter(|alias| {
            registry
                .options(alias)
                .is_some_and(|options| options.contains(FLEET) && !options.contains(EXCLUDE))
        })
        .filter(|alias| !excludes.contains(alias.as_str()))
        .cloned()
        .collect()
}

/// Treats an empty fleet selection as fatal.
///
/// # Errors
///
/// Returns [Error::NoFleetMembers] if `members` is empty.
pub fn require_members(members: Vec<String>) -> Result<Vec<String>, Error> {
    if members.is_empty() {
        return Err(Error::NoFleetMembers);
    }
    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::fixtures::TEXT;

    fn excludes(aliases: &[&str]) -> HashSet<String> {
        aliases.iter().map(|a| a.to_string()).collect()
    }

    fn scenario() -> Registry {
        Registry::parse("a.test a1 (oknav)\nb.test b1 (oknav,exclude)\nc.test c1 c1b (oknav)")
            .unwrap()
    }

    #[test]
    fn works() {
        assert_eq!(vec!["a1", "c1"], select(&scenario(), &excludes(&[])));
    }

    #[test]
    fn runtime_excludes() {
        assert_eq!(vec!["c1"], select(&scenario(), &excludes(&["a1"])));
    }

    #[test]
    fn excluding_a_secondary_alias_has_no_effect() {
        assert_eq!(vec!["a1", "c1"], select(&scenario(), &excludes(&["c1b"])));
    }

    #[test]
    fn unknown_runtime_excludes_are_ignored() {
        assert_eq!(vec!["a1", "c1"], select(&scenario(), &excludes(&["nope"])));
    }

    #[test]
    fn keeps_local_only_members() {
        let registry = Registry::parse(TEXT).unwrap();
        assert_eq!(vec!["a1", "c1", "e1"], select(&registry, &excludes(&[])));
    }

    #[test]
    fn never_selects_secondary_aliases() {
        // a2 carries the line's `oknav` tag, but a1 is the primary alias for a.test.
        let registry = Registry::parse("a.test a1 a2 (oknav)").unwrap();
        assert!(registry.options("a2").unwrap().contains(FLEET));
        assert_eq!(vec!["a1"], select(&registry, &excludes(&[])));

        // Excluding the primary alias doesn't promote the secondary one.
        assert!(select(&registry, &excludes(&["a1"])).is_empty());
    }

    #[test]
    fn duplicate_alias_selected_once() {
        let registry = Registry::parse("a.test a1 (oknav)\nb.test b1 (oknav)\na.test a1 (oknav)")
            .unwrap();
        assert_eq!(vec!["a1", "b1"], select(&registry, &excludes(&[])));
    }

    #[test]
    fn is_idempotent() {
        let registry = Registry::parse(TEXT).unwrap();
        let excludes = excludes(&["c1"]);
        let first = select(&registry, &excludes);
        let second = select(&registry, &excludes);
        assert_eq!(first, second);
    }

    #[test]
    fn everything_excluded() {
        let selection = select(&scenario(), &excludes(&["a1", "c1"]));
        assert!(selection.is_empty());
        assert!(matches!(
            require_members(selection),
            Err(Error::NoFleetMembers)
        ));
    }

    #[test]
    fn require_members_passes_through() {
        let members = vec!["a1".to_string()];
        assert_eq!(members.clone(), require_members(members).unwrap());
    }
}
