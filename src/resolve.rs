//! Turns aliases into addresses.

use crate::error::ResolveError;
use crate::registry::Registry;
use std::sync::Arc;

/// Resolves aliases against a [Registry], enforcing `local-only` constraints.
///
/// The current hostname is captured once, when the [Resolver] is created, and never re-read.
/// Cloning is cheap; the registry is shared.
#[derive(Clone, Debug)]
pub struct Resolver {
    registry: Arc<Registry>,
    hostname: String,
}

impl Resolver {
    pub fn new(registry: Arc<Registry>, hostname: impl Into<String>) -> Self {
        Self {
            registry,
            hostname: hostname.into(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The hostname `local-only` constraints are checked against.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Returns the address for `alias`.
    ///
    /// # Errors
    ///
    /// [ResolveError::AliasNotFound] if the registry doesn't declare `alias`.
    ///
    /// [ResolveError::LocalOnlyViolation] if the alias carries `local-only:HOST` and `HOST` is not
    /// exactly (case-sensitively) the current hostname.
    pub fn resolve(&self, alias: &str) -> Result<&str, ResolveError> {
        let address = self
            .registry
            .address(alias)
            .ok_or_else(|| ResolveError::AliasNotFound(alias.to_owned()))?;

        if let Some(required) = self
            .registry
            .options(alias)
            .and_then(|options| options.local_only())
        {
            if required != self.hostname {
                return Err(ResolveError::LocalOnlyViolation {
                    alias: alias.to_owned(),
                    required: required.to_owned(),
                    actual: self.hostname.clone(),
                });
            }
        }

        Ok(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::fixtures::TEXT;

    fn resolver(hostname: &str) -> Resolver {
        Resolver::new(Arc::new(Registry::parse(TEXT).unwrap()), hostname)
    }

    #[test]
    fn works() {
        let resolver = resolver("laptop");
        assert_eq!(Ok("a.test"), resolver.resolve("a1"));
        assert_eq!(Ok("c.test"), resolver.resolve("c1b"));
    }

    #[test]
    fn ignores_fleet_options() {
        // Excluded and untagged aliases still resolve for direct use.
        let resolver = resolver("laptop");
        assert_eq!(Ok("b.test"), resolver.resolve("b1"));
        assert_eq!(Ok("d.test"), resolver.resolve("d1"));
    }

    #[test]
    fn alias_not_found() {
        assert_eq!(
            Err(ResolveError::AliasNotFound("zz".into())),
            resolver("laptop").resolve("zz"),
        );
    }

    #[test]
    fn local_only_on_the_right_host() {
        assert_eq!(Ok("e.test"), resolver("workstation").resolve("e1"));
    }

    #[test]
    fn local_only_on_another_host() {
        assert_eq!(
            Err(ResolveError::LocalOnlyViolation {
                alias: "e1".into(),
                required: "workstation".into(),
                actual: "laptop".into(),
            }),
            resolver("laptop").resolve("e1"),
        );
    }

    #[test]
    fn local_only_is_case_sensitive() {
        assert!(matches!(
            resolver("Workstation").resolve("e1"),
            Err(ResolveError::LocalOnlyViolation { .. }),
        ));
    }

    #[test]
    fn local_only_requires_exact_match() {
        assert!(resolver("workstation.example.com").resolve("e1").is_err());
    }
}
