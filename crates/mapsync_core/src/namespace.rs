//! Resource namespaces
//!
//! Every binding instance owns a token that is unique among the bindings attached
//! to one map. Engine identifiers are derived from that token by concatenating a
//! role, so two bindings of the same kind mounted side by side never collide:
//!
//! ```
//! use mapsync_core::namespace::{InstanceToken, ResourceNamespace};
//!
//! let ns = ResourceNamespace::new(InstanceToken::from("r1"));
//! assert_eq!(ns.id("route-source"), "route-source-r1");
//! assert_eq!(ns.id("route-layer"), "route-layer-r1");
//! ```

use std::cell::Cell;
use std::fmt;

/// Per-instance unique token
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstanceToken(String);

impl InstanceToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InstanceToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl From<String> for InstanceToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl fmt::Display for InstanceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generator for unique instance tokens
///
/// One generator lives in each map context, so tokens are unique per map.
#[derive(Debug)]
pub struct TokenGenerator {
    prefix: &'static str,
    next: Cell<u64>,
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new("ms")
    }
}

impl TokenGenerator {
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            next: Cell::new(0),
        }
    }

    pub fn next(&self) -> InstanceToken {
        let id = self.next.get();
        self.next.set(id + 1);
        InstanceToken(format!("{}-{}", self.prefix, id))
    }
}

/// Derives engine identifiers for one binding instance
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceNamespace {
    token: InstanceToken,
}

impl ResourceNamespace {
    pub fn new(token: InstanceToken) -> Self {
        Self { token }
    }

    pub fn token(&self) -> &InstanceToken {
        &self.token
    }

    /// Engine identifier for `role` (e.g. `route-source`)
    pub fn id(&self, role: &str) -> String {
        format!("{}-{}", role, self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_is_unique() {
        let tokens = TokenGenerator::default();
        let a = tokens.next();
        let b = tokens.next();
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "ms-0");
        assert_eq!(b.as_str(), "ms-1");
    }

    #[test]
    fn test_namespaces_never_collide() {
        let tokens = TokenGenerator::default();
        let first = ResourceNamespace::new(tokens.next());
        let second = ResourceNamespace::new(tokens.next());
        assert_ne!(first.id("cluster-source"), second.id("cluster-source"));
        assert_ne!(first.id("clusters"), first.id("cluster-count"));
    }

    #[test]
    fn test_namespace_is_deterministic() {
        let ns = ResourceNamespace::new(InstanceToken::from("x"));
        assert_eq!(ns.id("image-layer"), ns.id("image-layer"));
        assert_eq!(ns.token().as_str(), "x");
    }
}
