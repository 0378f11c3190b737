// =============================================================================
// QMK - Kernel Services - Capability-Based Access Control
// =============================================================================
// Table of Contents:
//   1. Capability - Opaque capability token
//   2. CapabilitySet - Collection of capabilities granted to a session
//   3. Well-known capability tokens
// =============================================================================
// Purpose: Capability tokens gate access to opcode classes in the graph
//          execution stack. Negotiation and session lifetime are owned by the
//          (out of scope) RPC/session transport; the kernel only ever sees the
//          resulting opaque token set and checks membership.
// =============================================================================

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

// =============================================================================
// 1. Capability - Opaque capability token
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capability(String);

impl Capability {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub const ALLOC: &'static str = "CAP_ALLOC";
    pub const LINK: &'static str = "CAP_LINK";
    pub const TELEPORT: &'static str = "CAP_TELEPORT";
    pub const MAGIC: &'static str = "CAP_MAGIC";
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Capability {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// =============================================================================
// 2. CapabilitySet - Collection of capabilities granted to a session
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilitySet {
    granted: HashSet<Capability>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            granted: tokens.into_iter().map(|t| Capability::new(t.into())).collect(),
        }
    }

    pub fn grant(&mut self, capability: Capability) {
        self.granted.insert(capability);
    }

    pub fn has(&self, capability: &Capability) -> bool {
        self.granted.contains(capability)
    }

    pub fn union_with(&self, other: &CapabilitySet) -> CapabilitySet {
        CapabilitySet {
            granted: self.granted.union(&other.granted).cloned().collect(),
        }
    }

    /// Returns true iff every capability in `required` is present in this set.
    pub fn satisfies(&self, required: &[Capability]) -> bool {
        required.iter().all(|cap| self.granted.contains(cap))
    }

    pub fn missing(&self, required: &[Capability]) -> Vec<Capability> {
        required
            .iter()
            .filter(|cap| !self.granted.contains(*cap))
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.granted.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn satisfies_requires_all() {
        let mut caps = CapabilitySet::new();
        caps.grant(Capability::new(Capability::ALLOC));

        let required = vec![Capability::new(Capability::ALLOC)];
        assert!(caps.satisfies(&required));

        let required_missing = vec![Capability::new(Capability::ALLOC), Capability::new(Capability::LINK)];
        assert!(!caps.satisfies(&required_missing));
        assert_eq!(
            caps.missing(&required_missing),
            vec![Capability::new(Capability::LINK)]
        );
    }

    #[test]
    fn union_merges_two_sets() {
        let mut a = CapabilitySet::new();
        a.grant(Capability::new(Capability::ALLOC));
        let mut b = CapabilitySet::new();
        b.grant(Capability::new(Capability::LINK));

        let merged = a.union_with(&b);
        assert!(merged.has(&Capability::new(Capability::ALLOC)));
        assert!(merged.has(&Capability::new(Capability::LINK)));
    }
}
