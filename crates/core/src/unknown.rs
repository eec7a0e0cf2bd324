//! Unknown values for partial evaluation.
//!
//! When an activation declares an attribute pattern as unknown, resolving a
//! matching attribute produces an [`UnknownSet`] instead of a value or an
//! error. Strict operators propagate unknowns and merge them by set union;
//! short-circuit operators may absorb them.

use std::fmt;

use crate::map::MapKey;

/// A path from a root variable through zero or more qualifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeTrail {
    pub variable: String,
    pub qualifiers: Vec<MapKey>,
}

impl AttributeTrail {
    pub fn new(variable: impl Into<String>) -> AttributeTrail {
        AttributeTrail {
            variable: variable.into(),
            qualifiers: Vec::new(),
        }
    }

    pub fn qualified(mut self, qualifier: MapKey) -> AttributeTrail {
        self.qualifiers.push(qualifier);
        self
    }

    /// Whether `self` names the same attribute or a prefix of `other`.
    /// `request.auth` covers `request.auth.claims.email`.
    pub fn covers(&self, other: &AttributeTrail) -> bool {
        self.variable == other.variable
            && self.qualifiers.len() <= other.qualifiers.len()
            && self
                .qualifiers
                .iter()
                .zip(other.qualifiers.iter())
                .all(|(a, b)| a == b)
    }
}

impl fmt::Display for AttributeTrail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.variable)?;
        for q in &self.qualifiers {
            match q {
                MapKey::String(s) => write!(f, ".{s}")?,
                other => write!(f, "[{other}]")?,
            }
        }
        Ok(())
    }
}

/// The set of `(expression id, attribute trail)` pairs an unknown value
/// carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnknownSet {
    entries: Vec<(i64, AttributeTrail)>,
}

impl UnknownSet {
    pub fn single(expr_id: i64, trail: AttributeTrail) -> UnknownSet {
        UnknownSet {
            entries: vec![(expr_id, trail)],
        }
    }

    /// Set union; duplicates collapse.
    pub fn merge(&self, other: &UnknownSet) -> UnknownSet {
        let mut merged = self.entries.clone();
        for entry in &other.entries {
            if !merged.contains(entry) {
                merged.push(entry.clone());
            }
        }
        UnknownSet { entries: merged }
    }

    pub fn entries(&self) -> &[(i64, AttributeTrail)] {
        &self.entries
    }

    pub fn trails(&self) -> impl Iterator<Item = &AttributeTrail> {
        self.entries.iter().map(|(_, trail)| trail)
    }

    pub fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }
}

impl fmt::Display for UnknownSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown{")?;
        for (i, (_, trail)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{trail}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trail(var: &str, fields: &[&str]) -> AttributeTrail {
        let mut t = AttributeTrail::new(var);
        for f in fields {
            t = t.qualified(MapKey::String((*f).into()));
        }
        t
    }

    #[test]
    fn test_trail_display() {
        let t = trail("request", &["auth", "claims", "email"]);
        assert_eq!(t.to_string(), "request.auth.claims.email");
        let indexed = trail("xs", &[]).qualified(MapKey::Int(3));
        assert_eq!(indexed.to_string(), "xs[3]");
    }

    #[test]
    fn test_prefix_covers() {
        let prefix = trail("request", &["auth"]);
        let full = trail("request", &["auth", "claims", "email"]);
        assert!(prefix.covers(&full));
        assert!(!full.covers(&prefix));
        assert!(!trail("resource", &[]).covers(&full));
    }

    #[test]
    fn test_merge_is_union() {
        let a = UnknownSet::single(1, trail("x", &[]));
        let b = UnknownSet::single(2, trail("y", &["f"]));
        let merged = a.merge(&b);
        assert_eq!(merged.entries().len(), 2);
        // Merging again does not duplicate.
        assert_eq!(merged.merge(&a).entries().len(), 2);
    }
}
