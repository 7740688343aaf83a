//! Named affinity relationships.
//!
//! Affinity entries are written `[!]name[:hard|:soft]`. A leading `!` marks
//! anti-affinity. Without a strength suffix, affinity is hard and
//! anti-affinity is soft.

use std::collections::BTreeMap;
use std::fmt;

/// Marks an entry as anti-affinity.
pub const ANTI_AFFINITY_MARKER: char = '!';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintStrength {
    /// Must be satisfied exactly.
    Hard,
    /// Preferred; relaxed when it cannot be satisfied uniquely.
    Soft,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AffinityConstraint {
    pub name: String,
    pub strength: ConstraintStrength,
    pub anti_affinity: bool,
}

impl AffinityConstraint {
    pub fn affinity(name: impl Into<String>, strength: ConstraintStrength) -> Self {
        Self {
            name: name.into(),
            strength,
            anti_affinity: false,
        }
    }

    pub fn anti_affinity(name: impl Into<String>, strength: ConstraintStrength) -> Self {
        Self {
            name: name.into(),
            strength,
            anti_affinity: true,
        }
    }

    /// Parse an affinity entry. Returns `None` for entries without a name.
    pub fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        let (anti_affinity, rest) = match entry.strip_prefix(ANTI_AFFINITY_MARKER) {
            Some(rest) => (true, rest.trim_start()),
            None => (false, entry),
        };

        let (name, strength) = match rest.rsplit_once(':') {
            Some((name, suffix)) if suffix.eq_ignore_ascii_case("hard") => {
                (name, Some(ConstraintStrength::Hard))
            }
            Some((name, suffix)) if suffix.eq_ignore_ascii_case("soft") => {
                (name, Some(ConstraintStrength::Soft))
            }
            _ => (rest, None),
        };

        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let strength = strength.unwrap_or(if anti_affinity {
            ConstraintStrength::Soft
        } else {
            ConstraintStrength::Hard
        });

        Some(Self {
            name: name.to_string(),
            strength,
            anti_affinity,
        })
    }

    pub fn is_hard(&self) -> bool {
        self.strength == ConstraintStrength::Hard
    }
}

impl fmt::Display for AffinityConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.anti_affinity {
            write!(f, "{ANTI_AFFINITY_MARKER}")?;
        }
        let strength = match self.strength {
            ConstraintStrength::Hard => "hard",
            ConstraintStrength::Soft => "soft",
        };
        write!(f, "{}:{strength}", self.name)
    }
}

/// Parse a list of affinity entries into a name → constraint map.
pub fn constraints_of(entries: &[String]) -> BTreeMap<String, AffinityConstraint> {
    entries
        .iter()
        .filter_map(|e| AffinityConstraint::parse(e))
        .map(|c| (c.name.clone(), c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_name_is_hard_affinity() {
        let c = AffinityConstraint::parse("db").unwrap();
        assert_eq!(c, AffinityConstraint::affinity("db", ConstraintStrength::Hard));
    }

    #[test]
    fn marker_is_soft_anti_affinity() {
        let c = AffinityConstraint::parse("!db").unwrap();
        assert_eq!(c, AffinityConstraint::anti_affinity("db", ConstraintStrength::Soft));
    }

    #[test]
    fn explicit_strength_overrides_default() {
        let c = AffinityConstraint::parse("!db:HARD").unwrap();
        assert!(c.anti_affinity);
        assert!(c.is_hard());

        let c = AffinityConstraint::parse("cache:soft").unwrap();
        assert!(!c.anti_affinity);
        assert_eq!(c.strength, ConstraintStrength::Soft);
    }

    #[test]
    fn unknown_suffix_is_part_of_name() {
        let c = AffinityConstraint::parse("svc:v2").unwrap();
        assert_eq!(c.name, "svc:v2");
    }

    #[test]
    fn empty_entries_are_ignored() {
        assert!(AffinityConstraint::parse("").is_none());
        assert!(AffinityConstraint::parse("!").is_none());
        assert!(AffinityConstraint::parse("!:hard").is_none());
    }

    #[test]
    fn display_round_trips_through_parse() {
        let c = AffinityConstraint::anti_affinity("db", ConstraintStrength::Hard);
        assert_eq!(c.to_string(), "!db:hard");
        assert_eq!(AffinityConstraint::parse(&c.to_string()), Some(c));
    }

    #[test]
    fn constraints_of_keys_by_name() {
        let entries = vec!["db".to_string(), "!cache:hard".to_string(), " ".to_string()];
        let map = constraints_of(&entries);
        assert_eq!(map.len(), 2);
        assert!(map["cache"].anti_affinity);
        assert!(!map["db"].anti_affinity);
    }
}
