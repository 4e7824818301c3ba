// src/packages/dependency.rs

//! Dependency strings such as `glibc>=2.38` or `python: for scripting`

use crate::version;
use std::cmp::Ordering;
use std::fmt;
use tracing::debug;

/// Operator set plus the version it applies to.
///
/// `>=` sets both `greater` and `equal`. Parsed once, never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Constraint {
    pub less: bool,
    pub equal: bool,
    pub greater: bool,
    pub version: String,
}

impl Constraint {
    /// True if `candidate` satisfies the operators
    pub fn accepts(&self, candidate: &str) -> bool {
        if candidate.is_empty() || self.version.is_empty() {
            return true;
        }
        match version::compare(candidate, &self.version) {
            Ordering::Less => self.less,
            Ordering::Equal => self.equal,
            Ordering::Greater => self.greater,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.less {
            f.write_str("<")?;
        }
        if self.greater {
            f.write_str(">")?;
        }
        if self.equal {
            f.write_str("=")?;
        }
        f.write_str(&self.version)
    }
}

/// A `(name, constraint)` entry of depends, conflicts, provides or replaces
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dependency {
    pub name: String,
    pub constraint: Option<Constraint>,
    /// Reason text of an optional dependency
    pub description: Option<String>,
}

impl Dependency {
    /// Split `name[<op>version]` at the first operator character
    pub fn parse(raw: &str) -> Self {
        let Some(at) = raw.find(['<', '=', '>']) else {
            return Self {
                name: raw.to_string(),
                constraint: None,
                description: None,
            };
        };

        let mut constraint = Constraint::default();
        let mut rest = &raw[at..];
        while let Some(op) = rest.chars().next() {
            match op {
                '<' => constraint.less = true,
                '=' => constraint.equal = true,
                '>' => constraint.greater = true,
                _ => break,
            }
            rest = &rest[1..];
        }
        constraint.version = rest.to_string();

        Self {
            name: raw[..at].to_string(),
            constraint: Some(constraint),
            description: None,
        }
    }

    /// Like [`Dependency::parse`], first splitting off a `": reason"` suffix
    pub fn parse_optional(raw: &str) -> Self {
        match raw.split_once(": ") {
            Some((spec, reason)) => Self {
                description: Some(reason.to_string()),
                ..Self::parse(spec)
            },
            None => Self::parse(raw),
        }
    }

    /// True if a package at `version` satisfies this entry
    pub fn accepts(&self, version: &str) -> bool {
        match &self.constraint {
            Some(c) => {
                let ok = c.accepts(version);
                if !ok {
                    debug!("{} {} rejected by {}", self.name, version, self);
                }
                ok
            }
            None => true,
        }
    }

    /// Constraint version, empty when unconstrained
    pub fn version(&self) -> &str {
        self.constraint.as_ref().map_or("", |c| c.version.as_str())
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(c) = &self.constraint {
            write!(f, "{}", c)?;
        }
        if let Some(reason) = &self.description {
            write!(f, ": {}", reason)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_name() {
        let dep = Dependency::parse("glibc");
        assert_eq!(dep.name, "glibc");
        assert!(dep.constraint.is_none());
        assert!(dep.accepts("0.1"));
    }

    #[test]
    fn test_parse_combined_operators() {
        let dep = Dependency::parse("python>=3.11");
        assert_eq!(dep.name, "python");
        let c = dep.constraint.as_ref().unwrap();
        assert!(c.greater && c.equal && !c.less);
        assert_eq!(c.version, "3.11");

        let dep = Dependency::parse("openssl<3");
        let c = dep.constraint.as_ref().unwrap();
        assert!(c.less && !c.equal && !c.greater);

        let dep = Dependency::parse("libfoo=1:2.0-1");
        assert_eq!(dep.version(), "1:2.0-1");
    }

    #[test]
    fn test_accepts_honors_operators() {
        let dep = Dependency::parse("b>=2.0");
        assert!(dep.accepts("2.1"));
        assert!(dep.accepts("2.0"));
        assert!(!dep.accepts("1.5"));

        let dep = Dependency::parse("b<2.0");
        assert!(dep.accepts("1.5"));
        assert!(!dep.accepts("2.0"));

        let dep = Dependency::parse("b=2.0");
        assert!(dep.accepts("2.0"));
        assert!(!dep.accepts("2.0.1"));
    }

    #[test]
    fn test_missing_version_is_accepted() {
        assert!(Dependency::parse("b>=2.0").accepts(""));
        assert!(Dependency::parse("b>=").accepts("1.0"));
    }

    #[test]
    fn test_optional_description() {
        let dep = Dependency::parse_optional("python-gobject: GTK bindings");
        assert_eq!(dep.name, "python-gobject");
        assert_eq!(dep.description.as_deref(), Some("GTK bindings"));

        let dep = Dependency::parse_optional("perl>=1:5.30: scripts");
        assert_eq!(dep.name, "perl");
        assert_eq!(dep.version(), "1:5.30");
        assert_eq!(dep.to_string(), "perl>=1:5.30: scripts");
    }

    #[test]
    fn test_display_operator_order() {
        assert_eq!(Dependency::parse("a>=1").to_string(), "a>=1");
        assert_eq!(Dependency::parse("a<=1").to_string(), "a<=1");
        assert_eq!(Dependency::parse("a=1").to_string(), "a=1");
        assert_eq!(Dependency::parse("a").to_string(), "a");
    }
}
