// src/packages/descriptor.rs

//! The canonical package descriptor entity

use super::dependency::Dependency;
use std::fmt;
use std::ops::BitOr;

/// Stable index of a descriptor inside its owning database
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DescId(pub u32);

impl DescId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for DescId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Origin and state bits of a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct DescFlags(u16);

impl DescFlags {
    pub const NONE: Self = Self(0);
    /// Present in the local install set
    pub const INSTALLED: Self = Self(1 << 0);
    /// Installed locally but gone from every upstream repository
    pub const REMOVED: Self = Self(1 << 1);
    /// Built by the user rather than downloaded from a mirror
    pub const LOCALLY_BUILT: Self = Self(1 << 2);
    /// Synthesized from a `provides` entry
    pub const PROVIDE: Self = Self(1 << 3);
    /// Synthesized from a `replaces` entry
    pub const REPLACE: Self = Self(1 << 4);
    /// Dependencies already encoded by the resolver
    pub const EXPANDED: Self = Self(1 << 5);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub fn bits(self) -> u16 {
        self.0
    }
}

impl BitOr for DescFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Parsed metadata of one package
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageDescriptor {
    pub name: String,
    pub base: String,
    pub version: String,
    pub description: String,
    pub url: String,
    pub url_path: String,
    pub filename: String,
    pub maintainer: String,
    pub packager: String,
    pub md5sum: String,
    pub sha256sum: String,
    pub pgpsig: String,
    pub validation: String,
    pub arch: String,

    pub build_date: u64,
    pub install_date: u64,
    pub size: u64,
    pub csize: u64,
    pub isize: u64,
    /// 0 = explicitly installed, 1 = pulled in as a dependency
    pub reason: u64,
    pub num_votes: u64,
    pub out_of_date: u64,
    pub popularity: f64,

    pub license: Vec<String>,
    pub groups: Vec<String>,
    pub xdata: Vec<String>,

    pub depends: Vec<Dependency>,
    pub make_depends: Vec<Dependency>,
    pub check_depends: Vec<Dependency>,
    pub opt_depends: Vec<Dependency>,
    pub conflicts: Vec<Dependency>,
    pub provides: Vec<Dependency>,
    pub replaces: Vec<Dependency>,

    pub flags: DescFlags,
    /// Canonical descriptor this alias stands for; `None` on real packages
    pub link: Option<DescId>,
    /// Resolver variable, assigned on first use
    pub var: Option<u32>,
}

impl PackageDescriptor {
    /// Alias descriptor standing for `target` under the name in `entry`
    pub fn alias(entry: &Dependency, target: DescId, kind: DescFlags) -> Self {
        Self {
            name: entry.name.clone(),
            version: entry.version().to_string(),
            flags: kind,
            link: Some(target),
            ..Default::default()
        }
    }

    /// True for descriptors synthesized from provides/replaces
    pub fn is_virtual(&self) -> bool {
        self.flags.intersects(DescFlags::PROVIDE | DescFlags::REPLACE)
    }

    /// Unsigned packages built with makepkg carry these placeholder values
    pub fn looks_locally_built(&self) -> bool {
        self.validation == "none" && self.packager == "Unknown Packager"
    }
}

impl fmt::Display for PackageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{} {}", self.name, self.version)
        }
    }
}
