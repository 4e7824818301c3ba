// src/db/mod.rs

//! In-memory package databases
//!
//! A [`PackageDatabase`] owns every descriptor of one repository in an arena
//! and indexes them by name in an ordered map. Descriptors sharing a name form
//! a cluster kept in insertion order; inserting a duplicate name extends the
//! cluster and never overwrites. Provides and replaces entries become virtual
//! alias descriptors that point back at their real package by [`DescId`].

pub mod catalog;

pub use catalog::{Catalog, DbRef, PackageRef, SearchMatch};

use crate::packages::{DescFlags, DescId, PackageDescriptor};
use std::collections::BTreeMap;
use tracing::debug;

/// Where a database's descriptors come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A configured repository mirror
    Upstream,
    /// The installed package tree
    Local,
    /// The community-contributed source
    Contributed,
}

/// How the raw descriptor bytes were held while loading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// Every record came out of one decompressed archive
    Archive,
    /// Every record was read from its own file
    PerEntry,
}

/// Name-indexed arena of descriptors for one repository
#[derive(Debug)]
pub struct PackageDatabase {
    name: String,
    origin: Origin,
    storage: Storage,
    descs: Vec<PackageDescriptor>,
    index: BTreeMap<String, Vec<DescId>>,
}

impl PackageDatabase {
    pub fn new(name: impl Into<String>, origin: Origin, storage: Storage) -> Self {
        Self {
            name: name.into(),
            origin,
            storage,
            descs: Vec::new(),
            index: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn storage(&self) -> Storage {
        self.storage
    }

    /// Number of descriptors, aliases included
    pub fn len(&self) -> usize {
        self.descs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descs.is_empty()
    }

    /// Number of distinct names in the index
    pub fn cluster_count(&self) -> usize {
        self.index.len()
    }

    pub fn get(&self, id: DescId) -> Option<&PackageDescriptor> {
        self.descs.get(id.index())
    }

    pub fn get_mut(&mut self, id: DescId) -> Option<&mut PackageDescriptor> {
        self.descs.get_mut(id.index())
    }

    /// Add a descriptor under its own name, extending an existing cluster
    pub fn insert(&mut self, desc: PackageDescriptor) -> DescId {
        let id = DescId(self.descs.len() as u32);

        match desc.link.and_then(|l| self.descs.get(l.index())) {
            Some(target) if desc.flags.contains(DescFlags::PROVIDE) => {
                debug!("{}: {} provided by {}", self.name, desc.name, target.name)
            }
            Some(target) => debug!("{}: {} replaced by {}", self.name, desc.name, target.name),
            None => debug!("{}: {}", self.name, desc),
        }

        self.index.entry(desc.name.clone()).or_default().push(id);
        self.descs.push(desc);
        id
    }

    /// Insert one alias per `provides` entry of `id`
    pub fn insert_provides(&mut self, id: DescId) {
        self.insert_aliases(id, DescFlags::PROVIDE);
    }

    /// Insert one alias per `replaces` entry of `id`
    pub fn insert_replaces(&mut self, id: DescId) {
        self.insert_aliases(id, DescFlags::REPLACE);
    }

    fn insert_aliases(&mut self, id: DescId, kind: DescFlags) {
        let Some(desc) = self.get(id) else {
            return;
        };
        let entries = if kind == DescFlags::PROVIDE {
            desc.provides.clone()
        } else {
            desc.replaces.clone()
        };
        for entry in &entries {
            self.insert(PackageDescriptor::alias(entry, id, kind));
        }
    }

    /// Insert a real package together with its provides and replaces
    pub fn insert_with_aliases(&mut self, desc: PackageDescriptor) -> DescId {
        let id = self.insert(desc);
        self.insert_provides(id);
        self.insert_replaces(id);
        id
    }

    /// The cluster stored under `name`, in insertion order
    pub fn search_by_name(&self, name: &str) -> Option<&[DescId]> {
        self.index.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// First non-virtual member of the cluster named `name`
    pub fn find_canonical(&self, name: &str) -> Option<DescId> {
        self.search_by_name(name)?
            .iter()
            .copied()
            .find(|id| self.get(*id).is_some_and(|d| !d.is_virtual()))
    }

    /// The real package a descriptor stands for
    pub fn canonical_of(&self, id: DescId) -> DescId {
        self.get(id).and_then(|d| d.link).unwrap_or(id)
    }

    /// Clusters in name order
    pub fn clusters(&self) -> impl Iterator<Item = (&str, &[DescId])> {
        self.index.iter().map(|(name, ids)| (name.as_str(), ids.as_slice()))
    }

    /// Every descriptor in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (DescId, &PackageDescriptor)> {
        self.descs
            .iter()
            .enumerate()
            .map(|(i, d)| (DescId(i as u32), d))
    }

    /// Plain substring search over names and descriptions.
    ///
    /// A cluster whose name matches contributes every member. Otherwise each
    /// member is tested against its description, aliases using the
    /// description of the package they stand for.
    pub fn fuzzy_match(&self, needle: &str) -> Vec<DescId> {
        let mut out = Vec::new();
        for (name, ids) in &self.index {
            if name.contains(needle) {
                out.extend_from_slice(ids);
                continue;
            }
            for &id in ids {
                let Some(desc) = self.get(self.canonical_of(id)) else {
                    continue;
                };
                if desc.description.contains(needle) {
                    out.push(id);
                }
            }
        }
        out
    }

    /// Forget resolver variables and expansion marks
    pub fn clear_resolution(&mut self) {
        for desc in &mut self.descs {
            desc.var = None;
            desc.flags.remove(DescFlags::EXPANDED);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packages::Dependency;

    fn pkg(name: &str, version: &str) -> PackageDescriptor {
        PackageDescriptor {
            name: name.to_string(),
            version: version.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_duplicate_insert_keeps_both() {
        let mut db = PackageDatabase::new("core", Origin::Upstream, Storage::Archive);
        let a = db.insert(pkg("b", "1.5"));
        let b = db.insert(pkg("b", "2.1"));

        assert_eq!(db.search_by_name("b"), Some(&[a, b][..]));
        assert_eq!(db.get(a).unwrap().version, "1.5");
        assert_eq!(db.get(b).unwrap().version, "2.1");
        assert_eq!(db.cluster_count(), 1);
        assert_eq!(db.len(), 2);
    }

    #[test]
    fn test_provides_resolve_to_owner() {
        let mut db = PackageDatabase::new("extra", Origin::Upstream, Storage::Archive);
        let mut baz = pkg("baz", "1.0");
        baz.provides = vec![Dependency::parse("foo"), Dependency::parse("bar=2")];
        let id = db.insert_with_aliases(baz);

        for name in ["foo", "bar"] {
            let cluster = db.search_by_name(name).unwrap();
            assert_eq!(cluster.len(), 1);
            let alias = db.get(cluster[0]).unwrap();
            assert!(alias.flags.contains(DescFlags::PROVIDE));
            assert_eq!(alias.link, Some(id));
            assert_eq!(db.get(db.canonical_of(cluster[0])).unwrap().name, "baz");
        }
        assert_eq!(db.get(db.search_by_name("bar").unwrap()[0]).unwrap().version, "2");
        assert!(db.get(id).unwrap().link.is_none());
    }

    #[test]
    fn test_replaces_are_aliases() {
        let mut db = PackageDatabase::new("extra", Origin::Upstream, Storage::Archive);
        let mut new = pkg("pipewire-pulse", "1.0");
        new.replaces = vec![Dependency::parse("pulseaudio")];
        let id = db.insert_with_aliases(new);

        let alias = db.search_by_name("pulseaudio").unwrap()[0];
        assert!(db.get(alias).unwrap().flags.contains(DescFlags::REPLACE));
        assert_eq!(db.canonical_of(alias), id);
        assert_eq!(db.find_canonical("pulseaudio"), None);
    }

    #[test]
    fn test_find_canonical_skips_aliases() {
        let mut db = PackageDatabase::new("core", Origin::Upstream, Storage::Archive);
        let mut bash = pkg("bash", "5.2");
        bash.provides = vec![Dependency::parse("sh")];
        db.insert_with_aliases(bash);
        let real = db.insert(pkg("sh", "1.0"));

        assert_eq!(db.search_by_name("sh").unwrap().len(), 2);
        assert_eq!(db.find_canonical("sh"), Some(real));
    }

    #[test]
    fn test_fuzzy_match() {
        let mut db = PackageDatabase::new("extra", Origin::Upstream, Storage::Archive);
        let mut vim = pkg("vim", "9.1");
        vim.description = "Vi Improved, a highly configurable text editor".to_string();
        vim.provides = vec![Dependency::parse("xxd")];
        db.insert_with_aliases(vim);
        let mut nano = pkg("nano", "8.0");
        nano.description = "Pico editor clone".to_string();
        db.insert(nano);

        let hits: Vec<_> = db
            .fuzzy_match("editor")
            .into_iter()
            .map(|id| db.get(id).unwrap().name.clone())
            .collect();
        assert_eq!(hits, vec!["nano", "vim", "xxd"]);

        let hits = db.fuzzy_match("vi");
        assert_eq!(hits.len(), 1);
        assert!(db.fuzzy_match("emacs").is_empty());
    }

    #[test]
    fn test_clear_resolution() {
        let mut db = PackageDatabase::new("core", Origin::Upstream, Storage::Archive);
        let id = db.insert(pkg("a", "1"));
        let desc = db.get_mut(id).unwrap();
        desc.var = Some(3);
        desc.flags.insert(DescFlags::EXPANDED | DescFlags::INSTALLED);

        db.clear_resolution();
        let desc = db.get(id).unwrap();
        assert_eq!(desc.var, None);
        assert!(!desc.flags.contains(DescFlags::EXPANDED));
        assert!(desc.flags.contains(DescFlags::INSTALLED));
    }
}
