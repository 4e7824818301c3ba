// src/db/catalog.rs

//! The set of databases one run works with

use super::{Origin, PackageDatabase, Storage};
use crate::packages::{DescFlags, DescId, PackageDescriptor};
use tracing::{debug, info};

/// Which database of the catalog a descriptor lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbRef {
    Local,
    Contributed,
    Upstream(usize),
}

/// Catalog-wide address of a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackageRef {
    pub db: DbRef,
    pub id: DescId,
}

/// One search hit
#[derive(Debug, Clone, PartialEq)]
pub struct SearchMatch {
    pub repository: String,
    pub name: String,
    pub version: String,
    pub description: String,
    /// Name of the package an alias stands for
    pub provided_by: Option<String>,
    pub installed: bool,
}

/// Local, contributed and upstream databases
#[derive(Debug)]
pub struct Catalog {
    pub local: PackageDatabase,
    pub contributed: PackageDatabase,
    /// In configuration order
    pub upstream: Vec<PackageDatabase>,
}

impl Catalog {
    pub fn new(local: PackageDatabase, upstream: Vec<PackageDatabase>) -> Self {
        Self {
            local,
            contributed: PackageDatabase::new("aur", Origin::Contributed, Storage::PerEntry),
            upstream,
        }
    }

    pub fn db(&self, db: DbRef) -> Option<&PackageDatabase> {
        match db {
            DbRef::Local => Some(&self.local),
            DbRef::Contributed => Some(&self.contributed),
            DbRef::Upstream(i) => self.upstream.get(i),
        }
    }

    pub fn db_mut(&mut self, db: DbRef) -> Option<&mut PackageDatabase> {
        match db {
            DbRef::Local => Some(&mut self.local),
            DbRef::Contributed => Some(&mut self.contributed),
            DbRef::Upstream(i) => self.upstream.get_mut(i),
        }
    }

    pub fn get(&self, r: PackageRef) -> Option<&PackageDescriptor> {
        self.db(r.db)?.get(r.id)
    }

    pub fn get_mut(&mut self, r: PackageRef) -> Option<&mut PackageDescriptor> {
        self.db_mut(r.db)?.get_mut(r.id)
    }

    /// Follow an alias to the package it stands for
    pub fn canonical(&self, r: PackageRef) -> PackageRef {
        match self.db(r.db) {
            Some(db) => PackageRef {
                db: r.db,
                id: db.canonical_of(r.id),
            },
            None => r,
        }
    }

    /// Cluster for `name` in the first upstream database that has one
    pub fn find_upstream(&self, name: &str) -> Option<(usize, &[DescId])> {
        self.upstream
            .iter()
            .enumerate()
            .find_map(|(i, db)| db.search_by_name(name).map(|ids| (i, ids)))
    }

    /// Mark local packages as installed or orphaned.
    ///
    /// A local package found in any upstream database marks itself and the
    /// upstream real package installed. One found nowhere is flagged removed
    /// unless it was built locally.
    pub fn cross_reference(&mut self) {
        let mut installed = 0usize;
        let mut orphaned = 0usize;
        let local: Vec<(DescId, String, bool)> = self
            .local
            .iter()
            .map(|(id, d)| (id, d.name.clone(), d.flags.contains(DescFlags::LOCALLY_BUILT)))
            .collect();

        for (id, name, locally_built) in local {
            let hit = self.find_upstream(&name).and_then(|(i, ids)| {
                let db = &self.upstream[i];
                ids.iter()
                    .copied()
                    .find(|id| db.get(*id).is_some_and(|d| !d.is_virtual()))
                    .or_else(|| ids.first().map(|first| db.canonical_of(*first)))
                    .map(|canon| PackageRef {
                        db: DbRef::Upstream(i),
                        id: canon,
                    })
            });

            match hit {
                Some(r) => {
                    if let Some(d) = self.get_mut(r) {
                        d.flags.insert(DescFlags::INSTALLED);
                    }
                    if let Some(d) = self.local.get_mut(id) {
                        d.flags.insert(DescFlags::INSTALLED);
                    }
                    installed += 1;
                }
                None if !locally_built => {
                    debug!("{} is installed but no longer in any repository", name);
                    if let Some(d) = self.local.get_mut(id) {
                        d.flags.insert(DescFlags::REMOVED);
                    }
                    orphaned += 1;
                }
                None => {}
            }
        }

        info!(
            "Cross-referenced local packages: {} from repositories, {} orphaned",
            installed, orphaned
        );
    }

    /// Add contributed-source records, marking the ones installed locally
    pub fn import_contributed(&mut self, records: Vec<PackageDescriptor>) -> usize {
        let count = records.len();
        for mut desc in records {
            desc.flags.insert(DescFlags::LOCALLY_BUILT);
            if self.local.contains(&desc.name) {
                desc.flags.insert(DescFlags::INSTALLED);
            }
            debug!("Adding contributed package {}", desc);
            self.contributed.insert_with_aliases(desc);
        }
        count
    }

    /// Substring search over upstream and contributed databases
    pub fn search(&self, needle: &str) -> Vec<SearchMatch> {
        let mut out = Vec::new();
        let dbs = self.upstream.iter().chain(std::iter::once(&self.contributed));
        for db in dbs {
            for id in db.fuzzy_match(needle) {
                let Some(desc) = db.get(id) else { continue };
                let canonical = db.get(db.canonical_of(id)).unwrap_or(desc);
                out.push(SearchMatch {
                    repository: db.name().to_string(),
                    name: desc.name.clone(),
                    version: canonical.version.clone(),
                    description: canonical.description.clone(),
                    provided_by: desc.link.map(|_| canonical.name.clone()),
                    installed: canonical.flags.contains(DescFlags::INSTALLED)
                        || self.local.contains(&canonical.name),
                });
            }
        }
        out
    }

    /// Reset per-resolution state on every database
    pub fn clear_resolution(&mut self) {
        self.local.clear_resolution();
        self.contributed.clear_resolution();
        for db in &mut self.upstream {
            db.clear_resolution();
        }
    }
}
