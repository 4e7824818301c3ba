// src/resolver/mod.rs

//! Dependency resolution
//!
//! Every real (non-alias) package reachable from the explicitly installed
//! local set becomes one SAT variable. Explicit packages are asserted true;
//! each dependency adds `¬pkg ∨ candidate₁ ∨ candidate₂ ∨ …` over the upstream
//! packages whose version satisfies it; each declared conflict adds
//! `¬pkg ∨ ¬other`. The variables that come out true are the install set.

pub mod sat;

pub use sat::{DpllSolver, LBool, Lit, SatSolver, SolveResult};

use crate::db::{Catalog, DbRef, PackageRef};
use crate::error::{Error, Result};
use crate::packages::{DescFlags, Dependency};
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use tracing::{debug, info, warn};

/// One package chosen by the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallEntry {
    pub repository: String,
    pub name: String,
    pub version: String,
}

impl fmt::Display for InstallEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.repository, self.name, self.version)
    }
}

/// Validated result of a resolution, in variable-allocation order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallSet {
    pub packages: Vec<InstallEntry>,
}

impl InstallSet {
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn contains(&self, name: &str, version: &str) -> bool {
        self.packages
            .iter()
            .any(|p| p.name == name && p.version == version)
    }
}

/// Builds and solves one SAT instance per call
pub struct Resolver<S: SatSolver + Default = DpllSolver> {
    conflicts: bool,
    _solver: PhantomData<S>,
}

impl Resolver<DpllSolver> {
    pub fn new() -> Self {
        Self::with_solver()
    }
}

impl Default for Resolver<DpllSolver> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SatSolver + Default> Resolver<S> {
    /// Resolver backed by a solver type of the caller's choosing
    pub fn with_solver() -> Self {
        Self {
            conflicts: true,
            _solver: PhantomData,
        }
    }

    /// Toggle mutual-exclusion clauses for declared conflicts
    pub fn with_conflicts(mut self, enabled: bool) -> Self {
        self.conflicts = enabled;
        self
    }

    /// Compute the install set keeping every explicit local package.
    ///
    /// The catalog must have been cross-referenced. Resolver marks left on
    /// descriptors by an earlier call are cleared first.
    pub fn resolve(&self, catalog: &mut Catalog) -> Result<InstallSet> {
        catalog.clear_resolution();

        let mut enc = Encoder {
            catalog,
            sat: S::default(),
            vars: Vec::new(),
            work: Vec::new(),
            conflict_pairs: HashSet::new(),
            conflicts: self.conflicts,
            clauses: 0,
        };

        enc.seed()?;
        while let Some(pkg) = enc.work.pop() {
            enc.expand(pkg)?;
        }

        info!(
            "Solving {} packages with {} clauses",
            enc.vars.len(),
            enc.clauses
        );
        match enc.sat.solve() {
            SolveResult::Satisfiable => enc.install_set(),
            SolveResult::Unsatisfiable => Err(Error::Unsatisfiable),
        }
    }
}

struct Encoder<'c, S: SatSolver> {
    catalog: &'c mut Catalog,
    sat: S,
    /// Canonical package behind each variable
    vars: Vec<PackageRef>,
    work: Vec<PackageRef>,
    conflict_pairs: HashSet<(u32, u32)>,
    conflicts: bool,
    clauses: usize,
}

impl<S: SatSolver> Encoder<'_, S> {
    fn add_clause(&mut self, lits: &[Lit]) {
        self.sat.add_clause(lits);
        self.clauses += 1;
    }

    /// Variable of the real package behind `r`, allocated on first use
    fn var(&mut self, r: PackageRef) -> Result<u32> {
        let canon = self.catalog.canonical(r);
        let desc = self
            .catalog
            .get_mut(canon)
            .ok_or_else(|| Error::Internal(format!("dangling package reference {:?}", canon)))?;
        if let Some(v) = desc.var {
            return Ok(v);
        }
        let v = self.sat.new_vars(1);
        desc.var = Some(v);
        self.vars.push(canon);
        Ok(v)
    }

    /// Queue the real package behind `r` for expansion unless already done
    fn schedule(&mut self, r: PackageRef) {
        let canon = self.catalog.canonical(r);
        if let Some(desc) = self.catalog.get_mut(canon)
            && !desc.flags.contains(DescFlags::EXPANDED)
        {
            desc.flags.insert(DescFlags::EXPANDED);
            self.work.push(canon);
        }
    }

    /// Assert every explicitly installed local package
    fn seed(&mut self) -> Result<()> {
        let explicit: Vec<String> = self
            .catalog
            .local
            .clusters()
            .flat_map(|(_, ids)| ids.iter())
            .filter_map(|id| self.catalog.local.get(*id))
            .filter(|d| {
                d.reason == 0
                    && !d
                        .flags
                        .intersects(DescFlags::REMOVED | DescFlags::LOCALLY_BUILT)
            })
            .map(|d| d.name.clone())
            .collect();

        for name in explicit {
            let (db, ids) = self.catalog.find_upstream(&name).ok_or_else(|| {
                Error::Internal(format!("installed package {} has no repository candidate", name))
            })?;
            let upstream = &self.catalog.upstream[db];
            let id = upstream
                .find_canonical(&name)
                .unwrap_or_else(|| upstream.canonical_of(ids[0]));
            let r = PackageRef {
                db: DbRef::Upstream(db),
                id,
            };

            debug!("Keeping installed package {}", name);
            let v = self.var(r)?;
            self.add_clause(&[Lit::positive(v)]);
            self.schedule(r);
        }
        Ok(())
    }

    /// Upstream members of the cluster `dep` names that satisfy it
    fn candidates(&self, dep: &Dependency) -> Vec<PackageRef> {
        let Some((db, ids)) = self.catalog.find_upstream(&dep.name) else {
            return Vec::new();
        };
        let upstream = &self.catalog.upstream[db];
        ids.iter()
            .copied()
            .filter(|id| upstream.get(*id).is_some_and(|d| dep.accepts(&d.version)))
            .map(|id| PackageRef {
                db: DbRef::Upstream(db),
                id,
            })
            .collect()
    }

    fn expand(&mut self, pkg: PackageRef) -> Result<()> {
        let (name, depends, conflicts) = match self.catalog.get(pkg) {
            Some(d) => (d.name.clone(), d.depends.clone(), d.conflicts.clone()),
            None => return Err(Error::Internal(format!("dangling package reference {:?}", pkg))),
        };
        let var = self.var(pkg)?;

        for dep in &depends {
            let candidates = self.candidates(dep);
            if candidates.is_empty() {
                return Err(Error::MissingCandidate {
                    dependency: dep.to_string(),
                    required_by: name,
                });
            }

            let mut clause = Vec::with_capacity(candidates.len() + 1);
            clause.push(Lit::negative(var));
            for candidate in candidates {
                clause.push(Lit::positive(self.var(candidate)?));
                self.schedule(candidate);
            }
            debug!("{} needs {}: {:?}", name, dep, clause);
            self.add_clause(&clause);
        }

        if self.conflicts {
            for conflict in &conflicts {
                for other in self.candidates(conflict) {
                    if self.catalog.canonical(other) == pkg {
                        continue;
                    }
                    let q = self.var(other)?;
                    let pair = (var.min(q), var.max(q));
                    if self.conflict_pairs.insert(pair) {
                        debug!("{} conflicts with {}", name, conflict);
                        self.add_clause(&[Lit::negative(var), Lit::negative(q)]);
                    }
                }
            }
        }
        Ok(())
    }

    fn install_set(&self) -> Result<InstallSet> {
        let model = self.sat.model();
        let mut set = InstallSet::default();

        for (v, r) in self.vars.iter().enumerate() {
            match model.get(v) {
                Some(LBool::True) => {}
                Some(LBool::False) => continue,
                _ => {
                    warn!("Variable {} left undetermined by the solver", v);
                    continue;
                }
            }
            let desc = self
                .catalog
                .get(*r)
                .ok_or_else(|| Error::Internal(format!("dangling package reference {:?}", r)))?;
            let repository = self
                .catalog
                .db(r.db)
                .map(|db| db.name().to_string())
                .unwrap_or_default();
            set.packages.push(InstallEntry {
                repository,
                name: desc.name.clone(),
                version: desc.version.clone(),
            });
        }

        info!("Resolved {} packages", set.len());
        Ok(set)
    }
}
