// src/resolver/sat.rs

//! Boolean satisfiability capability
//!
//! The resolver only needs to allocate variables, add clauses, solve and read
//! a model back, so that is all [`SatSolver`] asks for. [`DpllSolver`] is the
//! bundled implementation: unit propagation over two watched literals per
//! clause, chronological backtracking, and decisions that try `false` first
//! so that nothing ends up installed unless some clause demands it.

use std::fmt;
use tracing::debug;

/// A variable or its negation, encoded as `var << 1 | negated`
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lit(u32);

impl Lit {
    pub fn new(var: u32, negated: bool) -> Self {
        Lit(var << 1 | negated as u32)
    }

    pub fn positive(var: u32) -> Self {
        Self::new(var, false)
    }

    pub fn negative(var: u32) -> Self {
        Self::new(var, true)
    }

    pub fn var(self) -> u32 {
        self.0 >> 1
    }

    pub fn is_negated(self) -> bool {
        self.0 & 1 == 1
    }

    pub fn negate(self) -> Self {
        Lit(self.0 ^ 1)
    }

    fn code(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_negated() {
            write!(f, "-{}", self.var())
        } else {
            write!(f, "+{}", self.var())
        }
    }
}

/// Value of a variable in a model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LBool {
    True,
    False,
    Undef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveResult {
    Satisfiable,
    Unsatisfiable,
}

/// What the resolver needs from a SAT solver
pub trait SatSolver {
    /// Allocate `n` variables and return the id of the first one
    fn new_vars(&mut self, n: u32) -> u32;

    fn num_vars(&self) -> u32;

    fn add_clause(&mut self, lits: &[Lit]);

    fn solve(&mut self) -> SolveResult;

    /// One value per variable; all `Undef` unless the last solve succeeded
    fn model(&self) -> Vec<LBool>;
}

/// Small DPLL solver with watched literals
#[derive(Debug, Default)]
pub struct DpllSolver {
    num_vars: u32,
    clauses: Vec<Vec<Lit>>,
    units: Vec<Lit>,
    /// Clause indices watching each literal code
    watches: Vec<Vec<usize>>,
    has_empty_clause: bool,

    assigns: Vec<LBool>,
    trail: Vec<Lit>,
    qhead: usize,
    /// Trail length at each decision, with the decision literal and whether
    /// its opposite has already been tried
    levels: Vec<(usize, Lit, bool)>,
    satisfied: bool,
}

impl DpllSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_clauses(&self) -> usize {
        self.clauses.len() + self.units.len()
    }

    fn value(&self, lit: Lit) -> LBool {
        match self.assigns[lit.var() as usize] {
            LBool::Undef => LBool::Undef,
            LBool::True if lit.is_negated() => LBool::False,
            LBool::False if lit.is_negated() => LBool::True,
            v => v,
        }
    }

    /// Make `lit` true; false if it is already false
    fn enqueue(&mut self, lit: Lit) -> bool {
        match self.value(lit) {
            LBool::False => false,
            LBool::True => true,
            LBool::Undef => {
                self.assigns[lit.var() as usize] = if lit.is_negated() {
                    LBool::False
                } else {
                    LBool::True
                };
                self.trail.push(lit);
                true
            }
        }
    }

    /// Unit propagation; returns the index of a conflicting clause
    fn propagate(&mut self) -> Option<usize> {
        while self.qhead < self.trail.len() {
            let false_lit = self.trail[self.qhead].negate();
            self.qhead += 1;

            let watchers = std::mem::take(&mut self.watches[false_lit.code()]);
            let mut kept = Vec::with_capacity(watchers.len());

            for (n, &ci) in watchers.iter().enumerate() {
                if self.clauses[ci][0] == false_lit {
                    self.clauses[ci].swap(0, 1);
                }

                let first = self.clauses[ci][0];
                if self.value(first) == LBool::True {
                    kept.push(ci);
                    continue;
                }

                let replacement =
                    (2..self.clauses[ci].len()).find(|&k| self.value(self.clauses[ci][k]) != LBool::False);
                if let Some(k) = replacement {
                    self.clauses[ci].swap(1, k);
                    let watch = self.clauses[ci][1];
                    self.watches[watch.code()].push(ci);
                    continue;
                }

                kept.push(ci);
                if !self.enqueue(first) {
                    kept.extend_from_slice(&watchers[n + 1..]);
                    self.watches[false_lit.code()] = kept;
                    return Some(ci);
                }
            }

            self.watches[false_lit.code()] = kept;
        }
        None
    }

    fn undo_to(&mut self, len: usize) {
        for lit in self.trail.drain(len..) {
            self.assigns[lit.var() as usize] = LBool::Undef;
        }
        self.qhead = self.trail.len();
    }

    fn next_unassigned(&self) -> Option<u32> {
        self.assigns
            .iter()
            .position(|v| *v == LBool::Undef)
            .map(|v| v as u32)
    }

    /// Undo decisions until one can be flipped; false when none is left
    fn backtrack(&mut self) -> bool {
        while let Some((len, lit, flipped)) = self.levels.pop() {
            self.undo_to(len);
            if !flipped {
                let other = lit.negate();
                self.levels.push((len, other, true));
                self.enqueue(other);
                return true;
            }
        }
        false
    }
}

impl SatSolver for DpllSolver {
    fn new_vars(&mut self, n: u32) -> u32 {
        let first = self.num_vars;
        self.num_vars += n;
        self.watches.resize_with(2 * self.num_vars as usize, Vec::new);
        first
    }

    fn num_vars(&self) -> u32 {
        self.num_vars
    }

    fn add_clause(&mut self, lits: &[Lit]) {
        let mut clause = lits.to_vec();
        clause.sort_unstable();
        clause.dedup();
        if clause.windows(2).any(|w| w[0].var() == w[1].var()) {
            // Contains both x and -x.
            return;
        }
        if let Some(max) = clause.iter().map(|l| l.var()).max()
            && max >= self.num_vars
        {
            self.new_vars(max + 1 - self.num_vars);
        }

        match clause.len() {
            0 => self.has_empty_clause = true,
            1 => self.units.push(clause[0]),
            _ => {
                let ci = self.clauses.len();
                self.watches[clause[0].code()].push(ci);
                self.watches[clause[1].code()].push(ci);
                self.clauses.push(clause);
            }
        }
        self.satisfied = false;
    }

    fn solve(&mut self) -> SolveResult {
        self.assigns = vec![LBool::Undef; self.num_vars as usize];
        self.trail.clear();
        self.levels.clear();
        self.qhead = 0;
        self.satisfied = false;

        if self.has_empty_clause {
            return SolveResult::Unsatisfiable;
        }
        for i in 0..self.units.len() {
            if !self.enqueue(self.units[i]) {
                return SolveResult::Unsatisfiable;
            }
        }
        if self.propagate().is_some() {
            return SolveResult::Unsatisfiable;
        }

        let mut decisions = 0u64;
        loop {
            let Some(var) = self.next_unassigned() else {
                debug!(
                    "Satisfiable: {} variables, {} clauses, {} decisions",
                    self.num_vars,
                    self.num_clauses(),
                    decisions
                );
                self.satisfied = true;
                return SolveResult::Satisfiable;
            };

            decisions += 1;
            let lit = Lit::negative(var);
            self.levels.push((self.trail.len(), lit, false));
            self.enqueue(lit);

            while self.propagate().is_some() {
                if !self.backtrack() {
                    debug!("Unsatisfiable after {} decisions", decisions);
                    return SolveResult::Unsatisfiable;
                }
            }
        }
    }

    fn model(&self) -> Vec<LBool> {
        if self.satisfied {
            self.assigns.clone()
        } else {
            vec![LBool::Undef; self.num_vars as usize]
        }
    }
}
