//! Constraint model for division-property propagation and the boundary to
//! the SAT backend.
//!
//! All indicator variables are binary, so every constraint of the propagation
//! model has an exact clause encoding: an integer sum-equality `y = sum(terms)`
//! over binaries is "at most one term set" plus "y is the OR of the terms",
//! and the solution set over the same variables is unchanged. Trail counts
//! are therefore exact, never approximated.

use thiserror::Error;
use varisat::{CnfFormula, ExtendFormula, Lit, Solver, Var};

/// Hard cap on enumerated solutions per search. Exceeding it aborts the whole
/// run: a truncated pool would silently corrupt a parity result.
pub const POOL_LIMIT: u64 = 2_000_000_000;

/// Failures crossing the solver boundary.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Internal solver failure. Infeasibility is not an error and is reported
    /// as zero trails by the caller.
    #[error("solver backend failure: {0}")]
    Backend(String),

    #[error("solution pool exceeded the limit of {0} entries")]
    PoolExhausted(u64),
}

/// A constraint system over fresh binary variables.
///
/// Clauses are recorded here and loaded into a [`PoolSearch`] when the model
/// is complete; keeping them lets the engine check a warm-start assignment
/// against the model without a solver call.
pub struct DivModel {
    next_var: usize,
    clauses: Vec<Vec<Lit>>,
}

impl Default for DivModel {
    fn default() -> Self {
        Self::new()
    }
}

impl DivModel {
    pub fn new() -> Self {
        Self {
            next_var: 1,
            clauses: Vec::new(),
        }
    }

    pub fn fresh_var(&mut self) -> Var {
        let v = Var::from_dimacs(self.next_var as isize);
        self.next_var += 1;
        v
    }

    pub fn fresh_vars(&mut self, count: usize) -> Vec<Var> {
        (0..count).map(|_| self.fresh_var()).collect()
    }

    pub fn num_vars(&self) -> usize {
        self.next_var - 1
    }

    pub fn num_clauses(&self) -> usize {
        self.clauses.len()
    }

    pub fn add_clause(&mut self, lits: &[Lit]) {
        self.clauses.push(lits.to_vec());
    }

    /// lhs <= rhs over binaries: lhs implies rhs.
    pub fn assert_le(&mut self, lhs: Var, rhs: Var) {
        self.add_clause(&[!Lit::positive(lhs), Lit::positive(rhs)]);
    }

    /// sum(parts) >= x: if x is set, at least one part is.
    pub fn assert_cover(&mut self, x: Var, parts: &[Var]) {
        let mut clause = vec![!Lit::positive(x)];
        clause.extend(parts.iter().map(|&p| Lit::positive(p)));
        self.add_clause(&clause);
    }

    /// x = OR(parts).
    pub fn or_gate(&mut self, x: Var, parts: &[Var]) {
        for &p in parts {
            self.assert_le(p, x);
        }
        self.assert_cover(x, parts);
    }

    pub fn assert_eq_vars(&mut self, a: Var, b: Var) {
        self.assert_le(a, b);
        self.assert_le(b, a);
    }

    /// Pin a variable to a constant.
    pub fn fix(&mut self, v: Var, value: bool) {
        let lit = if value {
            Lit::positive(v)
        } else {
            !Lit::positive(v)
        };
        self.add_clause(&[lit]);
    }

    fn at_most_one(&mut self, vars: &[Var]) {
        for i in 0..vars.len() {
            for j in (i + 1)..vars.len() {
                self.add_clause(&[!Lit::positive(vars[i]), !Lit::positive(vars[j])]);
            }
        }
    }

    /// y = sum(terms) as an integer equality over binaries: the terms are
    /// mutually exclusive and y is set exactly when one of them is.
    pub fn assert_sum_eq(&mut self, y: Var, terms: &[Var]) {
        self.at_most_one(terms);
        self.or_gate(y, terms);
    }

    /// sum(terms) = 1.
    pub fn assert_sum_one(&mut self, terms: &[Var]) {
        self.at_most_one(terms);
        let clause: Vec<Lit> = terms.iter().map(|&v| Lit::positive(v)).collect();
        self.add_clause(&clause);
    }

    /// not both a and b.
    pub fn assert_not_both(&mut self, a: Var, b: Var) {
        self.add_clause(&[!Lit::positive(a), !Lit::positive(b)]);
    }

    /// Check a complete assignment against every recorded clause.
    pub fn satisfied_by(&self, assignment: &Assignment) -> bool {
        self.clauses.iter().all(|clause| {
            clause
                .iter()
                .any(|lit| assignment.value(lit.var()) == lit.is_positive())
        })
    }

    /// Load the clauses into a fresh incremental solver session.
    pub fn search(&self) -> PoolSearch {
        let mut cnf = CnfFormula::new();
        for clause in &self.clauses {
            cnf.add_clause(clause);
        }
        let mut solver = Solver::new();
        solver.add_formula(&cnf);
        PoolSearch {
            solver,
            num_vars: self.num_vars(),
        }
    }
}

/// One complete satisfying assignment, indexed by variable.
#[derive(Clone, Debug)]
pub struct Assignment {
    values: Vec<bool>,
    lits: Vec<Lit>,
}

impl Assignment {
    fn from_model(num_vars: usize, lits: Vec<Lit>) -> Self {
        let mut values = vec![false; num_vars];
        for lit in &lits {
            let idx = lit.var().index();
            if idx < num_vars {
                values[idx] = lit.is_positive();
            }
        }
        Self { values, lits }
    }

    pub fn value(&self, var: Var) -> bool {
        self.values.get(var.index()).copied().unwrap_or(false)
    }

    /// The assignment as the literals the solver reported.
    pub fn lits(&self) -> &[Lit] {
        &self.lits
    }
}

/// An incremental enumeration session: repeated satisfiability queries with
/// blocking clauses injected between them.
pub struct PoolSearch {
    solver: Solver<'static>,
    num_vars: usize,
}

impl PoolSearch {
    /// Next satisfying assignment, or `None` once the search space is
    /// exhausted under the blocking clauses added so far.
    pub fn next_model(&mut self) -> Result<Option<Assignment>, SearchError> {
        match self.solver.solve() {
            Ok(true) => {
                let lits = self
                    .solver
                    .model()
                    .ok_or_else(|| SearchError::Backend("missing model after SAT".into()))?;
                Ok(Some(Assignment::from_model(self.num_vars, lits)))
            }
            Ok(false) => Ok(None),
            Err(e) => Err(SearchError::Backend(e.to_string())),
        }
    }

    /// Forbid this exact assignment for the remainder of the search.
    pub fn exclude_assignment(&mut self, assignment: &Assignment) {
        let clause: Vec<Lit> = assignment.lits().iter().map(|&l| !l).collect();
        self.solver.add_clause(&clause);
    }

    /// Add an arbitrary blocking clause mid-search.
    pub fn exclude_clause(&mut self, clause: &[Lit]) {
        self.solver.add_clause(clause);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Enumerate every satisfying assignment of the model.
    pub(crate) fn enumerate_all(model: &DivModel) -> Vec<Assignment> {
        let mut search = model.search();
        let mut found = Vec::new();
        while let Some(assignment) = search.next_model().expect("solver failure") {
            search.exclude_assignment(&assignment);
            found.push(assignment);
        }
        found
    }

    #[test]
    fn test_or_gate_truth_table() {
        let mut model = DivModel::new();
        let x = model.fresh_var();
        let y = model.fresh_var();
        let z = model.fresh_var();
        model.or_gate(x, &[y, z]);

        let solutions = enumerate_all(&model);
        let mut table: Vec<(bool, bool, bool)> = solutions
            .iter()
            .map(|a| (a.value(x), a.value(y), a.value(z)))
            .collect();
        table.sort();
        assert_eq!(
            table,
            vec![
                (false, false, false),
                (true, false, true),
                (true, true, false),
                (true, true, true),
            ]
        );
    }

    #[test]
    fn test_sum_eq_truth_table() {
        let mut model = DivModel::new();
        let y = model.fresh_var();
        let a = model.fresh_var();
        let b = model.fresh_var();
        model.assert_sum_eq(y, &[a, b]);

        let solutions = enumerate_all(&model);
        let mut table: Vec<(bool, bool, bool)> = solutions
            .iter()
            .map(|s| (s.value(y), s.value(a), s.value(b)))
            .collect();
        table.sort();
        // y = a + b over integers: both terms set is infeasible.
        assert_eq!(
            table,
            vec![
                (false, false, false),
                (true, false, true),
                (true, true, false),
            ]
        );
    }

    #[test]
    fn test_sum_one_counts() {
        let mut model = DivModel::new();
        let vars = model.fresh_vars(4);
        model.assert_sum_one(&vars);
        assert_eq!(enumerate_all(&model).len(), 4);
    }

    #[test]
    fn test_fix_and_satisfied_by() {
        let mut model = DivModel::new();
        let a = model.fresh_var();
        let b = model.fresh_var();
        model.assert_eq_vars(a, b);
        model.fix(a, true);

        let solutions = enumerate_all(&model);
        assert_eq!(solutions.len(), 1);
        assert!(solutions[0].value(a));
        assert!(solutions[0].value(b));
        assert!(model.satisfied_by(&solutions[0]));
    }

    #[test]
    fn test_infeasible_model_has_no_solutions() {
        let mut model = DivModel::new();
        let a = model.fresh_var();
        model.fix(a, true);
        model.fix(a, false);
        assert!(enumerate_all(&model).is_empty());
    }
}
