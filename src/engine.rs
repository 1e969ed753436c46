//! Two-stage division trail search.
//!
//! A full-round constraint system is too large to pool-enumerate directly at
//! high round counts. Splitting it at a midpoint round keeps each stage
//! enumerable: stage 1 walks the distinct midpoint states reachable under the
//! output constraint, blocking each one as it is found; stage 2 fixes one
//! midpoint and counts every completion, crediting each completion's round-0
//! projection in the counting box. The original nested solver-callback
//! becomes an explicit two-level loop with identical behavior.

use crate::aggregate::CountingBox;
use crate::bits::StateBits;
use crate::model::{Assignment, DivModel, SearchError, POOL_LIMIT};
use tracing::{debug, info};
use varisat::{Lit, Var};

/// Round-0 classification of a state bit: fixed constant, cube-active, or
/// secret. Constant-one and secret bits are left free in the model; a trail
/// may or may not route through them.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BitRole {
    FixedZero,
    FixedOne,
    Active,
    Secret,
}

/// A cipher's division-property constraint system.
pub trait DivisionSystem {
    /// Width of one round's state row.
    fn state_width(&self) -> usize;

    /// Number of update rounds the system models.
    fn rounds(&self) -> usize;

    /// Emit every constraint into `model` and return the
    /// `(rounds + 1) x state_width` grid of state variables, round 0 first.
    fn build(&self, model: &mut DivModel) -> Vec<Vec<Var>>;
}

/// Options for the two-stage search.
#[derive(Clone, Copy, Default, Debug)]
pub struct TwoStageOptions {
    /// Round at which to split the system. Defaults to `rounds / 2`; any
    /// split in `0..=rounds` counts exactly, the choice only shifts work
    /// between the stages.
    pub div_round: Option<usize>,
}

/// Totals of one two-stage run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TwoStageSummary {
    /// Distinct midpoint states explored by stage 1.
    pub midpoints: u64,
    /// Division trails counted across all midpoints.
    pub trails: u64,
}

fn read_row(row: &[Var], assignment: &Assignment) -> StateBits {
    let mut bits = StateBits::new(row.len());
    for (i, &var) in row.iter().enumerate() {
        bits.set(i, assignment.value(var));
    }
    bits
}

/// "At least one bit of this row differs": the clause that retires an
/// explored midpoint state.
fn differ_clause(row: &[Var], assignment: &Assignment) -> Vec<Lit> {
    row.iter()
        .map(|&var| {
            if assignment.value(var) {
                !Lit::positive(var)
            } else {
                Lit::positive(var)
            }
        })
        .collect()
}

/// Enumerate the full solution pool of the system in a single stage. Every
/// satisfying assignment is one division trail; its round-0 projection is
/// credited in the counting box. Returns the number of trails found.
///
/// An infeasible system yields zero trails and is not an error.
pub fn enumerate_trails<S: DivisionSystem>(
    system: &S,
    counting: &mut CountingBox,
) -> Result<u64, SearchError> {
    let mut model = DivModel::new();
    let grid = system.build(&mut model);
    count_pool(&model, &grid, None, counting)
}

/// Two-stage search: enumerate distinct midpoint states, then count the
/// completions of each with the midpoint fixed.
pub fn enumerate_trails_two_stage<S: DivisionSystem>(
    system: &S,
    options: TwoStageOptions,
    counting: &mut CountingBox,
) -> Result<TwoStageSummary, SearchError> {
    let rounds = system.rounds();
    let div_round = options.div_round.unwrap_or(rounds / 2);
    assert!(div_round <= rounds, "split round {} out of range", div_round);

    let mut model = DivModel::new();
    let grid = system.build(&mut model);
    let mut search = model.search();
    let mut summary = TwoStageSummary {
        midpoints: 0,
        trails: 0,
    };

    loop {
        let Some(assignment) = search.next_model()? else {
            break;
        };
        summary.midpoints += 1;
        if summary.midpoints >= POOL_LIMIT {
            return Err(SearchError::PoolExhausted(POOL_LIMIT));
        }

        let midpoint = read_row(&grid[div_round], &assignment);
        debug!(round = div_round, state = ?midpoint, "stage-1 incumbent");

        let completions = count_completions(system, div_round, &midpoint, &assignment, counting)?;
        summary.trails += completions;
        info!(
            midpoints = summary.midpoints,
            completions,
            trails = summary.trails,
            monomials = counting.len(),
            "midpoint explored"
        );

        search.exclude_clause(&differ_clause(&grid[div_round], &assignment));
    }

    Ok(summary)
}

/// Stage 2: rebuild the system, pin the midpoint row to one explored state,
/// and enumerate every completion. The stage-1 assignment seeds the pool: it
/// is already a complete trail through this midpoint, so it is verified,
/// counted first and blocked before the first solver call.
fn count_completions<S: DivisionSystem>(
    system: &S,
    div_round: usize,
    midpoint: &StateBits,
    seed: &Assignment,
    counting: &mut CountingBox,
) -> Result<u64, SearchError> {
    let mut model = DivModel::new();
    let grid = system.build(&mut model);
    for (i, &var) in grid[div_round].iter().enumerate() {
        model.fix(var, midpoint.get(i));
    }
    let seed_valid = model.satisfied_by(seed);
    debug_assert!(seed_valid, "stage-1 incumbent must complete its own midpoint");
    count_pool(&model, &grid, seed_valid.then_some(seed), counting)
}

fn count_pool(
    model: &DivModel,
    grid: &[Vec<Var>],
    seed: Option<&Assignment>,
    counting: &mut CountingBox,
) -> Result<u64, SearchError> {
    let mut search = model.search();
    let mut found = 0u64;

    if let Some(seed) = seed {
        counting.record(read_row(&grid[0], seed), 1);
        search.exclude_assignment(seed);
        found += 1;
    }

    loop {
        let Some(assignment) = search.next_model()? else {
            break;
        };
        found += 1;
        if found >= POOL_LIMIT {
            return Err(SearchError::PoolExhausted(POOL_LIMIT));
        }
        counting.record(read_row(&grid[0], &assignment), 1);
        search.exclude_assignment(&assignment);
    }

    debug!(trails = found, "pool exhausted");
    Ok(found)
}
