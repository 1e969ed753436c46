//! Propagation rules for the three-subset division property.
//!
//! Each rule takes indicator variables for the bit positions it touches,
//! emits the constraints binding them, and rebinds the touched positions to
//! fresh variables by overwriting the caller's handles. The rules are
//! stateless and shared by both cipher builders.

use crate::model::DivModel;
use varisat::Var;

/// Copy-then-consume. The source bit keeps propagating through `pass` while
/// `keep` feeds one term of an output or feedback function; the source is
/// active exactly when at least one of the two copies is.
pub fn tap(model: &mut DivModel, x: &mut Var) -> Var {
    let keep = model.fresh_var();
    let pass = model.fresh_var();
    model.or_gate(*x, &[keep, pass]);
    *x = pass;
    keep
}

/// The Trivium nonlinear feedback core:
///
/// `x[i5] <- x[i3]*x[i4] + x[i2] + x[i1] + x[i5]`
///
/// `x[i1]` and `x[i2]` each split into a retained copy and a consumed copy;
/// `x[i3]` and `x[i4]` share a single AND indicator that can only be active
/// when both operands are; the new `x[i5]` is the integer sum of the
/// consumed contributions.
pub fn trivium_core(model: &mut DivModel, x: &mut [Var], i1: usize, i2: usize, i3: usize, i4: usize, i5: usize) {
    let y1 = model.fresh_var();
    let y2 = model.fresh_var();
    let y3 = model.fresh_var();
    let y4 = model.fresh_var();
    let y5 = model.fresh_var();

    let z1 = model.fresh_var();
    let z2 = model.fresh_var();

    let a = model.fresh_var();

    model.assert_le(y1, x[i1]);
    model.assert_le(z1, x[i1]);
    model.assert_cover(x[i1], &[y1, z1]);

    model.assert_le(y2, x[i2]);
    model.assert_le(z2, x[i2]);
    model.assert_cover(x[i2], &[y2, z2]);

    model.assert_le(y3, x[i3]);
    model.assert_le(a, x[i3]);
    model.assert_cover(x[i3], &[y3, a]);

    model.assert_le(y4, x[i4]);
    model.assert_le(a, x[i4]);
    model.assert_cover(x[i4], &[y4, a]);

    model.assert_sum_eq(y5, &[x[i5], a, z1, z2]);

    x[i1] = y1;
    x[i2] = y2;
    x[i3] = y3;
    x[i4] = y4;
    x[i5] = y5;
}

/// XOR of division-property indicators: a fresh output bound to the integer
/// sum of its inputs.
pub fn xor_sum(model: &mut DivModel, terms: &[Var]) -> Var {
    let y = model.fresh_var();
    model.assert_sum_eq(y, terms);
    y
}

/// AND-merge of several register bits into one product term: every factor is
/// tapped and the kept copies are constrained equal, so the product is active
/// exactly when all factors simultaneously carry the monomial. Returns the
/// shared indicator.
pub fn product(model: &mut DivModel, regs: &mut [Var], positions: &[usize]) -> Var {
    let keeps: Vec<Var> = positions.iter().map(|&i| tap(model, &mut regs[i])).collect();
    for &k in &keeps[1..] {
        model.assert_eq_vars(keeps[0], k);
    }
    keeps[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::enumerate_all;
    use crate::model::DivModel;

    #[test]
    fn test_tap_truth_table() {
        let mut model = DivModel::new();
        let source = model.fresh_var();
        let mut x = source;
        let keep = tap(&mut model, &mut x);
        let pass = x;

        let mut table: Vec<(bool, bool, bool)> = enumerate_all(&model)
            .iter()
            .map(|a| (a.value(source), a.value(keep), a.value(pass)))
            .collect();
        table.sort();
        // Inactive source forces both copies off; an active source needs at
        // least one copy active.
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
    fn test_xor_sum_truth_table() {
        let mut model = DivModel::new();
        let a = model.fresh_var();
        let b = model.fresh_var();
        let c = model.fresh_var();
        let y = xor_sum(&mut model, &[a, b, c]);

        let solutions = enumerate_all(&model);
        assert_eq!(solutions.len(), 4);
        for s in &solutions {
            let sum = [a, b, c].iter().filter(|&&v| s.value(v)).count();
            assert!(sum <= 1, "sum-equality must forbid two active inputs");
            assert_eq!(s.value(y), sum == 1);
        }
    }

    /// Exhaustive cross-check of the Trivium core against the inequality
    /// system it encodes, over all assignments of its thirteen variables.
    #[test]
    fn test_trivium_core_conservation() {
        let mut model = DivModel::new();
        let inputs = model.fresh_vars(5);
        let mut x: Vec<Var> = inputs.clone();
        trivium_core(&mut model, &mut x, 0, 1, 2, 3, 4);
        // Fresh variables are allocated in declaration order after the five
        // inputs: y1..y5, z1, z2, a.
        let y: Vec<Var> = (6..=10).map(|d| Var::from_dimacs(d)).collect();
        let z1 = Var::from_dimacs(11);
        let z2 = Var::from_dimacs(12);
        let a = Var::from_dimacs(13);
        assert_eq!(x, y, "touched positions rebind to the retained copies");

        let feasible = |v: &[u8; 13]| -> bool {
            let (x1, x2, x3, x4, x5) = (v[0], v[1], v[2], v[3], v[4]);
            let (y1, y2, y3, y4, y5) = (v[5], v[6], v[7], v[8], v[9]);
            let (z1, z2, a) = (v[10], v[11], v[12]);
            y1 <= x1
                && z1 <= x1
                && y1 + z1 >= x1
                && y2 <= x2
                && z2 <= x2
                && y2 + z2 >= x2
                && y3 <= x3
                && a <= x3
                && y3 + a >= x3
                && y4 <= x4
                && a <= x4
                && y4 + a >= x4
                && y5 == x5 + a + z1 + z2
        };

        let mut expected = Vec::new();
        for bits in 0u32..(1 << 13) {
            let mut v = [0u8; 13];
            for (i, slot) in v.iter_mut().enumerate() {
                *slot = ((bits >> i) & 1) as u8;
            }
            if feasible(&v) {
                expected.push(v);
            }
        }

        let order: Vec<Var> = inputs
            .iter()
            .chain(y.iter())
            .chain([z1, z2, a].iter())
            .copied()
            .collect();
        let mut found: Vec<[u8; 13]> = enumerate_all(&model)
            .iter()
            .map(|s| {
                let mut v = [0u8; 13];
                for (i, &var) in order.iter().enumerate() {
                    v[i] = s.value(var) as u8;
                }
                v
            })
            .collect();
        expected.sort();
        found.sort();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_product_requires_all_factors() {
        let mut model = DivModel::new();
        let mut regs = model.fresh_vars(2);
        let sources = regs.clone();
        let shared = product(&mut model, &mut regs, &[0, 1]);

        for s in enumerate_all(&model) {
            if s.value(shared) {
                assert!(
                    s.value(sources[0]) && s.value(sources[1]),
                    "an active product term needs every factor active"
                );
            }
        }
    }
}
