//! Grain-128a: constraint builder, superpoly recovery drivers, and the
//! bit-exact cipher used for practical verification.
//!
//! Two 128-bit registers: the NFSR `b` holds the key, the LFSR `s` loads the
//! 96-bit IV followed by 31 ones and a zero. Each round computes the output
//! `z = h + o` from taps of both registers, feeds it back into both update
//! functions during initialization, and shifts. A trail row is the
//! concatenation `b || s`, key bits first.
//!
//! The output function splits into five nonlinear product terms and a linear
//! remainder; each can be targeted separately so the per-term counting boxes
//! sum into the full superpoly.

use crate::aggregate::{CountingBox, SuperpolyOutcome};
use crate::bits::StateBits;
use crate::engine::{
    enumerate_trails_two_stage, BitRole, DivisionSystem, TwoStageOptions,
};
use crate::model::{DivModel, SearchError};
use crate::rules::{product, tap, xor_sum};
use tracing::info;
use varisat::Var;

pub const NFSR_BITS: usize = 128;
pub const LFSR_BITS: usize = 128;
pub const STATE_BITS: usize = NFSR_BITS + LFSR_BITS;
pub const IV_BITS: usize = 96;

/// Constant-IV positions of the 95-active-bit subcube attack.
pub const SUBCUBE_CONSTANT_POSITIONS: [usize; 15] =
    [26, 29, 30, 31, 33, 40, 43, 44, 45, 47, 57, 58, 63, 69, 71];

/// Output-bit target of one enumeration run.
///
/// `h = b12*s8 + s13*s20 + b95*s42 + s60*s79 + b12*b95*s94` and the linear
/// remainder `o = s93 + b2 + b15 + b36 + b45 + b64 + b73 + b89`; the product
/// variants isolate one `h` term, `Linear` isolates `o`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GrainTarget {
    /// The exact output bit `z = h + o`.
    Combined,
    Linear,
    B12S8,
    S13S20,
    B95S42,
    S60S79,
    B12B95S94,
}

/// Per-term evaluation order used by the recovery driver.
pub const ATTACK_TARGET_ORDER: [GrainTarget; 6] = [
    GrainTarget::Linear,
    GrainTarget::B12S8,
    GrainTarget::S13S20,
    GrainTarget::B95S42,
    GrainTarget::S60S79,
    GrainTarget::B12B95S94,
];

/// The division-property constraint system for `rounds` initialization
/// rounds of Grain-128a.
#[derive(Clone, Debug)]
pub struct GrainSystem {
    rounds: usize,
    cube: Vec<bool>,
    flags: Vec<BitRole>,
    target: GrainTarget,
}

impl GrainSystem {
    pub fn new(rounds: usize, cube: Vec<bool>, flags: Vec<BitRole>, target: GrainTarget) -> Self {
        assert_eq!(cube.len(), IV_BITS);
        assert_eq!(flags.len(), STATE_BITS);
        Self {
            rounds,
            cube,
            flags,
            target,
        }
    }
}

/// Nonlinear part of the output function. Each product term taps its factors
/// and equates the kept copies; `target` pins one term active (or, for
/// `Linear`, the whole of `h` inactive).
fn func_h(model: &mut DivModel, b: &mut [Var], s: &mut [Var], target: GrainTarget) -> Var {
    let b12x = tap(model, &mut b[12]);
    let s8 = tap(model, &mut s[8]);
    model.assert_eq_vars(b12x, s8);

    let s13 = tap(model, &mut s[13]);
    let s20 = tap(model, &mut s[20]);
    model.assert_eq_vars(s13, s20);

    let b95x = tap(model, &mut b[95]);
    let s42 = tap(model, &mut s[42]);
    model.assert_eq_vars(b95x, s42);

    let s60 = tap(model, &mut s[60]);
    let s79 = tap(model, &mut s[79]);
    model.assert_eq_vars(s60, s79);

    let b12y = tap(model, &mut b[12]);
    let b95y = tap(model, &mut b[95]);
    let s94 = tap(model, &mut s[94]);
    model.assert_eq_vars(b12y, b95y);
    model.assert_eq_vars(b12y, s94);

    let y = xor_sum(model, &[b12x, s13, b95x, s60, b12y]);

    match target {
        GrainTarget::B12B95S94 => model.fix(b12y, true),
        GrainTarget::S60S79 => model.fix(s60, true),
        GrainTarget::B95S42 => model.fix(b95x, true),
        GrainTarget::S13S20 => model.fix(s13, true),
        GrainTarget::B12S8 => model.fix(b12x, true),
        GrainTarget::Linear => model.fix(y, false),
        GrainTarget::Combined => {}
    }

    y
}

/// Linear part of the output function.
fn func_o(model: &mut DivModel, b: &mut [Var], s: &mut [Var], target: GrainTarget) -> Var {
    let s93 = tap(model, &mut s[93]);
    let b2 = tap(model, &mut b[2]);
    let b15 = tap(model, &mut b[15]);
    let b36 = tap(model, &mut b[36]);
    let b45 = tap(model, &mut b[45]);
    let b64 = tap(model, &mut b[64]);
    let b73 = tap(model, &mut b[73]);
    let b89 = tap(model, &mut b[89]);

    let y = xor_sum(model, &[s93, b2, b15, b36, b45, b64, b73, b89]);

    match target {
        GrainTarget::Linear => model.fix(y, true),
        GrainTarget::Combined => {}
        // Isolating a nonlinear term silences the linear remainder.
        _ => model.fix(y, false),
    }

    y
}

/// LFSR feedback `f = s0 + s7 + s38 + s70 + s81 + s96`.
fn func_f(model: &mut DivModel, s: &mut [Var]) -> Var {
    let mut terms = Vec::with_capacity(6);
    for &i in &[0usize, 7, 38, 70, 81, 96] {
        terms.push(tap(model, &mut s[i]));
    }
    xor_sum(model, &terms)
}

/// NFSR feedback `g`; `b0` is consumed directly since it shifts out this
/// round.
fn func_g(model: &mut DivModel, b: &mut [Var]) -> Var {
    let b0 = b[0];
    let mut terms = vec![b0];
    for &i in &[26usize, 56, 91, 96] {
        terms.push(tap(model, &mut b[i]));
    }
    let groups: [&[usize]; 10] = [
        &[3, 67],
        &[11, 13],
        &[17, 18],
        &[27, 59],
        &[40, 48],
        &[61, 65],
        &[68, 84],
        &[88, 92, 93, 95],
        &[22, 24, 25],
        &[70, 78, 82],
    ];
    for group in groups {
        terms.push(product(model, b, group));
    }
    xor_sum(model, &terms)
}

impl DivisionSystem for GrainSystem {
    fn state_width(&self) -> usize {
        STATE_BITS
    }

    fn rounds(&self) -> usize {
        self.rounds
    }

    fn build(&self, model: &mut DivModel) -> Vec<Vec<Var>> {
        let mut rows_b: Vec<Vec<Var>> = Vec::with_capacity(self.rounds + 1);
        let mut rows_s: Vec<Vec<Var>> = Vec::with_capacity(self.rounds + 1);

        let b0 = model.fresh_vars(NFSR_BITS);
        let s0 = model.fresh_vars(LFSR_BITS);
        for i in 0..IV_BITS {
            if self.cube[i] {
                model.fix(s0[i], true);
            } else if self.flags[NFSR_BITS + i] == BitRole::FixedZero {
                model.fix(s0[i], false);
            }
        }
        model.fix(s0[LFSR_BITS - 1], false);
        rows_b.push(b0);
        rows_s.push(s0);

        for r in 0..self.rounds {
            let mut tb = rows_b[r].clone();
            let mut ts = rows_s[r].clone();

            let h = func_h(model, &mut tb, &mut ts, GrainTarget::Combined);
            let o = func_o(model, &mut tb, &mut ts, GrainTarget::Combined);
            let z = xor_sum(model, &[h, o]);

            let z1 = model.fresh_var();
            let z2 = model.fresh_var();
            model.or_gate(z, &[z1, z2]);

            let f = func_f(model, &mut ts);
            let g = func_g(model, &mut tb);

            let new_s = xor_sum(model, &[z1, f]);
            let new_b = xor_sum(model, &[z2, g, ts[0]]);

            let mut nb = Vec::with_capacity(NFSR_BITS);
            let mut ns = Vec::with_capacity(LFSR_BITS);
            for i in 0..NFSR_BITS - 1 {
                nb.push(tb[i + 1]);
                ns.push(ts[i + 1]);
            }
            nb.push(new_b);
            ns.push(new_s);

            // s0 and the keystream bit of the same round cannot both carry
            // the monomial.
            model.assert_not_both(rows_s[r][0], z);

            rows_b.push(nb);
            rows_s.push(ns);
        }

        // Final round: the output function with the run's target; everything
        // left in the registers after the taps must be consumed.
        let mut tb = rows_b[self.rounds].clone();
        let mut ts = rows_s[self.rounds].clone();
        let h = func_h(model, &mut tb, &mut ts, self.target);
        let o = func_o(model, &mut tb, &mut ts, self.target);
        let z = xor_sum(model, &[h, o]);
        model.fix(z, true);
        for i in 0..NFSR_BITS {
            model.fix(tb[i], false);
        }
        for i in 0..LFSR_BITS {
            model.fix(ts[i], false);
        }

        rows_b
            .into_iter()
            .zip(rows_s)
            .map(|(b, s)| {
                let mut row = b;
                row.extend(s);
                row
            })
            .collect()
    }
}

/// Flag layout of the full key-recovery attack: secret key, active cube
/// bits, free constant ones at IV positions 96..127, everything else zero.
pub fn attack_flags(cube: &[bool]) -> Vec<BitRole> {
    let mut flags = vec![BitRole::FixedZero; STATE_BITS];
    for flag in flags.iter_mut().take(NFSR_BITS) {
        *flag = BitRole::Secret;
    }
    for (i, &active) in cube.iter().enumerate() {
        if active {
            flags[NFSR_BITS + i] = BitRole::Active;
        }
    }
    for i in IV_BITS..LFSR_BITS - 1 {
        flags[NFSR_BITS + i] = BitRole::FixedOne;
    }
    flags
}

/// Flag layout of the practical verification runs: non-active IV bits stay
/// free constants instead of zeros.
pub fn practical_flags(cube: &[bool]) -> Vec<BitRole> {
    let mut flags = attack_flags(cube);
    for (i, &active) in cube.iter().enumerate() {
        if !active {
            flags[NFSR_BITS + i] = BitRole::FixedOne;
        }
    }
    flags
}

/// Recover the superpoly of the output bit after `rounds` rounds: run the
/// two-stage search once per output-function term into a shared counting
/// box, strip the cube and constant positions, and partition by parity.
pub fn recover_superpoly(
    rounds: usize,
    cube: &[bool],
    flags: &[BitRole],
    options: TwoStageOptions,
) -> Result<SuperpolyOutcome, SearchError> {
    let mut counting = CountingBox::new();
    for &target in &ATTACK_TARGET_ORDER {
        info!(term = ?target, "enumerating division trails");
        let system = GrainSystem::new(rounds, cube.to_vec(), flags.to_vec(), target);
        let summary = enumerate_trails_two_stage(&system, options, &mut counting)?;
        info!(
            term = ?target,
            midpoints = summary.midpoints,
            trails = summary.trails,
            "target exhausted"
        );
    }

    let mut clear: Vec<usize> = cube
        .iter()
        .enumerate()
        .filter(|&(_, &active)| active)
        .map(|(i, _)| NFSR_BITS + i)
        .collect();
    clear.extend(NFSR_BITS + IV_BITS..STATE_BITS);
    let superpoly = counting.project(&clear).partition();
    Ok(SuperpolyOutcome {
        counting,
        superpoly,
    })
}

/// One superpoly of the 95-active-bit variant: the full cube minus one
/// constant position.
pub fn subcube_superpoly(
    rounds: usize,
    constant_position: usize,
    options: TwoStageOptions,
) -> Result<SuperpolyOutcome, SearchError> {
    assert!(constant_position < IV_BITS);
    let mut cube = vec![true; IV_BITS];
    cube[constant_position] = false;
    let flags = attack_flags(&cube);
    recover_superpoly(rounds, &cube, &flags, options)
}

/// One clocking of the real cipher during initialization; returns the output
/// bit, which is fed back into both registers.
pub fn round_output(b: &mut [bool; NFSR_BITS], s: &mut [bool; LFSR_BITS]) -> bool {
    let f = s[0] ^ s[7] ^ s[38] ^ s[70] ^ s[81] ^ s[96];
    let g = s[0]
        ^ b[0]
        ^ b[26]
        ^ b[56]
        ^ b[91]
        ^ b[96]
        ^ (b[3] & b[67])
        ^ (b[11] & b[13])
        ^ (b[17] & b[18])
        ^ (b[27] & b[59])
        ^ (b[40] & b[48])
        ^ (b[61] & b[65])
        ^ (b[68] & b[84])
        ^ (b[88] & b[92] & b[93] & b[95])
        ^ (b[22] & b[24] & b[25])
        ^ (b[70] & b[78] & b[82]);
    let h = (b[12] & s[8])
        ^ (s[13] & s[20])
        ^ (b[95] & s[42])
        ^ (s[60] & s[79])
        ^ (b[12] & b[95] & s[94]);
    let y = h ^ s[93] ^ b[2] ^ b[15] ^ b[36] ^ b[45] ^ b[64] ^ b[73] ^ b[89];

    for i in 0..NFSR_BITS - 1 {
        b[i] = b[i + 1];
        s[i] = s[i + 1];
    }
    b[NFSR_BITS - 1] = g ^ y;
    s[LFSR_BITS - 1] = f ^ y;

    y
}

/// Sum the real output bit over every assignment of the cube bits.
pub fn cube_sum(rounds: usize, cube: &[bool], iv: &[bool], key: &[bool]) -> bool {
    let mut base_b = [false; NFSR_BITS];
    let mut base_s = [false; LFSR_BITS];
    base_b.copy_from_slice(&key[..NFSR_BITS]);
    base_s.copy_from_slice(&iv[..LFSR_BITS]);

    let active: Vec<usize> = (0..IV_BITS).filter(|&i| cube[i]).collect();
    assert!(active.len() < 32, "cube too large to sum directly");

    let mut sum = false;
    for assignment in 0u32..(1 << active.len()) {
        let mut b = base_b;
        let mut s = base_s;
        for (j, &idx) in active.iter().enumerate() {
            s[idx] = (assignment >> j) & 1 == 1;
        }
        let mut z = false;
        for _ in 0..=rounds {
            z = round_output(&mut b, &mut s);
        }
        sum ^= z;
    }
    sum
}

/// Evaluate the recovered superpoly (the odd-count monomials) on concrete
/// key and IV values.
pub fn superpoly_sum(counting: &CountingBox, cube: &[bool], iv: &[bool], key: &[bool]) -> bool {
    let mut sum = false;
    for (monomial, count) in counting.iter() {
        if count % 2 == 0 {
            continue;
        }
        let mut term = true;
        for i in 0..STATE_BITS {
            if !monomial.get(i) {
                continue;
            }
            if i < NFSR_BITS {
                term &= key[i];
            } else {
                let j = i - NFSR_BITS;
                if j >= IV_BITS || !cube[j] {
                    term &= iv[j];
                }
            }
        }
        sum ^= term;
    }
    sum
}

/// Human-readable monomial: `k` factors from the NFSR half, `v` factors from
/// the LFSR half, all 1-based.
pub fn describe_monomial(key: &StateBits, cube: &[bool]) -> String {
    let mut parts = Vec::new();
    for i in 0..NFSR_BITS {
        if key.get(i) {
            parts.push(format!("k{}", i + 1));
        }
    }
    for i in 0..LFSR_BITS {
        if key.get(NFSR_BITS + i) && (i >= IV_BITS || !cube[i]) {
            parts.push(format!("v{}", i + 1));
        }
    }
    if parts.is_empty() {
        "1".to_string()
    } else {
        parts.join(" ")
    }
}
