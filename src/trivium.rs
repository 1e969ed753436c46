//! Trivium: constraint builder, superpoly recovery drivers, and the bit-exact
//! cipher used for practical verification.
//!
//! The 288-bit state loads the 80-bit key at positions 0..80, the IV at
//! 93..173, and constant ones at 285..288. One round applies the nonlinear
//! core at three tap groups and rotates the state by one position. The
//! keystream bit taps positions 66, 93, 162, 177, 243, 288 (1-based), so a
//! superpoly can be recovered either against the combined output or against
//! each tap separately and summed.

use crate::aggregate::{CountingBox, SuperpolyOutcome};
use crate::bits::StateBits;
use crate::engine::{
    enumerate_trails, enumerate_trails_two_stage, BitRole, DivisionSystem, TwoStageOptions,
};
use crate::model::{DivModel, SearchError};
use crate::rules::trivium_core;
use tracing::info;
use varisat::Var;

pub const STATE_BITS: usize = 288;
pub const KEY_BITS: usize = 80;
pub const IV_BITS: usize = 80;
pub const IV_OFFSET: usize = 93;

/// Keystream tap positions (0-based).
pub const OUTPUT_TAPS: [usize; 6] = [65, 92, 161, 176, 242, 287];

/// Per-tap evaluation order used by the recovery driver: s288, s177, s93,
/// s243, s162, s66.
pub const ATTACK_TARGET_ORDER: [usize; 6] = [287, 176, 92, 242, 161, 65];

/// Output-bit target of one enumeration run.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TriviumTarget {
    /// The exact keystream bit: the six taps sum to one.
    Combined,
    /// One isolated tap position carries the monomial alone.
    Tap(usize),
}

/// The division-property constraint system for `rounds` initialization
/// rounds of Trivium.
#[derive(Clone, Debug)]
pub struct TriviumSystem {
    rounds: usize,
    cube: Vec<bool>,
    flags: Vec<BitRole>,
    forced_keys: Vec<usize>,
    target: TriviumTarget,
}

impl TriviumSystem {
    pub fn new(rounds: usize, cube: Vec<bool>, flags: Vec<BitRole>, target: TriviumTarget) -> Self {
        assert_eq!(cube.len(), IV_BITS);
        assert_eq!(flags.len(), STATE_BITS);
        if let TriviumTarget::Tap(pos) = target {
            assert!(OUTPUT_TAPS.contains(&pos), "not an output tap: {}", pos);
        }
        Self {
            rounds,
            cube,
            flags,
            forced_keys: Vec::new(),
            target,
        }
    }

    /// Monomial verification: leave every unpinned bit free and force the
    /// given round-0 positions to one.
    pub fn with_forced_keys(mut self, positions: &[usize]) -> Self {
        self.forced_keys = positions.to_vec();
        self
    }
}

impl DivisionSystem for TriviumSystem {
    fn state_width(&self) -> usize {
        STATE_BITS
    }

    fn rounds(&self) -> usize {
        self.rounds
    }

    fn build(&self, model: &mut DivModel) -> Vec<Vec<Var>> {
        let mut grid: Vec<Vec<Var>> = Vec::with_capacity(self.rounds + 1);
        let row0 = model.fresh_vars(STATE_BITS);

        for i in 0..IV_BITS {
            if self.cube[i] {
                model.fix(row0[IV_OFFSET + i], true);
            }
        }
        for i in 0..STATE_BITS {
            if self.flags[i] == BitRole::FixedZero {
                model.fix(row0[i], false);
            }
        }
        for &pos in &self.forced_keys {
            model.fix(row0[pos], true);
        }
        grid.push(row0);

        for r in 0..self.rounds {
            let mut tmp = grid[r].clone();
            trivium_core(model, &mut tmp, 65, 170, 90, 91, 92);
            trivium_core(model, &mut tmp, 161, 263, 174, 175, 176);
            trivium_core(model, &mut tmp, 242, 68, 285, 286, 287);

            let mut next = vec![tmp[0]; STATE_BITS];
            for i in 0..STATE_BITS {
                next[(i + 1) % STATE_BITS] = tmp[i];
            }
            grid.push(next);
        }

        let last = &grid[self.rounds];
        match self.target {
            TriviumTarget::Combined => {
                for i in 0..STATE_BITS {
                    if !OUTPUT_TAPS.contains(&i) {
                        model.fix(last[i], false);
                    }
                }
                let taps: Vec<Var> = OUTPUT_TAPS.iter().map(|&i| last[i]).collect();
                model.assert_sum_one(&taps);
            }
            TriviumTarget::Tap(pos) => {
                for i in 0..STATE_BITS {
                    model.fix(last[i], i == pos);
                }
            }
        }

        grid
    }
}

/// The published full cubes: all IV bits active, except {34, 47} (1-based)
/// at 840 rounds and {9, 79} at 841.
pub fn known_cube(rounds: usize) -> Vec<bool> {
    let skip: &[usize] = match rounds {
        840 => &[33, 46],
        841 => &[8, 78],
        _ => &[],
    };
    (0..IV_BITS).map(|i| !skip.contains(&i)).collect()
}

/// Flag layout of the full key-recovery attack: secret key, active cube
/// bits, constant ones at 285..288, everything else zero.
pub fn attack_flags(cube: &[bool]) -> Vec<BitRole> {
    let mut flags = vec![BitRole::FixedZero; STATE_BITS];
    for flag in flags.iter_mut().take(KEY_BITS) {
        *flag = BitRole::Secret;
    }
    for (i, &active) in cube.iter().enumerate() {
        if active {
            flags[IV_OFFSET + i] = BitRole::Active;
        }
    }
    for flag in flags.iter_mut().skip(285) {
        *flag = BitRole::FixedOne;
    }
    flags
}

/// Flag layout of the practical verification runs: non-active IV bits stay
/// free constants instead of zeros.
pub fn practical_flags(cube: &[bool]) -> Vec<BitRole> {
    let mut flags = attack_flags(cube);
    for (i, &active) in cube.iter().enumerate() {
        if !active {
            flags[IV_OFFSET + i] = BitRole::FixedOne;
        }
    }
    flags
}

/// Recover the superpoly of the keystream bit after `rounds` rounds: run the
/// two-stage search once per output tap into a shared counting box, strip
/// the cube and constant positions, and partition by parity.
pub fn recover_superpoly(
    rounds: usize,
    cube: &[bool],
    flags: &[BitRole],
    options: TwoStageOptions,
) -> Result<SuperpolyOutcome, SearchError> {
    let mut counting = CountingBox::new();
    for &tap in &ATTACK_TARGET_ORDER {
        info!(tap = tap + 1, "enumerating division trails");
        let system = TriviumSystem::new(
            rounds,
            cube.to_vec(),
            flags.to_vec(),
            TriviumTarget::Tap(tap),
        );
        let summary = enumerate_trails_two_stage(&system, options, &mut counting)?;
        info!(
            tap = tap + 1,
            midpoints = summary.midpoints,
            trails = summary.trails,
            "target exhausted"
        );
    }

    let mut clear: Vec<usize> = cube
        .iter()
        .enumerate()
        .filter(|&(_, &active)| active)
        .map(|(i, _)| IV_OFFSET + i)
        .collect();
    clear.extend(285..288);
    let superpoly = counting.project(&clear).partition();
    Ok(SuperpolyOutcome {
        counting,
        superpoly,
    })
}

/// Result of checking one explicit monomial: the trail count toward each
/// output tap and the counting box keyed by full round-0 projections.
#[derive(Clone, Debug)]
pub struct MonomialCheck {
    pub per_target: Vec<(usize, u64)>,
    pub counting: CountingBox,
}

impl MonomialCheck {
    /// Exact trail count of the monomial made of the given cube and key
    /// indices, with no other bit involved.
    pub fn count_for(&self, cube_indices: &[usize], key_indices: &[usize]) -> u64 {
        let mut key = StateBits::new(STATE_BITS);
        for &i in cube_indices {
            key.set(IV_OFFSET + i, true);
        }
        for &i in key_indices {
            key.set(i, true);
        }
        self.counting.count(&key)
    }

    /// Whether that monomial appears in the superpoly.
    pub fn present(&self, cube_indices: &[usize], key_indices: &[usize]) -> bool {
        self.count_for(cube_indices, key_indices) % 2 == 1
    }
}

/// Count the trails of one explicit monomial toward each output tap. The
/// given cube IV bits and key bits are pinned to one at round 0 and every
/// other bit is left free, as in the zero-sum disproof runs.
pub fn check_monomial(
    rounds: usize,
    cube_indices: &[usize],
    key_indices: &[usize],
) -> Result<MonomialCheck, SearchError> {
    let mut cube = vec![false; IV_BITS];
    for &i in cube_indices {
        cube[i] = true;
    }
    let flags = vec![BitRole::Secret; STATE_BITS];

    let mut counting = CountingBox::new();
    let mut per_target = Vec::new();
    for &tap in &ATTACK_TARGET_ORDER {
        let system = TriviumSystem::new(rounds, cube.clone(), flags.clone(), TriviumTarget::Tap(tap))
            .with_forced_keys(key_indices);
        let trails = enumerate_trails(&system, &mut counting)?;
        info!(tap = tap + 1, trails, "monomial target counted");
        per_target.push((tap, trails));
    }
    Ok(MonomialCheck {
        per_target,
        counting,
    })
}

/// One clocking of the real cipher; returns the keystream bit computed from
/// the pre-update state.
pub fn round_output(s: &mut [bool; STATE_BITS]) -> bool {
    let o = *s;

    let x1 = o[92] ^ o[65];
    let x2 = o[176] ^ o[161];
    let x3 = o[287] ^ o[242];
    let z = x1 ^ x2 ^ x3;

    let mut t = o;
    t[92] = x1 ^ (o[91] & o[90]) ^ o[170];
    t[176] = x2 ^ (o[174] & o[175]) ^ o[263];
    t[287] = x3 ^ (o[286] & o[285]) ^ o[68];

    for i in 0..STATE_BITS {
        s[(i + 1) % STATE_BITS] = t[i];
    }

    z
}

/// Sum the real keystream bit over every assignment of the cube bits.
pub fn cube_sum(rounds: usize, cube: &[bool], iv: &[bool], key: &[bool]) -> bool {
    let mut base = [false; STATE_BITS];
    base[..KEY_BITS].copy_from_slice(&key[..KEY_BITS]);
    base[IV_OFFSET..IV_OFFSET + IV_BITS].copy_from_slice(&iv[..IV_BITS]);
    base[285] = true;
    base[286] = true;
    base[287] = true;

    let active: Vec<usize> = (0..IV_BITS).filter(|&i| cube[i]).collect();
    assert!(active.len() < 32, "cube too large to sum directly");

    let mut sum = false;
    for assignment in 0u32..(1 << active.len()) {
        let mut state = base;
        for (j, &idx) in active.iter().enumerate() {
            state[IV_OFFSET + idx] = (assignment >> j) & 1 == 1;
        }
        let mut z = false;
        for _ in 0..=rounds {
            z = round_output(&mut state);
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
            if i < KEY_BITS {
                term &= key[i];
            } else if (IV_OFFSET..IV_OFFSET + IV_BITS).contains(&i) {
                let j = i - IV_OFFSET;
                if !cube[j] {
                    term &= iv[j];
                }
            }
        }
        sum ^= term;
    }
    sum
}

/// Human-readable monomial: `k`/`v` factors are 1-based, constant-one
/// positions print as `c`.
pub fn describe_monomial(key: &StateBits, cube: &[bool]) -> String {
    let mut parts = Vec::new();
    for i in 0..KEY_BITS {
        if key.get(i) {
            parts.push(format!("k{}", i + 1));
        }
    }
    for i in 0..IV_BITS {
        if !cube[i] && key.get(IV_OFFSET + i) {
            parts.push(format!("v{}", i + 1));
        }
    }
    for i in 285..STATE_BITS {
        if key.get(i) {
            parts.push(format!("c{}", i + 1));
        }
    }
    if parts.is_empty() {
        "1".to_string()
    } else {
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    fn cube_of(indices: &[usize]) -> Vec<bool> {
        let mut cube = vec![false; IV_BITS];
        for &i in indices {
            cube[i] = true;
        }
        cube
    }

    #[test]
    fn test_known_cube_dimensions() {
        assert_eq!(known_cube(840).iter().filter(|&&b| b).count(), 78);
        assert!(!known_cube(840)[33] && !known_cube(840)[46]);
        assert_eq!(known_cube(841).iter().filter(|&&b| b).count(), 78);
        assert!(!known_cube(841)[8] && !known_cube(841)[78]);
        assert_eq!(known_cube(500).iter().filter(|&&b| b).count(), 80);
    }

    #[test]
    fn test_monomial_check_single_trail() {
        // One round, no cube: s[1][66] comes straight from s[0][65] (0-based
        // 64), so the monomial {k65} has exactly one trail and is present.
        let check = check_monomial(1, &[], &[64]).unwrap();
        assert_eq!(check.count_for(&[], &[64]), 1);
        assert!(check.present(&[], &[64]));
        let total: u64 = check.per_target.iter().map(|&(_, n)| n).sum();
        assert_eq!(total, 1);
        let tap66 = check
            .per_target
            .iter()
            .find(|&&(tap, _)| tap == 65)
            .unwrap()
            .1;
        assert_eq!(tap66, 1);
    }

    #[test]
    fn test_tap_targets_partition_combined_output() {
        // IV bit 49 (position 141) reaches the s162 tap at round 20, so the
        // combined target and the per-tap split both see real trails.
        let cube = cube_of(&[48]);
        let flags = practical_flags(&cube);
        let rounds = 20;

        let mut combined = CountingBox::new();
        let system = TriviumSystem::new(rounds, cube.clone(), flags.clone(), TriviumTarget::Combined);
        let combined_trails = enumerate_trails(&system, &mut combined).unwrap();

        let mut merged = CountingBox::new();
        let mut merged_trails = 0;
        for &tap in &ATTACK_TARGET_ORDER {
            let system =
                TriviumSystem::new(rounds, cube.clone(), flags.clone(), TriviumTarget::Tap(tap));
            merged_trails += enumerate_trails(&system, &mut merged).unwrap();
        }

        assert_eq!(combined_trails, merged_trails);
        assert_eq!(combined, merged);
    }

    #[test]
    fn test_two_stage_matches_single_stage() {
        // IV bit 39 reaches the s162 tap at round 30.
        let cube = cube_of(&[38]);
        let flags = practical_flags(&cube);
        let rounds = 30;
        let system = TriviumSystem::new(rounds, cube, flags, TriviumTarget::Combined);

        let mut single = CountingBox::new();
        let single_trails = enumerate_trails(&system, &mut single).unwrap();

        for div_round in [rounds / 2, 10] {
            let mut two_stage = CountingBox::new();
            let summary = enumerate_trails_two_stage(
                &system,
                TwoStageOptions {
                    div_round: Some(div_round),
                },
                &mut two_stage,
            )
            .unwrap();
            assert_eq!(summary.trails, single_trails, "split at {}", div_round);
            assert_eq!(two_stage, single, "split at {}", div_round);
        }
    }

    #[test]
    fn test_superpoly_matches_cube_sum() {
        // Three configurations with different superpoly shapes:
        //  - IV bit 29 lands on the s162 tap after 40 rounds: constant 1.
        //  - IV bit 42 is consumed by the middle register's AND at update 40
        //    of a 106-round run, whose product reaches the s243 tap 66
        //    rounds later: the superpoly is the partner bit v43.
        //  - IV bits 29 and 44 would need two output taps at once: zero sum.
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let configs = [
            (40usize, cube_of(&[28]), true),
            (106, cube_of(&[41]), true),
            (40, cube_of(&[28, 43]), false),
        ];

        for (rounds, cube, expect_trails) in configs {
            let flags = practical_flags(&cube);
            let system =
                TriviumSystem::new(rounds, cube.clone(), flags, TriviumTarget::Combined);
            let mut counting = CountingBox::new();
            let trails = enumerate_trails(&system, &mut counting).unwrap();
            assert_eq!(
                trails > 0,
                expect_trails,
                "unexpected trail population at {} rounds",
                rounds
            );

            for _trial in 0..100 {
                let key: Vec<bool> = (0..KEY_BITS).map(|_| rng.gen()).collect();
                let iv: Vec<bool> = (0..IV_BITS).map(|_| rng.gen()).collect();
                let practical = cube_sum(rounds, &cube, &iv, &key);
                let theoretical = superpoly_sum(&counting, &cube, &iv, &key);
                assert_eq!(practical, theoretical, "superpoly disagrees with cipher");
            }
        }
    }

    #[test]
    fn test_describe_monomial() {
        let cube = vec![false; IV_BITS];
        let mut key = StateBits::new(STATE_BITS);
        key.set(0, true);
        key.set(IV_OFFSET + 4, true);
        assert_eq!(describe_monomial(&key, &cube), "k1 v5");
        assert_eq!(describe_monomial(&StateBits::new(STATE_BITS), &cube), "1");
    }
}
