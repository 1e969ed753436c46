//! # divtrail - three-subset division property trail enumeration
//!
//! Recovers the superpolies of cube attacks on Trivium and Grain-128a by
//! modeling bit-based division property propagation as a constraint system
//! and exhaustively counting the satisfying assignments (division trails)
//! that reach a chosen output bit. For each monomial `u` over the key and
//! public IV bits, the exact trail count `J[u]` decides membership by
//! parity: odd means `u` appears in the superpoly, even means it cancels.
//!
//! ## Modules
//!
//! - [`bits`] - Fixed-width bit strings for trail rows and monomial keys
//! - [`model`] - Constraint vocabulary and the incremental SAT boundary
//! - [`rules`] - Propagation rules: tap, Trivium core, XOR sum, AND merge
//! - [`engine`] - Single-stage and two-stage trail enumeration
//! - [`aggregate`] - Counting box, key projection, parity partition
//! - [`trivium`] - Trivium builder, recovery drivers, verification oracle
//! - [`grain128`] - Grain-128a builder, recovery drivers, verification oracle

pub mod aggregate;
pub mod bits;
pub mod engine;
pub mod grain128;
pub mod model;
pub mod rules;
pub mod trivium;

pub use aggregate::{CountingBox, SuperpolyOutcome, SuperpolyPartition};
pub use bits::StateBits;
pub use engine::{
    enumerate_trails, enumerate_trails_two_stage, BitRole, DivisionSystem, TwoStageOptions,
    TwoStageSummary,
};
pub use model::{DivModel, SearchError, POOL_LIMIT};
