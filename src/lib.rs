//! Research harness for evaluating randomized conformance-testing strategies
//! against model-based mutation testing of Mealy machines.
//!
//! The crate covers one experiment pipeline end to end: a random, complete,
//! deterministic, strongly connected and minimal [`machine::MealyMachine`] is
//! drawn by the [`generate`] module; the [`hsi`] module derives harmonised
//! state identifiers and a finite test suite from it; the [`mutate`] module
//! injects connectivity-preserving faults into an independent copy; and the
//! [`walk`] module explores the faulty copy under a transition-coverage stop
//! condition, reporting whether (and where) the executed trace exposes the
//! injected fault. The [`harness`] module strings these together and produces
//! per-run records for external persistence and analysis.
//!
//! All randomized components take an explicit [`fastrand::Rng`] handle, so
//! experiments can be reproduced by seeding. The core is single-threaded;
//! drivers parallelize across independent runs, each of which owns its
//! machines end to end.

/// The prelude re-exports everything needed for the usual
/// generate → identify → mutate → walk pipeline.
pub mod prelude {
    pub use crate::{
        case_studies,
        generate::{generate_machine, generate_machine_at_least, GenerateError},
        harness::{render_records, run_all_walks, InputScale, RunConfig, RunError, RunRecord},
        hsi::{
            harmonised_state_identifiers, hsi_suite, separating_sequences, state_cover,
            transition_cover, HsiSuite,
        },
        machine::{Alphabet, MachineBuilder, MachineError, MealyMachine, StateId, Transition},
        math,
        mutate::{mutate, Mutated, Mutation, Mutator},
        walk::{detected_fault, event_weights, Trace, WalkKind, Walker},
    };
}

/// Small mathematical helpers: hash collection aliases and the state partition
/// used by minimization.
pub mod math;

/// The Mealy machine entity and its query surface.
pub mod machine;

/// Moore-style partition refinement and quotienting of equivalent states.
pub mod minimization;

/// Random generation of well-formed machines.
pub mod generate;

/// Fault injection through connectivity-preserving mutations.
pub mod mutate;

/// State identification: separating sequences, harmonised identifiers, covers
/// and the HSI test suite.
pub mod hsi;

/// Coverage-driven exploration strategies over mutated machines.
pub mod walk;

/// Sequential experiment driving and result records.
pub mod harness;

/// Hand-built machines from the literature.
pub mod case_studies;

pub use machine::MealyMachine;
pub use walk::WalkKind;
