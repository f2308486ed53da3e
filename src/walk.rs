use std::fmt;

use tracing::trace;

use crate::{
    hsi::{harmonised_state_identifiers, HsiSuite},
    machine::{MachineError, MealyMachine, StateId},
    math::{Map, Set},
};

/// Steps without a successful state identification before the reset strategy
/// jumps back to the initial state.
pub const DEFAULT_STEP_LIMIT: usize = 5;

/// The four exploration policies a [`Walker`] can follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalkKind {
    /// Uniform choice among the triggers available at the current state.
    Random,
    /// Uniform choice, but the machine is reset to its initial state whenever no
    /// state identification succeeds for a number of consecutive steps.
    RandomWithReset,
    /// Uniform choice that avoids transitions already observed to self-loop.
    LimitedSelfLoop,
    /// Triggers weighted by how often each symbol occurs in the current state's
    /// harmonised identifiers.
    Statistical,
}

impl WalkKind {
    /// All walk kinds, in the order experiment drivers iterate them.
    pub fn all() -> [WalkKind; 4] {
        [
            WalkKind::Random,
            WalkKind::RandomWithReset,
            WalkKind::LimitedSelfLoop,
            WalkKind::Statistical,
        ]
    }
}

impl fmt::Display for WalkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WalkKind::Random => "random",
            WalkKind::RandomWithReset => "randomwithreset",
            WalkKind::LimitedSelfLoop => "limitedselfloop",
            WalkKind::Statistical => "statistical",
        };
        write!(f, "{name}")
    }
}

/// The ordered `(input, output)` pairs executed during a walk.
pub type Trace = Vec<(char, char)>;

/// Tracks which `(state, symbol)` pairs a walk has executed, against the total
/// transition count of the machine under test.
struct Coverage {
    executed: Set<(StateId, char)>,
    total: usize,
}

impl Coverage {
    fn new(total: usize) -> Self {
        Self {
            executed: Set::default(),
            total,
        }
    }

    fn record(&mut self, state: StateId, symbol: char) {
        self.executed.insert((state, symbol));
    }

    fn percent(&self) -> f64 {
        self.executed.len() as f64 / self.total as f64 * 100.0
    }
}

/// Walks a mutated machine until a target transition-coverage percentage is
/// reached, producing the executed trace. The walker threads its position
/// through the walk loop as an explicit value; the machine itself is never
/// modified.
pub struct Walker<'a> {
    original: &'a MealyMachine,
    mutated: &'a MealyMachine,
    suite: &'a HsiSuite,
    target_coverage: f64,
    step_limit: usize,
    max_walk_length: usize,
}

impl<'a> Walker<'a> {
    /// Creates a walker over `mutated`, with `original` supplying the state
    /// identifiers for the reset and statistical strategies. The target coverage
    /// is clamped to at most 100 percent; the step ceiling defaults to
    /// `|states|² × |inputs|` of the original machine.
    pub fn new(
        original: &'a MealyMachine,
        mutated: &'a MealyMachine,
        target_coverage: f64,
        suite: &'a HsiSuite,
    ) -> Self {
        let max_walk_length = original.size() * original.size() * original.inputs().size();
        Self {
            original,
            mutated,
            suite,
            target_coverage: target_coverage.min(100.0),
            step_limit: DEFAULT_STEP_LIMIT,
            max_walk_length,
        }
    }

    /// Overrides the reset strategy's identification step limit.
    pub fn with_step_limit(mut self, step_limit: usize) -> Self {
        self.step_limit = step_limit;
        self
    }

    /// Overrides the global step ceiling. Mainly useful for forcing the abort
    /// path in tests.
    pub fn with_max_walk_length(mut self, max_walk_length: usize) -> Self {
        self.max_walk_length = max_walk_length;
        self
    }

    /// Performs a walk of the given kind. Returns the executed trace, or `None`
    /// when the step ceiling is exceeded before the target coverage is reached.
    pub fn walk(&self, kind: WalkKind, rng: &mut fastrand::Rng) -> Option<Trace> {
        match kind {
            WalkKind::Random => self.random_walk(rng),
            WalkKind::RandomWithReset => self.random_walk_with_reset(rng),
            WalkKind::LimitedSelfLoop => self.limited_self_loop_walk(rng),
            WalkKind::Statistical => self.statistical_walk(rng),
        }
    }

    fn random_walk(&self, rng: &mut fastrand::Rng) -> Option<Trace> {
        let mut coverage = Coverage::new(self.mutated.transitions().len());
        let mut current = self.mutated.initial();
        let mut walk = Trace::new();

        while coverage.percent() < self.target_coverage {
            if walk.len() > self.max_walk_length {
                return None;
            }
            let symbol = self.uniform_trigger(current, rng);
            current = self.step(current, symbol, &mut coverage, &mut walk);
        }

        Some(walk)
    }

    fn random_walk_with_reset(&self, rng: &mut fastrand::Rng) -> Option<Trace> {
        let mut coverage = Coverage::new(self.mutated.transitions().len());
        let mut current = self.mutated.initial();
        let mut walk = Trace::new();
        let mut since_reset = Trace::new();
        let mut steps_since_identification = 0usize;

        while coverage.percent() < self.target_coverage {
            if walk.len() > self.max_walk_length {
                return None;
            }
            let symbol = self.uniform_trigger(current, rng);
            current = self.step(current, symbol, &mut coverage, &mut walk);
            since_reset.push(*walk.last().expect("a step was just recorded"));

            if self.identified(&since_reset) {
                steps_since_identification = 0;
            } else {
                steps_since_identification += 1;
            }

            if steps_since_identification >= self.step_limit {
                trace!(
                    steps = self.step_limit,
                    "no identification, resetting to the initial state"
                );
                current = self.mutated.initial();
                since_reset.clear();
                steps_since_identification = 0;
            }
        }

        Some(walk)
    }

    fn limited_self_loop_walk(&self, rng: &mut fastrand::Rng) -> Option<Trace> {
        let mut coverage = Coverage::new(self.mutated.transitions().len());
        let mut current = self.mutated.initial();
        let mut walk = Trace::new();
        let mut self_loops: Set<(StateId, char)> = Set::default();

        while coverage.percent() < self.target_coverage {
            if walk.len() > self.max_walk_length {
                return None;
            }

            let triggers = self.mutated.triggers(current);
            let progressing: Vec<char> = triggers
                .iter()
                .copied()
                .filter(|&sym| !self_loops.contains(&(current, sym)))
                .collect();
            // fall back to the full trigger set if only self-loops remain
            let pool = if progressing.is_empty() {
                triggers
            } else {
                progressing
            };
            let symbol = pool[rng.usize(..pool.len())];

            let previous = current;
            current = self.step(current, symbol, &mut coverage, &mut walk);
            if previous == current {
                self_loops.insert((previous, symbol));
            }
        }

        Some(walk)
    }

    fn statistical_walk(&self, rng: &mut fastrand::Rng) -> Option<Trace> {
        let weights = event_weights(self.original);
        let mut coverage = Coverage::new(self.mutated.transitions().len());
        let mut current = self.mutated.initial();
        let mut walk = Trace::new();

        while coverage.percent() < self.target_coverage {
            if walk.len() > self.max_walk_length {
                return None;
            }
            // states the mutator introduced are unknown to the original machine
            // and fall back to a uniform draw
            let symbol = match weights.get(&current) {
                Some(state_weights) => {
                    weighted_trigger(&self.mutated.triggers(current), state_weights, rng)
                }
                None => self.uniform_trigger(current, rng),
            };
            current = self.step(current, symbol, &mut coverage, &mut walk);
        }

        Some(walk)
    }

    fn uniform_trigger(&self, state: StateId, rng: &mut fastrand::Rng) -> char {
        let triggers = self.mutated.triggers(state);
        triggers[rng.usize(..triggers.len())]
    }

    fn step(
        &self,
        current: StateId,
        symbol: char,
        coverage: &mut Coverage,
        walk: &mut Trace,
    ) -> StateId {
        let (target, output) = self
            .mutated
            .successor(current, symbol)
            .expect("the machine under test is complete");
        coverage.record(current, symbol);
        walk.push((symbol, output));
        target
    }

    /// Whether the tail of the trace since the last reset matches some suite
    /// entry symbol-for-symbol and output-for-output.
    fn identified(&self, since_reset: &[(char, char)]) -> bool {
        self.suite.iter().any(|(inputs, outputs)| {
            let len = inputs.len();
            since_reset.len() >= len && {
                let tail = &since_reset[since_reset.len() - len..];
                tail.iter().map(|&(sym, _)| sym).eq(inputs.chars())
                    && tail.iter().map(|&(_, out)| out).eq(outputs.iter().copied())
            }
        })
    }
}

/// Per-state sampling weights for the statistical walk: each input symbol is
/// weighted by its occurrence count across the state's harmonised identifiers,
/// with absent symbols kept reachable through a baseline weight of a single
/// occurrence.
pub fn event_weights(machine: &MealyMachine) -> Map<StateId, Map<char, f64>> {
    let identifiers = harmonised_state_identifiers(machine);
    let mut weights = Map::default();

    for &state in machine.states() {
        let mut counts: Map<char, usize> = Map::default();
        if let Some(seqs) = identifiers.get(&state) {
            for seq in seqs {
                for sym in seq.chars() {
                    *counts.entry(sym).or_default() += 1;
                }
            }
        }

        let absent = machine
            .inputs()
            .universe()
            .filter(|sym| !counts.contains_key(sym))
            .count();
        let total = (counts.values().sum::<usize>() + absent) as f64;

        let state_weights: Map<char, f64> = machine
            .inputs()
            .universe()
            .map(|sym| {
                let count = counts.get(&sym).copied().unwrap_or(0);
                let weight = if count == 0 {
                    1.0 / total
                } else {
                    count as f64 / total
                };
                (sym, weight)
            })
            .collect();
        weights.insert(state, state_weights);
    }

    weights
}

/// Cumulative-weight inversion sampling over the given triggers.
fn weighted_trigger(triggers: &[char], weights: &Map<char, f64>, rng: &mut fastrand::Rng) -> char {
    let total: f64 = triggers
        .iter()
        .map(|sym| weights.get(sym).copied().unwrap_or(0.0))
        .sum();
    if total <= 0.0 {
        return triggers[rng.usize(..triggers.len())];
    }

    let mut remaining = rng.f64() * total;
    for &symbol in triggers {
        let weight = weights.get(&symbol).copied().unwrap_or(0.0);
        if remaining < weight {
            return symbol;
        }
        remaining -= weight;
    }
    *triggers
        .last()
        .expect("states of a complete machine have triggers")
}

/// Replays the trace's input sequence on `original` from its initial state and
/// compares outputs symbol by symbol. Returns the 1-based index of the first
/// divergence, or `None` when the outputs agree everywhere.
pub fn detected_fault(
    original: &MealyMachine,
    trace: &[(char, char)],
) -> Result<Option<usize>, MachineError> {
    let inputs: String = trace.iter().map(|&(symbol, _)| symbol).collect();
    let (_, outputs) = original.run(original.initial(), &inputs)?;

    Ok(trace
        .iter()
        .zip(outputs)
        .position(|(&(_, observed), expected)| observed != expected)
        .map(|index| index + 1))
}
