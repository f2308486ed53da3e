use std::fmt;

use tracing::debug;

use crate::{
    machine::{MealyMachine, StateId, Transition},
    math::Set,
};

/// Fraction of the state count that determines how many mutations a session applies.
const MUTATION_RATIO: f64 = 0.4;

/// A record of a single applied change. Purely observational output for
/// diagnostics; no algorithm consults it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// A fresh state was spliced into an existing transition.
    AddState {
        /// Id of the newly created state.
        state: StateId,
        /// The transition that was rewired to point at the new state, as it was
        /// before the rewiring.
        rewired: Transition,
    },
    /// A state was deleted and its incoming transitions rerouted.
    RemoveState {
        /// Id of the removed state.
        state: StateId,
    },
    /// A transition's output label was reassigned.
    ChangeOutput {
        /// The transition after the change.
        transition: Transition,
    },
    /// A transition was redirected to a different target state.
    ChangeTarget {
        /// The transition after the change.
        transition: Transition,
        /// The target the transition pointed at before.
        previous: StateId,
    },
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::AddState { state, rewired } => {
                write!(f, "added state {state} by splitting {rewired}")
            }
            Mutation::RemoveState { state } => write!(f, "removed state {state}"),
            Mutation::ChangeOutput { transition } => {
                write!(f, "changed output, transition is now {transition}")
            }
            Mutation::ChangeTarget {
                transition,
                previous,
            } => {
                write!(f, "redirected transition away from {previous}, now {transition}")
            }
        }
    }
}

/// Result of a mutation session: an independent faulty copy of the input
/// machine together with the ordered log of applied changes.
#[derive(Debug, Clone)]
pub struct Mutated {
    /// The mutated machine. Complete, deterministic and strongly connected,
    /// but behaviorally different from the original.
    pub machine: MealyMachine,
    /// Human-readable descriptions of the applied mutations, in order.
    pub log: Vec<Mutation>,
}

/// Applies `floor(0.4 × |states|)` (at least one) random mutations to a copy of
/// `machine`. Shorthand for [`Mutator::new`] followed by
/// [`Mutator::create_mutated`].
pub fn mutate(machine: &MealyMachine, rng: &mut fastrand::Rng) -> Mutated {
    Mutator::new(machine, rng).create_mutated()
}

/// Injects faults into a machine by applying a randomized sequence of
/// structural and behavioral mutations, each gated on preserving strong
/// connectivity (output changes are always structurally safe). A mutation that
/// would disconnect the machine is rolled back and substituted, so a session
/// always succeeds.
pub struct Mutator<'r> {
    machine: MealyMachine,
    rng: &'r mut fastrand::Rng,
    log: Vec<Mutation>,
    // transitions whose output this session already changed; reselecting one
    // could flip it back to the original label
    output_mutated: Set<(StateId, char)>,
}

impl<'r> Mutator<'r> {
    /// Creates a mutation session over a deep copy of `machine`.
    pub fn new(machine: &MealyMachine, rng: &'r mut fastrand::Rng) -> Self {
        Self {
            machine: machine.clone(),
            rng,
            log: Vec::new(),
            output_mutated: Set::default(),
        }
    }

    /// Runs the session and returns the mutated machine with its log.
    pub fn create_mutated(mut self) -> Mutated {
        let rounds = ((self.machine.size() as f64 * MUTATION_RATIO) as usize).max(1);
        for _ in 0..rounds {
            match self.rng.usize(..4) {
                0 => self.add_state(),
                1 => self.remove_state(),
                2 => self.change_output(),
                _ => {
                    if !self.try_change_target() {
                        self.fallback();
                    }
                }
            }
            debug_assert!(self.machine.is_strongly_connected());
        }

        for mutation in &self.log {
            debug!(%mutation, "applied mutation");
        }
        Mutated {
            machine: self.machine,
            log: self.log,
        }
    }

    /// Splices a new state into a randomly picked transition: the transition is
    /// rewired to the new state, which forwards to the old target on the same
    /// symbol and gets fresh random transitions for every other input symbol.
    fn add_state(&mut self) {
        let source = {
            let states = self.machine.states();
            states[self.rng.usize(..states.len())]
        };
        let outgoing: Vec<usize> = self
            .machine
            .transitions()
            .iter()
            .enumerate()
            .filter(|(_, t)| t.source == source)
            .map(|(i, _)| i)
            .collect();
        let picked = outgoing[self.rng.usize(..outgoing.len())];
        let rewired = self.machine.transitions()[picked];

        let new_state = self
            .machine
            .states()
            .iter()
            .max()
            .copied()
            .expect("machines are non-empty")
            + 1;
        self.machine.states_mut().push(new_state);
        self.machine.transitions_mut()[picked].target = new_state;

        let outputs = self.machine.outputs().clone();
        let symbols: Vec<char> = self.machine.inputs().universe().collect();
        let pool: Vec<StateId> = self.machine.states().to_vec();

        let mut fresh = vec![Transition {
            source: new_state,
            symbol: rewired.symbol,
            output: outputs.choose(self.rng),
            target: rewired.target,
        }];
        for symbol in symbols.into_iter().filter(|&s| s != rewired.symbol) {
            fresh.push(Transition {
                source: new_state,
                symbol,
                output: outputs.choose(self.rng),
                target: pool[self.rng.usize(..pool.len())],
            });
        }
        self.machine.transitions_mut().extend(fresh);

        self.log.push(Mutation::AddState {
            state: new_state,
            rewired,
        });
    }

    /// Deletes a state and reroutes its incoming transitions onto the targets
    /// its outgoing transitions used to reach. Only states whose non-self-loop
    /// in-degree is at least their non-self-loop out-degree are eligible; a
    /// removal that loses connectivity is rolled back and the next candidate is
    /// tried. When no candidate works, a fallback mutation applies instead.
    fn remove_state(&mut self) {
        let initial = self.machine.initial();
        let mut candidates: Vec<StateId> = self
            .machine
            .states()
            .iter()
            .copied()
            .filter(|&q| q != initial)
            .collect();
        self.rng.shuffle(&mut candidates);

        for candidate in candidates {
            if self.non_loop_in_degree(candidate) < self.non_loop_out_degree(candidate) {
                continue;
            }
            let snapshot = self.machine.clone();
            if self.try_remove(candidate) {
                self.log.push(Mutation::RemoveState { state: candidate });
                return;
            }
            self.machine = snapshot;
        }

        debug!("no state can be removed without losing connectivity, falling back");
        self.fallback();
    }

    fn try_remove(&mut self, state: StateId) -> bool {
        let mut rerouted: Vec<StateId> = self
            .machine
            .transitions_from(state)
            .filter(|t| !t.is_loop())
            .map(|t| t.target)
            .collect();
        self.rng.shuffle(&mut rerouted);

        self.machine.transitions_mut().retain(|t| t.source != state);
        self.machine.states_mut().retain(|&q| q != state);

        let pool: Vec<StateId> = self.machine.states().to_vec();
        for index in 0..self.machine.transitions().len() {
            if self.machine.transitions()[index].target != state {
                continue;
            }
            let source = self.machine.transitions()[index].source;
            let target = match rerouted.pop() {
                Some(target) => target,
                None => {
                    let others: Vec<StateId> =
                        pool.iter().copied().filter(|&q| q != source).collect();
                    if others.is_empty() {
                        source
                    } else {
                        others[self.rng.usize(..others.len())]
                    }
                }
            };
            self.machine.transitions_mut()[index].target = target;
        }

        self.machine.is_strongly_connected()
    }

    /// Reassigns a random transition's output to a different symbol of the
    /// output alphabet. Always structurally safe. Transitions already mutated in
    /// this session are avoided until every transition has been touched.
    fn change_output(&mut self) {
        if self.machine.outputs().size() < 2 {
            // single-output machines offer no alternative label to assign
            self.add_state();
            return;
        }

        let fresh: Vec<usize> = self
            .machine
            .transitions()
            .iter()
            .enumerate()
            .filter(|(_, t)| !self.output_mutated.contains(&(t.source, t.symbol)))
            .map(|(i, _)| i)
            .collect();
        let pool = if fresh.is_empty() {
            (0..self.machine.transitions().len()).collect()
        } else {
            fresh
        };
        let index = pool[self.rng.usize(..pool.len())];
        let previous = self.machine.transitions()[index];

        let others: Vec<char> = self
            .machine
            .outputs()
            .universe()
            .filter(|&o| o != previous.output)
            .collect();
        let output = others[self.rng.usize(..others.len())];
        self.machine.transitions_mut()[index].output = output;
        self.output_mutated.insert((previous.source, previous.symbol));

        self.log.push(Mutation::ChangeOutput {
            transition: self.machine.transitions()[index],
        });
    }

    /// Redirects a random transition to a different target. Only transitions
    /// whose current target keeps at least two non-self-loop incoming
    /// transitions are candidates, and a redirect that loses connectivity is
    /// rolled back. Returns whether a redirect was applied.
    fn try_change_target(&mut self) -> bool {
        let candidates: Vec<usize> = self
            .machine
            .transitions()
            .iter()
            .enumerate()
            .filter(|(_, t)| self.non_loop_in_degree(t.target) >= 2)
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() {
            return false;
        }
        let index = candidates[self.rng.usize(..candidates.len())];
        let previous = self.machine.transitions()[index];

        let others: Vec<StateId> = self
            .machine
            .states()
            .iter()
            .copied()
            .filter(|&q| q != previous.target)
            .collect();
        if others.is_empty() {
            return false;
        }
        let target = others[self.rng.usize(..others.len())];
        self.machine.transitions_mut()[index].target = target;

        if self.machine.is_strongly_connected() {
            self.log.push(Mutation::ChangeTarget {
                transition: self.machine.transitions()[index],
                previous: previous.target,
            });
            true
        } else {
            self.machine.transitions_mut()[index].target = previous.target;
            false
        }
    }

    /// Substitute mutation applied when a structural mutation cannot be placed:
    /// a coin flip may attempt one redirect, otherwise an output change (which
    /// always succeeds) is applied.
    fn fallback(&mut self) {
        if self.rng.bool() && self.try_change_target() {
            return;
        }
        self.change_output();
    }

    fn non_loop_in_degree(&self, state: StateId) -> usize {
        self.machine
            .transitions_into(state)
            .filter(|t| !t.is_loop())
            .count()
    }

    fn non_loop_out_degree(&self, state: StateId) -> usize {
        self.machine
            .transitions_from(state)
            .filter(|t| !t.is_loop())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::generate_machine_at_least;

    #[test_log::test]
    fn mutated_machines_stay_well_formed() {
        for seed in 0..10 {
            let mut rng = fastrand::Rng::with_seed(seed);
            let machine = generate_machine_at_least(8, 3, 2, 2, &mut rng).unwrap();
            let mutated = mutate(&machine, &mut rng);

            assert!(mutated.machine.is_complete());
            assert!(mutated.machine.is_deterministic());
            assert!(mutated.machine.is_strongly_connected());
        }
    }

    #[test]
    fn mutation_is_never_a_no_op() {
        for seed in 20..30 {
            let mut rng = fastrand::Rng::with_seed(seed);
            let machine = generate_machine_at_least(6, 3, 2, 2, &mut rng).unwrap();
            let mutated = mutate(&machine, &mut rng);

            assert!(!mutated.log.is_empty());
            assert_ne!(mutated.machine, machine);
        }
    }

    #[test]
    fn initial_state_survives_mutation() {
        for seed in 40..50 {
            let mut rng = fastrand::Rng::with_seed(seed);
            let machine = generate_machine_at_least(5, 2, 2, 2, &mut rng).unwrap();
            let mutated = mutate(&machine, &mut rng);
            assert_eq!(mutated.machine.initial(), machine.initial());
        }
    }

    #[test]
    fn mutation_log_is_readable() {
        let mut rng = fastrand::Rng::with_seed(99);
        let machine = generate_machine_at_least(6, 3, 2, 2, &mut rng).unwrap();
        let mutated = mutate(&machine, &mut rng);
        for mutation in &mutated.log {
            assert!(!mutation.to_string().is_empty());
        }
    }
}
