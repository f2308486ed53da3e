use tracing::debug;

use crate::{
    machine::{reachable_set, Alphabet, MealyMachine, StateId, Transition},
    math::Set,
    minimization,
};

/// Errors raised by the generator before any randomized work begins.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerateError {
    /// The requested state count was zero.
    #[error("cannot generate a machine without states")]
    NoStates,
    /// The requested input alphabet was empty.
    #[error("the input alphabet must contain at least one symbol")]
    EmptyInputAlphabet,
    /// The requested output alphabet was empty.
    #[error("the output alphabet must contain at least one symbol")]
    EmptyOutputAlphabet,
}

/// Generates a random complete, deterministic, strongly connected and minimal
/// [`MealyMachine`] with `num_states` states over `num_inputs` input and
/// `num_outputs` output symbols.
///
/// The machine is assembled by sampling random transitions, repairing
/// connectivity pair by pair, filling in the missing transitions and finally
/// merging output-equivalent states. Because of that final merge the returned
/// machine may have fewer states than requested. Whenever the connectivity
/// repair exhausts the input alphabet at some state, the whole attempt is
/// discarded and sampling starts over; for adversarial state:input ratios this
/// retry loop can run for a long time, which is accepted as a soft failure.
pub fn generate_machine(
    num_states: usize,
    num_inputs: usize,
    num_outputs: usize,
    rng: &mut fastrand::Rng,
) -> Result<MealyMachine, GenerateError> {
    if num_states == 0 {
        return Err(GenerateError::NoStates);
    }
    if num_inputs == 0 {
        return Err(GenerateError::EmptyInputAlphabet);
    }
    if num_outputs == 0 {
        return Err(GenerateError::EmptyOutputAlphabet);
    }

    let inputs = Alphabet::of_size(num_inputs);
    let outputs = Alphabet::numeric(num_outputs);
    let states: Vec<StateId> = (0..num_states).collect();

    let mut attempt = 0usize;
    let mut transitions = loop {
        attempt += 1;
        let mut transitions = sample_transitions(&states, &inputs, &outputs, rng);
        if repair_connectivity(&states, &inputs, &outputs, &mut transitions, rng) {
            break transitions;
        }
        debug!(attempt, "connectivity repair exhausted the alphabet, resampling");
    };

    complete_transitions(&states, &inputs, &outputs, &mut transitions, rng);

    let mut machine = MealyMachine::new(inputs, outputs, states, transitions);
    minimization::quotient(&mut machine);
    debug!(
        states = machine.size(),
        transitions = machine.transitions().len(),
        attempt,
        "generated machine"
    );
    Ok(machine)
}

/// Like [`generate_machine`], but redraws until the minimized machine has at
/// least `min_states` states. Minimization routinely collapses small random
/// machines, and a single-state machine is useless as a fault-injection target.
pub fn generate_machine_at_least(
    num_states: usize,
    num_inputs: usize,
    num_outputs: usize,
    min_states: usize,
    rng: &mut fastrand::Rng,
) -> Result<MealyMachine, GenerateError> {
    let min_states = min_states.min(num_states);
    loop {
        let machine = generate_machine(num_states, num_inputs, num_outputs, rng)?;
        if machine.size() >= min_states {
            return Ok(machine);
        }
        debug!(
            size = machine.size(),
            min_states, "minimization collapsed the machine, redrawing"
        );
    }
}

/// Draws, for every state, a random subset of all but one input symbol, each
/// with a random destination and output. The withheld symbol leaves room for the
/// connectivity repair to add a transition without violating determinism.
fn sample_transitions(
    states: &[StateId],
    inputs: &Alphabet,
    outputs: &Alphabet,
    rng: &mut fastrand::Rng,
) -> Vec<Transition> {
    let symbols: Vec<char> = inputs.universe().collect();
    let mut transitions = Vec::new();

    for &state in states {
        let mut sample = symbols.clone();
        rng.shuffle(&mut sample);
        sample.truncate(symbols.len().saturating_sub(1));

        for symbol in sample {
            transitions.push(Transition {
                source: state,
                symbol,
                output: outputs.choose(rng),
                target: states[rng.usize(..states.len())],
            });
        }
    }

    transitions
}

/// Adds a direct repairing transition for every ordered state pair `(s, t)`
/// where `t` is unreachable from `s`, on the first input symbol still unused at
/// `s`. Returns `false` when some repair finds the alphabet exhausted, in which
/// case the caller discards the attempt.
fn repair_connectivity(
    states: &[StateId],
    inputs: &Alphabet,
    outputs: &Alphabet,
    transitions: &mut Vec<Transition>,
    rng: &mut fastrand::Rng,
) -> bool {
    for &source in states {
        for &target in states {
            if source == target {
                continue;
            }
            if reachable_set(transitions, source).contains(&target) {
                continue;
            }

            let used: Set<char> = transitions
                .iter()
                .filter(|t| t.source == source)
                .map(|t| t.symbol)
                .collect();
            let Some(symbol) = inputs.universe().find(|sym| !used.contains(sym)) else {
                return false;
            };

            transitions.push(Transition {
                source,
                symbol,
                output: outputs.choose(rng),
                target,
            });
        }
    }
    true
}

/// Fills in a random transition for every `(state, symbol)` pair that is still
/// missing one, establishing completeness.
fn complete_transitions(
    states: &[StateId],
    inputs: &Alphabet,
    outputs: &Alphabet,
    transitions: &mut Vec<Transition>,
    rng: &mut fastrand::Rng,
) {
    for &state in states {
        let used: Set<char> = transitions
            .iter()
            .filter(|t| t.source == state)
            .map(|t| t.symbol)
            .collect();
        for symbol in inputs.universe().filter(|sym| !used.contains(sym)) {
            transitions.push(Transition {
                source: state,
                symbol,
                output: outputs.choose(rng),
                target: states[rng.usize(..states.len())],
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sized_parameters_are_rejected() {
        let mut rng = fastrand::Rng::with_seed(7);
        assert_eq!(
            generate_machine(0, 2, 2, &mut rng),
            Err(GenerateError::NoStates)
        );
        assert_eq!(
            generate_machine(3, 0, 2, &mut rng),
            Err(GenerateError::EmptyInputAlphabet)
        );
        assert_eq!(
            generate_machine(3, 2, 0, &mut rng),
            Err(GenerateError::EmptyOutputAlphabet)
        );
    }

    #[test_log::test]
    fn generated_machines_are_well_formed() {
        let mut rng = fastrand::Rng::with_seed(0xC0FFEE);
        for _ in 0..20 {
            let machine = generate_machine(8, 4, 2, &mut rng).unwrap();
            assert!(machine.is_complete());
            assert!(machine.is_deterministic());
            assert!(machine.is_strongly_connected());
            assert!(machine.is_minimal());
            assert!(!machine.has_duplicate_transitions());
        }
    }

    #[test]
    fn single_state_machine_is_legal() {
        let mut rng = fastrand::Rng::with_seed(3);
        let machine = generate_machine(1, 2, 2, &mut rng).unwrap();
        assert_eq!(machine.size(), 1);
        assert!(machine.is_complete());
        assert!(machine.is_strongly_connected());
    }

    #[test]
    fn redraw_until_minimum_size() {
        let mut rng = fastrand::Rng::with_seed(11);
        let machine = generate_machine_at_least(6, 3, 2, 2, &mut rng).unwrap();
        assert!(machine.size() >= 2);
    }
}
