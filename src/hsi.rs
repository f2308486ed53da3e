use std::collections::{BTreeSet, VecDeque};

use itertools::Itertools;
use tracing::trace;

use crate::{
    machine::{MealyMachine, StateId},
    math::Map,
};

/// Candidate distinguishing sequences are enumerated up to this length. A state
/// pair that no sequence of this length separates silently gets no identifier;
/// the generator's minimality guarantee makes that case unreachable in practice.
const MAX_SEQUENCE_LENGTH: usize = 5;

/// The finite test suite derived from a machine: every key is an input sequence
/// and its value the output sequence the machine produces from its initial
/// state. Read-only for all walk strategies.
pub type HsiSuite = Map<String, Vec<char>>;

/// All candidate input sequences of length 1 to [`MAX_SEQUENCE_LENGTH`], shortest
/// first, in alphabet order within each length.
fn candidate_sequences(machine: &MealyMachine) -> impl Iterator<Item = String> + '_ {
    let symbols: Vec<char> = machine.inputs().universe().collect();
    (1..=MAX_SEQUENCE_LENGTH).flat_map(move |len| {
        std::iter::repeat(symbols.clone())
            .take(len)
            .multi_cartesian_product()
            .map(|seq| seq.into_iter().collect::<String>())
    })
}

/// Finds, for every unordered pair of distinct states, the shortest input
/// sequence on which the two states produce different output tuples. The
/// machine must be complete.
pub fn separating_sequences(machine: &MealyMachine) -> Map<(StateId, StateId), String> {
    let mut separating = Map::default();
    let states = machine.states();

    for (i, &s1) in states.iter().enumerate() {
        for &s2 in &states[i + 1..] {
            for seq in candidate_sequences(machine) {
                let (_, out1) = machine
                    .run(s1, &seq)
                    .expect("the machine under identification is complete");
                let (_, out2) = machine
                    .run(s2, &seq)
                    .expect("the machine under identification is complete");
                if out1 != out2 {
                    separating.insert((s1, s2), seq);
                    break;
                }
            }
        }
    }

    separating
}

/// Computes the harmonised state identifiers: the single separating sequence
/// chosen for each state pair is shared into both members' identifier sets, so
/// its separating power is reused across all states that need to distinguish
/// themselves from a common neighbor.
pub fn harmonised_state_identifiers(machine: &MealyMachine) -> Map<StateId, BTreeSet<String>> {
    let mut identifiers: Map<StateId, BTreeSet<String>> = machine
        .states()
        .iter()
        .map(|&q| (q, BTreeSet::new()))
        .collect();

    for ((s1, s2), seq) in separating_sequences(machine) {
        identifiers
            .get_mut(&s1)
            .expect("identifier sets cover all states")
            .insert(seq.clone());
        identifiers
            .get_mut(&s2)
            .expect("identifier sets cover all states")
            .insert(seq);
    }

    identifiers
}

/// BFS shortest input sequence from the initial state to every state. The
/// initial state is covered by the empty sequence.
pub fn state_cover(machine: &MealyMachine) -> Map<StateId, String> {
    let mut cover = Map::default();
    cover.insert(machine.initial(), String::new());
    let mut queue = VecDeque::from([machine.initial()]);

    while let Some(state) = queue.pop_front() {
        let prefix = cover[&state].clone();
        for t in machine.transitions_from(state) {
            if !cover.contains_key(&t.target) {
                let mut path = prefix.clone();
                path.push(t.symbol);
                cover.insert(t.target, path);
                queue.push_back(t.target);
            }
        }
    }

    cover
}

/// Every state's cover sequence extended by each of its outgoing transitions'
/// triggering symbols. Collectively exercises every transition at least once.
pub fn transition_cover(machine: &MealyMachine) -> BTreeSet<String> {
    let cover = state_cover(machine);
    let mut sequences = BTreeSet::new();

    for &state in machine.states() {
        let Some(prefix) = cover.get(&state) else {
            continue;
        };
        for t in machine.transitions_from(state) {
            let mut seq = prefix.clone();
            seq.push(t.symbol);
            sequences.insert(seq);
        }
    }

    sequences
}

/// Assembles the HSI test suite: every transition cover sequence, extended by
/// each harmonised identifier of the state it reaches, keyed to the output
/// tuple the machine produces on the full sequence. Keys that are a strict
/// prefix of another key are dropped as subsumed.
pub fn hsi_suite(machine: &MealyMachine) -> HsiSuite {
    let identifiers = harmonised_state_identifiers(machine);
    let mut suite = HsiSuite::default();

    for seq in transition_cover(machine) {
        let (reached, _) = machine
            .run(machine.initial(), &seq)
            .expect("cover sequences only use alphabet symbols");
        let Some(ids) = identifiers.get(&reached) else {
            continue;
        };
        for identifier in ids {
            let full = format!("{seq}{identifier}");
            let (_, outputs) = machine
                .run(machine.initial(), &full)
                .expect("suite sequences only use alphabet symbols");
            suite.insert(full, outputs);
        }
    }

    let keys: Vec<String> = suite.keys().cloned().collect();
    for key in &keys {
        if keys
            .iter()
            .any(|other| other.len() > key.len() && other.starts_with(key.as_str()))
        {
            suite.remove(key);
        }
    }

    trace!(entries = suite.len(), "assembled HSI suite");
    suite
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::{MachineBuilder, MealyMachine};
    use lazy_static::lazy_static;

    lazy_static! {
        static ref MACHINE: MealyMachine = MachineBuilder::default()
            .with_transitions([
                (0, 'a', 'x', 1),
                (0, 'b', 'x', 0),
                (1, 'a', 'x', 1),
                (1, 'b', 'y', 2),
                (2, 'a', 'z', 0),
                (2, 'b', 'x', 2),
            ])
            .into_machine(0);
    }

    #[test]
    fn state_cover_finds_shortest_paths() {
        let cover = state_cover(&MACHINE);
        assert_eq!(cover[&0], "");
        assert_eq!(cover[&1], "a");
        assert_eq!(cover[&2], "ab");
    }

    #[test]
    fn transition_cover_extends_state_cover() {
        let cover = transition_cover(&MACHINE);
        let expected: BTreeSet<String> = ["a", "b", "aa", "ab", "aba", "abb"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(cover, expected);
    }

    #[test]
    fn shortest_separating_sequences_are_found() {
        let separating = separating_sequences(&MACHINE);
        assert_eq!(separating[&(0, 1)], "b");
        assert_eq!(separating[&(0, 2)], "a");
        assert_eq!(separating[&(1, 2)], "a");
    }

    #[test]
    fn identifiers_are_harmonised_across_pairs() {
        let identifiers = harmonised_state_identifiers(&MACHINE);
        assert_eq!(
            identifiers[&0],
            BTreeSet::from(["a".to_string(), "b".to_string()])
        );
        assert_eq!(identifiers[&2], BTreeSet::from(["a".to_string()]));
    }

    #[test]
    fn suite_is_prefix_free() {
        let suite = hsi_suite(&MACHINE);
        assert_eq!(suite.len(), 7);
        assert!(suite.contains_key("abba"));
        assert!(!suite.contains_key("ab"));
        for key in suite.keys() {
            assert!(!suite
                .keys()
                .any(|other| other.len() > key.len() && other.starts_with(key.as_str())));
        }
    }

    #[test_log::test]
    fn suite_round_trips_on_the_original_machine() {
        let suite = hsi_suite(&MACHINE);
        for (seq, outputs) in &suite {
            let (_, produced) = MACHINE.run(MACHINE.initial(), seq).unwrap();
            assert_eq!(&produced, outputs);
        }
    }

    #[test]
    fn suite_round_trips_on_generated_machines() {
        let mut rng = fastrand::Rng::with_seed(0xABCD);
        let machine = crate::generate::generate_machine_at_least(6, 3, 2, 2, &mut rng).unwrap();
        let suite = hsi_suite(&machine);
        assert!(!suite.is_empty());
        for (seq, outputs) in &suite {
            let (_, produced) = machine.run(machine.initial(), seq).unwrap();
            assert_eq!(&produced, outputs);
        }
    }
}
