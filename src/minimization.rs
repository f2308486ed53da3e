use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use tracing::trace;

use crate::{
    machine::{MealyMachine, StateId},
    math::{Map, Partition},
};

/// Computes the partition of states into output-equivalence classes by iterated
/// refinement. The starting point groups states by the sorted multiset of
/// `(symbol, output)` labels on their outgoing transitions (1-equivalence); each
/// round additionally requires that matching symbols lead into the same current
/// class, until the partition stabilizes.
pub fn refine_partition(machine: &MealyMachine) -> Partition<StateId> {
    let mut groups: BTreeMap<Vec<(char, char)>, BTreeSet<StateId>> = BTreeMap::new();
    for &state in machine.states() {
        let signature = machine
            .transitions_from(state)
            .map(|t| (t.symbol, t.output))
            .sorted()
            .collect::<Vec<_>>();
        groups.entry(signature).or_default().insert(state);
    }
    let mut classes: Vec<BTreeSet<StateId>> = groups.into_values().collect();

    loop {
        let index: Map<StateId, usize> = classes
            .iter()
            .enumerate()
            .flat_map(|(i, class)| class.iter().map(move |&state| (state, i)))
            .collect();

        let mut refined: BTreeMap<Vec<(char, char, usize)>, BTreeSet<StateId>> = BTreeMap::new();
        for &state in machine.states() {
            let signature = machine
                .transitions_from(state)
                .map(|t| (t.symbol, t.output, index[&t.target]))
                .sorted()
                .collect::<Vec<_>>();
            refined.entry(signature).or_default().insert(state);
        }

        // refinement only ever splits classes, so an unchanged count means a fixed point
        if refined.len() == classes.len() {
            break;
        }
        classes = refined.into_values().collect();
    }

    Partition::from(classes)
}

/// Merges every equivalence class of size greater than one into a single
/// representative state, rewriting all transition endpoints and dropping the
/// redundant states. The initial state is always kept as representative of its
/// own class. Exact duplicate transition records arising from merges are removed.
pub fn quotient(machine: &mut MealyMachine) {
    let partition = refine_partition(machine);
    let initial = machine.initial();

    for class in partition.iter().filter(|class| class.len() > 1) {
        let representative = if class.contains(&initial) {
            initial
        } else {
            *class.iter().next().expect("classes are non-empty")
        };

        for &state in class.iter().filter(|&&q| q != representative) {
            trace!(state, representative, "merging equivalent state");
            for t in machine.transitions_mut().iter_mut() {
                if t.source == state {
                    t.source = representative;
                }
                if t.target == state {
                    t.target = representative;
                }
            }
            machine.states_mut().retain(|&q| q != state);
        }
    }

    machine.dedup_transitions();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::MachineBuilder;

    fn machine_with_twins() -> MealyMachine {
        // states 1 and 2 behave identically under every input sequence
        MachineBuilder::default()
            .with_transitions([
                (0, 'a', 'x', 1),
                (0, 'b', 'x', 2),
                (1, 'a', 'y', 0),
                (1, 'b', 'x', 1),
                (2, 'a', 'y', 0),
                (2, 'b', 'x', 2),
            ])
            .into_machine(0)
    }

    #[test]
    fn refinement_groups_equivalent_states() {
        let machine = machine_with_twins();
        let partition = refine_partition(&machine);
        assert_eq!(partition.size(), 2);
        assert_eq!(partition.class_of(&1), partition.class_of(&2));
        assert_ne!(partition.class_of(&0), partition.class_of(&1));
    }

    #[test]
    fn quotient_merges_twins() {
        let mut machine = machine_with_twins();
        quotient(&mut machine);
        assert_eq!(machine.size(), 2);
        assert_eq!(machine.initial(), 0);
        assert!(machine.is_complete());
        assert!(machine.is_deterministic());
        assert!(machine.is_minimal());
        assert!(!machine.has_duplicate_transitions());
    }

    #[test]
    fn minimal_machine_is_left_alone() {
        let mut machine = MachineBuilder::default()
            .with_transitions([
                (0, 'a', 'x', 1),
                (0, 'b', 'x', 0),
                (1, 'a', 'x', 1),
                (1, 'b', 'y', 0),
            ])
            .into_machine(0);
        let before = machine.clone();
        quotient(&mut machine);
        assert_eq!(machine, before);
        assert!(machine.is_minimal());
    }
}
