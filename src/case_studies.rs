//! Hand-built reference machines taken from the conformance-testing
//! literature. Useful as fixtures for the identification algorithms and as
//! realistic targets for experiment drivers.

use crate::machine::{MachineBuilder, MealyMachine};

/// A coffee machine with six states over the inputs clean (`C`), button (`B`),
/// pod (`P`), water (`W`) and reset (`R`).
///
/// Derived from M. Merten, "Active automata learning for real life
/// applications", doi: 10.17877/DE290R-5169.
pub fn coffee_machine() -> MealyMachine {
    MachineBuilder::default()
        .with_transitions([
            (0, 'C', 't', 0),
            (0, 'B', 'f', 5),
            (0, 'P', 't', 1),
            (0, 'W', 't', 2),
            (1, 'P', 't', 1),
            (1, 'C', 't', 0),
            (1, 'B', 'f', 5),
            (1, 'W', 't', 3),
            (3, 'C', 't', 0),
            (3, 'B', 'c', 4),
            (4, 'C', 't', 0),
            (2, 'C', 't', 0),
            (3, 'W', 't', 3),
            (3, 'P', 't', 3),
            (2, 'W', 't', 2),
            (2, 'P', 't', 3),
            (4, 'B', 'f', 5),
            (4, 'P', 'f', 5),
            (4, 'W', 'f', 5),
            (2, 'B', 'f', 5),
            (5, 'C', 'f', 5),
            (5, 'B', 'f', 5),
            (5, 'P', 'f', 5),
            (5, 'W', 'f', 5),
            (5, 'R', 't', 0),
        ])
        .into_machine(0)
}

/// A simple localisation system with three states over the compass direction
/// inputs `N`, `E`, `S`, `W`.
///
/// Derived from S. Plambeck, J. Schyga, J. Hinckeldeyn, J. Kreutzfeldt, and
/// G. Fey, "Automata Learning for Automated Test Generation of Real Time
/// Localization Systems", doi: 10.48550/arXiv.2105.11911.
pub fn localisation_system() -> MealyMachine {
    MachineBuilder::default()
        .with_transitions([
            (0, 'N', 'a', 0),
            (0, 'W', 'a', 0),
            (0, 'S', 'b', 1),
            (1, 'S', 'a', 0),
            (1, 'N', 'a', 0),
            (1, 'E', 'b', 2),
            (2, 'E', 'a', 1),
            (2, 'N', 'a', 2),
            (2, 'S', 'a', 0),
            (0, 'E', 'a', 2),
        ])
        .into_machine(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coffee_machine_shape() {
        let machine = coffee_machine();
        assert_eq!(machine.size(), 6);
        assert_eq!(machine.inputs().size(), 5);
        assert_eq!(machine.outputs().size(), 3);
        assert!(machine.is_deterministic());
        assert!(machine.is_strongly_connected());
        // the reset input only exists in the error state, the machine is not complete
        assert!(!machine.is_complete());
    }

    #[test]
    fn coffee_machine_brews() {
        let machine = coffee_machine();
        // pod, water, button: the machine dispenses coffee
        assert_eq!(machine.run(0, "PWB"), Ok((4, vec!['t', 't', 'c'])));
    }

    #[test]
    fn localisation_system_shape() {
        let machine = localisation_system();
        assert_eq!(machine.size(), 3);
        assert!(machine.is_deterministic());
        assert!(machine.is_strongly_connected());
    }

    #[test]
    fn localisation_system_round_trip() {
        let machine = localisation_system();
        assert_eq!(machine.run(0, "SE"), Ok((2, vec!['b', 'b'])));
    }
}
