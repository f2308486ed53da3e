use std::{collections::BTreeSet, fmt};

use itertools::Itertools;

use crate::math::Set;

/// States are identified by plain indices. Ids of a machine need not be dense,
/// as mutation allocates fresh ids past the maximum and may remove old ones.
pub type StateId = usize;

/// An ordered collection of `char` symbols, used both as input and as output
/// alphabet of a [`MealyMachine`].
#[derive(Clone, Hash, PartialEq, Eq, Debug, PartialOrd, Ord)]
pub struct Alphabet(Vec<char>);

impl Alphabet {
    /// Creates an alphabet of the given size consisting of the first `size`
    /// lowercase letters, i.e. 'a' to 'z'.
    pub fn of_size(size: usize) -> Self {
        assert!(size <= 26, "alphabet is too large");
        Self((0..size).map(|i| (b'a' + i as u8) as char).collect())
    }

    /// Creates an alphabet of the given size consisting of the digits '0' to '9'.
    /// Used for the output labels of generated machines.
    pub fn numeric(size: usize) -> Self {
        assert!(size <= 10, "numeric alphabet is too large");
        Self((0..size).map(|i| (b'0' + i as u8) as char).collect())
    }

    /// Creates an alphabet from an iterator over symbols. Symbols are deduplicated
    /// and sorted.
    pub fn new<I: IntoIterator<Item = char>>(symbols: I) -> Self {
        Self(symbols.into_iter().unique().sorted().collect())
    }

    /// The number of symbols in the alphabet.
    pub fn size(&self) -> usize {
        self.0.len()
    }

    /// Whether `sym` is part of the alphabet.
    pub fn contains(&self, sym: char) -> bool {
        self.0.contains(&sym)
    }

    /// Returns an iterator over all symbols of the alphabet, in order.
    pub fn universe(&self) -> impl Iterator<Item = char> + '_ {
        self.0.iter().copied()
    }

    pub(crate) fn choose(&self, rng: &mut fastrand::Rng) -> char {
        self.0[rng.usize(..self.0.len())]
    }
}

impl std::ops::Index<usize> for Alphabet {
    type Output = char;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl FromIterator<char> for Alphabet {
    fn from_iter<T: IntoIterator<Item = char>>(iter: T) -> Self {
        Self::new(iter)
    }
}

/// A single transition record. The triggering input and the emitted output are
/// separate typed fields rather than a composite label.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Transition {
    /// State the transition originates in.
    pub source: StateId,
    /// Input symbol that triggers the transition.
    pub symbol: char,
    /// Output symbol emitted when the transition is taken.
    pub output: char,
    /// State the transition leads to.
    pub target: StateId,
}

impl Transition {
    /// Whether source and target coincide.
    pub fn is_loop(&self) -> bool {
        self.source == self.target
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} --{}/{}--> {}",
            self.source, self.symbol, self.output, self.target
        )
    }
}

/// Errors that arise from querying a [`MealyMachine`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MachineError {
    /// No transition exists for the given state and input symbol.
    #[error("no transition from state {state} on symbol '{symbol}'")]
    MissingTransition {
        /// State the lookup started from.
        state: StateId,
        /// Symbol that has no outgoing transition.
        symbol: char,
    },
    /// The symbol is not part of the machine's input alphabet.
    #[error("symbol '{0}' is not part of the input alphabet")]
    ForeignSymbol(char),
}

/// A deterministic Mealy machine: a finite set of states over an input and an
/// output alphabet, connected by [`Transition`]s. The first state in the state
/// list is the designated initial state.
///
/// The type is a pure query surface. It never stores a "current state"; walks
/// thread their position through their own loop instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MealyMachine {
    inputs: Alphabet,
    outputs: Alphabet,
    states: Vec<StateId>,
    transitions: Vec<Transition>,
}

impl MealyMachine {
    /// Assembles a machine from its parts. The first element of `states` is the
    /// initial state.
    pub fn new(
        inputs: Alphabet,
        outputs: Alphabet,
        states: Vec<StateId>,
        transitions: Vec<Transition>,
    ) -> Self {
        assert!(!states.is_empty(), "a machine must have at least one state");
        Self {
            inputs,
            outputs,
            states,
            transitions,
        }
    }

    /// The designated initial state.
    pub fn initial(&self) -> StateId {
        self.states[0]
    }

    /// The number of states.
    pub fn size(&self) -> usize {
        self.states.len()
    }

    /// All live states, initial state first.
    pub fn states(&self) -> &[StateId] {
        &self.states
    }

    /// Whether `state` is part of the machine.
    pub fn contains_state(&self, state: StateId) -> bool {
        self.states.contains(&state)
    }

    /// The input alphabet.
    pub fn inputs(&self) -> &Alphabet {
        &self.inputs
    }

    /// The output alphabet.
    pub fn outputs(&self) -> &Alphabet {
        &self.outputs
    }

    /// All transition records, in insertion order.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Iterates over the transitions originating in `state`.
    pub fn transitions_from(&self, state: StateId) -> impl Iterator<Item = &Transition> + '_ {
        self.transitions.iter().filter(move |t| t.source == state)
    }

    /// Iterates over the transitions leading into `state`.
    pub fn transitions_into(&self, state: StateId) -> impl Iterator<Item = &Transition> + '_ {
        self.transitions.iter().filter(move |t| t.target == state)
    }

    /// Iterates over the transitions from `source` to `target`.
    pub fn transitions_between(
        &self,
        source: StateId,
        target: StateId,
    ) -> impl Iterator<Item = &Transition> + '_ {
        self.transitions
            .iter()
            .filter(move |t| t.source == source && t.target == target)
    }

    /// The sorted list of input symbols that trigger an outgoing transition of `state`.
    pub fn triggers(&self, state: StateId) -> Vec<char> {
        self.transitions_from(state)
            .map(|t| t.symbol)
            .sorted()
            .collect()
    }

    /// Resolves the target state and emitted output for taking `symbol` in `state`.
    pub fn successor(&self, state: StateId, symbol: char) -> Result<(StateId, char), MachineError> {
        self.transitions_from(state)
            .find(|t| t.symbol == symbol)
            .map(|t| (t.target, t.output))
            .ok_or(MachineError::MissingTransition { state, symbol })
    }

    /// Applies the input sequence `word` starting in `from`, returning the state that
    /// is reached and the sequence of emitted outputs. Every consumed symbol must
    /// have a matching transition; none is ever silently skipped.
    pub fn run(&self, from: StateId, word: &str) -> Result<(StateId, Vec<char>), MachineError> {
        let mut current = from;
        let mut outputs = Vec::with_capacity(word.len());
        for symbol in word.chars() {
            if !self.inputs.contains(symbol) {
                return Err(MachineError::ForeignSymbol(symbol));
            }
            let (target, output) = self.successor(current, symbol)?;
            outputs.push(output);
            current = target;
        }
        Ok((current, outputs))
    }

    /// The set of states reachable from `from`, including `from` itself.
    pub fn reachable_from(&self, from: StateId) -> Set<StateId> {
        reachable_set(&self.transitions, from)
    }

    /// Whether `target` can be reached from `source` by some transition sequence.
    pub fn can_reach(&self, source: StateId, target: StateId) -> bool {
        self.reachable_from(source).contains(&target)
    }

    /// Whether every state can reach every other state.
    pub fn is_strongly_connected(&self) -> bool {
        self.states
            .iter()
            .all(|&q| self.reachable_from(q).len() == self.size())
    }

    /// Whether every state has an outgoing transition for every input symbol.
    pub fn is_complete(&self) -> bool {
        self.states.iter().all(|&q| {
            self.inputs
                .universe()
                .all(|sym| self.transitions_from(q).any(|t| t.symbol == sym))
        })
    }

    /// Whether no state has two outgoing transitions on the same input symbol.
    pub fn is_deterministic(&self) -> bool {
        self.states.iter().all(|&q| {
            self.transitions_from(q)
                .map(|t| t.symbol)
                .duplicates()
                .next()
                .is_none()
        })
    }

    /// Whether two transition records coincide exactly.
    pub fn has_duplicate_transitions(&self) -> bool {
        self.transitions.iter().duplicates().next().is_some()
    }

    /// Whether no two distinct states are output-equivalent under all input sequences.
    pub fn is_minimal(&self) -> bool {
        crate::minimization::refine_partition(self).is_discrete()
    }

    pub(crate) fn states_mut(&mut self) -> &mut Vec<StateId> {
        &mut self.states
    }

    pub(crate) fn transitions_mut(&mut self) -> &mut Vec<Transition> {
        &mut self.transitions
    }

    /// Removes transition records that are exact duplicates of an earlier one.
    pub(crate) fn dedup_transitions(&mut self) {
        let mut seen = Set::default();
        self.transitions.retain(|t| seen.insert(*t));
    }
}

/// Stack-based reachability search over a raw transition list. Also used while the
/// generator repairs connectivity, before a machine value exists.
pub(crate) fn reachable_set(transitions: &[Transition], from: StateId) -> Set<StateId> {
    let mut reachable = Set::default();
    reachable.insert(from);
    let mut stack = vec![from];
    while let Some(current) = stack.pop() {
        for t in transitions.iter().filter(|t| t.source == current) {
            if reachable.insert(t.target) {
                stack.push(t.target);
            }
        }
    }
    reachable
}

impl fmt::Display for MealyMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = tabled::builder::Builder::default();
        let mut header = vec!["state".to_string()];
        header.extend(self.inputs.universe().map(|sym| sym.to_string()));
        builder.push_record(header);

        for &state in &self.states {
            let mut row = vec![state.to_string()];
            for sym in self.inputs.universe() {
                row.push(match self.successor(state, sym) {
                    Ok((target, output)) => format!("{output}/{target}"),
                    Err(_) => "-".to_string(),
                });
            }
            builder.push_record(row);
        }

        write!(f, "{}", builder.build())
    }
}

/// Helper for assembling machines transition by transition, mainly used by tests
/// and the case studies. Alphabets default to the symbols appearing on the given
/// transitions and can be extended explicitly.
#[derive(Default)]
pub struct MachineBuilder {
    input_symbols: BTreeSet<char>,
    output_symbols: BTreeSet<char>,
    transitions: Vec<Transition>,
}

impl MachineBuilder {
    /// Adds transitions given as `(source, symbol, output, target)` tuples.
    pub fn with_transitions<I>(mut self, iter: I) -> Self
    where
        I: IntoIterator<Item = (StateId, char, char, StateId)>,
    {
        self.transitions
            .extend(iter.into_iter().map(|(source, symbol, output, target)| {
                Transition {
                    source,
                    symbol,
                    output,
                    target,
                }
            }));
        self
    }

    /// Forces additional input symbols to be part of the alphabet, beyond the ones
    /// appearing on transitions.
    pub fn with_input_symbols<I: IntoIterator<Item = char>>(mut self, symbols: I) -> Self {
        self.input_symbols.extend(symbols);
        self
    }

    /// Forces additional output symbols to be part of the output alphabet.
    pub fn with_output_symbols<I: IntoIterator<Item = char>>(mut self, symbols: I) -> Self {
        self.output_symbols.extend(symbols);
        self
    }

    /// Finalizes the machine with the given initial state.
    pub fn into_machine(self, initial: StateId) -> MealyMachine {
        let inputs = Alphabet::new(
            self.transitions
                .iter()
                .map(|t| t.symbol)
                .chain(self.input_symbols),
        );
        let outputs = Alphabet::new(
            self.transitions
                .iter()
                .map(|t| t.output)
                .chain(self.output_symbols),
        );
        let mut states = vec![initial];
        states.extend(
            self.transitions
                .iter()
                .flat_map(|t| [t.source, t.target])
                .filter(|&q| q != initial)
                .sorted()
                .dedup(),
        );
        MealyMachine::new(inputs, outputs, states, self.transitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_state_machine() -> MealyMachine {
        MachineBuilder::default()
            .with_transitions([
                (0, 'a', 'x', 1),
                (0, 'b', 'x', 0),
                (1, 'a', 'x', 1),
                (1, 'b', 'y', 2),
                (2, 'a', 'z', 0),
                (2, 'b', 'x', 2),
            ])
            .into_machine(0)
    }

    #[test]
    fn builder_assembles_machine() {
        let machine = three_state_machine();
        assert_eq!(machine.size(), 3);
        assert_eq!(machine.initial(), 0);
        assert_eq!(machine.inputs().size(), 2);
        assert_eq!(machine.outputs().size(), 3);
        assert!(machine.is_complete());
        assert!(machine.is_deterministic());
        assert!(machine.is_strongly_connected());
    }

    #[test]
    fn successor_and_run() {
        let machine = three_state_machine();
        assert_eq!(machine.successor(0, 'a'), Ok((1, 'x')));
        assert_eq!(
            machine.run(0, "abab"),
            Ok((1, vec!['x', 'y', 'z', 'x']))
        );
    }

    #[test]
    fn missing_transition_is_a_lookup_error() {
        let machine = MachineBuilder::default()
            .with_transitions([(0, 'a', 'x', 1), (1, 'a', 'x', 0)])
            .with_input_symbols(['b'])
            .into_machine(0);
        assert_eq!(
            machine.successor(0, 'b'),
            Err(MachineError::MissingTransition {
                state: 0,
                symbol: 'b'
            })
        );
    }

    #[test]
    fn foreign_symbol_is_a_value_error() {
        let machine = three_state_machine();
        assert_eq!(
            machine.run(0, "ac"),
            Err(MachineError::ForeignSymbol('c'))
        );
    }

    #[test]
    fn triggers_are_sorted() {
        let machine = MachineBuilder::default()
            .with_transitions([(0, 'b', 'x', 0), (0, 'a', 'x', 0)])
            .into_machine(0);
        assert_eq!(machine.triggers(0), vec!['a', 'b']);
    }

    #[test]
    fn reachability() {
        let machine = MachineBuilder::default()
            .with_transitions([(0, 'a', 'x', 1), (1, 'a', 'x', 1)])
            .into_machine(0);
        assert!(machine.can_reach(0, 1));
        assert!(!machine.can_reach(1, 0));
        assert!(!machine.is_strongly_connected());
    }

    #[test]
    fn transition_table_rendering() {
        let machine = three_state_machine();
        let rendered = machine.to_string();
        assert!(rendered.contains("state"));
        assert!(rendered.contains("x/1"));
    }
}
