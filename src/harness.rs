use std::time::{Duration, Instant};

use owo_colors::OwoColorize;
use tabled::{settings::Style, Table, Tabled};
use tracing::debug;

use crate::{
    generate::{generate_machine_at_least, GenerateError},
    hsi::hsi_suite,
    machine::MachineError,
    mutate::Mutator,
    walk::{detected_fault, WalkKind, Walker},
};

/// Construction parameters for a single experiment run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunConfig {
    /// Number of states to request from the generator.
    pub num_states: usize,
    /// Number of input symbols.
    pub num_inputs: usize,
    /// Number of output symbols.
    pub num_outputs: usize,
    /// Transition coverage percentage at which walks stop.
    pub target_coverage: f64,
}

/// One row of experiment output, suitable for tabular persistence by external
/// sinks. Walk length and fault index use `-1` for "aborted" and "not found".
#[derive(Debug, Clone, PartialEq, Tabled)]
pub struct RunRecord {
    /// State count of the generated machine, after minimization.
    #[tabled(rename = "states")]
    pub state_size: usize,
    /// Input alphabet size.
    #[tabled(rename = "inputs")]
    pub input_size: usize,
    /// Output alphabet size.
    #[tabled(rename = "outputs")]
    pub output_size: usize,
    /// The coverage target the walk was asked to reach.
    #[tabled(rename = "coverage %")]
    pub target_coverage: f64,
    /// Number of entries in the HSI suite of the original machine.
    #[tabled(rename = "suite")]
    pub hsi_suite_len: usize,
    /// Strategy the walk followed.
    #[tabled(rename = "walk")]
    pub walk_kind: WalkKind,
    /// Number of executed steps, or `-1` if the walk aborted.
    #[tabled(rename = "length")]
    pub walk_length: i64,
    /// 1-based index of the first output divergence, or `-1` if none was found.
    #[tabled(rename = "fault", display_with = "display_fault")]
    pub detected_fault_index: i64,
    /// Wall-clock time the walk took.
    #[tabled(rename = "time", display_with = "display_duration")]
    pub time_taken: Duration,
}

fn display_fault(index: &i64) -> String {
    if *index < 0 {
        "-".to_string()
    } else {
        index.green().to_string()
    }
}

fn display_duration(duration: &Duration) -> String {
    format!("{:.2?}", duration)
}

/// Errors a run can surface. Everything else (generation retries, mutation
/// rollbacks, walk aborts) is internal control flow reported as data.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The run configuration was rejected by the generator.
    #[error(transparent)]
    Generate(#[from] GenerateError),
    /// A trace could not be replayed on the original machine.
    #[error(transparent)]
    Machine(#[from] MachineError),
}

/// Executes the full pipeline once — generate, build the HSI suite, mutate,
/// then perform every walk kind on the mutated machine — and returns one record
/// per walk. Machines that minimize down to a single state are redrawn, since
/// they cannot carry a meaningful fault.
pub fn run_all_walks(
    config: &RunConfig,
    rng: &mut fastrand::Rng,
) -> Result<Vec<RunRecord>, RunError> {
    let machine = generate_machine_at_least(
        config.num_states,
        config.num_inputs,
        config.num_outputs,
        2,
        rng,
    )?;
    let suite = hsi_suite(&machine);
    let mutated = Mutator::new(&machine, rng).create_mutated();
    let walker = Walker::new(&machine, &mutated.machine, config.target_coverage, &suite);

    let mut records = Vec::with_capacity(WalkKind::all().len());
    for kind in WalkKind::all() {
        let start = Instant::now();
        let walk = walker.walk(kind, rng);
        let time_taken = start.elapsed();

        let fault = match &walk {
            Some(trace) => detected_fault(&machine, trace)?,
            None => None,
        };
        debug!(
            %kind,
            length = walk.as_ref().map(|w| w.len()),
            micros = time_taken.as_micros() as u64,
            "walk finished"
        );

        records.push(RunRecord {
            state_size: machine.size(),
            input_size: config.num_inputs,
            output_size: config.num_outputs,
            target_coverage: config.target_coverage,
            hsi_suite_len: suite.len(),
            walk_kind: kind,
            walk_length: walk.as_ref().map_or(-1, |w| w.len() as i64),
            detected_fault_index: fault.map_or(-1, |index| index as i64),
            time_taken,
        });
    }

    Ok(records)
}

/// How the input alphabet size of an experiment configuration is derived from
/// its state count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputScale {
    /// A fixed input count, independent of the state count.
    Fixed(usize),
    /// The state count scaled by a factor (e.g. `Ratio(0.5)` for `n/2` inputs).
    Ratio(f64),
}

impl InputScale {
    fn apply(&self, num_states: usize) -> usize {
        match self {
            InputScale::Fixed(count) => *count,
            InputScale::Ratio(factor) => (num_states as f64 * factor) as usize,
        }
        // the generator's input alphabet holds at most 26 symbols
        .clamp(1, 26)
    }
}

/// The cross product of experiment configurations external drivers iterate:
/// every state size, input scaling, coverage target, repeated `repeats` times.
pub fn task_grid(
    state_sizes: &[usize],
    input_scales: &[InputScale],
    num_outputs: usize,
    coverages: &[f64],
    repeats: usize,
) -> Vec<RunConfig> {
    let mut tasks = Vec::new();
    for &num_states in state_sizes {
        for scale in input_scales {
            let num_inputs = scale.apply(num_states);
            for _ in 0..repeats {
                for &target_coverage in coverages {
                    tasks.push(RunConfig {
                        num_states,
                        num_inputs,
                        num_outputs,
                        target_coverage,
                    });
                }
            }
        }
    }
    tasks
}

/// Renders records as a terminal table.
pub fn render_records(records: &[RunRecord]) -> String {
    Table::new(records).with(Style::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn pipeline_produces_one_record_per_walk_kind() {
        let config = RunConfig {
            num_states: 5,
            num_inputs: 3,
            num_outputs: 2,
            target_coverage: 80.0,
        };
        let mut rng = fastrand::Rng::with_seed(0xFEED);
        let records = run_all_walks(&config, &mut rng).unwrap();

        assert_eq!(records.len(), 4);
        let kinds: Vec<WalkKind> = records.iter().map(|r| r.walk_kind).collect();
        assert_eq!(kinds, WalkKind::all());
        for record in &records {
            assert!(record.state_size >= 2);
            assert!(record.walk_length >= -1);
            assert!(record.walk_length != 0);
            assert!(record.detected_fault_index >= -1);
        }
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let config = RunConfig {
            num_states: 0,
            num_inputs: 2,
            num_outputs: 2,
            target_coverage: 80.0,
        };
        let mut rng = fastrand::Rng::with_seed(1);
        assert!(matches!(
            run_all_walks(&config, &mut rng),
            Err(RunError::Generate(GenerateError::NoStates))
        ));
    }

    #[test]
    fn grid_covers_the_configuration_space() {
        let grid = task_grid(
            &[5, 10],
            &[InputScale::Fixed(2), InputScale::Ratio(0.5)],
            2,
            &[80.0, 95.0],
            3,
        );
        assert_eq!(grid.len(), 2 * 2 * 2 * 3);
        assert!(grid.iter().all(|c| c.num_inputs >= 1));
    }

    #[test]
    fn records_render_as_a_table() {
        let record = RunRecord {
            state_size: 5,
            input_size: 3,
            output_size: 2,
            target_coverage: 80.0,
            hsi_suite_len: 12,
            walk_kind: WalkKind::Random,
            walk_length: 42,
            detected_fault_index: -1,
            time_taken: Duration::from_micros(1500),
        };
        let table = render_records(&[record]);
        assert!(table.contains("states"));
        assert!(table.contains("random"));
        assert!(table.contains('-'));
    }
}
