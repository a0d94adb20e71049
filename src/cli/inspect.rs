//! Inspect command implementation.

use super::CliError;
use cellgp::value::{Value, ValueType};
use cellgp::{Cell, OperatorConfig, ProgramShape};
use rand::rngs::SmallRng;
use rand::SeedableRng;

/// Records per generated collection.
const MAX_RECORDS: usize = 4;

/// Execute the inspect command: build a random genome whose main program
/// takes one real per input, print it and run it once.
///
/// # Errors
///
/// Returns an error if the genome cannot be generated or does not run.
pub(crate) fn execute(config: OperatorConfig, seed: Option<u64>, inputs: &[f64]) -> Result<(), CliError> {
    let seed = super::resolve_seed(seed);
    let mut rng = SmallRng::seed_from_u64(seed);
    let operator = super::operator(config)?;

    let shape = ProgramShape::new(vec![ValueType::Real; inputs.len()], ValueType::Real);
    let nucleus = operator.initialize(&[shape], &mut rng)?;

    println!("Genome (seed: {seed}, size: {}, depth: {})", nucleus.total_size(), nucleus.max_depth());
    println!("{nucleus}");
    println!();

    let collections = super::random_collections(&operator.config().architecture.collections, MAX_RECORDS, &mut rng);
    let args: Vec<Value> = inputs.iter().copied().map(Value::Real).collect();
    let mut cell = Cell::new(nucleus);
    let outcome = cell
        .execute(0, &args, &collections)
        .map_err(|e| CliError::new(format!("Execution failed: {e}")))?;
    println!("Result: {} (cost {})", outcome.value, outcome.cost);

    Ok(())
}
