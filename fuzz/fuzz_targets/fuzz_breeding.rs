#![no_main]

//! Breeding fuzzer.
//!
//! Grows two random genomes and breeds them for a few generations, checking
//! that every child validates, consolidates to itself and executes without
//! any error other than a domain error.

use std::sync::Arc;

use arbitrary::Arbitrary;
use cellgp::{Cell, ExecError, GeneticOperator, OperatorConfig, PrimitiveSet, ProgramShape, Value, ValueType};
use libfuzzer_sys::fuzz_target;
use rand::rngs::SmallRng;
use rand::SeedableRng;

/// Structured input for breeding.
#[derive(Arbitrary, Debug)]
struct BreedingInput {
    /// RNG seed.
    seed: u64,
    /// Number of generations.
    generations: u8,
    /// Main program arity.
    arity: u8,
    /// Inputs fed to every child.
    inputs: [f64; 4],
    /// Records of collection 0.
    records: Vec<(f64, bool)>,
}

fuzz_target!(|input: BreedingInput| {
    // Cap values to avoid excessive runtime
    let generations = input.generations % 16;
    let arity = usize::from(input.arity % 4);
    let records: Vec<Vec<Value>> = input
        .records
        .iter()
        .take(8)
        .map(|(x, b)| vec![Value::Real(*x), Value::Boolean(*b)])
        .collect();

    let mut config = OperatorConfig::default();
    config.architecture.collections = vec![vec![ValueType::Real, ValueType::Boolean]];
    let op = Arc::new(GeneticOperator::new(PrimitiveSet::standard(), config).unwrap());
    let shapes = [ProgramShape::new(vec![ValueType::Real; arity], ValueType::Real)];
    let args: Vec<Value> = input.inputs[..arity].iter().map(|x| Value::Real(*x)).collect();

    let mut rng = SmallRng::seed_from_u64(input.seed);
    let (Ok(mut a), Ok(mut b)) = (op.initialize(&shapes, &mut rng), op.initialize(&shapes, &mut rng)) else {
        panic!("initialization failed for seed {}", input.seed);
    };

    for _ in 0..generations {
        let child = match op.breed(&a, &b, &mut rng) {
            Ok(child) => child,
            Err(e) => panic!("breeding failed: {e}"),
        };
        assert!(child.validate().is_ok());

        let rendered = child.to_string();
        let mut again = child.clone();
        assert!(again.consolidate().is_ok());
        assert_eq!(again.to_string(), rendered);

        let mut cell = Cell::new(child.clone());
        if let Err(e) = cell.execute(0, &args, std::slice::from_ref(&records)) {
            assert!(matches!(e, ExecError::Domain(_)), "valid genome failed: {e}");
        }
        a = std::mem::replace(&mut b, child);
    }
});
