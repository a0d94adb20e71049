#![no_main]

//! Configuration fuzzer.
//!
//! Arbitrary JSON must either be rejected or yield a configuration under
//! which a genome can be grown and bred.

use std::sync::Arc;

use cellgp::{GeneticOperator, OperatorConfig, PrimitiveSet, ProgramShape, ValueType};
use libfuzzer_sys::fuzz_target;
use rand::rngs::SmallRng;
use rand::SeedableRng;

fuzz_target!(|data: &[u8]| {
    let Ok(json) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(config) = OperatorConfig::from_json(json) else {
        return;
    };

    // Skip configurations that are valid but too large to run quickly
    let arch = &config.architecture;
    if config.limits.max_size > 256 || arch.initial_modules > 8 || arch.max_arguments > 8 || arch.storage_size > 64 {
        return;
    }

    let Ok(op) = GeneticOperator::new(PrimitiveSet::standard(), config) else {
        return;
    };
    let op = Arc::new(op);
    let shapes = [ProgramShape::new(vec![ValueType::Real], ValueType::Real)];
    let mut rng = SmallRng::seed_from_u64(0);
    if let (Ok(a), Ok(b)) = (op.initialize(&shapes, &mut rng), op.initialize(&shapes, &mut rng)) {
        let _ = op.breed(&a, &b, &mut rng);
    }
});
