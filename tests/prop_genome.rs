//! Property-based tests for genome invariants.
//!
//! These tests breed random genomes and check that type safety, binding
//! and copy independence survive every operator.
//! Run with: cargo test --release prop_genome

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use proptest::prelude::*;
use rand::rngs::SmallRng;
use rand::SeedableRng;

use cellgp::module::ModuleKind;
use cellgp::{Cell, ExecError, GeneticOperator, ModuleKey, Nucleus, OperatorConfig, PrimitiveSet, ProgramShape, Value, ValueType};

fn operator() -> Arc<GeneticOperator> {
    let mut config = OperatorConfig::default();
    config.architecture.collections = vec![vec![ValueType::Real, ValueType::Boolean]];
    config.architecture.initial_modules = 3;
    Arc::new(GeneticOperator::new(PrimitiveSet::standard(), config).unwrap())
}

fn shapes() -> Vec<ProgramShape> {
    vec![
        ProgramShape::new(vec![ValueType::Real, ValueType::Real], ValueType::Real),
        ProgramShape::new(vec![ValueType::Real], ValueType::Boolean),
    ]
}

/// Two random parents and `generations` of offspring, rolling the parents.
fn lineage(seed: u64, generations: usize) -> (Arc<GeneticOperator>, Vec<Nucleus>) {
    let op = operator();
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut a = op.initialize(&shapes(), &mut rng).unwrap();
    let mut b = op.initialize(&shapes(), &mut rng).unwrap();
    let mut children = Vec::with_capacity(generations);
    for _ in 0..generations {
        let child = op.breed(&a, &b, &mut rng).unwrap();
        children.push(child.clone());
        a = std::mem::replace(&mut b, child);
    }
    (op, children)
}

fn collection() -> Vec<Vec<Vec<Value>>> {
    vec![vec![
        vec![Value::Real(0.5), Value::Boolean(true)],
        vec![Value::Real(-2.0), Value::Boolean(false)],
    ]]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Offspring validate, respect the branch limits and keep program
    /// signatures.
    #[test]
    fn prop_offspring_are_well_typed(seed in any::<u64>()) {
        let (op, children) = lineage(seed, 8);
        let limits = op.config().limits;
        for child in &children {
            prop_assert!(child.validate().is_ok());
            prop_assert_eq!(child.programs().len(), 2);
            prop_assert_eq!(child.programs()[0].return_type(), ValueType::Real);
            prop_assert_eq!(child.programs()[1].return_type(), ValueType::Boolean);
            for module in child.all_modules() {
                for branch in module.branches() {
                    prop_assert!(branch.size() <= limits.max_size);
                    prop_assert!(branch.depth() <= limits.max_depth);
                }
            }
            prop_assert!(child.modules(ModuleKind::Function).len() <= op.config().architecture.max_modules);
        }
    }

    /// Execution of a valid genome yields a value of the program type or a
    /// domain error. Exhausted budgets fall back to values, so call depth
    /// never runs out in a strict hierarchy.
    #[test]
    fn prop_execution_is_type_safe(seed in any::<u64>(), x in -10.0f64..10.0) {
        let (_, children) = lineage(seed, 6);
        for child in children {
            let mut cell = Cell::new(child);
            let real = cell.execute(0, &[Value::Real(x), Value::Real(-x)], &collection());
            match real {
                Ok(outcome) => prop_assert_eq!(outcome.value.value_type(), ValueType::Real),
                Err(e) => prop_assert!(matches!(e, ExecError::Domain(_)), "{}", e),
            }
            let boolean = cell.execute(1, &[Value::Real(x)], &collection());
            match boolean {
                Ok(outcome) => prop_assert_eq!(outcome.value.value_type(), ValueType::Boolean),
                Err(e) => prop_assert!(matches!(e, ExecError::Domain(_)), "{}", e),
            }
        }
    }

    /// A second consolidation changes nothing.
    #[test]
    fn prop_consolidation_is_idempotent(seed in any::<u64>()) {
        let (_, children) = lineage(seed, 5);
        for mut child in children {
            let before = child.to_string();
            let sizes: Vec<usize> = child.all_modules().map(cellgp::Module::size).collect();
            prop_assert!(child.consolidate().is_ok());
            prop_assert_eq!(child.to_string(), before);
            prop_assert_eq!(child.all_modules().map(cellgp::Module::size).collect::<Vec<_>>(), sizes);
        }
    }

    /// Editing a copy never reaches the original.
    #[test]
    fn prop_copies_are_independent(seed in any::<u64>()) {
        let (op, children) = lineage(seed, 3);
        let mut rng = SmallRng::seed_from_u64(seed ^ 0x5eed);
        for child in children {
            let before = child.to_string();
            let mut copy = child.clone();
            for _ in 0..4 {
                op.mutate(&mut copy, &mut rng);
                op.alter(&mut copy, &mut rng);
            }
            let program = ModuleKey::new(ModuleKind::Program, 0);
            let leaf = op.generate(&op.node_set(&copy, program), ValueType::Real, 1, &mut rng).unwrap();
            copy.module_mut(program).unwrap().set_branch(0, leaf).unwrap();
            prop_assert_eq!(child.to_string(), before);
            prop_assert!(child.validate().is_ok());
        }
    }

    /// Generated trees have the requested type and fit the limits.
    #[test]
    fn prop_generated_trees_fit(seed in any::<u64>(), size in 1usize..200) {
        let op = operator();
        let mut rng = SmallRng::seed_from_u64(seed);
        let nucleus = op.initialize(&shapes(), &mut rng).unwrap();
        let limits = op.config().limits;
        for key in [ModuleKey::new(ModuleKind::Program, 0), ModuleKey::new(ModuleKind::Program, 1)] {
            let nodes = op.node_set(&nucleus, key);
            for t in [ValueType::Real, ValueType::Boolean] {
                let tree = op.generate(&nodes, t, size, &mut rng).unwrap();
                prop_assert_eq!(tree.return_type(), t);
                prop_assert!(tree.size() <= limits.max_size);
                prop_assert!(tree.depth() <= limits.max_depth);
                prop_assert!(tree.is_ready());
            }
        }
    }
}
