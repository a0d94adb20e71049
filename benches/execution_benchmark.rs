//! Benchmarks for genome execution.

#![allow(missing_docs)] // Benchmark macros generate undocumented functions
#![allow(clippy::unwrap_used)]

use std::hint::black_box;
use std::sync::Arc;

use cellgp::module::{Argument, LoopLimits};
use cellgp::node::{Access, Constant, Sum};
use cellgp::{Cell, GeneticOperator, Module, Node, Nucleus, OperatorConfig, PrimitiveSet, ProgramShape, Tree, Value, ValueType};
use criterion::{Criterion, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::SmallRng;

fn real(x: f64) -> Tree {
    Tree::leaf(Node::primitive(Constant::new(Value::Real(x)))).unwrap()
}

fn arg(i: usize) -> Tree {
    Tree::leaf(Node::argument(i, ValueType::Real)).unwrap()
}

/// RPB0(x) = ADL0(x): 64 iterations of `acc + x`.
fn looping() -> Nucleus {
    let op = Arc::new(GeneticOperator::new(PrimitiveSet::arithmetic(), OperatorConfig::default()).unwrap());
    let mut nucleus = Nucleus::new(op);
    let limits = LoopLimits {
        max_iterations: 64,
        max_calls: 1,
    };
    let body = Tree::compose(Node::primitive(Sum), vec![arg(2), arg(0)]).unwrap();
    let adl = Module::looping(0, Argument::numbered(&[ValueType::Real]), limits, real(0.0), real(1.0), body).unwrap();
    let key = nucleus.push_module(adl);
    let call = nucleus.module(key).unwrap().call(Access::Invoke).unwrap();
    let main = Tree::compose(call.into(), vec![arg(0)]).unwrap();
    nucleus.push_module(Module::program(0, Argument::numbered(&[ValueType::Real]), main).unwrap());
    nucleus.consolidate().unwrap();
    nucleus
}

fn bench_loop(c: &mut Criterion) {
    let mut cell = Cell::new(looping());
    let args = [Value::Real(0.5)];

    c.bench_function("execute_loop_64", |b| {
        b.iter(|| black_box(cell.execute(0, &args, &[])));
    });
}

fn bench_random_genomes(c: &mut Criterion) {
    let op = Arc::new(GeneticOperator::new(PrimitiveSet::standard(), OperatorConfig::default()).unwrap());
    let mut rng = SmallRng::seed_from_u64(7);
    let shape = ProgramShape::new(vec![ValueType::Real], ValueType::Real);
    let mut cells: Vec<Cell> = (0..100)
        .map(|_| Cell::new(op.initialize(std::slice::from_ref(&shape), &mut rng).unwrap()))
        .collect();
    let args = [Value::Real(1.25)];

    c.bench_function("execute_100_random", |b| {
        b.iter(|| {
            for cell in &mut cells {
                let _ = black_box(cell.execute_unconditionally(0, &args, &[]));
            }
        });
    });
}

criterion_group!(benches, bench_loop, bench_random_genomes);
criterion_main!(benches);
