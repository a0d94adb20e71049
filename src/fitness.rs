//! Fitness contract between the engine and a problem domain.
//!
//! A domain implements [`FitnessFunction`] to score one cell; the default
//! population pass runs those evaluations in parallel with rayon and treats
//! an unevaluable individual as the worst possible one. Complexity penalties
//! read genome size, depth and the cost of the last execution.

// Sizes and costs are far below 2^52, so float conversion is exact enough.
#![allow(clippy::cast_precision_loss)]

use crate::cell::Cell;
use crate::nucleus::Nucleus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Whether lower or higher raw fitness is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FitnessDirection {
    /// Raw fitness is a penalty; lower is better.
    #[default]
    Minimize,
    /// Raw fitness is a score; higher is better.
    Maximize,
}

impl FitnessDirection {
    /// Whether `a` is strictly better than `b`.
    #[must_use]
    pub fn is_better(self, a: f64, b: f64) -> bool {
        match self {
            FitnessDirection::Minimize => a < b,
            FitnessDirection::Maximize => a > b,
        }
    }

    /// The value assigned to individuals that cannot be evaluated.
    #[must_use]
    pub fn worst(self) -> f64 {
        match self {
            FitnessDirection::Minimize => f64::INFINITY,
            FitnessDirection::Maximize => f64::NEG_INFINITY,
        }
    }
}

/// A cell together with its evaluation.
#[derive(Debug, Clone)]
pub struct Individual {
    cell: Cell,
    raw_fitness: Option<f64>,
    direction: FitnessDirection,
}

impl Individual {
    /// An unevaluated individual.
    #[must_use]
    pub fn new(nucleus: Nucleus) -> Self {
        Self {
            cell: Cell::new(nucleus),
            raw_fitness: None,
            direction: FitnessDirection::default(),
        }
    }

    /// The executable cell.
    #[must_use]
    pub fn cell(&self) -> &Cell {
        &self.cell
    }

    /// Mutable access to the cell, for execution.
    pub fn cell_mut(&mut self) -> &mut Cell {
        &mut self.cell
    }

    /// The genome.
    #[must_use]
    pub fn nucleus(&self) -> &Nucleus {
        self.cell.nucleus()
    }

    /// Raw fitness, once evaluated.
    #[must_use]
    pub fn raw_fitness(&self) -> Option<f64> {
        self.raw_fitness
    }

    /// Direction the raw fitness was computed in.
    #[must_use]
    pub fn direction(&self) -> FitnessDirection {
        self.direction
    }

    /// Record an evaluation.
    pub fn set_fitness(&mut self, raw_fitness: f64, direction: FitnessDirection) {
        self.raw_fitness = Some(raw_fitness);
        self.direction = direction;
    }

    /// Forget the evaluation, after the genome changed.
    pub fn clear_fitness(&mut self) {
        self.raw_fitness = None;
    }
}

impl From<Nucleus> for Individual {
    fn from(nucleus: Nucleus) -> Self {
        Self::new(nucleus)
    }
}

/// A problem domain's scoring of individuals.
pub trait FitnessFunction: Sync {
    /// Direction of the raw fitness this function produces.
    fn direction(&self) -> FitnessDirection;

    /// Raw fitness of one cell in `generation`, or `None` if the cell
    /// cannot be evaluated.
    fn raw_fitness(&self, cell: &mut Cell, generation: usize) -> Option<f64>;

    /// Evaluate every individual in parallel. Unevaluable individuals get
    /// the worst value of the direction.
    fn evaluate(&self, population: &mut [Individual], generation: usize) {
        let direction = self.direction();
        population.par_iter_mut().for_each(|individual| {
            let value = self
                .raw_fitness(&mut individual.cell, generation)
                .filter(|v| !v.is_nan())
                .unwrap_or_else(|| direction.worst());
            individual.set_fitness(value, direction);
        });
        debug!(generation, size = population.len(), "population evaluated");
    }
}

/// Penalty on genome size, depth and execution cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplexityPenalty {
    /// Per node of the whole genome.
    pub size: f64,
    /// Per level of the deepest branch.
    pub depth: f64,
    /// Per unit of the last execution's cost.
    pub cost: f64,
}

impl Default for ComplexityPenalty {
    fn default() -> Self {
        Self {
            size: 0.001,
            depth: 0.0,
            cost: 0.0,
        }
    }
}

impl ComplexityPenalty {
    /// The penalty for `cell`. A cell that has not run successfully pays
    /// no cost term.
    #[must_use]
    pub fn penalty(&self, cell: &Cell) -> f64 {
        let cost = cell.last_cost().map_or(0.0, |c| c as f64);
        self.size * cell.total_size() as f64 + self.depth * cell.max_depth() as f64 + self.cost * cost
    }

    /// `raw` worsened by the penalty of `cell` in `direction`.
    #[must_use]
    pub fn apply(&self, raw: f64, direction: FitnessDirection, cell: &Cell) -> f64 {
        match direction {
            FitnessDirection::Minimize => raw + self.penalty(cell),
            FitnessDirection::Maximize => raw - self.penalty(cell),
        }
    }
}

/// Evaluate a population with `fitness`.
pub fn evaluate_population(population: &mut [Individual], fitness: &impl FitnessFunction, generation: usize) {
    fitness.evaluate(population, generation);
}

/// The best evaluated individual.
#[must_use]
pub fn best(population: &[Individual]) -> Option<&Individual> {
    population
        .iter()
        .filter(|i| i.raw_fitness.is_some())
        .reduce(|best, candidate| match (candidate.raw_fitness, best.raw_fitness) {
            (Some(c), Some(b)) if candidate.direction.is_better(c, b) => candidate,
            _ => best,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperatorConfig;
    use crate::module::{Argument, Module};
    use crate::node::{Constant, Node, PrimitiveSet, Sum};
    use crate::operator::GeneticOperator;
    use crate::tree::Tree;
    use crate::value::{Value, ValueType};
    use std::sync::Arc;

    /// Squared error of program 0 against `2x + 1` on a few points.
    struct Line;

    impl FitnessFunction for Line {
        fn direction(&self) -> FitnessDirection {
            FitnessDirection::Minimize
        }

        fn raw_fitness(&self, cell: &mut Cell, _generation: usize) -> Option<f64> {
            let mut error = 0.0;
            for x in [0.0, 1.0, 2.0] {
                let y = cell.execute_unconditionally(0, &[Value::Real(x)], &[])?.value.as_real()?;
                error += (y - (2.0 * x + 1.0)).powi(2);
            }
            Some(error)
        }
    }

    fn individual(body: Tree) -> Individual {
        let op = Arc::new(GeneticOperator::new(PrimitiveSet::arithmetic(), OperatorConfig::default()).unwrap());
        let mut nucleus = Nucleus::new(op);
        nucleus.push_module(Module::program(0, Argument::numbered(&[ValueType::Real]), body).unwrap());
        Individual::new(nucleus)
    }

    fn arg() -> Tree {
        Tree::leaf(Node::argument(0, ValueType::Real)).unwrap()
    }

    fn real(x: f64) -> Tree {
        Tree::leaf(Node::primitive(Constant::new(Value::Real(x)))).unwrap()
    }

    #[test]
    fn test_evaluate_population_scores_everyone() {
        let exact = Tree::compose(
            Node::primitive(Sum),
            vec![Tree::compose(Node::primitive(Sum), vec![arg(), arg()]).unwrap(), real(1.0)],
        )
        .unwrap();
        let mut population = vec![individual(arg()), individual(exact)];
        evaluate_population(&mut population, &Line, 0);
        assert!(population.iter().all(|i| i.raw_fitness().is_some()));
        let winner = best(&population).unwrap();
        assert!(winner.raw_fitness().unwrap().abs() < 1e-12);
        assert_eq!(winner.cell().total_size(), 5);
    }

    #[test]
    fn test_unevaluable_gets_worst() {
        // Program 1 does not exist.
        struct Missing;
        impl FitnessFunction for Missing {
            fn direction(&self) -> FitnessDirection {
                FitnessDirection::Maximize
            }
            fn raw_fitness(&self, cell: &mut Cell, _generation: usize) -> Option<f64> {
                cell.execute_unconditionally(1, &[], &[])?.value.as_real()
            }
        }
        let mut population = vec![individual(arg())];
        Missing.evaluate(&mut population, 3);
        assert!(population[0].raw_fitness().is_some_and(|v| v.is_infinite() && v < 0.0));
    }

    #[test]
    fn test_complexity_penalty() {
        let mut individual = individual(arg());
        let penalty = ComplexityPenalty {
            size: 1.0,
            depth: 10.0,
            cost: 100.0,
        };
        assert!((penalty.penalty(individual.cell()) - 11.0).abs() < 1e-12);
        individual.cell_mut().execute(0, &[Value::Real(1.0)], &[]).unwrap();
        // A lone argument read costs nothing.
        assert!((penalty.apply(1.0, FitnessDirection::Maximize, individual.cell()) - (1.0 - 11.0)).abs() < 1e-12);
    }
}
