//! Stress command implementation.

use super::output::{format_stress_text, is_tolerated, JsonStressReport, StressStats};
use super::{CliError, OutputFormat};
use cellgp::module::ModuleKind;
use cellgp::value::{Value, ValueType};
use cellgp::{Cell, GeneticOperator, Nucleus, OperatorConfig, ProgramShape};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Records per generated collection.
const MAX_RECORDS: usize = 6;

/// Options of the stress command.
#[derive(Debug)]
pub(crate) struct StressOptions {
    pub(crate) lanes: u64,
    pub(crate) generations: usize,
    pub(crate) arity: usize,
    pub(crate) seed: Option<u64>,
    pub(crate) threads: Option<usize>,
    pub(crate) format: OutputFormat,
    pub(crate) progress: bool,
}

/// Execute the stress command.
///
/// # Errors
///
/// Returns an error if the progress bar cannot be styled, the report
/// cannot be serialized, or any invariant was violated.
pub(crate) fn execute(config: OperatorConfig, options: &StressOptions) -> Result<(), CliError> {
    if let Some(num_threads) = options.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .ok(); // Ignore error if already initialized
    }

    let base_seed = super::resolve_seed(options.seed);
    let operator = super::operator(config)?;
    let shape = ProgramShape::new(vec![ValueType::Real; options.arity], ValueType::Real);

    let pb = if options.progress {
        let pb = ProgressBar::new(options.lanes);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} lanes ({per_sec})",
            )
            .map_err(|e| CliError::new(format!("Invalid progress template: {e}")))?
            .progress_chars("=>-"),
        );
        Some(pb)
    } else {
        None
    };

    info!(lanes = options.lanes, generations = options.generations, base_seed, "stress started");
    let start = Instant::now();

    // Each worker accumulates its own stats; they are merged at the end.
    let stats = (0..options.lanes)
        .into_par_iter()
        .fold(StressStats::default, |mut local, lane| {
            run_lane(&operator, &shape, base_seed.wrapping_add(lane), options.generations, &mut local);
            if let Some(pb) = &pb {
                pb.inc(1);
            }
            local
        })
        .reduce(StressStats::default, |mut a, b| {
            a.merge(&b);
            a
        });

    if let Some(pb) = pb {
        pb.finish_with_message("done");
    }

    let duration = start.elapsed();

    match options.format {
        OutputFormat::Text => {
            println!();
            print!("{}", format_stress_text(&stats, base_seed));
            println!();
            println!("Duration: {:.2}s", duration.as_secs_f64());
        }
        OutputFormat::Json => {
            let report = JsonStressReport::from_stats(&stats, base_seed, duration.as_secs_f64());
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    match stats.broken() {
        0 => Ok(()),
        n => Err(CliError::new(format!("{n} invariant violations"))),
    }
}

/// Breed `generations` children from two random parents, checking each.
fn run_lane(operator: &Arc<GeneticOperator>, shape: &ProgramShape, seed: u64, generations: usize, stats: &mut StressStats) {
    stats.lanes += 1;
    let mut rng = SmallRng::seed_from_u64(seed);
    let shapes = std::slice::from_ref(shape);

    let parents = operator
        .initialize(shapes, &mut rng)
        .and_then(|a| operator.initialize(shapes, &mut rng).map(|b| (a, b)));
    let (mut a, mut b) = match parents {
        Ok(parents) => parents,
        Err(e) => {
            stats.breed_errors += 1;
            stats.fail(format!("lane {seed}: initialization failed: {e}"));
            return;
        }
    };

    for generation in 0..generations {
        let child = match operator.breed(&a, &b, &mut rng) {
            Ok(child) => child,
            Err(e) => {
                stats.breed_errors += 1;
                stats.fail(format!("lane {seed} generation {generation}: breeding failed: {e}"));
                continue;
            }
        };
        check_child(operator, &child, &mut rng, stats, || format!("lane {seed} generation {generation}"));
        a = std::mem::replace(&mut b, child);
    }
    debug!(seed, size = b.total_size(), "lane finished");
}

fn check_child(
    operator: &GeneticOperator,
    child: &Nucleus,
    rng: &mut dyn RngCore,
    stats: &mut StressStats,
    origin: impl Fn() -> String,
) {
    stats.add_child(
        child.total_size(),
        ModuleKind::ALL.iter().map(|&kind| (kind, child.modules(kind).len())),
    );

    if let Err(e) = child.validate() {
        stats.invalid += 1;
        stats.fail(format!("{}: invalid child: {e}", origin()));
        return;
    }

    let rendered = child.to_string();
    let mut again = child.clone();
    if again.consolidate().is_err() || again.to_string() != rendered {
        stats.unstable += 1;
        stats.fail(format!("{}: consolidation is not idempotent", origin()));
    }

    // Editing a copy must leave the original untouched.
    let mut copy = child.clone();
    operator.mutate(&mut copy, rng);
    operator.alter(&mut copy, rng);
    if child.to_string() != rendered {
        stats.aliased += 1;
        stats.fail(format!("{}: editing a copy changed the original", origin()));
    }

    let collections = super::random_collections(&operator.config().architecture.collections, MAX_RECORDS, rng);
    let cyclic = !child.hierarchy().is_strict();
    let mut cell = Cell::new(child.clone());
    for program in 0..child.programs().len() {
        let args: Vec<Value> = child.programs()[program]
            .arg_types()
            .into_iter()
            .map(|t| Value::random(t, rng))
            .collect();
        let result = cell.execute(program, &args, &collections);
        if let Err(e) = &result
            && !is_tolerated(e, cyclic)
        {
            stats.fail(format!("{}: program {program} failed: {e}", origin()));
        }
        stats.add_execution(result.as_ref().map(|o| o.cost), cyclic);
    }
}
