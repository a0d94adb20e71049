//! Output formatting utilities for CLI.

// Counts stay far below 2^52.
#![allow(clippy::cast_precision_loss)]

use cellgp::module::ModuleKind;
use cellgp::ExecError;
use serde::Serialize;
use std::fmt::Write as _;

/// Failures kept verbatim in a report.
const MAX_FAILURES: usize = 16;

/// Stress statistics, accumulated per worker and merged at the end.
#[derive(Debug, Default)]
pub(super) struct StressStats {
    /// Lanes that ran to completion or failed.
    pub(super) lanes: u64,
    /// Children bred.
    pub(super) children: u64,
    /// Children that failed validation.
    pub(super) invalid: u64,
    /// Children whose second consolidation changed them.
    pub(super) unstable: u64,
    /// Children whose copy was affected by editing the original.
    pub(super) aliased: u64,
    /// Breedings that returned an error.
    pub(super) breed_errors: u64,
    /// Executions that produced a value.
    pub(super) executions: u64,
    /// Executions that stopped on a tolerated error.
    pub(super) tolerated: u64,
    /// Executions that stopped on an error a valid genome must never raise.
    pub(super) exec_faults: u64,
    /// Sum of execution costs.
    total_cost: u64,
    /// Sum of genome sizes.
    total_size: u64,
    /// Largest genome seen.
    pub(super) max_size: usize,
    /// Module count per kind, summed over children.
    modules: [u64; ModuleKind::ALL.len()],
    /// First failures, with lane seeds.
    pub(super) failures: Vec<String>,
}

impl StressStats {
    /// Record one bred child.
    pub(super) fn add_child(&mut self, size: usize, modules: impl IntoIterator<Item = (ModuleKind, usize)>) {
        self.children += 1;
        self.total_size += size as u64;
        self.max_size = self.max_size.max(size);
        for (kind, count) in modules {
            self.modules[kind.index()] += count as u64;
        }
    }

    /// Record one execution. Running out of call depth is tolerated only
    /// when `cyclic`, that is when the hierarchy lets calls loop back.
    pub(super) fn add_execution(&mut self, result: Result<u64, &ExecError>, cyclic: bool) {
        match result {
            Ok(cost) => {
                self.executions += 1;
                self.total_cost += cost;
            }
            Err(e) if is_tolerated(e, cyclic) => self.tolerated += 1,
            Err(_) => self.exec_faults += 1,
        }
    }

    /// Record a failure message.
    pub(super) fn fail(&mut self, message: String) {
        if self.failures.len() < MAX_FAILURES {
            self.failures.push(message);
        }
    }

    /// Merge another worker's statistics.
    pub(super) fn merge(&mut self, other: &StressStats) {
        self.lanes += other.lanes;
        self.children += other.children;
        self.invalid += other.invalid;
        self.unstable += other.unstable;
        self.aliased += other.aliased;
        self.breed_errors += other.breed_errors;
        self.executions += other.executions;
        self.tolerated += other.tolerated;
        self.exec_faults += other.exec_faults;
        self.total_cost += other.total_cost;
        self.total_size += other.total_size;
        self.max_size = self.max_size.max(other.max_size);
        for (mine, theirs) in self.modules.iter_mut().zip(other.modules) {
            *mine += theirs;
        }
        for failure in &other.failures {
            self.fail(failure.clone());
        }
    }

    /// Whether any invariant was broken.
    pub(super) fn broken(&self) -> u64 {
        self.invalid + self.unstable + self.aliased + self.breed_errors + self.exec_faults
    }

    fn mean_size(&self) -> f64 {
        ratio(self.total_size, self.children)
    }

    fn mean_cost(&self) -> f64 {
        ratio(self.total_cost, self.executions)
    }

    fn mean_modules(&self, kind: ModuleKind) -> f64 {
        ratio(self.modules[kind.index()], self.children)
    }
}

/// Whether a valid genome may legitimately stop on `error`.
pub(super) fn is_tolerated(error: &ExecError, cyclic: bool) -> bool {
    match error {
        ExecError::Domain(_) => true,
        ExecError::CallDepthExceeded(_) => cyclic,
        _ => false,
    }
}

fn ratio(sum: u64, count: u64) -> f64 {
    if count > 0 {
        sum as f64 / count as f64
    } else {
        0.0
    }
}

/// JSON-serializable stress report.
#[derive(Debug, Serialize)]
pub(super) struct JsonStressReport {
    /// Base seed of the run.
    pub(super) seed: u64,
    /// Lanes run.
    pub(super) lanes: u64,
    /// Children bred.
    pub(super) children: u64,
    /// Invariant violations by check.
    pub(super) violations: JsonViolations,
    /// Successful executions.
    pub(super) executions: u64,
    /// Executions stopped by a domain error, or by call depth in a cyclic
    /// hierarchy.
    pub(super) tolerated: u64,
    /// Mean genome size.
    pub(super) mean_size: f64,
    /// Largest genome size.
    pub(super) max_size: usize,
    /// Mean execution cost.
    pub(super) mean_cost: f64,
    /// Mean module count per kind.
    pub(super) mean_modules: Vec<JsonModuleCount>,
    /// First failures.
    pub(super) failures: Vec<String>,
    /// Wall time in seconds.
    pub(super) seconds: f64,
}

/// Violation counts.
#[derive(Debug, Serialize)]
pub(super) struct JsonViolations {
    /// Failed validation.
    pub(super) invalid: u64,
    /// Changed by a second consolidation.
    pub(super) unstable: u64,
    /// Shared state with a copy.
    pub(super) aliased: u64,
    /// Breeding errors.
    pub(super) breed_errors: u64,
    /// Execution errors on valid genomes.
    pub(super) exec_faults: u64,
}

/// Mean count of one module kind.
#[derive(Debug, Serialize)]
pub(super) struct JsonModuleCount {
    /// Kind prefix, such as `ADF`.
    pub(super) kind: &'static str,
    /// Mean per child.
    pub(super) mean: f64,
}

impl JsonStressReport {
    /// Create from merged statistics.
    pub(super) fn from_stats(stats: &StressStats, seed: u64, seconds: f64) -> Self {
        Self {
            seed,
            lanes: stats.lanes,
            children: stats.children,
            violations: JsonViolations {
                invalid: stats.invalid,
                unstable: stats.unstable,
                aliased: stats.aliased,
                breed_errors: stats.breed_errors,
                exec_faults: stats.exec_faults,
            },
            executions: stats.executions,
            tolerated: stats.tolerated,
            mean_size: stats.mean_size(),
            max_size: stats.max_size,
            mean_cost: stats.mean_cost(),
            mean_modules: ModuleKind::ALL
                .iter()
                .map(|&kind| JsonModuleCount {
                    kind: kind.prefix(),
                    mean: stats.mean_modules(kind),
                })
                .collect(),
            failures: stats.failures.clone(),
            seconds,
        }
    }
}

/// Format stress statistics as human-readable text.
pub(super) fn format_stress_text(stats: &StressStats, seed: u64) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "Stress Results (seed: {seed})");
    let _ = writeln!(output, "  Lanes: {}  Children: {}", stats.lanes, stats.children);
    let _ = writeln!(
        output,
        "  Size: {:.1} mean, {} max",
        stats.mean_size(),
        stats.max_size
    );
    let _ = writeln!(
        output,
        "  Executions: {} ok, {} tolerated, {:.1} mean cost",
        stats.executions,
        stats.tolerated,
        stats.mean_cost()
    );
    output.push_str("  Modules per child:");
    for kind in ModuleKind::ALL {
        let _ = write!(output, " {} {:.2}", kind.prefix(), stats.mean_modules(kind));
    }
    output.push_str("\n\n");

    let _ = writeln!(output, "  {:<22} {:>8}", "Check", "Failures");
    let _ = writeln!(output, "  {}", "-".repeat(31));
    for (name, count) in [
        ("validation", stats.invalid),
        ("consolidation", stats.unstable),
        ("copy independence", stats.aliased),
        ("breeding", stats.breed_errors),
        ("execution", stats.exec_faults),
    ] {
        let _ = writeln!(output, "  {name:<22} {count:>8}");
    }

    if !stats.failures.is_empty() {
        output.push('\n');
        for failure in &stats.failures {
            let _ = writeln!(output, "  ! {failure}");
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_sums_and_caps_failures() {
        let mut a = StressStats::default();
        a.add_child(10, [(ModuleKind::Program, 1), (ModuleKind::Function, 2)]);
        a.add_execution(Ok(4), false);
        for i in 0..MAX_FAILURES {
            a.fail(format!("a{i}"));
        }

        let mut b = StressStats::default();
        b.add_child(30, [(ModuleKind::Program, 1)]);
        b.add_execution(Err(&ExecError::CallDepthExceeded(64)), false);
        b.add_execution(Err(&ExecError::UnboundArgument(3)), true);
        b.fail("b".to_string());

        a.merge(&b);
        assert_eq!(a.children, 2);
        assert_eq!(a.max_size, 30);
        assert_eq!(a.executions, 1);
        assert_eq!(a.tolerated, 0);
        assert_eq!(a.exec_faults, 2);
        assert_eq!(a.broken(), 2);
        assert_eq!(a.failures.len(), MAX_FAILURES);
        assert!((a.mean_size() - 20.0).abs() < 1e-12);
        assert!((a.mean_modules(ModuleKind::Function) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_call_depth_is_tolerated_only_in_cyclic_hierarchies() {
        let depth = ExecError::CallDepthExceeded(64);
        assert!(!is_tolerated(&depth, false));
        assert!(is_tolerated(&depth, true));
        assert!(is_tolerated(&ExecError::Domain("log of -1".to_string()), false));
        assert!(!is_tolerated(&ExecError::NoSuchProgram(2), true));
    }

    #[test]
    fn test_text_lists_every_check() {
        let text = format_stress_text(&StressStats::default(), 7);
        assert!(text.contains("seed: 7"));
        for check in ["validation", "consolidation", "copy independence", "breeding", "execution"] {
            assert!(text.contains(check));
        }
    }
}
