//! Subtree crossover between two genomes.
//!
//! The child starts as a copy of the first parent. At every crossover point
//! the subtree is replaced by a subtree taken from the same module and
//! branch of the second parent. Donors must return the same type, fit the
//! branch limits and resolve in the child's context; a point without such a
//! donor is left unchanged.

use super::{GeneticOperator, select_branch, select_module};
use crate::module::{Branch, ModuleKey};
use crate::nucleus::{Nucleus, Site};
use crate::tree::{NodeId, Tree};
use crate::value::ValueType;
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// How crossover points are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CrossoverPlan {
    /// No crossover; the child is a copy of the first parent.
    None,
    /// Every node of every branch is a point with this probability.
    Frequency(f64),
    /// Exactly `count` points spread over the branches, picked uniformly or
    /// in proportion to branch size. Repeated points count once.
    Points {
        /// Number of points.
        count: usize,
        /// Weight modules and branches by size.
        size_weighted: bool,
    },
}

impl CrossoverPlan {
    /// The per-node probability, for frequency plans.
    #[must_use]
    pub fn frequency(&self) -> Option<f64> {
        match self {
            CrossoverPlan::Frequency(p) => Some(*p),
            _ => None,
        }
    }
}

/// How a donor subtree is picked among the compatible ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NodeSelection {
    /// Uniformly.
    Standard,
    /// Size-fair: donors close in size to the replaced subtree are favoured.
    #[default]
    SizeFair,
}

/// Crossover scheme.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossoverConfig {
    /// Point selection.
    pub plan: CrossoverPlan,
    /// Donor selection.
    pub selection: NodeSelection,
}

impl Default for CrossoverConfig {
    fn default() -> Self {
        Self {
            plan: CrossoverPlan::Points {
                count: 1,
                size_weighted: true,
            },
            selection: NodeSelection::default(),
        }
    }
}

/// Relative weights of the three size buckets of size-fair selection.
///
/// For a replaced subtree of size `s`, candidates fall into smaller, equal
/// and larger buckets. The equal bucket weighs its count; the larger bucket
/// weighs its count times `s / mean_larger`; the smaller bucket weighs its
/// count times `mean_smaller / s`. An empty bucket weighs zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeFairWeights {
    /// Weight of candidates smaller than the replaced subtree.
    pub smaller: f64,
    /// Weight of candidates of the same size.
    pub same: f64,
    /// Weight of candidates larger than the replaced subtree.
    pub larger: f64,
}

// Subtree sizes stay far below 2^52.
#[allow(clippy::cast_precision_loss)]
impl SizeFairWeights {
    /// Bucket weights for candidate `sizes` replacing a subtree of `base`
    /// nodes.
    #[must_use]
    pub fn new(sizes: &[usize], base: usize) -> Self {
        let base = base.max(1);
        let mut smaller = (0usize, 0usize);
        let mut larger = (0usize, 0usize);
        let mut same = 0usize;
        for &size in sizes {
            match size.cmp(&base) {
                Ordering::Less => {
                    smaller.0 += 1;
                    smaller.1 += size;
                }
                Ordering::Greater => {
                    larger.0 += 1;
                    larger.1 += size;
                }
                Ordering::Equal => same += 1,
            }
        }
        let base = base as f64;
        let smaller = if smaller.0 == 0 {
            0.0
        } else {
            let mean = smaller.1 as f64 / smaller.0 as f64;
            smaller.0 as f64 * mean / base
        };
        let larger = if larger.0 == 0 {
            0.0
        } else {
            let mean = larger.1 as f64 / larger.0 as f64;
            larger.0 as f64 * base / mean
        };
        Self {
            smaller,
            same: same as f64,
            larger,
        }
    }

    /// Normalized probabilities of picking from the smaller, same and larger
    /// buckets, or `None` when there are no candidates.
    #[must_use]
    pub fn probabilities(&self) -> Option<[f64; 3]> {
        let total = self.smaller + self.same + self.larger;
        (total > 0.0).then(|| [self.smaller / total, self.same / total, self.larger / total])
    }
}

/// Index into `sizes` of a size-fair pick for a subtree of `base` nodes.
///
/// A bucket (smaller, same size or larger than `base`) is drawn with the
/// weights of [`SizeFairWeights`], then a member of that bucket is drawn
/// uniformly. The size bias lives entirely in the bucket weights, so two
/// larger candidates of different sizes are equally likely once the larger
/// bucket is chosen.
pub fn size_fair_pick(sizes: &[usize], base: usize, rng: &mut dyn RngCore) -> Option<usize> {
    let base = base.max(1);
    let weights = SizeFairWeights::new(sizes, base);
    let buckets = WeightedIndex::new([weights.smaller, weights.same, weights.larger]).ok()?;
    let bucket = buckets.sample(rng);
    let members: Vec<usize> = sizes
        .iter()
        .enumerate()
        .filter(|(_, s)| {
            let order = match bucket {
                0 => Ordering::Less,
                1 => Ordering::Equal,
                _ => Ordering::Greater,
            };
            (**s).cmp(&base) == order
        })
        .map(|(i, _)| i)
        .collect();
    members.choose(rng).copied()
}

/// Crossover points in `nucleus`, grouped by branch and ordered so that
/// later nodes come first.
pub fn plan_sites(nucleus: &Nucleus, plan: CrossoverPlan, rng: &mut dyn RngCore) -> Vec<Site> {
    let mut sites = Vec::new();
    match plan {
        CrossoverPlan::None => {}
        CrossoverPlan::Frequency(p) => {
            for module in nucleus.all_modules() {
                for (b, branch) in module.branches().iter().enumerate() {
                    for id in branch.tree().ids() {
                        if rng.gen_bool(p) {
                            sites.push(Site {
                                module: module.key(),
                                branch: b,
                                node: id,
                            });
                        }
                    }
                }
            }
        }
        CrossoverPlan::Points { count, size_weighted } => {
            for _ in 0..count {
                let Some(key) = select_module(nucleus, size_weighted, rng) else {
                    break;
                };
                let Some(module) = nucleus.module(key) else {
                    continue;
                };
                let Some(b) = select_branch(module, size_weighted, rng) else {
                    continue;
                };
                let size = module.branch(b).map_or(0, Branch::size);
                if size > 0 {
                    sites.push(Site {
                        module: key,
                        branch: b,
                        node: NodeId::new(rng.gen_range(0..size)),
                    });
                }
            }
        }
    }
    sort_sites(&mut sites);
    sites
}

/// Order sites by module and branch, later nodes first, without repeats.
pub(crate) fn sort_sites(sites: &mut Vec<Site>) {
    sites.sort_by(|a, b| {
        (a.module, a.branch)
            .cmp(&(b.module, b.branch))
            .then(b.node.cmp(&a.node))
    });
    sites.dedup();
}

/// A child of `a` with subtrees of `b` swapped in.
pub(crate) fn crossover(operator: &GeneticOperator, a: &Nucleus, b: &Nucleus, rng: &mut dyn RngCore) -> Nucleus {
    let config = operator.config().crossover;
    let mut child = a.clone();
    let mut swapped = 0;
    for site in plan_sites(a, config.plan, rng) {
        match donor(operator, &child, b, site, config.selection, rng) {
            Some(tree) => {
                let applied = child
                    .module_mut(site.module)
                    .map(|m| m.edit_branch(site.branch, |t| t.replace(site.node, tree)));
                if matches!(applied, Some(Ok(_))) {
                    swapped += 1;
                }
            }
            None => debug!(module = %site.module, branch = site.branch, node = %site.node, "no compatible donor"),
        }
    }
    debug!(swapped, "crossover");
    child
}

/// A subtree of `b` that may replace the subtree at `site` in `child`.
fn donor(
    operator: &GeneticOperator,
    child: &Nucleus,
    b: &Nucleus,
    site: Site,
    selection: NodeSelection,
    rng: &mut dyn RngCore,
) -> Option<Tree> {
    let limits = operator.config().limits;
    let module = child.module(site.module)?;
    let tree = module.branch(site.branch)?.tree();
    let target = tree.get(site.node)?;
    let base = tree.subtree_size(site.node);
    let size_room = limits.max_size.saturating_sub(tree.size() - base);
    let depth_room = limits.max_depth.saturating_sub(tree.level(site.node));
    let frame = module.frame_types();

    let donor_tree = b.module(site.module)?.branch(site.branch)?.tree();
    let candidates: Vec<NodeId> = donor_tree
        .ids()
        .filter(|id| donor_tree.node(*id).return_type() == target.return_type())
        .filter(|id| donor_tree.subtree_size(*id) <= size_room && donor_tree.subtree_depth(*id) <= depth_room)
        .filter(|id| resolves(child, site.module, &frame, donor_tree, *id))
        .collect();
    let chosen = match selection {
        NodeSelection::Standard => candidates.choose(rng).copied(),
        NodeSelection::SizeFair => {
            let sizes: Vec<usize> = candidates.iter().map(|id| donor_tree.subtree_size(*id)).collect();
            size_fair_pick(&sizes, base, rng).map(|i| candidates[i])
        }
    }?;
    Some(donor_tree.subtree(chosen))
}

fn resolves(nucleus: &Nucleus, caller: ModuleKey, frame: &[ValueType], tree: &Tree, id: NodeId) -> bool {
    tree.subtree_ids(id)
        .all(|i| nucleus.check_node(caller, frame, tree.node(i)).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperatorConfig;
    use crate::module::{Argument, Module, ModuleKind};
    use crate::node::{Constant, Node, PrimitiveSet, Sum};
    use crate::value::Value;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use std::sync::Arc;

    fn operator(config: CrossoverConfig) -> Arc<GeneticOperator> {
        let config = OperatorConfig {
            crossover: config,
            ..OperatorConfig::default()
        };
        Arc::new(GeneticOperator::new(PrimitiveSet::arithmetic(), config).unwrap())
    }

    fn constant(x: f64) -> Tree {
        Tree::leaf(Node::primitive(Constant::new(Value::Real(x)))).unwrap()
    }

    fn program(op: &Arc<GeneticOperator>, body: Tree) -> Nucleus {
        let mut nucleus = Nucleus::new(Arc::clone(op));
        nucleus.push_module(Module::program(0, Argument::numbered(&[ValueType::Real]), body).unwrap());
        nucleus
    }

    #[test]
    fn test_size_fair_probabilities() {
        let weights = SizeFairWeights::new(&[1, 1, 2, 3, 5], 3);
        let [smaller, same, larger] = weights.probabilities().unwrap();
        assert!((smaller - 0.4545).abs() < 1e-3);
        assert!((same - 0.3409).abs() < 1e-3);
        assert!((larger - 0.2045).abs() < 1e-3);
        assert!(SizeFairWeights::new(&[], 3).probabilities().is_none());
    }

    #[test]
    fn test_size_fair_pick_frequencies() {
        let mut rng = SmallRng::seed_from_u64(21);
        let sizes = [1, 1, 2, 3, 5];
        let mut buckets = [0usize; 3];
        let trials: u32 = 20_000;
        for _ in 0..trials {
            let i = size_fair_pick(&sizes, 3, &mut rng).unwrap();
            let bucket = match sizes[i].cmp(&3) {
                Ordering::Less => 0,
                Ordering::Equal => 1,
                Ordering::Greater => 2,
            };
            buckets[bucket] += 1;
        }
        let expected = [0.4545, 0.3409, 0.2045];
        for (count, p) in buckets.iter().zip(expected) {
            #[allow(clippy::cast_precision_loss)]
            let observed = *count as f64 / f64::from(trials);
            assert!((observed - p).abs() < 0.02, "observed {observed}, expected {p}");
        }
    }

    #[test]
    fn test_size_fair_pick_is_uniform_within_bucket() {
        let mut rng = SmallRng::seed_from_u64(23);
        let sizes = [1, 1, 2, 3, 5];
        let mut smaller = [0u32; 3];
        for _ in 0..20_000 {
            let i = size_fair_pick(&sizes, 3, &mut rng).unwrap();
            if i < 3 {
                smaller[i] += 1;
            }
        }
        let total: u32 = smaller.iter().sum();
        for count in smaller {
            let share = f64::from(count) / f64::from(total);
            assert!((share - 1.0 / 3.0).abs() < 0.03, "share {share}");
        }
    }

    #[test]
    fn test_points_are_deduplicated_and_descending() {
        let mut rng = SmallRng::seed_from_u64(22);
        let op = operator(CrossoverConfig::default());
        let body = Tree::compose(Node::primitive(Sum), vec![constant(1.0), constant(2.0)]).unwrap();
        let nucleus = program(&op, body);
        let sites = plan_sites(
            &nucleus,
            CrossoverPlan::Points {
                count: 50,
                size_weighted: false,
            },
            &mut rng,
        );
        assert!(sites.len() <= 3);
        assert!(sites.windows(2).all(|w| w[0].node > w[1].node));
    }

    #[test]
    fn test_crossover_swaps_matching_subtrees() {
        let mut rng = SmallRng::seed_from_u64(23);
        let op = operator(CrossoverConfig {
            plan: CrossoverPlan::Frequency(1.0),
            selection: NodeSelection::Standard,
        });
        let a = program(&op, constant(1.0));
        let b = program(&op, constant(7.0));
        let child = op.crossover(&a, &b, &mut rng);
        child.validate().unwrap();
        assert_eq!(child.program(0).unwrap().branch(0).unwrap().tree().to_string(), "7");
        assert_eq!(a.program(0).unwrap().branch(0).unwrap().tree().to_string(), "1");
    }

    #[test]
    fn test_crossover_rejects_unresolved_donors() {
        let mut rng = SmallRng::seed_from_u64(24);
        let op = operator(CrossoverConfig {
            plan: CrossoverPlan::Frequency(1.0),
            selection: NodeSelection::Standard,
        });
        let a = program(&op, constant(1.0));
        let mut b = program(&op, constant(7.0));
        let f0 = b.push_module(Module::function(0, Vec::new(), constant(3.0)).unwrap());
        let call = b.module(f0).unwrap().call(crate::node::Access::Invoke).unwrap();
        b.module_mut(ModuleKey::new(ModuleKind::Program, 0))
            .unwrap()
            .set_branch(0, Tree::leaf(call.into()).unwrap())
            .unwrap();
        // The only donor calls a function the child does not have.
        let child = op.crossover(&a, &b, &mut rng);
        child.validate().unwrap();
        assert_eq!(child.program(0).unwrap().branch(0).unwrap().tree().to_string(), "1");
    }

    #[test]
    fn test_crossover_respects_size_limit() {
        let mut rng = SmallRng::seed_from_u64(25);
        let mut config = OperatorConfig::default();
        config.crossover.plan = CrossoverPlan::Frequency(1.0);
        config.limits.max_size = 2;
        let op = Arc::new(GeneticOperator::new(PrimitiveSet::arithmetic(), config).unwrap());
        let a = program(&op, constant(1.0));
        let big = Tree::compose(Node::primitive(Sum), vec![constant(1.0), constant(2.0)]).unwrap();
        let b = program(&op, big);
        for _ in 0..20 {
            let child = op.crossover(&a, &b, &mut rng);
            assert!(child.total_size() <= 2);
        }
    }
}
