//! Composition of random and covariate effects onto no-effect rates.
//!
//! All effects live in log-rate space. A node's effective random effect for
//! a rate is its own draw plus every strict ancestor's draw, root excluded;
//! covariate effects are the configured coefficient times the covariate's
//! distance from its (node, sex) reference average at the evaluation point.
//! The composed rate is `exp(effect) * no_effect_rate(age, time)`, evaluated
//! lazily per call because covariate surfaces vary continuously.

use rand::Rng;
use rand_distr::StandardNormal;

use crate::covariate::NodeSexSurfaces;
use crate::node::NodeTree;
use crate::surface::{build_surfaces, SamplePoint, Surface};
use crate::tables::{MultiplierRow, Rate, RateTruthRow};
use crate::SimError;

/// One no-effect surface per rate present in the no-effect-rate table.
#[derive(Debug, Clone, Default)]
pub struct RateSurfaces {
    surfaces: [Option<Surface>; 4],
}

impl RateSurfaces {
    pub fn build(rows: &[RateTruthRow]) -> Result<Self, SimError> {
        const TABLE: &str = "no_effect_rate";

        let mut grouped: [Vec<SamplePoint>; 4] = Default::default();
        for (index, row) in rows.iter().enumerate() {
            let rate = Rate::parse(&row.rate_name).ok_or_else(|| SimError::TableRow {
                table: TABLE,
                row: index + 1,
                message: format!("rate_name {} is not pini, iota, rho, or chi", row.rate_name),
            })?;
            grouped[rate.index()].push(SamplePoint {
                x: row.age,
                y: row.time,
                z: vec![row.rate_truth],
            });
        }

        let mut surfaces: [Option<Surface>; 4] = Default::default();
        for rate in Rate::ALL {
            let points = &grouped[rate.index()];
            if points.is_empty() {
                continue;
            }
            let (_, _, mut built) =
                build_surfaces(points, 1).map_err(|e| SimError::NonRectangular {
                    table: TABLE,
                    group: format!("rate_name = {}", rate.as_str()),
                    x_name: "age",
                    y_name: "time",
                    x_grid: e.x_grid,
                    y_grid: e.y_grid,
                })?;
            surfaces[rate.index()] = built.pop();
        }
        Ok(RateSurfaces { surfaces })
    }

    pub fn get(&self, rate: Rate) -> Option<&Surface> {
        self.surfaces[rate.index()].as_ref()
    }

    /// Rates present in the table, in enum order.
    pub fn present(&self) -> impl Iterator<Item = Rate> + '_ {
        Rate::ALL
            .into_iter()
            .filter(|r| self.surfaces[r.index()].is_some())
    }
}

/// One log-rate offset per (node, rate) pair, drawn once per run.
#[derive(Debug, Clone)]
pub struct RandomEffects {
    by_node: Vec<[f64; 4]>,
}

impl RandomEffects {
    /// Draw order is fixed: nodes in node-table order, rates in enum order.
    /// This is the first consumption of the shared random stream.
    pub fn draw<R: Rng>(tree: &NodeTree, std: f64, rng: &mut R) -> Self {
        let by_node = (0..tree.len())
            .map(|_| {
                let mut draws = [0.0; 4];
                for rate in Rate::ALL {
                    let z: f64 = rng.sample(StandardNormal);
                    draws[rate.index()] = std * z;
                }
                draws
            })
            .collect();
        RandomEffects { by_node }
    }

    pub fn from_values(by_node: Vec<[f64; 4]>) -> Self {
        RandomEffects { by_node }
    }

    pub fn get(&self, node: usize, rate: Rate) -> f64 {
        self.by_node[node][rate.index()]
    }
}

/// What a covariate multiplier multiplies: a covariate column, or the sex
/// pseudo-covariate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplierTarget {
    Covariate(usize),
    Sex,
}

#[derive(Debug, Clone)]
pub struct Multiplier {
    pub rate: Rate,
    pub target: MultiplierTarget,
    pub coefficient: f64,
}

/// Resolve multiplier rows against the rate and covariate vocabularies.
///
/// Sex-targeted multipliers are kept in the result but contribute no effect;
/// the encoding of sex as a covariate is deliberately not guessed at.
pub fn parse_multipliers(
    rows: &[MultiplierRow],
    covariate_names: &[String],
) -> Result<Vec<Multiplier>, SimError> {
    const TABLE: &str = "multiplier_sim";

    let mut multipliers = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let rate = Rate::parse(&row.rate_name).ok_or_else(|| SimError::TableRow {
            table: TABLE,
            row: index + 1,
            message: format!("rate_name {} is not pini, iota, rho, or chi", row.rate_name),
        })?;
        let target = if row.covariate_or_sex == "sex" {
            log::warn!(
                "multiplier_sim.csv row {}: sex covariate multipliers are not \
                 implemented and contribute no effect",
                index + 1
            );
            MultiplierTarget::Sex
        } else {
            let position = covariate_names
                .iter()
                .position(|name| *name == row.covariate_or_sex)
                .ok_or_else(|| SimError::TableRow {
                    table: TABLE,
                    row: index + 1,
                    message: format!(
                        "covariate_or_sex {} is not sex or a covariate.csv column",
                        row.covariate_or_sex
                    ),
                })?;
            MultiplierTarget::Covariate(position)
        };
        multipliers.push(Multiplier {
            rate,
            target,
            coefficient: row.multiplier_truth,
        });
    }
    Ok(multipliers)
}

/// The per-(node, sex) rate model handed to the integration engine.
///
/// Borrowing everything keeps construction per simulate row cheap; no effect
/// is precomputed per grid point.
pub struct RateModel<'a> {
    node: usize,
    tree: &'a NodeTree,
    no_effect: &'a RateSurfaces,
    random_effects: &'a RandomEffects,
    multipliers: &'a [Multiplier],
    surfaces: &'a NodeSexSurfaces,
    averages: &'a [f64],
}

impl<'a> RateModel<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node: usize,
        tree: &'a NodeTree,
        no_effect: &'a RateSurfaces,
        random_effects: &'a RandomEffects,
        multipliers: &'a [Multiplier],
        surfaces: &'a NodeSexSurfaces,
        averages: &'a [f64],
    ) -> Self {
        RateModel {
            node,
            tree,
            no_effect,
            random_effects,
            multipliers,
            surfaces,
            averages,
        }
    }

    fn log_effect(&self, rate: Rate, age: f64, time: f64) -> f64 {
        // own draw plus every strict ancestor's, root excluded: each node on
        // the lineage contributes unless it is the root
        let mut effect = 0.0;
        for id in self.tree.lineage(self.node) {
            if self.tree.parent(id).is_some() {
                effect += self.random_effects.get(id, rate);
            }
        }

        for multiplier in self.multipliers {
            if multiplier.rate != rate {
                continue;
            }
            if let MultiplierTarget::Covariate(k) = multiplier.target {
                let value = self.surfaces.covariates[k].eval(age, time);
                effect += multiplier.coefficient * (value - self.averages[k]);
            }
        }
        effect
    }

    /// The composed rate at (age, time). Rates with no surface in the
    /// no-effect-rate table are identically zero.
    pub fn rate(&self, rate: Rate, age: f64, time: f64) -> f64 {
        match self.no_effect.get(rate) {
            None => 0.0,
            Some(surface) => self.log_effect(rate, age, time).exp() * surface.eval(age, time),
        }
    }

    /// Other-cause mortality for this (node, sex), from the covariate table.
    pub fn omega(&self, age: f64, time: f64) -> f64 {
        self.surfaces.omega.eval(age, time)
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_multipliers, RandomEffects, RateModel, RateSurfaces};
    use crate::covariate::{CovariateData, NodeSexSurfaces};
    use crate::node::NodeTree;
    use crate::tables::{
        CovariateRow, CovariateTable, MultiplierRow, NodeRow, Rate, RateTruthRow, Sex,
    };

    fn tree() -> NodeTree {
        let rows = vec![
            NodeRow {
                node_name: "n0".to_string(),
                parent_name: String::new(),
            },
            NodeRow {
                node_name: "n1".to_string(),
                parent_name: "n0".to_string(),
            },
            NodeRow {
                node_name: "n2".to_string(),
                parent_name: "n0".to_string(),
            },
            NodeRow {
                node_name: "n3".to_string(),
                parent_name: "n1".to_string(),
            },
            NodeRow {
                node_name: "n4".to_string(),
                parent_name: "n1".to_string(),
            },
        ];
        NodeTree::from_rows(&rows).unwrap()
    }

    fn flat_iota(value: f64) -> RateSurfaces {
        let rows = vec![RateTruthRow {
            rate_name: "iota".to_string(),
            age: 0.0,
            time: 2000.0,
            rate_truth: value,
        }];
        RateSurfaces::build(&rows).unwrap()
    }

    fn covariates(tree: &NodeTree, node: &str, haqi: &[(f64, f64)]) -> CovariateData {
        let rows = haqi
            .iter()
            .map(|&(age, value)| CovariateRow {
                node_name: node.to_string(),
                sex: Sex::Female,
                age,
                time: 2000.0,
                omega: 0.015,
                covariates: vec![value],
            })
            .collect();
        let table = CovariateTable {
            covariate_names: vec!["haqi".to_string()],
            rows,
        };
        CovariateData::build(&table, tree).unwrap()
    }

    fn model_parts(tree: &NodeTree, node: &str) -> (usize, CovariateData) {
        let data = covariates(tree, node, &[(0.0, 0.2), (100.0, 0.4)]);
        (tree.id(node).unwrap(), data)
    }

    fn model<'a>(
        node: usize,
        tree: &'a NodeTree,
        no_effect: &'a RateSurfaces,
        random_effects: &'a RandomEffects,
        multipliers: &'a [super::Multiplier],
        surfaces: &'a NodeSexSurfaces,
        averages: &'a [f64],
    ) -> RateModel<'a> {
        RateModel::new(
            node,
            tree,
            no_effect,
            random_effects,
            multipliers,
            surfaces,
            averages,
        )
    }

    #[test]
    fn zero_effects_reproduce_the_no_effect_rate() {
        let tree = tree();
        let no_effect = flat_iota(0.01);
        let effects = RandomEffects::from_values(vec![[0.0; 4]; tree.len()]);
        let (node, data) = model_parts(&tree, "n1");
        let m = model(
            node,
            &tree,
            &no_effect,
            &effects,
            &[],
            data.surfaces(node, Sex::Female).unwrap(),
            data.averages(node, Sex::Female).unwrap(),
        );
        assert_eq!(m.rate(Rate::Iota, 37.0, 1995.5), 0.01);
        assert_eq!(m.rate(Rate::Rho, 37.0, 1995.5), 0.0);
    }

    #[test]
    fn random_effects_accumulate_up_the_tree_excluding_the_root() {
        let tree = tree();
        let no_effect = flat_iota(0.01);
        // root draw must not contribute
        let mut draws = vec![[0.0; 4]; tree.len()];
        draws[0][Rate::Iota.index()] = 100.0;
        draws[1][Rate::Iota.index()] = 0.5;
        draws[3][Rate::Iota.index()] = 0.25;
        let effects = RandomEffects::from_values(draws);

        let (node, data) = model_parts(&tree, "n3");
        let m = model(
            node,
            &tree,
            &no_effect,
            &effects,
            &[],
            data.surfaces(node, Sex::Female).unwrap(),
            data.averages(node, Sex::Female).unwrap(),
        );
        let expected = (0.25_f64 + 0.5).exp() * 0.01;
        assert!((m.rate(Rate::Iota, 10.0, 2000.0) - expected).abs() < 1e-14);
    }

    #[test]
    fn covariate_effects_are_centered_on_the_reference_average() {
        let tree = tree();
        let no_effect = flat_iota(0.01);
        let effects = RandomEffects::from_values(vec![[0.0; 4]; tree.len()]);
        let (node, data) = model_parts(&tree, "n1");
        let multipliers = parse_multipliers(
            &[MultiplierRow {
                multiplier_id: 0,
                rate_name: "iota".to_string(),
                covariate_or_sex: "haqi".to_string(),
                multiplier_truth: 0.5,
            }],
            data.names(),
        )
        .unwrap();

        let m = model(
            node,
            &tree,
            &no_effect,
            &effects,
            &multipliers,
            data.surfaces(node, Sex::Female).unwrap(),
            data.averages(node, Sex::Female).unwrap(),
        );
        // average haqi is 0.3; at age 0 the covariate is 0.2
        let expected = (0.5_f64 * (0.2 - 0.3)).exp() * 0.01;
        assert!((m.rate(Rate::Iota, 0.0, 2000.0) - expected).abs() < 1e-14);
        // at the average the multiplier contributes nothing
        let at_mean = m.rate(Rate::Iota, 50.0, 2000.0);
        assert!((at_mean - 0.01).abs() < 1e-14);
    }

    #[test]
    fn sex_multipliers_contribute_no_effect() {
        let tree = tree();
        let no_effect = flat_iota(0.01);
        let effects = RandomEffects::from_values(vec![[0.0; 4]; tree.len()]);
        let (node, data) = model_parts(&tree, "n1");
        let multipliers = parse_multipliers(
            &[MultiplierRow {
                multiplier_id: 0,
                rate_name: "iota".to_string(),
                covariate_or_sex: "sex".to_string(),
                multiplier_truth: 2.0,
            }],
            data.names(),
        )
        .unwrap();

        let m = model(
            node,
            &tree,
            &no_effect,
            &effects,
            &multipliers,
            data.surfaces(node, Sex::Female).unwrap(),
            data.averages(node, Sex::Female).unwrap(),
        );
        assert_eq!(m.rate(Rate::Iota, 0.0, 2000.0), 0.01);
    }

    #[test]
    fn unknown_multiplier_covariate_is_rejected() {
        let names = vec!["haqi".to_string()];
        let rows = vec![MultiplierRow {
            multiplier_id: 0,
            rate_name: "iota".to_string(),
            covariate_or_sex: "gdp".to_string(),
            multiplier_truth: 1.0,
        }];
        assert!(parse_multipliers(&rows, &names).is_err());
    }

    #[test]
    fn random_effect_draws_are_reproducible() {
        use rand::SeedableRng;
        use rand_chacha::ChaCha8Rng;

        let tree = tree();
        let mut a = ChaCha8Rng::seed_from_u64(7);
        let mut b = ChaCha8Rng::seed_from_u64(7);
        let ra = RandomEffects::draw(&tree, 0.2, &mut a);
        let rb = RandomEffects::draw(&tree, 0.2, &mut b);
        for node in 0..tree.len() {
            for rate in Rate::ALL {
                assert_eq!(ra.get(node, rate), rb.get(node, rate));
            }
        }
    }
}
