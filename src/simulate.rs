//! The simulation driver: one sequential pass from input tables to the
//! simulated-data and covariate-average output tables.
//!
//! The only shared mutable state is the seeded random stream. Draw order is
//! fixed and documented: random effects first (nodes in node-table order,
//! rates in enum order), then exactly one noise draw per simulate row in
//! input-row order. Re-running with the same seed reproduces the outputs
//! byte for byte.

use std::path::Path;

use chrono::Utc;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::covariate::CovariateData;
use crate::effect::{parse_multipliers, RandomEffects, RateModel, RateSurfaces};
use crate::grid::average_grid;
use crate::integrand::{Integrand, IntegrandEngine};
use crate::noise::censored_measurement;
use crate::node::NodeTree;
use crate::tables::{self, DataRow, OptionRow, Options, Sex};
use crate::SimError;

/// Absolute tolerance passed through to the integration engine.
const ABS_TOL: f64 = 1e-5;

const TABLE: &str = "simulate";

/// Run the whole simulation over the tables in `dir`.
///
/// Reads option.csv, node.csv, covariate.csv, no_effect_rate.csv,
/// multiplier_sim.csv, and simulate.csv; writes data_sim.csv and
/// covariate_avg.csv. When option.csv carries no random seed, one is
/// synthesized from the clock and persisted back before anything is drawn,
/// so a re-run reproduces this run. Any validation failure aborts before
/// either output table is written.
pub fn run_simulation(dir: &Path, engine: &dyn IntegrandEngine) -> Result<(), SimError> {
    let mut option_rows = tables::read_option_table(dir)?;
    let mut options = Options::from_rows(&option_rows)?;

    if options.random_seed.is_none() {
        let seed = Utc::now().timestamp().max(0) as u64;
        option_rows.push(OptionRow {
            name: "random_seed".to_string(),
            value: seed.to_string(),
        });
        tables::write_option_table(dir, &option_rows)?;
        options.random_seed = Some(seed);
    }
    let seed = options.random_seed.unwrap_or_default();
    log::info!("random_seed = {seed}");
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let node_rows = tables::read_node_table(dir)?;
    let tree = NodeTree::from_rows(&node_rows)?;

    let covariate_table = tables::read_covariate_table(dir)?;
    let covariates = CovariateData::build(&covariate_table, &tree)?;

    let rate_rows = tables::read_rate_table(dir)?;
    let no_effect = RateSurfaces::build(&rate_rows)?;

    // first consumption of the stream; must happen before any row is processed
    let random_effects = RandomEffects::draw(&tree, options.std_random_effects, &mut rng);

    let multiplier_rows = tables::read_multiplier_table(dir)?;
    let multipliers = parse_multipliers(&multiplier_rows, covariates.names())?;

    let simulate_rows = tables::read_simulate_table(dir)?;
    log::info!(
        "simulating {} rows over {} nodes",
        simulate_rows.len(),
        tree.len()
    );

    let mut data_rows = Vec::with_capacity(simulate_rows.len());
    for (index, row) in simulate_rows.iter().enumerate() {
        let table_row = index + 1;
        let invalid = |message: String| SimError::TableRow {
            table: TABLE,
            row: table_row,
            message,
        };

        if row.simulate_id != index {
            return Err(invalid(format!(
                "simulate_id = {} is not equal to the row index {index}",
                row.simulate_id
            )));
        }
        let integrand = Integrand::parse(&row.integrand_name).ok_or_else(|| {
            invalid(format!(
                "integrand_name = {} is not a valid integrand name",
                row.integrand_name
            ))
        })?;
        let node = tree
            .id(&row.node_name)
            .ok_or_else(|| invalid(format!("node_name = {} is not in node.csv", row.node_name)))?;
        let sex = Sex::parse(&row.sex)
            .ok_or_else(|| invalid(format!("sex = {} is not male, female, or both", row.sex)))?;
        if row.age_upper < row.age_lower {
            return Err(invalid(format!(
                "age_upper = {} < age_lower = {}",
                row.age_upper, row.age_lower
            )));
        }
        if row.time_upper < row.time_lower {
            return Err(invalid(format!(
                "time_upper = {} < time_lower = {}",
                row.time_upper, row.time_lower
            )));
        }

        let surfaces = covariates.surfaces(node, sex).ok_or_else(|| {
            invalid(format!(
                "covariate.csv has no rows for node_name = {}, sex = {}",
                row.node_name,
                sex.as_str()
            ))
        })?;
        let averages = covariates.averages(node, sex).unwrap_or(&[]);

        let age_mid = (row.age_lower + row.age_upper) / 2.0;
        let time_mid = (row.time_lower + row.time_upper) / 2.0;
        let midpoint_covariates: Vec<f64> = surfaces
            .covariates
            .iter()
            .map(|s| s.eval(age_mid, time_mid))
            .collect();

        let model = RateModel::new(
            node,
            &tree,
            &no_effect,
            &random_effects,
            &multipliers,
            surfaces,
            averages,
        );
        let grid = average_grid(
            options.integrand_step_size,
            row.age_lower,
            row.age_upper,
            row.time_lower,
            row.time_upper,
        );

        let meas_mean = engine.average(&model, integrand, &grid, ABS_TOL)?;
        let noise = censored_measurement(&mut rng, meas_mean, row.percent_cv);

        data_rows.push(DataRow {
            simulate_id: row.simulate_id,
            meas_mean,
            meas_value: noise.value,
            meas_std: noise.std,
            covariates: midpoint_covariates,
        });
    }

    tables::write_data_table(dir, covariates.names(), &data_rows)?;
    tables::write_covariate_avg_table(dir, covariates.names(), &covariates.average_rows(&tree))?;
    Ok(())
}
