//! Synthetic measurement-data generator for hierarchical disease-rate models.
//!
//! Given "true" rate surfaces on a tree of geographic nodes, the crate
//! forward-simulates noisy measurements under a
//! random-effects-plus-covariate-effects generative model, so that a
//! downstream cascading fit can be checked against known truth.
//!
//! The library exposes the surface, tree, effect, grid, integrand, noise,
//! and driver modules used by the `cascade-sim` CLI binary.

pub mod covariate;
pub mod effect;
pub mod grid;
pub mod integrand;
pub mod noise;
pub mod node;
pub mod simulate;
pub mod surface;
pub mod tables;

use thiserror::Error;

pub use integrand::{ClosedFormEngine, Integrand, IntegrandEngine};
pub use simulate::run_simulation;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("option.csv: {0}")]
    InvalidOption(String),
    #[error("{table}.csv row {row}: {message}")]
    TableRow {
        table: &'static str,
        row: usize,
        message: String,
    },
    #[error("{table}.csv: {message}")]
    Table {
        table: &'static str,
        message: String,
    },
    #[error(
        "{table}.csv: {group} is not a rectangular grid\n\
         expected every combination of\n\
         {x_name} grid: {x_grid:?}\n\
         {y_name} grid: {y_grid:?}"
    )]
    NonRectangular {
        table: &'static str,
        group: String,
        x_name: &'static str,
        y_name: &'static str,
        x_grid: Vec<f64>,
        y_grid: Vec<f64>,
    },
    #[error("integrand {0} requires a compartmental integration engine")]
    UnsupportedIntegrand(&'static str),
}
