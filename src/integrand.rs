//! The integrand vocabulary and the integration-engine boundary.
//!
//! Turning instantaneous rates into an average integrand over an age/time
//! interval is the job of an engine behind the [`IntegrandEngine`] trait.
//! The shipped [`ClosedFormEngine`] covers the integrands that are direct
//! grid averages of a single underlying rate; integrands that need the
//! compartmental disease model (prevalence and friends) are a boundary this
//! crate deliberately does not cross.

use crate::effect::RateModel;
use crate::grid::AvgGrid;
use crate::tables::Rate;
use crate::SimError;

/// The measurable quantities a simulate row may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Integrand {
    Sincidence,
    Remission,
    Mtexcess,
    Mtother,
    Mtwith,
    Susceptible,
    WithC,
    Prevalence,
    Tincidence,
    Mtspecific,
    Mtall,
    Mtstandard,
    Relrisk,
}

impl Integrand {
    pub const ALL: [Integrand; 13] = [
        Integrand::Sincidence,
        Integrand::Remission,
        Integrand::Mtexcess,
        Integrand::Mtother,
        Integrand::Mtwith,
        Integrand::Susceptible,
        Integrand::WithC,
        Integrand::Prevalence,
        Integrand::Tincidence,
        Integrand::Mtspecific,
        Integrand::Mtall,
        Integrand::Mtstandard,
        Integrand::Relrisk,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        Integrand::ALL.into_iter().find(|i| i.as_str() == s)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Integrand::Sincidence => "Sincidence",
            Integrand::Remission => "remission",
            Integrand::Mtexcess => "mtexcess",
            Integrand::Mtother => "mtother",
            Integrand::Mtwith => "mtwith",
            Integrand::Susceptible => "susceptible",
            Integrand::WithC => "withC",
            Integrand::Prevalence => "prevalence",
            Integrand::Tincidence => "Tincidence",
            Integrand::Mtspecific => "mtspecific",
            Integrand::Mtall => "mtall",
            Integrand::Mtstandard => "mtstandard",
            Integrand::Relrisk => "relrisk",
        }
    }
}

/// Black-box boundary to the numerical-integration engine: rate functions
/// in, one scalar average out.
pub trait IntegrandEngine {
    fn average(
        &self,
        model: &RateModel,
        integrand: Integrand,
        grid: &AvgGrid,
        abs_tol: f64,
    ) -> Result<f64, SimError>;
}

/// Engine for the integrands that equal the grid average of one rate.
///
/// `abs_tol` is accepted for engine compatibility; the closed forms are
/// exact up to the grid resolution and do not iterate.
pub struct ClosedFormEngine;

fn grid_average(grid: &AvgGrid, f: impl Fn(f64, f64) -> f64) -> f64 {
    let mut sum = 0.0;
    for &age in &grid.age {
        for &time in &grid.time {
            sum += f(age, time);
        }
    }
    sum / (grid.age.len() * grid.time.len()) as f64
}

impl IntegrandEngine for ClosedFormEngine {
    fn average(
        &self,
        model: &RateModel,
        integrand: Integrand,
        grid: &AvgGrid,
        _abs_tol: f64,
    ) -> Result<f64, SimError> {
        let average = match integrand {
            Integrand::Sincidence => grid_average(grid, |a, t| model.rate(Rate::Iota, a, t)),
            Integrand::Remission => grid_average(grid, |a, t| model.rate(Rate::Rho, a, t)),
            Integrand::Mtexcess => grid_average(grid, |a, t| model.rate(Rate::Chi, a, t)),
            Integrand::Mtother => grid_average(grid, |a, t| model.omega(a, t)),
            other => return Err(SimError::UnsupportedIntegrand(other.as_str())),
        };
        Ok(average)
    }
}
