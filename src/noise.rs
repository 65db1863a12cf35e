//! Censored-Gaussian measurement noise.

use rand::Rng;
use rand_distr::StandardNormal;

/// The noise standard deviation (before censoring) and the simulated value.
#[derive(Debug, Clone, Copy)]
pub struct NoisyMeasurement {
    pub std: f64,
    pub value: f64,
}

/// Draw one censored-normal measurement around `mean`.
///
/// `std = mean * percent_cv / 100`; the value is floored at zero. Exactly
/// one standard-normal draw is consumed per call, even when the standard
/// deviation is zero, so the position of the shared random stream depends
/// only on how many rows have been processed.
pub fn censored_measurement<R: Rng>(
    rng: &mut R,
    mean: f64,
    percent_cv: f64,
) -> NoisyMeasurement {
    let std = mean * percent_cv / 100.0;
    let z: f64 = rng.sample(StandardNormal);
    NoisyMeasurement {
        std,
        value: (mean + std * z).max(0.0),
    }
}
