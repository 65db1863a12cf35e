//! Quadrature grids for averaging integrands over age/time intervals.

/// The rectangular evaluation grid handed to the integration engine: the
/// outer product of the two axis grids.
#[derive(Debug, Clone, PartialEq)]
pub struct AvgGrid {
    pub age: Vec<f64>,
    pub time: Vec<f64>,
}

/// Split `[lower, upper]` into equal-width segments no wider than `step`.
///
/// A zero-width interval yields the single boundary value. Both endpoints
/// are exact; interior points are computed as `lower + i * width` so no
/// rounding drift accumulates.
fn axis_grid(lower: f64, upper: f64, step: f64) -> Vec<f64> {
    if lower == upper {
        return vec![lower];
    }
    let n = ((upper - lower) / step) as usize + 1;
    let width = (upper - lower) / n as f64;
    let mut grid: Vec<f64> = (0..=n).map(|i| lower + i as f64 * width).collect();
    grid[n] = upper;
    grid
}

/// Build the evaluation grid for one simulate row.
pub fn average_grid(
    step: f64,
    age_lower: f64,
    age_upper: f64,
    time_lower: f64,
    time_upper: f64,
) -> AvgGrid {
    debug_assert!(step > 0.0);
    AvgGrid {
        age: axis_grid(age_lower, age_upper, step),
        time: axis_grid(time_lower, time_upper, step),
    }
}

#[cfg(test)]
mod tests {
    use super::{average_grid, axis_grid};

    #[test]
    fn zero_width_interval_is_a_single_point() {
        assert_eq!(axis_grid(50.0, 50.0, 5.0), vec![50.0]);
    }

    #[test]
    fn endpoints_are_exactly_the_requested_bounds() {
        let grid = axis_grid(0.1, 99.9, 7.3);
        assert_eq!(grid[0], 0.1);
        assert_eq!(*grid.last().unwrap(), 99.9);
    }

    #[test]
    fn spacing_never_exceeds_the_step() {
        let grid = axis_grid(0.0, 100.0, 7.0);
        for pair in grid.windows(2) {
            assert!(pair[1] - pair[0] <= 7.0 + 1e-12);
        }
    }

    #[test]
    fn subinterval_count_matches_the_contract() {
        // floor(10 / 3) + 1 = 4 subintervals, 5 points
        let grid = axis_grid(0.0, 10.0, 3.0);
        assert_eq!(grid.len(), 5);
        assert!((grid[1] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn grid_covers_both_axes() {
        let grid = average_grid(5.0, 0.0, 10.0, 2000.0, 2000.0);
        assert_eq!(grid.time, vec![2000.0]);
        assert_eq!(grid.age.first(), Some(&0.0));
        assert_eq!(grid.age.last(), Some(&10.0));
    }
}
