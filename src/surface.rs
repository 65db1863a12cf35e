//! Bilinear surfaces over rectangular sample grids.
//!
//! A surface is built from tabular samples keyed by two independent
//! coordinates (age and time everywhere in this crate). The observed
//! coordinate pairs must cover the full Cartesian product of the distinct
//! values on each axis, exactly once each. Evaluation outside the sampled
//! bounding box clamps to the nearest edge, so the surface extends as a
//! constant in each axis.

/// One sample of a gridded table: two independent coordinates plus the
/// dependent values, one per requested z column.
#[derive(Debug, Clone)]
pub struct SamplePoint {
    pub x: f64,
    pub y: f64,
    pub z: Vec<f64>,
}

/// A bilinear interpolant over one z column of a rectangular sample table.
#[derive(Debug, Clone)]
pub struct Surface {
    x_grid: Vec<f64>,
    y_grid: Vec<f64>,
    // x-major: z[ix * y_grid.len() + iy]
    z: Vec<f64>,
}

/// The observed (x, y) pairs do not cover the product of the distinct axis
/// values exactly once each. Carries the computed grids so the caller can
/// report the expected shape.
#[derive(Debug, Clone)]
pub struct NotRectangular {
    pub x_grid: Vec<f64>,
    pub y_grid: Vec<f64>,
}

fn distinct_sorted(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut grid: Vec<f64> = values.collect();
    grid.sort_by(|a, b| a.total_cmp(b));
    grid.dedup_by(|a, b| a == b);
    grid
}

fn grid_index(grid: &[f64], v: f64) -> Option<usize> {
    grid.binary_search_by(|g| g.total_cmp(&v)).ok()
}

/// Build one surface per z column from a rectangular sample table.
///
/// Returns the sorted distinct grids for both axes along with the surfaces.
/// Every sample must carry `n_z` dependent values.
pub fn build_surfaces(
    points: &[SamplePoint],
    n_z: usize,
) -> Result<(Vec<f64>, Vec<f64>, Vec<Surface>), NotRectangular> {
    let x_grid = distinct_sorted(points.iter().map(|p| p.x));
    let y_grid = distinct_sorted(points.iter().map(|p| p.y));
    let nx = x_grid.len();
    let ny = y_grid.len();

    let not_rectangular = || NotRectangular {
        x_grid: x_grid.clone(),
        y_grid: y_grid.clone(),
    };

    if points.len() != nx * ny {
        return Err(not_rectangular());
    }

    let mut occupied = vec![false; nx * ny];
    let mut z_values = vec![0.0_f64; nx * ny * n_z];
    for point in points {
        debug_assert_eq!(point.z.len(), n_z);
        // distinct_sorted retains every observed value, so both lookups succeed
        let ix = grid_index(&x_grid, point.x).unwrap_or(0);
        let iy = grid_index(&y_grid, point.y).unwrap_or(0);
        let slot = ix * ny + iy;
        if occupied[slot] {
            return Err(not_rectangular());
        }
        occupied[slot] = true;
        for (k, &z) in point.z.iter().enumerate() {
            z_values[k * nx * ny + slot] = z;
        }
    }
    // points.len() == nx * ny and no slot repeated, so every slot is filled

    let surfaces = (0..n_z)
        .map(|k| Surface {
            x_grid: x_grid.clone(),
            y_grid: y_grid.clone(),
            z: z_values[k * nx * ny..(k + 1) * nx * ny].to_vec(),
        })
        .collect();

    Ok((x_grid, y_grid, surfaces))
}

/// Bracketing interval and interpolation fraction for `v` on `grid`,
/// clamped to the grid range. A single-value grid brackets everything
/// at fraction zero.
fn bracket(grid: &[f64], v: f64) -> (usize, f64) {
    let n = grid.len();
    if n == 1 || v <= grid[0] {
        return (0, 0.0);
    }
    if v >= grid[n - 1] {
        return (n - 2, 1.0);
    }
    let hi = grid.partition_point(|g| *g <= v);
    let lo = hi - 1;
    (lo, (v - grid[lo]) / (grid[hi] - grid[lo]))
}

impl Surface {
    fn at(&self, ix: usize, iy: usize) -> f64 {
        self.z[ix * self.y_grid.len() + iy]
    }

    /// Bilinear interpolation at (x, y), constant outside the sampled box.
    pub fn eval(&self, x: f64, y: f64) -> f64 {
        let (ix, tx) = bracket(&self.x_grid, x);
        let (iy, ty) = bracket(&self.y_grid, y);
        let ix1 = (ix + 1).min(self.x_grid.len() - 1);
        let iy1 = (iy + 1).min(self.y_grid.len() - 1);

        let z00 = self.at(ix, iy);
        let z10 = self.at(ix1, iy);
        let z01 = self.at(ix, iy1);
        let z11 = self.at(ix1, iy1);

        let lo = z00 + tx * (z10 - z00);
        let hi = z01 + tx * (z11 - z01);
        lo + ty * (hi - lo)
    }

    pub fn x_grid(&self) -> &[f64] {
        &self.x_grid
    }

    pub fn y_grid(&self) -> &[f64] {
        &self.y_grid
    }
}
