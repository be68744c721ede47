//! Closed-form ridge solution for small universes.
//!
//! Solves `((2/n) XᵀX + 2λI) w = (2/n) Xᵀy`, the stationarity condition of the
//! same objective the gradient trainer minimizes. Cost is O(N³) in the universe
//! size, so this is a reference check rather than a production path.

use crate::dataset::universe_dim;
use crate::error::{RapmError, RapmResult};
use crate::sparse::Example;
use crate::trainer::{Weights, validate_reg_param};

const PIVOT_EPS: f64 = 1e-12;

pub fn solve_ridge(examples: &[Example], reg_param: f64) -> RapmResult<Weights> {
    validate_reg_param(reg_param)?;
    let Some(dim) = universe_dim(examples)? else {
        return Err(RapmError::invalid("training set is empty"));
    };

    let scale = 2.0 / examples.len() as f64;
    // Augmented system [A | b], row-major, dim x (dim + 1).
    let width = dim + 1;
    let mut m = vec![0.0_f64; dim * width];
    for example in examples {
        let entries: Vec<(usize, f64)> = example.features.iter().collect();
        for &(i, xi) in &entries {
            for &(j, xj) in &entries {
                m[i * width + j] += scale * xi * xj;
            }
            m[i * width + dim] += scale * xi * example.label;
        }
    }
    for i in 0..dim {
        m[i * width + i] += 2.0 * reg_param;
    }

    gaussian_solve(&mut m, dim).map(Weights::from)
}

fn gaussian_solve(m: &mut [f64], dim: usize) -> RapmResult<Vec<f64>> {
    let width = dim + 1;
    for col in 0..dim {
        let mut pivot = col;
        for row in col + 1..dim {
            if m[row * width + col].abs() > m[pivot * width + col].abs() {
                pivot = row;
            }
        }
        if m[pivot * width + col].abs() < PIVOT_EPS {
            return Err(RapmError::Singular);
        }
        if pivot != col {
            for k in 0..width {
                m.swap(col * width + k, pivot * width + k);
            }
        }
        let p = m[col * width + col];
        for row in col + 1..dim {
            let factor = m[row * width + col] / p;
            if factor == 0.0 {
                continue;
            }
            for k in col..width {
                m[row * width + k] -= factor * m[col * width + k];
            }
        }
    }

    let mut x = vec![0.0_f64; dim];
    for row in (0..dim).rev() {
        let mut acc = m[row * width + dim];
        for k in row + 1..dim {
            acc -= m[row * width + k] * x[k];
        }
        x[row] = acc / m[row * width + row];
    }
    Ok(x)
}
