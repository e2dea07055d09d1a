//! Symmetric eigen-decomposition.
//!
//! Householder reduction to tridiagonal form followed by the implicit QL
//! method, accumulating the orthogonal transformations so that the
//! eigenvectors come out as the columns of the returned matrix. Real
//! symmetric input only; eigenvalues are real.

#![allow(clippy::needless_range_loop)]

use crate::errors::AggregationError;
use ndarray::{Array1, Array2};

/// Upper bound on QL iterations spent isolating a single eigenvalue.
const MAX_QL_ITERATIONS: usize = 60;

/// Eigenvalues and column eigenvectors of a symmetric matrix.
#[derive(Debug, Clone)]
pub struct SymmetricEigen {
    /// Eigenvalues in no particular order.
    pub values: Array1<f64>,
    /// Column `j` is the unit eigenvector for `values[j]`.
    pub vectors: Array2<f64>,
}

impl SymmetricEigen {
    /// Index of the largest eigenvalue. Ties keep the first index.
    pub fn largest(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, value) in self.values.iter().enumerate() {
            match best {
                Some(b) if *value <= self.values[b] => {}
                _ => best = Some(i),
            }
        }
        best
    }
}

/// Decompose a real symmetric matrix.
///
/// Only the lower triangle is trusted; asymmetric input gives meaningless
/// results rather than an error.
pub fn symmetric_eigen(matrix: &Array2<f64>) -> Result<SymmetricEigen, AggregationError> {
    let n = matrix.nrows();
    if matrix.ncols() != n {
        return Err(AggregationError::EigenFailed(n));
    }
    if n == 0 {
        return Ok(SymmetricEigen {
            values: Array1::zeros(0),
            vectors: Array2::zeros((0, 0)),
        });
    }

    let mut v = matrix.to_owned();
    let mut d = vec![0.0; n];
    let mut e = vec![0.0; n];

    tridiagonalize(&mut v, &mut d, &mut e);
    diagonalize(&mut v, &mut d, &mut e)?;

    Ok(SymmetricEigen {
        values: Array1::from(d),
        vectors: v,
    })
}

/// Householder reduction. On return `d` holds the diagonal, `e[1..]` the
/// subdiagonal and `v` the accumulated transformation.
fn tridiagonalize(v: &mut Array2<f64>, d: &mut [f64], e: &mut [f64]) {
    let n = d.len();

    for j in 0..n {
        d[j] = v[[n - 1, j]];
    }

    for i in (1..n).rev() {
        let mut scale = 0.0;
        let mut h = 0.0;
        for k in 0..i {
            scale += d[k].abs();
        }

        if scale == 0.0 {
            e[i] = d[i - 1];
            for j in 0..i {
                d[j] = v[[i - 1, j]];
                v[[i, j]] = 0.0;
                v[[j, i]] = 0.0;
            }
        } else {
            for k in 0..i {
                d[k] /= scale;
                h += d[k] * d[k];
            }

            let mut f = d[i - 1];
            let mut g = h.sqrt();
            if f > 0.0 {
                g = -g;
            }
            e[i] = scale * g;
            h -= f * g;
            d[i - 1] = f - g;

            for j in 0..i {
                e[j] = 0.0;
            }

            for j in 0..i {
                f = d[j];
                v[[j, i]] = f;
                g = e[j] + v[[j, j]] * f;
                for k in (j + 1)..i {
                    g += v[[k, j]] * d[k];
                    e[k] += v[[k, j]] * f;
                }
                e[j] = g;
            }

            f = 0.0;
            for j in 0..i {
                e[j] /= h;
                f += e[j] * d[j];
            }
            let hh = f / (h + h);
            for j in 0..i {
                e[j] -= hh * d[j];
            }

            for j in 0..i {
                f = d[j];
                g = e[j];
                for k in j..i {
                    v[[k, j]] -= f * e[k] + g * d[k];
                }
                d[j] = v[[i - 1, j]];
                v[[i, j]] = 0.0;
            }
        }

        d[i] = h;
    }

    // Accumulate transformations.
    for i in 0..n - 1 {
        v[[n - 1, i]] = v[[i, i]];
        v[[i, i]] = 1.0;
        let h = d[i + 1];
        if h != 0.0 {
            for k in 0..=i {
                d[k] = v[[k, i + 1]] / h;
            }
            for j in 0..=i {
                let mut g = 0.0;
                for k in 0..=i {
                    g += v[[k, i + 1]] * v[[k, j]];
                }
                for k in 0..=i {
                    v[[k, j]] -= g * d[k];
                }
            }
        }
        for k in 0..=i {
            v[[k, i + 1]] = 0.0;
        }
    }

    for j in 0..n {
        d[j] = v[[n - 1, j]];
        v[[n - 1, j]] = 0.0;
    }
    v[[n - 1, n - 1]] = 1.0;
    e[0] = 0.0;
}

/// Implicit QL on the tridiagonal form. On return `d` holds the
/// eigenvalues and the columns of `v` the eigenvectors.
fn diagonalize(v: &mut Array2<f64>, d: &mut [f64], e: &mut [f64]) -> Result<(), AggregationError> {
    let n = d.len();

    for i in 1..n {
        e[i - 1] = e[i];
    }
    e[n - 1] = 0.0;

    let mut f = 0.0;
    let mut tst1: f64 = 0.0;
    let eps = f64::EPSILON;

    for l in 0..n {
        // Find a small subdiagonal element. e[n - 1] is zero, so m < n.
        tst1 = tst1.max(d[l].abs() + e[l].abs());
        let mut m = l;
        while m < n - 1 && e[m].abs() > eps * tst1 {
            m += 1;
        }

        if m > l {
            let mut iterations = 0;
            loop {
                iterations += 1;
                if iterations > MAX_QL_ITERATIONS {
                    return Err(AggregationError::EigenFailed(n));
                }

                // Implicit shift.
                let mut g = d[l];
                let mut p = (d[l + 1] - g) / (2.0 * e[l]);
                let mut r = p.hypot(1.0);
                if p < 0.0 {
                    r = -r;
                }
                d[l] = e[l] / (p + r);
                d[l + 1] = e[l] * (p + r);
                let dl1 = d[l + 1];
                let mut h = g - d[l];
                for i in (l + 2)..n {
                    d[i] -= h;
                }
                f += h;

                // Implicit QL transformation.
                p = d[m];
                let mut c = 1.0;
                let mut c2 = c;
                let mut c3 = c;
                let el1 = e[l + 1];
                let mut s = 0.0;
                let mut s2 = 0.0;

                for i in (l..m).rev() {
                    c3 = c2;
                    c2 = c;
                    s2 = s;
                    g = c * e[i];
                    h = c * p;
                    r = p.hypot(e[i]);
                    e[i + 1] = s * r;
                    s = e[i] / r;
                    c = p / r;
                    p = c * d[i] - s * g;
                    d[i + 1] = h + s * (c * g + s * d[i]);

                    for k in 0..n {
                        h = v[[k, i + 1]];
                        v[[k, i + 1]] = s * v[[k, i]] + c * h;
                        v[[k, i]] = c * v[[k, i]] - s * h;
                    }
                }

                p = -s * s2 * c3 * el1 * e[l] / dl1;
                e[l] = s * p;
                d[l] = c * p;

                if e[l].abs() <= eps * tst1 {
                    break;
                }
            }
        }

        d[l] += f;
        e[l] = 0.0;
    }

    Ok(())
}
