// Dense solvers for the small F x F normal equations ALS produces.

use super::{FactorizationError, Result};
use ndarray::{Array1, Array2};

const MAX_JACOBI_SWEEPS: usize = 100;
const JACOBI_TOLERANCE: f64 = 1e-20;

/// Direct solve of `a · x = b` by LU with partial pivoting.
/// Returns `Singular` when a pivot vanishes relative to the matrix scale.
pub fn solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    if a.ncols() != n || b.len() != n {
        return Err(FactorizationError::Dimension(format!(
            "cannot solve {}x{} system with rhs of length {}",
            a.nrows(),
            a.ncols(),
            b.len()
        )));
    }

    let mut m = a.clone();
    let mut x = b.clone();

    let scale = m.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let tolerance = scale * n as f64 * f64::EPSILON;

    for col in 0..n {
        let (pivot_row, pivot_abs) = (col..n)
            .map(|r| (r, m[[r, col]].abs()))
            .fold((col, -1.0), |best, cur| if cur.1 > best.1 { cur } else { best });

        if pivot_abs <= tolerance || !pivot_abs.is_finite() {
            return Err(FactorizationError::Singular);
        }

        if pivot_row != col {
            for c in 0..n {
                m.swap([pivot_row, c], [col, c]);
            }
            x.swap(pivot_row, col);
        }

        let pivot = m[[col, col]];
        for r in (col + 1)..n {
            let factor = m[[r, col]] / pivot;
            if factor == 0.0 {
                continue;
            }
            for c in col..n {
                let upper = m[[col, c]];
                m[[r, c]] -= factor * upper;
            }
            let upper_rhs = x[col];
            x[r] -= factor * upper_rhs;
        }
    }

    for r in (0..n).rev() {
        let mut sum = x[r];
        for c in (r + 1)..n {
            sum -= m[[r, c]] * x[c];
        }
        x[r] = sum / m[[r, r]];
    }

    Ok(x)
}

/// Minimum-norm solution through the Moore-Penrose pseudo-inverse of a
/// symmetric matrix: `V · diag(1/λ) · Vᵀ · b`, dropping negligible eigenvalues.
pub fn pseudo_inverse_solve(a: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = a.nrows();
    let (eigenvalues, eigenvectors) = symmetric_eigen(a);

    let largest = eigenvalues.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let cutoff = largest * n as f64 * f64::EPSILON;

    let projected = eigenvectors.t().dot(b);
    let scaled = Array1::from_shape_fn(n, |i| {
        if eigenvalues[i].abs() > cutoff {
            projected[i] / eigenvalues[i]
        } else {
            0.0
        }
    });

    eigenvectors.dot(&scaled)
}

/// Direct solve, falling back to the pseudo-inverse on a singular system
pub fn solve_or_pseudo_inverse(a: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    match solve(a, b) {
        Ok(x) => x,
        Err(_) => pseudo_inverse_solve(a, b),
    }
}

/// Cyclic Jacobi eigendecomposition. Returns (eigenvalues, eigenvectors as columns).
fn symmetric_eigen(a: &Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let n = a.nrows();
    let mut m = a.clone();
    let mut v = Array2::<f64>::eye(n);

    for _ in 0..MAX_JACOBI_SWEEPS {
        let mut off_diagonal = 0.0;
        for p in 0..n {
            for q in 0..n {
                if p != q {
                    off_diagonal += m[[p, q]] * m[[p, q]];
                }
            }
        }
        if off_diagonal < JACOBI_TOLERANCE {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = m[[p, q]];
                if apq.abs() < f64::MIN_POSITIVE {
                    continue;
                }

                let theta = (m[[q, q]] - m[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let mkp = m[[k, p]];
                    let mkq = m[[k, q]];
                    m[[k, p]] = c * mkp - s * mkq;
                    m[[k, q]] = s * mkp + c * mkq;
                }
                for k in 0..n {
                    let mpk = m[[p, k]];
                    let mqk = m[[q, k]];
                    m[[p, k]] = c * mpk - s * mqk;
                    m[[q, k]] = s * mpk + c * mqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    (m.diag().to_owned(), v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn assert_close(a: &Array1<f64>, b: &Array1<f64>) {
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-8, "{} != {}", x, y);
        }
    }

    #[test]
    fn test_solve_requires_pivoting() {
        let a = array![[0.0, 2.0], [3.0, 1.0]];
        let b = array![4.0, 5.0];

        let x = solve(&a, &b).unwrap();

        assert_close(&x, &array![1.0, 2.0]);
    }

    #[test]
    fn test_singular_system_detected() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        let b = array![1.0, 2.0];

        assert!(matches!(solve(&a, &b), Err(FactorizationError::Singular)));
    }

    #[test]
    fn test_pseudo_inverse_gives_minimum_norm_solution() {
        // rank one: [[1,1],[1,1]] x = [2,2] -> x = [1,1]
        let a = array![[1.0, 1.0], [1.0, 1.0]];
        let b = array![2.0, 2.0];

        let x = solve_or_pseudo_inverse(&a, &b);

        assert_close(&x, &array![1.0, 1.0]);
    }

    #[test]
    fn test_pseudo_inverse_matches_solve_when_invertible() {
        let a = array![[4.0, 1.0, 0.0], [1.0, 3.0, 1.0], [0.0, 1.0, 2.0]];
        let b = array![1.0, 2.0, 3.0];

        let direct = solve(&a, &b).unwrap();
        let pinv = pseudo_inverse_solve(&a, &b);

        assert_close(&direct, &pinv);
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = array![[1.0, 0.0], [0.0, 1.0]];
        let b = array![1.0, 2.0, 3.0];

        assert!(matches!(solve(&a, &b), Err(FactorizationError::Dimension(_))));
    }
}
